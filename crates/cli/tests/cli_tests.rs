//! CLI integration tests

use serde_json::{json, Value};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn qm(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_qm"))
        .args(args)
        .env_remove("QM_MODEL_DIR")
        .output()
        .expect("Failed to execute command")
}

fn qm_json(model_dir: &Path, args: &[&str]) -> Value {
    let dir = model_dir.to_str().unwrap();
    let mut full = vec!["--model-dir", dir, "--format", "json"];
    full.extend_from_slice(args);
    let output = qm(&full);
    assert!(
        output.status.success(),
        "qm {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn write_training_files(dir: &Path) {
    let records: Vec<Value> = (0..45)
        .map(|i| {
            let (temperature, status) = match i % 3 {
                0 => (4.0 + (i % 5) as f64 * 0.5, "Good"),
                1 => (15.0 + (i % 4) as f64, "Degraded"),
                _ => (28.0 + (i % 3) as f64, "Counterfeit"),
            };
            json!({
                "storage_temperature": temperature,
                "storage_humidity": 55.0 + (i % 7) as f64,
                "ph_level": 7.0,
                "moisture_content": 5.0,
                "impurity_percentage": 0.5,
                "active_ingredient_concentration": 95.0,
                "manufacturing_date": "2024-01-01T00:00:00Z",
                "inspection_date": format!("2024-02-{:02}T00:00:00Z", 1 + i % 28),
                "quality_status": status,
            })
        })
        .collect();
    let readings: Vec<Value> = (0..60)
        .map(|i| {
            json!({
                "temperature": 4.0 + (i % 5) as f64 * 0.4,
                "humidity": 55.0 + (i % 9) as f64,
            })
        })
        .collect();
    std::fs::write(dir.join("records.json"), Value::from(records).to_string()).unwrap();
    std::fs::write(dir.join("readings.json"), Value::from(readings).to_string()).unwrap();
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = qm(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("Medicine Quality Monitor"),
        "Should show app name"
    );
    for command in ["train", "predict", "timeline", "detect", "alerts", "analyze", "status"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
    assert!(stdout.contains("--model-dir"), "Should show model dir option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = qm(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("qm"), "Should show binary name");
}

#[test]
fn test_predict_help() {
    let output = qm(&["predict", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--temperature"));
    assert!(stdout.contains("--days-elapsed"));
    assert!(stdout.contains("--active-ingredient"));
}

#[test]
fn test_alerts_without_models() {
    let dir = TempDir::new().unwrap();
    let evaluation = qm_json(
        dir.path(),
        &["alerts", "--temperature", "30", "--humidity", "60"],
    );

    assert_eq!(evaluation["status"], "Alert");
    assert_eq!(evaluation["alerts"].as_array().unwrap().len(), 1);
    assert_eq!(evaluation["alerts"][0]["alert_type"], "temperature");
    assert_eq!(evaluation["alerts"][0]["severity"], "high");
}

#[test]
fn test_predict_fails_without_models() {
    let dir = TempDir::new().unwrap();
    let output = qm(&[
        "--model-dir",
        dir.path().to_str().unwrap(),
        "predict",
        "--temperature",
        "5",
        "--humidity",
        "60",
    ]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not trained"));
}

#[test]
fn test_train_then_predict_and_status() {
    let data = TempDir::new().unwrap();
    let models = TempDir::new().unwrap();
    write_training_files(data.path());

    let records = data.path().join("records.json");
    let readings = data.path().join("readings.json");
    let report = qm_json(
        models.path(),
        &[
            "train",
            "--records",
            records.to_str().unwrap(),
            "--readings",
            readings.to_str().unwrap(),
        ],
    );
    assert_eq!(report["quality"]["skipped_records"], 0);
    assert_eq!(report["anomaly"]["samples"], 60);

    let assessment = qm_json(
        models.path(),
        &["predict", "--temperature", "5", "--humidity", "60", "--days-elapsed", "30"],
    );
    let score = assessment["quality_score"].as_f64().unwrap();
    assert!((0.0..=100.0).contains(&score));

    let timeline = qm_json(
        models.path(),
        &["timeline", "--temperature", "5", "--humidity", "60", "--days", "15"],
    );
    assert_eq!(timeline["timeline"].as_array().unwrap().len(), 3);

    let status = qm_json(models.path(), &["status"]);
    let status = status.as_array().unwrap();
    assert!(status.iter().all(|m| m["status"] == "active"));
    assert!(status.iter().all(|m| m["state"] == "loaded"));
}
