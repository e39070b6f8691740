//! End-to-end tests for the inference service over an in-memory store

use chrono::{Duration, TimeZone, Utc};
use inference_lib::service::SMART_ANALYSIS_TIMELINE_POINTS;
use inference_lib::{
    InMemoryStore, InferenceError, InferenceService, ModelState, MonitoringStore,
    OverallStatus, PipelineConfig, Product, ProductStatus, QualityFeatures, QualityRecord,
    SensorReading, StorageConditions,
};
use std::sync::Arc;
use tempfile::TempDir;

fn quality_records(n: i64) -> Vec<QualityRecord> {
    let manufactured = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let (temperature, status) = match i % 3 {
                0 => (4.0 + (i % 5) as f64 * 0.5, "Good"),
                1 => (15.0 + (i % 4) as f64, "Degraded"),
                _ => (28.0 + (i % 3) as f64, "Counterfeit"),
            };
            QualityRecord {
                storage_temperature: Some(temperature),
                storage_humidity: Some(55.0 + (i % 7) as f64),
                ph_level: Some(7.0),
                moisture_content: Some(5.0),
                impurity_percentage: Some(0.5),
                active_ingredient_concentration: Some(95.0),
                manufacturing_date: Some(manufactured),
                inspection_date: Some(manufactured + Duration::days(30 + i)),
                imported_at: None,
                quality_status: Some(status.to_string()),
            }
        })
        .collect()
}

fn normal_reading(i: usize) -> SensorReading {
    let t = ((i * 37) % 100) as f64 / 100.0;
    let h = ((i * 53) % 100) as f64 / 100.0;
    SensorReading::new(4.0 + 2.0 * t, 55.0 + 10.0 * h)
        .with_light_exposure(45.0 + ((i * 13) % 10) as f64)
        .with_vibration(0.4 + 0.02 * ((i * 7) % 10) as f64)
}

fn config(dir: &TempDir) -> PipelineConfig {
    let mut config = PipelineConfig::with_model_dir(dir.path());
    config.forest.n_estimators = 20;
    config.boosting.n_estimators = 20;
    config
}

fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.insert_product(Product {
        id: 7,
        name: "Insulin Glargine".to_string(),
        batch_number: "INS-2024-07".to_string(),
        manufacturing_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        status: ProductStatus::SafeVerified,
    });
    store.add_quality_records(quality_records(60));
    for i in 0..200 {
        store.append_reading(7, normal_reading(i));
    }
    store
}

fn features(temperature: f64) -> QualityFeatures {
    StorageConditions {
        temperature,
        humidity: 60.0,
        ph: 7.0,
        moisture: 5.0,
        impurity: 0.5,
        active_ingredient: 95.0,
    }
    .at_day(45.0)
}

#[test]
fn test_train_from_store_then_reload() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store();
    let service = InferenceService::new(&config(&dir), store.clone());

    let (quality, anomaly) = service.train_from_store().unwrap();
    assert_eq!(quality.train_samples + quality.test_samples, 60);
    assert_eq!(quality.skipped_records, 0);
    assert_eq!(anomaly.samples, 200);
    assert_eq!(service.quality_model().state(), ModelState::Persisted);

    let before = service.predict_quality(&features(5.0)).unwrap();

    let reloaded = InferenceService::new(&config(&dir), store);
    let availability = reloaded.load_models();
    assert!(availability.quality && availability.anomaly);
    assert_eq!(reloaded.quality_model().state(), ModelState::Loaded);
    assert_eq!(reloaded.predict_quality(&features(5.0)).unwrap(), before);
    assert_eq!(
        reloaded.quality_model().run_id(),
        service.quality_model().run_id()
    );
}

#[test]
fn test_quality_alert_tracks_score() {
    let dir = TempDir::new().unwrap();
    let service = InferenceService::new(&config(&dir), seeded_store());
    service.train_quality(&quality_records(60)).unwrap();

    for temperature in [4.0, 16.0, 29.0] {
        let assessment = service.predict_quality(&features(temperature)).unwrap();
        let score = assessment.prediction.quality_score;
        assert!((0.0..=100.0).contains(&score));
        assert_eq!(assessment.alert.is_some(), score < 70.0);
        let total: f64 = assessment.prediction.confidence.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}

#[test]
fn test_timeline_warning_tracks_points() {
    let dir = TempDir::new().unwrap();
    let service = InferenceService::new(&config(&dir), seeded_store());
    service.train_quality(&quality_records(60)).unwrap();

    let conditions = StorageConditions {
        temperature: 29.0,
        humidity: 60.0,
        ph: 7.0,
        moisture: 5.0,
        impurity: 0.5,
        active_ingredient: 95.0,
    };
    let report = service.predict_degradation_timeline(&conditions, 30).unwrap();
    let days: Vec<u32> = report.timeline.iter().map(|p| p.days_from_now).collect();
    assert_eq!(days, vec![0, 5, 10, 15, 20, 25]);
    assert_eq!(
        report.warning.is_some(),
        report.timeline.iter().any(|p| p.predicted_quality < 70.0)
    );

    let empty = service.predict_degradation_timeline(&conditions, 0).unwrap();
    assert!(empty.timeline.is_empty());
    assert!(empty.warning.is_none());
}

#[test]
fn test_insufficient_training_data_leaves_model_untrained() {
    let dir = TempDir::new().unwrap();
    let service = InferenceService::new(&config(&dir), seeded_store());

    let err = service.train_quality(&quality_records(5)).unwrap_err();
    assert!(matches!(
        err,
        InferenceError::InsufficientData { valid: 5, required: 10 }
    ));
    assert_eq!(service.quality_model().state(), ModelState::Untrained);
    assert!(matches!(
        service.predict_quality(&features(5.0)),
        Err(InferenceError::ModelNotTrained { .. })
    ));
}

#[test]
fn test_smart_analysis_report() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store();
    let service = InferenceService::new(&config(&dir), store.clone());
    service.train_from_store().unwrap();

    let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let report = service.run_smart_analysis_at(7, now).unwrap();

    assert_eq!(report.product_name, "Insulin Glargine");
    assert_eq!(report.batch_number, "INS-2024-07");
    assert_eq!(report.current_conditions.days_elapsed, 60.0);
    assert_eq!(report.timeline.len(), SMART_ANALYSIS_TIMELINE_POINTS);
    assert_eq!(report.timeline[0].days_from_now, 0);
    assert!(!report.recommendations.is_empty());

    let safe = report.quality.quality_score > 70.0 && !report.anomaly.is_anomaly;
    assert_eq!(report.overall_status == OverallStatus::Safe, safe);
    if safe {
        assert_eq!(report.recommendations, vec!["No action needed".to_string()]);
    }
    if let Some(warning) = &report.predictive_warning {
        assert!(warning.predicted_quality < 70.0);
        assert_eq!(
            warning.message,
            format!("Quality may drop below safe levels in {} days", warning.days_from_now)
        );
        assert!(report
            .timeline
            .iter()
            .take_while(|p| p.days_from_now < warning.days_from_now)
            .all(|p| p.predicted_quality >= 70.0));
    }

    // Same clock, same inputs, same report
    assert_eq!(service.run_smart_analysis_at(7, now).unwrap(), report);
}

#[test]
fn test_ingested_excursion_is_anomalous() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store();
    let service = InferenceService::new(&config(&dir), store.clone());
    service.train_from_store().unwrap();

    let excursion = SensorReading::new(25.0, 90.0)
        .with_light_exposure(100.0)
        .with_vibration(5.0);
    let evaluation = service.ingest_reading(7, excursion).unwrap();
    assert_eq!(evaluation.status, ProductStatus::Alert);
    assert_eq!(evaluation.alerts.len(), 2);
    assert_eq!(store.product(7).unwrap().status, ProductStatus::Alert);

    let latest = store.latest_reading(7).unwrap();
    assert_eq!(latest.vibration, Some(5.0));
    let result = service.anomaly_model().detect_reading(&latest).unwrap();
    assert!(result.is_anomaly);
    assert!(result.recommendation.contains("Adjust temperature"));

    // Two-channel input against a four-channel model
    assert!(matches!(
        service.detect_anomaly(25.0, 90.0, None, None),
        Err(InferenceError::FeatureMismatch { .. })
    ));
}
