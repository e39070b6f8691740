//! Model training command

use anyhow::{Context as _, Result};
use inference_lib::{QualityRecord, SensorReading};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::{read_json, Context};
use crate::output::{print_info, print_json, print_rows, print_success, OutputFormat};

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Serialize)]
struct TrainOutput {
    quality: inference_lib::predictor::QualityTrainingReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    anomaly: Option<inference_lib::anomaly::AnomalyTrainingReport>,
}

/// Train the quality model from `records` and, if given, the anomaly model from `readings`
pub fn train(ctx: &Context, records: &Path, readings: Option<&Path>) -> Result<()> {
    let records: Vec<QualityRecord> = read_json(records)?;
    let readings: Option<Vec<SensorReading>> = readings.map(read_json).transpose()?;

    let service = ctx.service(Context::empty_store());
    let quality = service
        .train_quality(&records)
        .context("Quality model training failed")?;
    let anomaly = readings
        .map(|r| service.train_anomaly(&r))
        .transpose()
        .context("Anomaly model training failed")?;

    let output = TrainOutput { quality, anomaly };

    match ctx.format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Table => {
            let q = &output.quality;
            let mut rows = vec![
                MetricRow {
                    model: "quality".to_string(),
                    metric: "R² score".to_string(),
                    value: format!("{:.3}", q.r2_score),
                },
                MetricRow {
                    model: "quality".to_string(),
                    metric: "Accuracy".to_string(),
                    value: format!("{:.3}", q.accuracy),
                },
                MetricRow {
                    model: "quality".to_string(),
                    metric: "Train / test".to_string(),
                    value: format!("{} / {}", q.train_samples, q.test_samples),
                },
                MetricRow {
                    model: "quality".to_string(),
                    metric: "Skipped records".to_string(),
                    value: q.skipped_records.to_string(),
                },
            ];
            if let Some(a) = &output.anomaly {
                rows.push(MetricRow {
                    model: "anomaly".to_string(),
                    metric: "Samples".to_string(),
                    value: a.samples.to_string(),
                });
                rows.push(MetricRow {
                    model: "anomaly".to_string(),
                    metric: "Flagged in training".to_string(),
                    value: format!("{} of {}", a.anomalies, a.samples),
                });
                rows.push(MetricRow {
                    model: "anomaly".to_string(),
                    metric: "Features".to_string(),
                    value: a.features.join(", "),
                });
            }
            print_rows(rows);

            for f in &q.top_features {
                print_info(&format!("{}: {:.3}", f.feature, f.importance));
            }
            print_success(&format!(
                "Models saved to {} (run {})",
                ctx.model_dir.display(),
                q.run_id
            ));
        }
    }

    Ok(())
}
