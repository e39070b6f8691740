//! Anomaly detection and alert commands

use anyhow::Result;
use inference_lib::{ProductStatus, SensorReading};
use tabled::Tabled;

use super::Context;
use crate::output::{
    color_status, print_json, print_rows, print_success, print_warning, OutputFormat,
};
use crate::ReadingArgs;

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Type")]
    alert_type: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Message")]
    message: String,
}

fn sensor_reading(args: &ReadingArgs) -> SensorReading {
    SensorReading {
        light_exposure: args.light_exposure,
        vibration: args.vibration,
        ..SensorReading::new(args.temperature, args.humidity)
    }
}

/// Score one reading with the anomaly model
pub fn detect(ctx: &Context, reading: &ReadingArgs) -> Result<()> {
    let service = ctx.loaded_service(Context::empty_store());
    let result = service.detect_anomaly(
        reading.temperature,
        reading.humidity,
        reading.light_exposure,
        reading.vibration,
    )?;

    match ctx.format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            println!(
                "Anomaly score: {:.3}  Severity: {}",
                result.anomaly_score,
                color_status(&result.severity.to_string())
            );
            if result.is_anomaly {
                print_warning(&format!("Anomaly detected: {}", result.recommendation));
            } else {
                print_success(&result.recommendation);
            }
        }
    }

    Ok(())
}

/// Evaluate threshold alerts; needs no trained model
pub fn alerts(ctx: &Context, reading: &ReadingArgs, status: ProductStatus) -> Result<()> {
    let service = ctx.service(Context::empty_store());
    let evaluation = service.evaluate_alerts(&sensor_reading(reading), status)?;

    match ctx.format {
        OutputFormat::Json => print_json(&evaluation)?,
        OutputFormat::Table => {
            if evaluation.alerts.is_empty() {
                print_success("Conditions within safe ranges");
            } else {
                let rows: Vec<AlertRow> = evaluation
                    .alerts
                    .iter()
                    .map(|a| AlertRow {
                        alert_type: a.alert_type.to_string(),
                        severity: color_status(&a.severity.to_string()),
                        message: a.message.clone(),
                    })
                    .collect();
                print_rows(rows);
            }
            println!(
                "Product status: {} → {}",
                status,
                color_status(&evaluation.status.to_string())
            );
        }
    }

    Ok(())
}
