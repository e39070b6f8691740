//! Product analysis and model status commands

use anyhow::{Context as _, Result};
use inference_lib::InMemoryStore;
use std::path::Path;
use std::sync::Arc;
use tabled::Tabled;

use super::Context;
use crate::output::{
    color_score, color_status, print_info, print_json, print_rows, print_success, print_warning,
    OutputFormat,
};

#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Model")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Run")]
    run_id: String,
}

#[derive(Tabled)]
struct TimelineRow {
    #[tabled(rename = "Day")]
    day: u32,
    #[tabled(rename = "Quality")]
    quality: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Run a smart analysis for one product in a data snapshot
pub fn analyze(ctx: &Context, data: &Path, product_id: i64) -> Result<()> {
    let store = InMemoryStore::from_json_file(data)?;
    let service = ctx.loaded_service(Arc::new(store));
    let report = service
        .run_smart_analysis(product_id)
        .with_context(|| format!("Smart analysis failed for product {}", product_id))?;

    match ctx.format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!(
                "{} (batch {})  analyzed {}",
                report.product_name,
                report.batch_number,
                report.analyzed_at.format("%Y-%m-%d %H:%M UTC")
            );
            println!(
                "Overall: {}  Quality: {} ({})  Anomaly score: {:.3}",
                color_status(&report.overall_status.to_string()),
                color_score(report.quality.quality_score),
                color_status(&report.quality.quality_status.to_string()),
                report.anomaly.anomaly_score
            );
            let c = &report.current_conditions;
            print_info(&format!(
                "Conditions: {:.1}°C, {:.1}% RH, day {}",
                c.temperature, c.humidity, c.days_elapsed
            ));

            let rows: Vec<TimelineRow> = report
                .timeline
                .iter()
                .map(|p| TimelineRow {
                    day: p.days_from_now,
                    quality: color_score(p.predicted_quality),
                    status: color_status(&p.predicted_status.to_string()),
                })
                .collect();
            print_rows(rows);

            if let Some(warning) = &report.predictive_warning {
                print_warning(&warning.message);
            }
            for recommendation in &report.recommendations {
                print_info(recommendation);
            }
        }
    }

    Ok(())
}

/// Show which models are available in the model directory
pub fn status(ctx: &Context) -> Result<()> {
    let service = ctx.loaded_service(Context::empty_store());
    let models = service.model_status();

    match ctx.format {
        OutputFormat::Json => print_json(&models)?,
        OutputFormat::Table => {
            let total = models.len();
            let active = models.iter().filter(|m| m.state.is_ready()).count();
            let rows: Vec<ModelRow> = models
                .into_iter()
                .map(|m| ModelRow {
                    name: m.name,
                    kind: m.kind,
                    status: color_status(&m.status.to_string()),
                    state: m.state.to_string(),
                    run_id: m.run_id.unwrap_or_else(|| "-".to_string()),
                })
                .collect();
            print_rows(rows);

            if active == 0 {
                print_warning(&format!(
                    "No trained models in {}; run `qm train` first",
                    ctx.model_dir.display()
                ));
            } else {
                print_success(&format!("{} of {} models active", active, total));
            }
        }
    }

    Ok(())
}
