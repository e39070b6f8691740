//! Quality prediction commands

use anyhow::Result;
use inference_lib::StorageConditions;
use tabled::Tabled;

use super::Context;
use crate::output::{
    color_confidence, color_score, color_status, print_json, print_rows, print_success,
    print_warning, OutputFormat,
};
use crate::ConditionArgs;

#[derive(Tabled)]
struct ConfidenceRow {
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Probability")]
    probability: String,
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

fn storage_conditions(args: &ConditionArgs) -> StorageConditions {
    StorageConditions {
        temperature: args.temperature,
        humidity: args.humidity,
        ph: args.ph,
        moisture: args.moisture,
        impurity: args.impurity,
        active_ingredient: args.active_ingredient,
    }
}

/// Predict quality for one sample
pub fn predict(ctx: &Context, conditions: &ConditionArgs, days_elapsed: f64) -> Result<()> {
    let service = ctx.loaded_service(Context::empty_store());
    let features = storage_conditions(conditions).at_day(days_elapsed);
    let assessment = service.predict_quality(&features)?;

    match ctx.format {
        OutputFormat::Json => print_json(&assessment)?,
        OutputFormat::Table => {
            let p = &assessment.prediction;
            println!(
                "Quality score: {}  Status: {}  Degradation risk: {:?}",
                color_score(p.quality_score),
                color_status(&p.quality_status.to_string()),
                p.degradation_risk
            );
            let rows: Vec<ConfidenceRow> = p
                .confidence
                .iter()
                .rev()
                .map(|(status, probability)| ConfidenceRow {
                    status: status.to_string(),
                    probability: color_confidence(*probability),
                })
                .collect();
            print_rows(rows);

            match &assessment.alert {
                Some(alert) => print_warning(&alert.message),
                None => print_success(&assessment.recommendation),
            }
        }
    }

    Ok(())
}

/// Project quality over the coming days
pub fn timeline(ctx: &Context, conditions: &ConditionArgs, days: u32) -> Result<()> {
    let service = ctx.loaded_service(Context::empty_store());
    let report = service.predict_degradation_timeline(&storage_conditions(conditions), days)?;

    match ctx.format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
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

            if let Some(warning) = &report.warning {
                print_warning(warning);
            }
        }
    }

    Ok(())
}
