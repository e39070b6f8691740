//! Operator-facing wording for quality predictions

/// Score below which a product is no longer considered safe
pub const SAFE_QUALITY_THRESHOLD: f64 = 70.0;

/// Guidance attached to timeline reports that dip below the safe threshold
pub const TIMELINE_WARNING: &str = "Take action if quality drops below 70";

/// Storage guidance for a predicted quality score
pub fn quality_recommendation(score: f64) -> &'static str {
    if score > 80.0 {
        "Quality is excellent. Continue current storage conditions."
    } else if score > 70.0 {
        "Quality is acceptable. Monitor conditions regularly."
    } else if score > 50.0 {
        "Quality is degrading. Consider redistributing or using soon."
    } else if score > 30.0 {
        "Quality is poor. Recommend immediate inspection and potential disposal."
    } else {
        "Critical quality level. Do not distribute. Quarantine immediately."
    }
}

/// Warning shown when a projected timeline crosses the safe threshold
pub fn predictive_warning(days_from_now: u32) -> String {
    format!(
        "Quality may drop below safe levels in {} days",
        days_from_now
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_tiers() {
        assert!(quality_recommendation(95.0).starts_with("Quality is excellent"));
        assert!(quality_recommendation(80.0).starts_with("Quality is acceptable"));
        assert!(quality_recommendation(70.0).starts_with("Quality is degrading"));
        assert!(quality_recommendation(50.0).starts_with("Quality is poor"));
        assert!(quality_recommendation(30.0).starts_with("Critical quality level"));
        assert!(quality_recommendation(0.0).starts_with("Critical quality level"));
    }

    #[test]
    fn test_predictive_warning_text() {
        assert_eq!(
            predictive_warning(15),
            "Quality may drop below safe levels in 15 days"
        );
    }
}
