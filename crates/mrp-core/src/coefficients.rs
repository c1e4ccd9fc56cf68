//! Coefficient table on the probability scale.

use mrp_math::{mean, sample_variance, sigmoid, DrawSummary};
use serde::Serialize;

use crate::fit::FittedModel;
use crate::model::ParameterKind;

/// Scale of the bounds in a [`CoefficientRow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoefficientScale {
    /// Inverse-logit of the coefficient, draw by draw.
    Probability,
    /// The group scale is reported as sampled.
    Natural,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoefficientRow {
    pub parameter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub logit_mean: f64,
    pub logit_sd: f64,
    pub point_estimate: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub scale: CoefficientScale,
}

/// One row per model parameter, in layout order.
pub fn coefficient_table(fitted: &FittedModel) -> Vec<CoefficientRow> {
    fitted
        .layout
        .params()
        .iter()
        .enumerate()
        .map(|(index, info)| {
            let draws = fitted.pooled(index);
            let (scale, transformed) = match info.kind {
                ParameterKind::AgeScale => (CoefficientScale::Natural, draws.clone()),
                _ => (
                    CoefficientScale::Probability,
                    draws.iter().map(|&v| sigmoid(v)).collect(),
                ),
            };
            let summary = DrawSummary::from_draws(&transformed);
            CoefficientRow {
                parameter: info.name.clone(),
                reference: info.reference.clone(),
                logit_mean: mean(&draws),
                logit_sd: sample_variance(&draws).sqrt(),
                point_estimate: summary.mean,
                lower_bound: summary.q2_5,
                upper_bound: summary.q97_5,
                scale,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::test_support::quick_fit;

    #[test]
    fn one_row_per_parameter() {
        let fitted = quick_fit();
        let table = coefficient_table(fitted);
        assert_eq!(table.len(), fitted.layout.dim());
        assert_eq!(table[0].parameter, "b_Intercept");
        assert_eq!(table[0].reference.as_deref(), Some("Female, Alberta"));
        assert_eq!(table[1].parameter, "b_sex[Male]");
        assert!(table.iter().any(|r| r.parameter == "b_province[Ontario]"));
        assert!(!table.iter().any(|r| r.parameter == "b_province[Alberta]"));
    }

    #[test]
    fn probability_bounds_are_ordered() {
        for row in coefficient_table(quick_fit()) {
            assert!(row.lower_bound <= row.point_estimate, "{}", row.parameter);
            assert!(row.point_estimate <= row.upper_bound, "{}", row.parameter);
            if row.scale == CoefficientScale::Probability {
                assert!(row.lower_bound >= 0.0 && row.upper_bound <= 1.0);
            }
        }
    }

    #[test]
    fn group_scale_stays_natural() {
        let table = coefficient_table(quick_fit());
        let sd = table
            .iter()
            .find(|r| r.parameter == "sd_age_group")
            .unwrap();
        assert_eq!(sd.scale, CoefficientScale::Natural);
        assert!((sd.point_estimate - sd.logit_mean).abs() < 1e-12);
        assert!(sd.lower_bound > 0.0);
    }

    #[test]
    fn male_effect_is_above_one_half() {
        let table = coefficient_table(quick_fit());
        // Simulated with a positive male effect of 1.0 on the logit scale.
        assert!(table[1].point_estimate > 0.5);
        assert!(table[1].logit_mean > 0.0);
    }
}
