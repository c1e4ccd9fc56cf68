//! Parameter layout of the ownership model.
//!
//! Unconstrained vector (what the sampler moves):
//!
//! | index | parameter |
//! |---|---|
//! | 0 | intercept |
//! | 1 | male |
//! | 2..7 | age effect, or its standardised `z` when pooled |
//! | 7..16 | province deltas, Alberta excluded |
//! | 16 | `log(sd_age_group)`, pooled only |
//!
//! The constrained (reported) vector has the same layout with the age
//! effects on their natural scale and `sd_age_group` in place of its log.

use mrp_common::categories::Cell;
use mrp_common::config::AgePooling;
use mrp_common::{AgeGroup, Province, Sex};
use serde::{Deserialize, Serialize};

pub const INTERCEPT: usize = 0;
pub const MALE: usize = 1;
pub const AGE_START: usize = 2;
pub const PROVINCE_START: usize = AGE_START + AgeGroup::COUNT;
pub const AGE_SCALE: usize = PROVINCE_START + Province::COUNT - 1;

/// What a coefficient measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "level", rename_all = "snake_case")]
pub enum ParameterKind {
    Intercept,
    Sex(Sex),
    AgeGroup(AgeGroup),
    Province(Province),
    AgeScale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    pub kind: ParameterKind,
    /// Level the coefficient is measured against, if any.
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterLayout {
    pooling: AgePooling,
    params: Vec<ParameterInfo>,
}

impl ParameterLayout {
    pub fn new(pooling: AgePooling) -> Self {
        let mut params = Vec::with_capacity(AGE_SCALE + 1);
        params.push(ParameterInfo {
            name: "b_Intercept".to_string(),
            kind: ParameterKind::Intercept,
            reference: Some(format!(
                "{}, {}",
                Sex::REFERENCE.name(),
                Province::REFERENCE.name()
            )),
        });
        params.push(ParameterInfo {
            name: "b_sex[Male]".to_string(),
            kind: ParameterKind::Sex(Sex::Male),
            reference: Some(Sex::REFERENCE.name().to_string()),
        });
        // Age effects are deviations from the intercept, not contrasts.
        let age_prefix = match pooling {
            AgePooling::Pooled => "r_age_group",
            AgePooling::Fixed => "b_age_group",
        };
        for age in AgeGroup::all() {
            params.push(ParameterInfo {
                name: format!("{}[{}]", age_prefix, age),
                kind: ParameterKind::AgeGroup(*age),
                reference: None,
            });
        }
        for province in Province::all().iter().filter(|p| **p != Province::REFERENCE) {
            params.push(ParameterInfo {
                name: format!("b_province[{}]", province),
                kind: ParameterKind::Province(*province),
                reference: Some(Province::REFERENCE.name().to_string()),
            });
        }
        if pooling == AgePooling::Pooled {
            params.push(ParameterInfo {
                name: "sd_age_group".to_string(),
                kind: ParameterKind::AgeScale,
                reference: None,
            });
        }
        ParameterLayout { pooling, params }
    }

    pub fn pooling(&self) -> AgePooling {
        self.pooling
    }

    pub fn dim(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[ParameterInfo] {
        &self.params
    }

    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// Index of a province delta; `None` for the reference province.
    pub fn province_index(province: Province) -> Option<usize> {
        match province.index() {
            0 => None,
            i => Some(PROVINCE_START + i - 1),
        }
    }

    pub fn age_index(age_group: AgeGroup) -> usize {
        AGE_START + age_group.index()
    }

    /// Logit-scale linear predictor of `cell` under constrained coefficients.
    pub fn linear_predictor(coefficients: &[f64], cell: Cell) -> f64 {
        let mut eta = coefficients[INTERCEPT]
            + coefficients[MALE] * cell.sex.male_indicator()
            + coefficients[Self::age_index(cell.age_group)];
        if let Some(i) = Self::province_index(cell.province) {
            eta += coefficients[i];
        }
        eta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooled_layout() {
        let layout = ParameterLayout::new(AgePooling::Pooled);
        assert_eq!(layout.dim(), 17);
        assert_eq!(layout.names()[0], "b_Intercept");
        assert_eq!(layout.names()[1], "b_sex[Male]");
        assert_eq!(layout.names()[3], "r_age_group[21-29]");
        assert_eq!(layout.names()[PROVINCE_START], "b_province[British Columbia]");
        assert_eq!(layout.names()[AGE_SCALE], "sd_age_group");
        assert_eq!(layout.index_of("b_province[Ontario]"), Some(PROVINCE_START + 5));
    }

    #[test]
    fn fixed_layout_has_no_scale() {
        let layout = ParameterLayout::new(AgePooling::Fixed);
        assert_eq!(layout.dim(), 16);
        assert!(layout.index_of("sd_age_group").is_none());
        assert_eq!(layout.params()[2].kind, ParameterKind::AgeGroup(AgeGroup::Under20));
    }

    #[test]
    fn references_are_documented() {
        let layout = ParameterLayout::new(AgePooling::Pooled);
        assert_eq!(layout.params()[MALE].reference.as_deref(), Some("Female"));
        assert_eq!(
            layout.params()[PROVINCE_START].reference.as_deref(),
            Some("Alberta")
        );
        assert!(layout.params()[AGE_START].reference.is_none());
    }

    #[test]
    fn linear_predictor_sums_effects() {
        let mut coefs = vec![0.0; 16];
        coefs[INTERCEPT] = 0.5;
        coefs[MALE] = 1.0;
        coefs[ParameterLayout::age_index(AgeGroup::Over65)] = 0.25;
        coefs[ParameterLayout::province_index(Province::Quebec).unwrap()] = -2.0;

        let cell = Cell::new(Sex::Male, AgeGroup::Over65, Province::Quebec);
        assert!((ParameterLayout::linear_predictor(&coefs, cell) - (-0.25)).abs() < 1e-12);

        let reference = Cell::new(Sex::Female, AgeGroup::Age40To65, Province::Alberta);
        assert_eq!(ParameterLayout::linear_predictor(&coefs, reference), 0.5);
    }
}
