//! Prior specification for the ownership model.
//!
//! Every population-level coefficient gets a Normal prior. The age-group
//! effect is either partially pooled through a learned scale with a
//! half-Student-t prior, or given independent Normal priors.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Normal(mean, sd) prior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalPrior {
    pub mean: f64,
    pub sd: f64,
}

impl NormalPrior {
    pub fn new(mean: f64, sd: f64) -> Self {
        NormalPrior { mean, sd }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !self.mean.is_finite() {
            return Err(Error::InvalidConfig(format!("{}.mean must be finite", name)));
        }
        if !(self.sd.is_finite() && self.sd > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "{}.sd must be positive and finite, got {}",
                name, self.sd
            )));
        }
        Ok(())
    }
}

/// Student-t(df, location, scale) prior, folded at zero when used for a scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StudentTPrior {
    pub df: f64,
    pub location: f64,
    pub scale: f64,
}

impl StudentTPrior {
    fn validate(&self, name: &str) -> Result<()> {
        if !(self.df.is_finite() && self.df > 0.0) {
            return Err(Error::InvalidConfig(format!("{}.df must be positive", name)));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(Error::InvalidConfig(format!("{}.scale must be positive", name)));
        }
        // Folded at zero: a non-zero location would move the fold point.
        if self.location != 0.0 {
            return Err(Error::InvalidConfig(format!(
                "{}.location must be 0 for a half-Student-t scale prior",
                name
            )));
        }
        Ok(())
    }
}

/// How the age-group effect is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgePooling {
    /// `alpha_age = sigma_age * z`, `z ~ N(0, 1)`, `sigma_age ~ half-t(age_scale)`.
    #[default]
    Pooled,
    /// Independent `alpha_age ~ age_effect`, no learned scale.
    Fixed,
}

impl std::fmt::Display for AgePooling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgePooling::Pooled => write!(f, "pooled"),
            AgePooling::Fixed => write!(f, "fixed"),
        }
    }
}

/// Prior hyperparameters for the logistic MRP model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPriors {
    /// Prior on the intercept (Female, Alberta, average age group).
    pub intercept: NormalPrior,
    /// Prior on the male and province coefficients.
    pub coefficients: NormalPrior,
    /// Age-group estimation mode.
    pub age_pooling: AgePooling,
    /// Prior on each age effect in [`AgePooling::Fixed`] mode.
    pub age_effect: NormalPrior,
    /// Prior on the age-group standard deviation in [`AgePooling::Pooled`] mode.
    pub age_scale: StudentTPrior,
}

impl Default for ModelPriors {
    fn default() -> Self {
        ModelPriors {
            intercept: NormalPrior::new(0.0, 2.0),
            coefficients: NormalPrior::new(0.0, 2.0),
            age_pooling: AgePooling::Pooled,
            age_effect: NormalPrior::new(0.0, 2.0),
            age_scale: StudentTPrior {
                df: 3.0,
                location: 0.0,
                scale: 2.5,
            },
        }
    }
}

impl ModelPriors {
    pub fn validate(&self) -> Result<()> {
        self.intercept.validate("model.intercept")?;
        self.coefficients.validate("model.coefficients")?;
        self.age_effect.validate("model.age_effect")?;
        self.age_scale.validate("model.age_scale")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let priors = ModelPriors::default();
        assert!(priors.validate().is_ok());
        assert_eq!(priors.intercept.sd, 2.0);
        assert_eq!(priors.age_scale.df, 3.0);
        assert_eq!(priors.age_scale.scale, 2.5);
        assert_eq!(priors.age_pooling, AgePooling::Pooled);
    }

    #[test]
    fn rejects_non_positive_sd() {
        let mut priors = ModelPriors::default();
        priors.coefficients.sd = 0.0;
        assert!(matches!(priors.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_shifted_scale_prior() {
        let mut priors = ModelPriors::default();
        priors.age_scale.location = 1.0;
        assert!(priors.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let priors: ModelPriors = toml::from_str("age_pooling = \"fixed\"").unwrap();
        assert_eq!(priors.age_pooling, AgePooling::Fixed);
        assert_eq!(priors.coefficients, NormalPrior::new(0.0, 2.0));
    }
}
