//! Dwelling-tenure MRP common types and errors.
//!
//! This crate provides foundational types shared across mrp-core modules:
//! - The fixed categorical factors (sex, age group, province) and age binning
//! - Common error types with stable codes
//! - Output format specifications
//! - Configuration loading and validation

pub mod categories;
pub mod config;
pub mod error;
pub mod output;

pub use categories::{AgeGroup, Province, Sex};
pub use config::{ConfigPaths, ConfigResolver, ConfigSnapshot, MrpConfig};
pub use error::{Error, Result};
pub use output::OutputFormat;
