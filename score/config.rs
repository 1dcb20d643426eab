//! Evaluation settings persisted as TOML.
//!
//! Every field has a default, so an empty file is a valid configuration that
//! scores all registered metrics with a Pearson partial correlation.

use crate::evaluate::Evaluator;
use crate::guard::WarningRegistry;
use crate::partial::PartialCorrelationOptions;
use crate::registry::Metric;
use crate::types::{EvaluationError, GroupingDimension};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid evaluation configuration: {0}")]
    Invalid(#[from] EvaluationError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Registered metric names, scored in this order.
    pub metrics: Vec<String>,
    /// Additional passes over group-normalized data.
    pub normalize: Vec<GroupingDimension>,
    /// Score metrics on the rayon thread pool.
    pub parallel: bool,
    pub partial_correlation: PartialCorrelationOptions,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            metrics: Metric::ALL.iter().map(|m| m.name().to_string()).collect(),
            normalize: Vec::new(),
            parallel: false,
            partial_correlation: PartialCorrelationOptions::default(),
        }
    }
}

impl EvaluationConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EvaluationConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Rejects unregistered metric names and out-of-range numeric options.
    pub fn validate(&self) -> Result<(), EvaluationError> {
        self.resolved_metrics()?;
        self.partial_correlation.validate()
    }

    pub fn resolved_metrics(&self) -> Result<Vec<Metric>, EvaluationError> {
        self.metrics.iter().map(|name| Metric::from_name(name)).collect()
    }

    /// An evaluator carrying these settings and reporting to `warnings`.
    pub fn evaluator<'w>(&self, warnings: &'w WarningRegistry) -> Evaluator<'w> {
        Evaluator::with_warnings(warnings)
            .options(self.partial_correlation.clone())
            .parallel(self.parallel)
    }
}
