// ========================================================================================
//                                  Metric Registry
// ========================================================================================
//
// The registry is a closed table. Every metric is a variant of `Metric`, and the
// name, optimization direction and primitive of each variant are resolved by
// exhaustive `match`. Adding a metric means adding a variant; there is no
// runtime registration.

use crate::correlation::{kendall, pearson, spearman};
use crate::guard::WarningRegistry;
use crate::partial::{PartialCorrelationOptions, partial_correlation};
use crate::regression::{mean_absolute_error, mean_squared_error, r_squared, root_mean_squared_error};
use crate::types::{EvaluationError, ObservationSet};
use itertools::Itertools;
use std::fmt;
use std::str::FromStr;

/// Whether smaller or larger values of a metric are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricDirection {
    Minimize,
    Maximize,
}

impl MetricDirection {
    /// The short mode string used for hyperparameter selection: "min" or "max".
    pub const fn as_str(self) -> &'static str {
        match self {
            MetricDirection::Minimize => "min",
            MetricDirection::Maximize => "max",
        }
    }

    /// Whether `candidate` beats `incumbent`. NaN never wins, and anything beats NaN.
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        if candidate.is_nan() {
            return false;
        }
        if incumbent.is_nan() {
            return true;
        }
        match self {
            MetricDirection::Minimize => candidate < incumbent,
            MetricDirection::Maximize => candidate > incumbent,
        }
    }
}

impl fmt::Display for MetricDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every registered evaluation metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Mse,
    Rmse,
    Mae,
    RSquared,
    Pearson,
    Spearman,
    Kendall,
    PartialCorrelation,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::Mse,
        Metric::Rmse,
        Metric::Mae,
        Metric::RSquared,
        Metric::Pearson,
        Metric::Spearman,
        Metric::Kendall,
        Metric::PartialCorrelation,
    ];

    /// The registered name, which is also the key in evaluation results.
    pub const fn name(self) -> &'static str {
        match self {
            Metric::Mse => "MSE",
            Metric::Rmse => "RMSE",
            Metric::Mae => "MAE",
            Metric::RSquared => "R^2",
            Metric::Pearson => "Pearson",
            Metric::Spearman => "Spearman",
            Metric::Kendall => "Kendall",
            Metric::PartialCorrelation => "Partial_Correlation",
        }
    }

    pub const fn direction(self) -> MetricDirection {
        match self {
            Metric::Mse | Metric::Rmse | Metric::Mae => MetricDirection::Minimize,
            Metric::RSquared
            | Metric::Pearson
            | Metric::Spearman
            | Metric::Kendall
            | Metric::PartialCorrelation => MetricDirection::Maximize,
        }
    }

    /// Only the partial correlation consumes the grouping keys.
    pub const fn requires_grouping(self) -> bool {
        matches!(self, Metric::PartialCorrelation)
    }

    /// Error metrics depend only on `response - prediction`, so subtracting the
    /// same per-group constant from both leaves them unchanged.
    pub const fn is_shift_invariant(self) -> bool {
        matches!(self, Metric::Mse | Metric::Rmse | Metric::Mae)
    }

    /// Looks up a registered name. `"R2"` and `"R²"` are accepted for `"R^2"`.
    pub fn from_name(name: &str) -> Result<Self, EvaluationError> {
        let trimmed = name.trim();
        if matches!(trimmed, "R2" | "R²") {
            return Ok(Metric::RSquared);
        }
        Metric::ALL
            .into_iter()
            .find(|metric| metric.name() == trimmed)
            .ok_or_else(|| EvaluationError::UnknownMetric {
                name: name.to_string(),
                available: available_metrics(),
            })
    }

    /// Runs the metric's primitive on one observation set.
    pub fn compute(
        self,
        observations: &ObservationSet,
        options: &PartialCorrelationOptions,
        warnings: &WarningRegistry,
    ) -> Result<f64, EvaluationError> {
        let predictions = observations.predictions();
        let response = observations.response();
        match self {
            Metric::Mse => mean_squared_error(predictions, response),
            Metric::Rmse => root_mean_squared_error(predictions, response),
            Metric::Mae => mean_absolute_error(predictions, response),
            Metric::RSquared => r_squared(predictions, response),
            Metric::Pearson => pearson(predictions, response),
            Metric::Spearman => spearman(predictions, response),
            Metric::Kendall => kendall(predictions, response),
            Metric::PartialCorrelation => partial_correlation(
                predictions,
                response,
                observations.cell_line_ids(),
                observations.drug_ids(),
                options,
                false,
                warnings,
            )
            .map(|score| score.coefficient()),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = EvaluationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::from_name(s)
    }
}

/// Comma-separated list of registered metric names.
pub fn available_metrics() -> String {
    Metric::ALL.iter().map(|metric| metric.name()).join(", ")
}

/// Optimization mode of a metric by name: "min" for error metrics, "max" for
/// the rest. Unregistered names fail and name the metric.
pub fn get_mode(metric: &str) -> Result<MetricDirection, EvaluationError> {
    Metric::from_name(metric).map(Metric::direction)
}
