//! # Evaluation Orchestrator
//!
//! Scores an `ObservationSet` against a list of registered metrics and returns
//! a name -> value map. Unknown names are rejected before any metric runs.
//! Sets with fewer than two observations short-circuit to NaN for every
//! metric without calling the primitives.

use crate::guard::{MIN_PAIRWISE_OBSERVATIONS, WarningRegistry};
use crate::partial::PartialCorrelationOptions;
use crate::registry::Metric;
use crate::types::{EvaluationError, GroupingDimension, ObservationSet};
use rayon::prelude::*;
use std::collections::HashMap;

/// One metric name or an ordered list of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSelection(Vec<String>);

impl MetricSelection {
    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Resolves every name against the registry, failing on the first unknown one.
    pub fn resolve(&self) -> Result<Vec<Metric>, EvaluationError> {
        self.0.iter().map(|name| Metric::from_name(name)).collect()
    }
}

impl From<&str> for MetricSelection {
    fn from(name: &str) -> Self {
        MetricSelection(vec![name.to_string()])
    }
}

impl From<String> for MetricSelection {
    fn from(name: String) -> Self {
        MetricSelection(vec![name])
    }
}

impl From<Metric> for MetricSelection {
    fn from(metric: Metric) -> Self {
        MetricSelection(vec![metric.name().to_string()])
    }
}

impl From<&[&str]> for MetricSelection {
    fn from(names: &[&str]) -> Self {
        MetricSelection(names.iter().map(|name| name.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for MetricSelection {
    fn from(names: [&str; N]) -> Self {
        MetricSelection(names.iter().map(|name| name.to_string()).collect())
    }
}

impl From<Vec<&str>> for MetricSelection {
    fn from(names: Vec<&str>) -> Self {
        MetricSelection(names.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for MetricSelection {
    fn from(names: Vec<String>) -> Self {
        MetricSelection(names)
    }
}

impl From<&[Metric]> for MetricSelection {
    fn from(metrics: &[Metric]) -> Self {
        MetricSelection(metrics.iter().map(|m| m.name().to_string()).collect())
    }
}

/// Result key of a group-normalized metric, e.g. `"Pearson: drug normalized"`.
pub fn normalized_metric_name(metric: Metric, dimension: GroupingDimension) -> String {
    format!("{}: {} normalized", metric.name(), dimension)
}

/// Holds the per-process context of an evaluation: partial-correlation
/// options, the warn-once registry, and whether metrics run on the rayon pool.
#[derive(Debug, Clone)]
pub struct Evaluator<'w> {
    options: PartialCorrelationOptions,
    warnings: &'w WarningRegistry,
    parallel: bool,
}

impl Default for Evaluator<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator<'static> {
    /// Default options, sequential loop, process-wide warning registry.
    pub fn new() -> Self {
        Evaluator {
            options: PartialCorrelationOptions::default(),
            warnings: WarningRegistry::global(),
            parallel: false,
        }
    }
}

impl<'w> Evaluator<'w> {
    pub fn with_warnings(warnings: &'w WarningRegistry) -> Self {
        Evaluator {
            options: PartialCorrelationOptions::default(),
            warnings,
            parallel: false,
        }
    }

    pub fn options(mut self, options: PartialCorrelationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn warnings(&self) -> &'w WarningRegistry {
        self.warnings
    }

    /// Scores `observations` on every requested metric.
    pub fn evaluate<M: Into<MetricSelection>>(
        &self,
        observations: &ObservationSet,
        metrics: M,
    ) -> Result<HashMap<String, f64>, EvaluationError> {
        let metrics = metrics.into().resolve()?;
        self.options.validate()?;
        let scores = self.score_all(observations, &metrics)?;
        Ok(metrics
            .into_iter()
            .map(|metric| metric.name().to_string())
            .zip(scores)
            .collect())
    }

    /// Scores `observations` after subtracting per-group mean responses.
    /// Error metrics are skipped since the shift cannot change them.
    pub fn evaluate_normalized<M: Into<MetricSelection>>(
        &self,
        observations: &ObservationSet,
        metrics: M,
        dimension: GroupingDimension,
    ) -> Result<HashMap<String, f64>, EvaluationError> {
        let metrics: Vec<Metric> = metrics
            .into()
            .resolve()?
            .into_iter()
            .filter(|metric| !metric.is_shift_invariant())
            .collect();
        self.options.validate()?;
        let normalized = observations.normalized_by(dimension);
        let scores = self.score_all(&normalized, &metrics)?;
        Ok(metrics
            .into_iter()
            .map(|metric| normalized_metric_name(metric, dimension))
            .zip(scores)
            .collect())
    }

    fn score_all(
        &self,
        observations: &ObservationSet,
        metrics: &[Metric],
    ) -> Result<Vec<f64>, EvaluationError> {
        if self.parallel {
            metrics
                .par_iter()
                .map(|&metric| self.score(observations, metric))
                .collect()
        } else {
            metrics
                .iter()
                .map(|&metric| self.score(observations, metric))
                .collect()
        }
    }

    fn score(&self, observations: &ObservationSet, metric: Metric) -> Result<f64, EvaluationError> {
        if observations.len() < MIN_PAIRWISE_OBSERVATIONS {
            log::debug!(
                "{metric}: only {} observation(s), reporting NaN",
                observations.len()
            );
            return Ok(f64::NAN);
        }
        metric.compute(observations, &self.options, self.warnings)
    }
}

/// Scores `observations` with default options and the process-wide warning registry.
pub fn evaluate<M: Into<MetricSelection>>(
    observations: &ObservationSet,
    metrics: M,
) -> Result<HashMap<String, f64>, EvaluationError> {
    Evaluator::new().evaluate(observations, metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn set(predictions: &[f64], response: &[f64], cells: &[&str], drugs: &[&str]) -> ObservationSet {
        ObservationSet::from_slices(predictions, response, cells, drugs).unwrap()
    }

    #[test]
    fn single_name_is_normalized_to_a_list() {
        let data = set(&[1.0, 2.0, 3.0], &[1.0, 2.0, 4.0], &["a", "b", "c"], &["x", "y", "z"]);
        let warnings = WarningRegistry::new();
        let scores = Evaluator::with_warnings(&warnings).evaluate(&data, "MAE").unwrap();
        assert_eq!(scores.len(), 1);
        assert_abs_diff_eq!(scores["MAE"], 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn unknown_metric_aborts_before_scoring() {
        let data = set(&[1.0, 2.0], &[1.0, 2.0], &["a", "b"], &["x", "y"]);
        let err = evaluate(&data, ["MSE", "Accuracy"]).unwrap_err();
        match err {
            EvaluationError::UnknownMetric { name, available } => {
                assert_eq!(name, "Accuracy");
                assert!(available.contains("Kendall"));
            }
            other => panic!("Expected UnknownMetric, got {other:?}"),
        }
    }

    #[test]
    fn tiny_sets_short_circuit_to_nan() {
        let data = set(&[1.0], &[2.0], &["a"], &["x"]);
        let warnings = WarningRegistry::new();
        let scores = Evaluator::with_warnings(&warnings)
            .evaluate(&data, &Metric::ALL[..])
            .unwrap();
        assert_eq!(scores.len(), Metric::ALL.len());
        assert!(scores.values().all(|v| v.is_nan()));
        assert!(!warnings.has_warned(crate::guard::WarningCategory::InsufficientGroups));
    }

    #[test]
    fn parallel_and_sequential_loops_agree() {
        let predictions = [0.2, 0.4, 0.1, 0.9, 0.5, 0.3, 0.8, 0.7, 0.6];
        let response = [0.1, 0.5, 0.2, 0.8, 0.4, 0.2, 0.9, 0.6, 0.7];
        let cells = ["c1", "c1", "c1", "c2", "c2", "c2", "c3", "c3", "c3"];
        let drugs = ["d1", "d2", "d3", "d1", "d2", "d3", "d1", "d2", "d3"];
        let data = set(&predictions, &response, &cells, &drugs);
        let warnings = WarningRegistry::new();
        let options = PartialCorrelationOptions::default().with_seed(3);

        let sequential = Evaluator::with_warnings(&warnings)
            .options(options.clone())
            .evaluate(&data, &Metric::ALL[..])
            .unwrap();
        let parallel = Evaluator::with_warnings(&warnings)
            .options(options)
            .parallel(true)
            .evaluate(&data, &Metric::ALL[..])
            .unwrap();
        for metric in Metric::ALL {
            let (a, b) = (sequential[metric.name()], parallel[metric.name()]);
            assert!(a == b || (a.is_nan() && b.is_nan()), "{metric}: {a} vs {b}");
        }
    }

    #[test]
    fn normalization_subtracts_group_mean_response() {
        let data = set(
            &[1.0, 3.0, 10.0, 14.0],
            &[2.0, 4.0, 11.0, 13.0],
            &["c1", "c2", "c1", "c2"],
            &["d1", "d1", "d2", "d2"],
        );
        let normalized = data.normalized_by(GroupingDimension::Drug);
        assert_eq!(normalized.response(), &[-1.0, 1.0, -1.0, 1.0]);
        assert_eq!(normalized.predictions(), &[-2.0, 0.0, -2.0, 2.0]);
        assert_eq!(normalized.drug_ids(), data.drug_ids());
    }

    #[test]
    fn normalized_evaluation_skips_error_metrics() {
        let data = set(
            &[1.0, 3.0, 10.0, 14.0],
            &[2.0, 4.0, 11.0, 13.0],
            &["c1", "c2", "c1", "c2"],
            &["d1", "d1", "d2", "d2"],
        );
        let warnings = WarningRegistry::new();
        let scores = Evaluator::with_warnings(&warnings)
            .evaluate_normalized(&data, ["MSE", "Pearson"], GroupingDimension::Drug)
            .unwrap();
        assert_eq!(scores.len(), 1);
        // Normalized pairs: (-2, -1), (0, 1), (-2, -1), (2, 1)
        let expected = crate::correlation::pearson(&[-2.0, 0.0, -2.0, 2.0], &[-1.0, 1.0, -1.0, 1.0])
            .unwrap();
        assert_abs_diff_eq!(scores["Pearson: drug normalized"], expected, epsilon = 1e-12);
    }
}
