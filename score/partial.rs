//! # Partial Correlation Engine
//!
//! Correlation between predictions and true response after removing the
//! linear effect of the two categorical covariates, cell line and drug.
//!
//! ### Covariate encoding
//!
//! Identifiers are factorized in first-occurrence order and expanded into a
//! design matrix with a leading intercept column followed by drop-first
//! indicator columns: the first-seen cell line and the first-seen drug are
//! the reference levels. Both variables are regressed on this design by
//! SVD least squares (which tolerates rank-deficient, unbalanced designs)
//! and the chosen correlation is taken between the two residual sequences.
//!
//! The covariate count used for the degrees of freedom excludes the
//! intercept: `k = (n_cell_lines - 1) + (n_drugs - 1)` and `dof = n - k - 2`.

use crate::correlation::{correlation_p_value, pearson_coefficient, spearman_coefficient};
use crate::guard::{
    MIN_PARTIAL_OBSERVATIONS, NoiseSettings, WarningCategory, WarningRegistry, all_finite,
    has_group_diversity, stabilize_predictions,
};
use crate::types::{CorrelationMethod, EvaluationError, GroupingDimension, Score};
use ahash::AHashMap;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_linalg::LeastSquaresSvd;
use serde::{Deserialize, Serialize};
use std::hash::Hash;

/// Residual sums of squares below this fraction of the centered sum of
/// squares mean the covariates explain the variable completely.
const RESIDUAL_VARIANCE_FRACTION: f64 = 1e-16;

/// Tunables for `partial_correlation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialCorrelationOptions {
    pub method: CorrelationMethod,
    /// Within-group prediction variance that triggers noise injection.
    pub variance_threshold: f64,
    /// Standard deviation of the injected Gaussian noise.
    pub noise_std: f64,
    /// Seed for noise injection. Absent means entropy-seeded (non-reproducible).
    pub seed: Option<u64>,
}

impl Default for PartialCorrelationOptions {
    fn default() -> Self {
        Self {
            method: CorrelationMethod::Pearson,
            variance_threshold: 1e-6,
            noise_std: 1e-5,
            seed: None,
        }
    }
}

impl PartialCorrelationOptions {
    pub fn with_method(mut self, method: CorrelationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), EvaluationError> {
        for (name, value) in [
            ("variance_threshold", self.variance_threshold),
            ("noise_std", self.noise_std),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EvaluationError::InvalidParameter { name, value });
            }
        }
        Ok(())
    }

    fn noise_settings(&self) -> NoiseSettings {
        NoiseSettings {
            variance_threshold: self.variance_threshold,
            noise_std: self.noise_std,
            seed: self.seed,
        }
    }
}

/// Small-integer codes for a categorical column, assigned in first-occurrence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCodes {
    pub codes: Vec<usize>,
    pub levels: usize,
}

pub fn factorize<K: Hash + Eq>(keys: &[K]) -> CategoryCodes {
    let mut lookup: AHashMap<&K, usize> = AHashMap::new();
    let codes = keys
        .iter()
        .map(|key| {
            let next = lookup.len();
            *lookup.entry(key).or_insert(next)
        })
        .collect();
    CategoryCodes {
        codes,
        levels: lookup.len(),
    }
}

/// Intercept plus drop-first indicator columns for both factors.
/// Shape: `[n, 1 + (cells.levels - 1) + (drugs.levels - 1)]`.
pub fn covariate_design(cells: &CategoryCodes, drugs: &CategoryCodes) -> Array2<f64> {
    let n = cells.codes.len();
    let cell_columns = cells.levels.saturating_sub(1);
    let drug_columns = drugs.levels.saturating_sub(1);
    let mut design = Array2::zeros((n, 1 + cell_columns + drug_columns));

    for (row, (&cell, &drug)) in cells.codes.iter().zip(&drugs.codes).enumerate() {
        design[[row, 0]] = 1.0;
        if cell > 0 {
            design[[row, cell]] = 1.0;
        }
        if drug > 0 {
            design[[row, cell_columns + drug]] = 1.0;
        }
    }
    design
}

/// Least-squares residuals of each column of `targets` regressed on `design`.
fn residualize(design: &Array2<f64>, targets: &Array2<f64>) -> Result<Array2<f64>, EvaluationError> {
    let fit = design.least_squares(targets)?;
    Ok(targets - &design.dot(&fit.solution))
}

fn fully_explained(original: ArrayView1<f64>, residual: ArrayView1<f64>) -> bool {
    let mean = original.mean().unwrap_or(0.0);
    let ss_total: f64 = original.iter().map(|v| (v - mean).powi(2)).sum();
    let ss_residual: f64 = residual.iter().map(|v| v * v).sum();
    ss_total == 0.0 || ss_residual <= RESIDUAL_VARIANCE_FRACTION * ss_total
}

/// Partial correlation of `predictions` and `response` controlling for cell line and drug.
///
/// Returns `Score::Tested` when `return_pvalue` is set, `Score::Coefficient`
/// otherwise. Degenerate slices (fewer than three rows, a single cell line or
/// drug, covariates that explain everything) yield NaN in every field.
pub fn partial_correlation<K: Hash + Eq>(
    predictions: &[f64],
    response: &[f64],
    cell_line_ids: &[K],
    drug_ids: &[K],
    options: &PartialCorrelationOptions,
    return_pvalue: bool,
    warnings: &WarningRegistry,
) -> Result<Score, EvaluationError> {
    let n = response.len();
    let lengths = [predictions.len(), n, cell_line_ids.len(), drug_ids.len()];
    if lengths.iter().any(|&len| len != n) {
        return Err(EvaluationError::LengthMismatch {
            context: "predictions, response, cell_line_ids and drug_ids",
            lengths: lengths.to_vec(),
        });
    }
    options.validate()?;

    let undefined = Score::undefined(return_pvalue);
    if n < MIN_PARTIAL_OBSERVATIONS {
        return Ok(undefined);
    }
    if !all_finite(predictions) || !all_finite(response) {
        log::debug!("Non-finite predictions or responses; partial correlation undefined");
        return Ok(undefined);
    }
    if !has_group_diversity(cell_line_ids, drug_ids) {
        warnings.warn_once(WarningCategory::InsufficientGroups, || {
            "Partial correlation not defined if only one cell line or drug is in the data."
                .to_string()
        });
        return Ok(undefined);
    }

    let mut x = predictions.to_vec();
    stabilize_predictions(
        &mut x,
        [
            (GroupingDimension::CellLine, cell_line_ids),
            (GroupingDimension::Drug, drug_ids),
        ],
        &options.noise_settings(),
        warnings,
    )?;

    let cells = factorize(cell_line_ids);
    let drugs = factorize(drug_ids);
    let design = covariate_design(&cells, &drugs);
    if design.nrows() < MIN_PARTIAL_OBSERVATIONS {
        return Ok(undefined);
    }

    let mut targets: Array2<f64> = Array2::zeros((n, 2));
    targets.column_mut(0).assign(&Array1::from_vec(x));
    targets.column_mut(1).assign(&ArrayView1::from(response));
    let residuals = residualize(&design, &targets)?;

    let explained = targets
        .axis_iter(Axis(1))
        .zip(residuals.axis_iter(Axis(1)))
        .any(|(original, residual)| fully_explained(original, residual));
    if explained {
        log::debug!(
            "Covariates explain all variance across {n} rows ({} cell lines, {} drugs); partial correlation undefined",
            cells.levels,
            drugs.levels
        );
        return Ok(undefined);
    }

    let rx = residuals.column(0).to_vec();
    let ry = residuals.column(1).to_vec();
    let coefficient = match options.method {
        CorrelationMethod::Pearson => pearson_coefficient(&rx, &ry),
        CorrelationMethod::Spearman => spearman_coefficient(&rx, &ry),
    };

    let covariates = design.ncols() - 1;
    let dof = n as f64 - covariates as f64 - 2.0;
    let p_value = correlation_p_value(coefficient, dof);

    Ok(Score::from_parts(coefficient, p_value, return_pvalue))
}
