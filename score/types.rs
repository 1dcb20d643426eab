// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use ahash::AHashMap;
use ndarray_linalg::error::LinalgError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One evaluation slice: four parallel columns where index `i` of every column
/// refers to the same (cell line, drug) observation.
///
/// The set is immutable once constructed. Every metric reads it, none writes it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSet {
    predictions: Vec<f64>,
    response: Vec<f64>,
    cell_line_ids: Vec<String>,
    drug_ids: Vec<String>,
}

impl ObservationSet {
    /// Builds a set from its four columns, rejecting columns of unequal length.
    pub fn new(
        predictions: Vec<f64>,
        response: Vec<f64>,
        cell_line_ids: Vec<String>,
        drug_ids: Vec<String>,
    ) -> Result<Self, EvaluationError> {
        let lengths = [
            predictions.len(),
            response.len(),
            cell_line_ids.len(),
            drug_ids.len(),
        ];
        if lengths.iter().any(|&len| len != lengths[0]) {
            return Err(EvaluationError::LengthMismatch {
                context: "predictions, response, cell_line_ids and drug_ids",
                lengths: lengths.to_vec(),
            });
        }
        Ok(Self {
            predictions,
            response,
            cell_line_ids,
            drug_ids,
        })
    }

    /// Convenience constructor for in-memory fixtures with borrowed identifiers.
    pub fn from_slices<S: AsRef<str>>(
        predictions: &[f64],
        response: &[f64],
        cell_line_ids: &[S],
        drug_ids: &[S],
    ) -> Result<Self, EvaluationError> {
        Self::new(
            predictions.to_vec(),
            response.to_vec(),
            cell_line_ids.iter().map(|id| id.as_ref().to_string()).collect(),
            drug_ids.iter().map(|id| id.as_ref().to_string()).collect(),
        )
    }

    pub fn predictions(&self) -> &[f64] {
        &self.predictions
    }

    pub fn response(&self) -> &[f64] {
        &self.response
    }

    pub fn cell_line_ids(&self) -> &[String] {
        &self.cell_line_ids
    }

    pub fn drug_ids(&self) -> &[String] {
        &self.drug_ids
    }

    /// The identifier column for one grouping dimension.
    pub fn ids(&self, dimension: GroupingDimension) -> &[String] {
        match dimension {
            GroupingDimension::CellLine => &self.cell_line_ids,
            GroupingDimension::Drug => &self.drug_ids,
        }
    }

    /// A copy of this set with the per-group mean true response subtracted from
    /// both predictions and response.
    pub fn normalized_by(&self, dimension: GroupingDimension) -> ObservationSet {
        let keys = self.ids(dimension);
        let mut sums: AHashMap<&str, (f64, usize)> = AHashMap::new();
        for (key, &value) in keys.iter().zip(&self.response) {
            let (sum, count) = sums.entry(key.as_str()).or_insert((0.0, 0));
            *sum += value;
            *count += 1;
        }
        let means: AHashMap<&str, f64> = sums
            .into_iter()
            .map(|(key, (sum, count))| (key, sum / count as f64))
            .collect();

        let shift = |values: &[f64]| -> Vec<f64> {
            values
                .iter()
                .zip(keys)
                .map(|(value, key)| value - means[key.as_str()])
                .collect()
        };

        ObservationSet {
            predictions: shift(&self.predictions),
            response: shift(&self.response),
            cell_line_ids: self.cell_line_ids.clone(),
            drug_ids: self.drug_ids.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.response.len()
    }

    pub fn is_empty(&self) -> bool {
        self.response.is_empty()
    }
}

/// A categorical covariate whose effect is controlled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingDimension {
    CellLine,
    Drug,
}

impl GroupingDimension {
    pub const ALL: [GroupingDimension; 2] = [GroupingDimension::CellLine, GroupingDimension::Drug];

    pub const fn as_str(self) -> &'static str {
        match self {
            GroupingDimension::CellLine => "cell_line",
            GroupingDimension::Drug => "drug",
        }
    }
}

impl fmt::Display for GroupingDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupingDimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cell_line" | "cell-line" | "cellline" => Ok(GroupingDimension::CellLine),
            "drug" => Ok(GroupingDimension::Drug),
            other => Err(format!(
                "Invalid grouping dimension '{other}'. Expected 'cell_line' or 'drug'."
            )),
        }
    }
}

/// Correlation used between the residual sequences of a partial correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    Spearman,
}

impl fmt::Display for CorrelationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationMethod::Pearson => f.write_str("pearson"),
            CorrelationMethod::Spearman => f.write_str("spearman"),
        }
    }
}

impl FromStr for CorrelationMethod {
    type Err = EvaluationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pearson" => Ok(CorrelationMethod::Pearson),
            "spearman" => Ok(CorrelationMethod::Spearman),
            _ => Err(EvaluationError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// A coefficient together with its two-sided p-value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialCorrelation {
    pub coefficient: f64,
    pub p_value: f64,
}

/// Result of a single statistic. NaN inside either variant means
/// "undefined for this input", never an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    Coefficient(f64),
    Tested(PartialCorrelation),
}

impl Score {
    /// The sentinel result, shaped by whether a p-value was requested.
    pub fn undefined(with_p_value: bool) -> Self {
        Self::from_parts(f64::NAN, f64::NAN, with_p_value)
    }

    pub fn from_parts(coefficient: f64, p_value: f64, with_p_value: bool) -> Self {
        if with_p_value {
            Score::Tested(PartialCorrelation {
                coefficient,
                p_value,
            })
        } else {
            Score::Coefficient(coefficient)
        }
    }

    pub fn coefficient(&self) -> f64 {
        match self {
            Score::Coefficient(value) => *value,
            Score::Tested(result) => result.coefficient,
        }
    }

    pub fn p_value(&self) -> Option<f64> {
        match self {
            Score::Coefficient(_) => None,
            Score::Tested(result) => Some(result.p_value),
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.coefficient().is_nan()
    }
}

/// Contract violations. Statistical degeneracy is reported as NaN instead.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Input sequences must have the same length: {context} have lengths {lengths:?}.")]
    LengthMismatch {
        context: &'static str,
        lengths: Vec<usize>,
    },
    #[error(
        "Invalid metric '{name}'. It is not registered with an optimization direction; add it to the metric registry first. Available: {available}"
    )]
    UnknownMetric { name: String, available: String },
    #[error(
        "Unsupported partial correlation method '{0}'. Supported methods are 'pearson' and 'spearman'."
    )]
    UnsupportedMethod(String),
    #[error("Parameter '{name}' must be finite and non-negative, got {value}.")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("Least-squares residualization failed: {0}")]
    Linalg(#[from] LinalgError),
}
