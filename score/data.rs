//! # Prediction Table Loading
//!
//! Reads a tab-separated prediction table into an `ObservationSet`.
//!
//! - Strict Schema: the columns `prediction`, `response`, `cell_line_id` and
//!   `drug_id` are required and their names are not configurable. Extra
//!   columns are ignored.
//! - User-Centric Errors: failures are assumed to be user-input errors and
//!   every `DataError` names the offending column.
//! - Small slices are valid input. A table with one row loads fine and simply
//!   scores NaN downstream.

use crate::types::{EvaluationError, ObservationSet};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

pub const PREDICTION_COLUMN: &str = "prediction";
pub const RESPONSE_COLUMN: &str = "response";
pub const CELL_LINE_COLUMN: &str = "cell_line_id";
pub const DRUG_COLUMN: &str = "drug_id";

const REQUIRED_COLUMNS: [&str; 4] = [
    PREDICTION_COLUMN,
    RESPONSE_COLUMN,
    CELL_LINE_COLUMN,
    DRUG_COLUMN,
];

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the required column '{0}'. Every row needs a value."
    )]
    MissingValuesFound(String),
    #[error(
        "Non-finite values (NaN or Infinity) were found in the required column '{0}'. Predictions and responses must be finite."
    )]
    NonFiniteValuesFound(String),
    #[error("Loaded columns are inconsistent: {0}")]
    Inconsistent(#[from] EvaluationError),
}

/// Loads and validates a prediction table.
pub fn load_observations<P: AsRef<Path>>(path: P) -> Result<ObservationSet, DataError> {
    let path = path.as_ref();
    log::info!("Loading predictions from '{}'", path.display());

    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;

    let columns: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    for column in REQUIRED_COLUMNS {
        if !columns.contains(column) {
            return Err(DataError::ColumnNotFound(column.to_string()));
        }
    }

    let predictions = extract_numeric_column(&df, PREDICTION_COLUMN)?;
    let response = extract_numeric_column(&df, RESPONSE_COLUMN)?;
    let cell_line_ids = extract_id_column(&df, CELL_LINE_COLUMN)?;
    let drug_ids = extract_id_column(&df, DRUG_COLUMN)?;

    log::info!(
        "Loaded {} observations from '{}'",
        response.len(),
        path.display()
    );
    Ok(ObservationSet::new(
        predictions,
        response,
        cell_line_ids,
        drug_ids,
    )?)
}

fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let wrong_type = || DataError::ColumnWrongType {
        column_name: column_name.to_string(),
        expected_type: "f64 (numeric)",
        found_type: format!("{:?}", series.dtype()),
    };
    let casted = series.cast(&DataType::Float64).map_err(|_| wrong_type())?;
    // Non-strict casts turn unparseable text into nulls.
    if casted.null_count() > 0 {
        return Err(wrong_type());
    }

    let values: Vec<f64> = casted.f64()?.rechunk().into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
    }
    Ok(values)
}

/// Identifiers are opaque: numeric identifiers are read back as their text.
fn extract_id_column(df: &DataFrame, column_name: &str) -> Result<Vec<String>, DataError> {
    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }
    let casted = series
        .cast(&DataType::String)
        .map_err(|_| DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "string identifier",
            found_type: format!("{:?}", series.dtype()),
        })?;
    casted
        .as_materialized_series()
        .str()?
        .into_iter()
        .map(|value| {
            value
                .map(str::to_string)
                .ok_or_else(|| DataError::MissingValuesFound(column_name.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    fn create_test_tsv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn loads_all_four_columns() {
        let content = "prediction\tresponse\tcell_line_id\tdrug_id\textra\n\
                       0.5\t0.4\tACH-000001\tCisplatin\tx\n\
                       1.5\t1.9\tACH-000002\tCisplatin\ty\n\
                       2.5\t2.1\tACH-000001\tPaclitaxel\tz";
        let file = create_test_tsv(content).unwrap();
        let data = load_observations(file.path()).unwrap();
        assert_eq!(data.len(), 3);
        assert_abs_diff_eq!(data.predictions()[1], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(data.response()[2], 2.1, epsilon = 1e-12);
        assert_eq!(data.cell_line_ids()[1], "ACH-000002");
        assert_eq!(data.drug_ids()[2], "Paclitaxel");
    }

    #[test]
    fn numeric_identifiers_are_kept_as_text() {
        let content = "prediction\tresponse\tcell_line_id\tdrug_id\n\
                       0.5\t0.4\t906826\t1003\n\
                       1.5\t1.9\t687983\t1004";
        let file = create_test_tsv(content).unwrap();
        let data = load_observations(file.path()).unwrap();
        assert_eq!(data.cell_line_ids(), &["906826".to_string(), "687983".to_string()]);
        assert_eq!(data.drug_ids(), &["1003".to_string(), "1004".to_string()]);
    }

    #[test]
    fn missing_column_is_named() {
        let content = "prediction\tresponse\tcell_line_id\n0.5\t0.4\tA";
        let file = create_test_tsv(content).unwrap();
        match load_observations(file.path()).unwrap_err() {
            DataError::ColumnNotFound(col) => assert_eq!(col, "drug_id"),
            other => panic!("Expected ColumnNotFound, got {other:?}"),
        }
    }

    #[test]
    fn non_numeric_prediction_is_rejected() {
        let content = "prediction\tresponse\tcell_line_id\tdrug_id\n\
                       high\t0.4\tA\tD1\n\
                       0.3\t0.1\tB\tD2";
        let file = create_test_tsv(content).unwrap();
        match load_observations(file.path()).unwrap_err() {
            DataError::ColumnWrongType { column_name, .. } => {
                assert_eq!(column_name, "prediction")
            }
            other => panic!("Expected ColumnWrongType, got {other:?}"),
        }
    }

    #[test]
    fn missing_response_value_is_rejected() {
        let content = "prediction\tresponse\tcell_line_id\tdrug_id\n\
                       0.5\t\tA\tD1\n\
                       0.3\t0.1\tB\tD2";
        let file = create_test_tsv(content).unwrap();
        match load_observations(file.path()).unwrap_err() {
            DataError::MissingValuesFound(col) => assert_eq!(col, "response"),
            other => panic!("Expected MissingValuesFound, got {other:?}"),
        }
    }
}
