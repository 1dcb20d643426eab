//! Error-based regression metrics: MSE, RMSE, MAE and the coefficient of determination.
//!
//! Empty inputs produce NaN. The orchestrator never calls these with fewer
//! than two observations.

use crate::correlation::ensure_same_length;
use crate::types::EvaluationError;

pub fn mean_squared_error(predictions: &[f64], response: &[f64]) -> Result<f64, EvaluationError> {
    ensure_same_length(predictions, response)?;
    Ok(mean(predictions.iter().zip(response).map(|(p, y)| (y - p).powi(2))))
}

pub fn root_mean_squared_error(
    predictions: &[f64],
    response: &[f64],
) -> Result<f64, EvaluationError> {
    Ok(mean_squared_error(predictions, response)?.sqrt())
}

pub fn mean_absolute_error(predictions: &[f64], response: &[f64]) -> Result<f64, EvaluationError> {
    ensure_same_length(predictions, response)?;
    Ok(mean(predictions.iter().zip(response).map(|(p, y)| (y - p).abs())))
}

/// Coefficient of determination `1 - SS_res / SS_tot`.
///
/// A constant response makes `SS_tot` zero; the score is then 1.0 for a
/// perfect fit and 0.0 otherwise, so the result is always finite.
pub fn r_squared(predictions: &[f64], response: &[f64]) -> Result<f64, EvaluationError> {
    ensure_same_length(predictions, response)?;
    if response.is_empty() {
        return Ok(f64::NAN);
    }
    let mean_response = response.iter().sum::<f64>() / response.len() as f64;
    let ss_res: f64 = predictions
        .iter()
        .zip(response)
        .map(|(p, y)| (y - p).powi(2))
        .sum();
    let ss_tot: f64 = response.iter().map(|y| (y - mean_response).powi(2)).sum();

    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

fn mean<I: Iterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}
