//! Pairwise correlation primitives.
//!
//! Every public function takes `(predictions, response)` of equal length.
//! Unequal lengths are a caller bug and fail with `LengthMismatch`; short or
//! constant inputs yield NaN.

use crate::guard::pairwise_defined;
use crate::types::EvaluationError;
use statrs::distribution::{ContinuousCDF, StudentsT};

pub(crate) fn ensure_same_length(
    predictions: &[f64],
    response: &[f64],
) -> Result<(), EvaluationError> {
    if predictions.len() != response.len() {
        return Err(EvaluationError::LengthMismatch {
            context: "predictions and response",
            lengths: vec![predictions.len(), response.len()],
        });
    }
    Ok(())
}

/// Pearson product-moment correlation.
pub fn pearson(predictions: &[f64], response: &[f64]) -> Result<f64, EvaluationError> {
    ensure_same_length(predictions, response)?;
    if !pairwise_defined(predictions, response) {
        return Ok(f64::NAN);
    }
    Ok(pearson_coefficient(predictions, response))
}

/// Spearman rank correlation (Pearson on average ranks).
pub fn spearman(predictions: &[f64], response: &[f64]) -> Result<f64, EvaluationError> {
    ensure_same_length(predictions, response)?;
    if !pairwise_defined(predictions, response) {
        return Ok(f64::NAN);
    }
    Ok(spearman_coefficient(predictions, response))
}

/// Kendall rank correlation, tau-b variant (adjusted for ties).
pub fn kendall(predictions: &[f64], response: &[f64]) -> Result<f64, EvaluationError> {
    ensure_same_length(predictions, response)?;
    if !pairwise_defined(predictions, response) {
        return Ok(f64::NAN);
    }
    Ok(kendall_tau_b(predictions, response))
}

/// Linear-covariance formula without the degeneracy guard. Returns NaN when
/// either input has zero variance.
pub(crate) fn pearson_coefficient(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = var_x.sqrt() * var_y.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return f64::NAN;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

pub(crate) fn spearman_coefficient(x: &[f64], y: &[f64]) -> f64 {
    pearson_coefficient(&average_ranks(x), &average_ranks(y))
}

fn kendall_tau_b(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    let mut score = 0.0_f64;
    let mut ties_x = 0.0_f64;
    let mut ties_y = 0.0_f64;

    for i in 0..n {
        for j in (i + 1)..n {
            let sx = sign(x[i] - x[j]);
            let sy = sign(y[i] - y[j]);
            if sx == 0.0 {
                ties_x += 1.0;
            }
            if sy == 0.0 {
                ties_y += 1.0;
            }
            score += sx * sy;
        }
    }

    let pairs = (n * (n - 1) / 2) as f64;
    let denom = ((pairs - ties_x) * (pairs - ties_y)).sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }
    (score / denom).clamp(-1.0, 1.0)
}

#[inline]
fn sign(delta: f64) -> f64 {
    if delta > 0.0 {
        1.0
    } else if delta < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// 1-based ranks where tied values share the mean of the ranks they span.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // Positions start..end hold ranks start+1..=end.
        let shared = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = shared;
        }
        start = end;
    }
    ranks
}

/// Two-sided p-value of a correlation coefficient under the t distribution
/// with `dof` degrees of freedom.
pub fn correlation_p_value(coefficient: f64, dof: f64) -> f64 {
    if !coefficient.is_finite() || !(dof > 0.0) {
        return f64::NAN;
    }
    if coefficient.abs() >= 1.0 {
        return 0.0;
    }
    let t = coefficient * (dof / (1.0 - coefficient * coefficient)).sqrt();
    match StudentsT::new(0.0, 1.0, dof) {
        Ok(dist) => (2.0 * dist.sf(t.abs())).min(1.0),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn pearson_perfect_linear_relationship() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        assert_abs_diff_eq!(pearson(&x, &y).unwrap(), 1.0, epsilon = 1e-12);
        let neg = [8.0, 6.0, 4.0, 2.0];
        assert_abs_diff_eq!(pearson(&x, &neg).unwrap(), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn pearson_known_value() {
        // Cross-product sum 8, both sums of squares 10.
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 1.0, 4.0, 3.0, 5.0];
        assert_abs_diff_eq!(pearson(&x, &y).unwrap(), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn constant_inputs_are_undefined() {
        let constant = [5.0, 5.0, 5.0, 5.0];
        let varied = [1.0, 2.0, 3.0, 4.0];
        assert!(pearson(&constant, &varied).unwrap().is_nan());
        assert!(spearman(&varied, &constant).unwrap().is_nan());
        assert!(kendall(&constant, &constant).unwrap().is_nan());
    }

    #[test]
    fn non_finite_inputs_are_undefined() {
        let clean = [0.4, 1.3, 2.2, 0.9, 3.1];
        let with_nan = [0.4, f64::NAN, 2.2, 0.9, 3.1];
        let with_inf = [0.4, 1.3, f64::NEG_INFINITY, 0.9, 3.1];
        for f in [pearson, spearman, kendall] {
            assert!(f(&with_nan, &clean).unwrap().is_nan());
            assert!(f(&clean, &with_nan).unwrap().is_nan());
            assert!(f(&with_inf, &clean).unwrap().is_nan());
        }
    }

    #[test]
    fn average_ranks_tolerate_nan() {
        let mut rng = StdRng::seed_from_u64(81);
        for _ in 0..200 {
            let values: Vec<f64> = (0..40)
                .map(|_| {
                    if rng.gen_bool(0.25) {
                        f64::NAN
                    } else {
                        rng.gen_range(-1.0..1.0)
                    }
                })
                .collect();
            let ranks = average_ranks(&values);
            assert_eq!(ranks.len(), values.len());
            assert!(ranks.iter().all(|r| (1.0..=40.0).contains(r)));
        }
    }

    #[test]
    fn pearson_survives_huge_magnitudes() {
        let x = [1e100, 2e100, 3e100, 4e100];
        let y = [2e100, 1e100, 4e100, 3e100];
        assert_abs_diff_eq!(pearson(&x, &y).unwrap(), 0.6, epsilon = 1e-12);
    }

    #[test]
    fn single_observation_is_undefined() {
        assert!(pearson(&[1.0], &[2.0]).unwrap().is_nan());
        assert!(kendall(&[], &[]).unwrap().is_nan());
    }

    #[test]
    fn length_mismatch_is_a_hard_failure() {
        for f in [pearson, spearman, kendall] {
            let err = f(&[1.0, 2.0, 3.0], &[1.0, 2.0]).unwrap_err();
            assert!(matches!(err, EvaluationError::LengthMismatch { .. }));
        }
    }

    #[test]
    fn spearman_is_monotone_invariant() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y: Vec<f64> = x.iter().map(|v: &f64| v.powi(3) + 7.0).collect();
        assert_abs_diff_eq!(spearman(&x, &y).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn average_ranks_share_ties() {
        let ranks = average_ranks(&[10.0, 20.0, 10.0, 30.0]);
        assert_eq!(ranks, vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn kendall_tau_b_with_ties() {
        // Five concordant pairs, no discordant pairs, one pair tied in x.
        let x = [1.0, 2.0, 2.0, 3.0];
        let y = [1.0, 3.0, 2.0, 4.0];
        let expected = 5.0 / (5.0_f64 * 6.0).sqrt();
        assert_abs_diff_eq!(kendall(&x, &y).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn kendall_perfect_disagreement() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [4.0, 3.0, 2.0, 1.0];
        assert_abs_diff_eq!(kendall(&x, &y).unwrap(), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn coefficients_stay_within_unit_interval() {
        let mut rng = StdRng::seed_from_u64(2024);
        for _ in 0..50 {
            let n = rng.gen_range(2..40);
            let x: Vec<f64> = (0..n).map(|_| rng.gen_range(-5.0..5.0)).collect();
            let y: Vec<f64> = (0..n).map(|_| rng.gen_range(-5.0..5.0)).collect();
            for f in [pearson, spearman, kendall] {
                let r = f(&x, &y).unwrap();
                assert!((-1.0..=1.0).contains(&r), "coefficient {r} out of range");
            }
        }
    }

    #[test]
    fn p_value_matches_reference() {
        // r = 0.8 with n = 5 (dof = 3): scipy.stats.pearsonr gives p = 0.1041.
        assert_abs_diff_eq!(correlation_p_value(0.8, 3.0), 0.1041, epsilon = 1e-3);
        assert_eq!(correlation_p_value(1.0, 3.0), 0.0);
        assert!(correlation_p_value(0.5, 0.0).is_nan());
        assert!(correlation_p_value(f64::NAN, 4.0).is_nan());
    }
}
