//! Robust linear regression by iteratively reweighted least squares.
//!
//! Weights follow the Talwar function: a sample keeps weight 1 while its
//! absolute residual is within `c * sigma` and drops to 0 beyond it, with
//! `sigma = MAD / 0.6745`. Iteration stops when the weights stop changing.

use super::stats::median;
use crate::config::LinearParams;
use crate::types::{CarbonError, CarbonResult};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Normal-distribution consistency constant for the MAD
const MAD_SCALE: f64 = 0.6745;
/// Pivot magnitude, relative to the largest diagonal, treated as zero
const PIVOT_TOLERANCE: f64 = 1e-12;
/// Residual scale, relative to the label magnitude, treated as an exact fit
const EXACT_FIT_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustLinearModel {
    intercept: f64,
    coefficients: Vec<f64>,
    iterations: usize,
    /// Samples with non-zero weight in the final fit
    inliers: usize,
}

impl RobustLinearModel {
    pub fn fit(features: &[Vec<f64>], targets: &[f64], params: &LinearParams) -> CarbonResult<Self> {
        let n = targets.len();
        let p = features.first().map_or(0, Vec::len);
        let required = p + 1;
        if n < required {
            return Err(CarbonError::InsufficientData {
                required,
                available: n,
            });
        }

        let mut weights = vec![1.0; n];
        let mut beta = weighted_least_squares(features, targets, &weights)?;
        let mut iterations = 1;

        while iterations < params.max_iterations {
            let residuals: Vec<f64> = features
                .iter()
                .zip(targets)
                .map(|(x, &y)| y - evaluate(&beta, x))
                .collect();
            let sigma = robust_scale(&residuals);
            let target_scale = targets.iter().map(|y| y.abs()).fold(0.0, f64::max).max(1.0);
            if sigma <= EXACT_FIT_TOLERANCE * target_scale {
                break;
            }

            let cutoff = params.tuning_constant * sigma;
            let next: Vec<f64> = residuals
                .iter()
                .map(|r| if r.abs() <= cutoff { 1.0 } else { 0.0 })
                .collect();
            if next == weights {
                break;
            }
            if (next.iter().sum::<f64>() as usize) < required {
                log::warn!("Robust fit would keep fewer than {} sample(s); stopping", required);
                break;
            }
            weights = next;
            beta = weighted_least_squares(features, targets, &weights)?;
            iterations += 1;
        }

        let inliers = weights.iter().filter(|&&w| w > 0.0).count();
        log::info!(
            "Robust linear fit: {} iteration(s), {} of {} sample(s) retained",
            iterations,
            inliers,
            n
        );
        Ok(Self {
            intercept: beta[0],
            coefficients: beta[1..].to_vec(),
            iterations,
            inliers,
        })
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(x)
                .map(|(c, v)| c * v)
                .sum::<f64>()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn inliers(&self) -> usize {
        self.inliers
    }
}

/// `beta[0] + beta[1..] . x`
fn evaluate(beta: &[f64], x: &[f64]) -> f64 {
    beta[0] + beta[1..].iter().zip(x).map(|(b, v)| b * v).sum::<f64>()
}

/// MAD of the residuals about their median, scaled to a standard deviation
fn robust_scale(residuals: &[f64]) -> f64 {
    let centre = median(&mut residuals.to_vec()).unwrap_or(0.0);
    let mut deviations: Vec<f64> = residuals.iter().map(|r| (r - centre).abs()).collect();
    median(&mut deviations).unwrap_or(0.0) / MAD_SCALE
}

/// Solve `(X'WX) beta = X'Wy` with an intercept column prepended to X
fn weighted_least_squares(features: &[Vec<f64>], targets: &[f64], weights: &[f64]) -> CarbonResult<Vec<f64>> {
    let dim = features.first().map_or(0, Vec::len) + 1;
    let mut normal = Array2::<f64>::zeros((dim, dim));
    let mut rhs = Array1::<f64>::zeros(dim);

    let mut row = vec![0.0; dim];
    for ((x, &y), &w) in features.iter().zip(targets).zip(weights) {
        if w == 0.0 {
            continue;
        }
        row[0] = 1.0;
        row[1..].copy_from_slice(x);
        for i in 0..dim {
            rhs[i] += w * row[i] * y;
            for j in 0..dim {
                normal[[i, j]] += w * row[i] * row[j];
            }
        }
    }
    solve(normal, rhs)
}

/// Gaussian elimination with partial pivoting
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> CarbonResult<Vec<f64>> {
    let n = b.len();
    let scale = (0..n).map(|i| a[[i, i]].abs()).fold(0.0, f64::max);
    if scale == 0.0 {
        return Err(CarbonError::DegenerateFit("normal matrix is zero".to_string()));
    }

    for col in 0..n {
        let mut pivot_row = col;
        for row in (col + 1)..n {
            if a[[row, col]].abs() > a[[pivot_row, col]].abs() {
                pivot_row = row;
            }
        }
        if a[[pivot_row, col]].abs() <= PIVOT_TOLERANCE * scale {
            return Err(CarbonError::DegenerateFit(format!(
                "singular normal equations at column {}",
                col
            )));
        }
        if pivot_row != col {
            for j in 0..n {
                a.swap([col, j], [pivot_row, j]);
            }
            b.swap(col, pivot_row);
        }

        let pivot = a[[col, col]];
        for row in (col + 1)..n {
            let factor = a[[row, col]] / pivot;
            a[[row, col]] = 0.0;
            for j in (col + 1)..n {
                a[[row, j]] -= factor * a[[col, j]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for col in (0..n).rev() {
        let mut sum = b[col];
        for j in (col + 1)..n {
            sum -= a[[col, j]] * x[j];
        }
        x[col] = sum / a[[col, col]];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn exact_line_is_recovered() {
        let x: Vec<Vec<f64>> = (1..=16).map(|v| vec![v as f64]).collect();
        let y: Vec<f64> = (1..=16).map(|v| 2.0 * v as f64 + 1.0).collect();
        let model = RobustLinearModel::fit(&x, &y, &LinearParams::default()).unwrap();
        assert_relative_eq!(model.intercept(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(model.coefficients()[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(model.predict(&[20.0]), 41.0, epsilon = 1e-8);
    }

    #[test]
    fn gross_outliers_are_rejected() {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            let v = i as f64;
            x.push(vec![v]);
            // small deterministic jitter so the MAD is non-zero
            let jitter = if i % 2 == 0 { 0.1 } else { -0.1 };
            y.push(3.0 * v - 2.0 + jitter);
        }
        y[4] += 500.0;
        y[15] -= 400.0;
        let model = RobustLinearModel::fit(&x, &y, &LinearParams::default()).unwrap();
        assert!((model.coefficients()[0] - 3.0).abs() < 0.05);
        assert!((model.intercept() + 2.0).abs() < 0.5);
        assert_eq!(model.inliers(), 18);
    }

    #[test]
    fn two_features() {
        let x: Vec<Vec<f64>> = (0..12)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64])
            .collect();
        let y: Vec<f64> = x.iter().map(|r| 0.5 * r[0] - 1.5 * r[1] + 4.0).collect();
        let model = RobustLinearModel::fit(&x, &y, &LinearParams::default()).unwrap();
        assert_relative_eq!(model.coefficients()[0], 0.5, epsilon = 1e-9);
        assert_relative_eq!(model.coefficients()[1], -1.5, epsilon = 1e-9);
        assert_relative_eq!(model.intercept(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn collinear_features_are_degenerate() {
        let x: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
        let y: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let err = RobustLinearModel::fit(&x, &y, &LinearParams::default()).unwrap_err();
        assert!(matches!(err, CarbonError::DegenerateFit(_)));
    }

    #[test]
    fn needs_more_samples_than_features() {
        let x = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        let err = RobustLinearModel::fit(&x, &[1.0, 2.0], &LinearParams::default()).unwrap_err();
        assert!(matches!(
            err,
            CarbonError::InsufficientData {
                required: 3,
                available: 2
            }
        ));
    }
}
