//! L2-penalized logistic regression fit by Newton–Raphson.
//!
//! Minimizes `0.5·‖w‖² + C·Σ logloss(yᵢ, σ(w·xᵢ + b))` with the intercept
//! left unpenalized. With a handful of standardized features the full
//! Hessian is tiny, so Newton steps converge in a few iterations and the
//! result does not depend on a learning rate.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineError;

const STEP_TOLERANCE: f64 = 1e-10;
const EPS: f64 = 1e-15;

pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

/// Mean binary cross-entropy
pub fn log_loss(y: &[f64], p: &[f64]) -> f64 {
    let n = y.len().max(1) as f64;
    y.iter()
        .zip(p)
        .map(|(&y, &p)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum::<f64>()
        / n
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

#[derive(Debug, Clone)]
pub struct FitReport {
    pub iterations: usize,
    pub converged: bool,
    pub train_log_loss: f64,
}

impl LogisticRegression {
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        c: f64,
        max_iter: usize,
    ) -> Result<(Self, FitReport), PipelineError> {
        let n_features = x.first().map_or(0, Vec::len);
        let d = n_features + 1;
        let mut beta = vec![0.0; d];
        let mut iterations = 0;
        let mut converged = false;

        for _ in 0..max_iter {
            iterations += 1;
            let mut grad = vec![0.0; d];
            let mut hess = vec![vec![0.0; d]; d];

            for (row, &target) in x.iter().zip(y) {
                let p = sigmoid(linear(&beta, row));
                let err = p - target;
                let w = p * (1.0 - p);
                for j in 0..d {
                    let xj = if j < n_features { row[j] } else { 1.0 };
                    grad[j] += c * err * xj;
                    for k in 0..=j {
                        let xk = if k < n_features { row[k] } else { 1.0 };
                        hess[j][k] += c * w * xj * xk;
                    }
                }
            }
            for j in 0..d {
                for k in 0..j {
                    hess[k][j] = hess[j][k];
                }
            }
            for j in 0..n_features {
                grad[j] += beta[j];
                hess[j][j] += 1.0;
            }

            let step = solve(hess, grad).ok_or_else(|| {
                PipelineError::FitFailed("singular Hessian (is every label identical?)".into())
            })?;
            // Halve the Newton step until the penalized objective stops increasing
            let current = objective(&beta, x, y, c);
            let mut scale = 1.0;
            let mut candidate: Vec<f64>;
            loop {
                candidate = beta.iter().zip(&step).map(|(b, s)| b - scale * s).collect();
                if objective(&candidate, x, y, c) <= current || scale < 1e-8 {
                    break;
                }
                scale *= 0.5;
            }
            let max_step = step.iter().fold(0.0f64, |m, s| m.max((scale * s).abs()));
            beta = candidate;
            if beta.iter().any(|b| !b.is_finite()) {
                return Err(PipelineError::FitFailed("coefficients diverged".into()));
            }
            if max_step < STEP_TOLERANCE {
                converged = true;
                break;
            }
        }

        let intercept = beta.pop().unwrap_or(0.0);
        let model = LogisticRegression {
            coefficients: beta,
            intercept,
        };
        let train_log_loss = log_loss(y, &model.predict_proba(x));
        debug!(
            "Newton fit: {} iterations, converged={}, log-loss={:.4}",
            iterations, converged, train_log_loss
        );
        Ok((
            model,
            FitReport {
                iterations,
                converged,
                train_log_loss,
            },
        ))
    }

    pub fn predict_proba_row(&self, row: &[f64]) -> f64 {
        let z = self
            .coefficients
            .iter()
            .zip(row)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept;
        sigmoid(z)
    }

    pub fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_proba_row(r)).collect()
    }
}

/// `beta` holds the coefficients followed by the intercept
fn linear(beta: &[f64], row: &[f64]) -> f64 {
    let (w, b) = beta.split_at(beta.len() - 1);
    w.iter().zip(row).map(|(w, x)| w * x).sum::<f64>() + b[0]
}

/// `0.5·‖w‖² + C·Σ logloss`, with log(1 + eᶻ) evaluated stably
fn objective(beta: &[f64], x: &[Vec<f64>], y: &[f64], c: f64) -> f64 {
    let penalty: f64 = beta[..beta.len() - 1].iter().map(|w| w * w).sum::<f64>() * 0.5;
    let loss: f64 = x
        .iter()
        .zip(y)
        .map(|(row, &target)| {
            let z = linear(beta, row);
            let softplus = z.max(0.0) + (-z.abs()).exp().ln_1p();
            softplus - target * z
        })
        .sum();
    penalty + c * loss
}

/// Solve `a · x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}
