//! Scalar metrics and diagnostic curves for binary probability forecasts.

use serde::{Deserialize, Serialize};

/// Fraction of rows where `p > 0.5` agrees with the label
pub fn accuracy(y: &[f64], p: &[f64]) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    let correct = y
        .iter()
        .zip(p)
        .filter(|(&y, &p)| (p > 0.5) == (y >= 0.5))
        .count();
    correct as f64 / y.len() as f64
}

/// Mean squared error between probability and outcome. Lower is better.
pub fn brier_score(y: &[f64], p: &[f64]) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    y.iter().zip(p).map(|(y, p)| (p - y).powi(2)).sum::<f64>() / y.len() as f64
}

/// Area under the ROC curve via the rank-sum statistic, ties averaged.
///
/// `None` when the labels contain only one class.
pub fn roc_auc(y: &[f64], p: &[f64]) -> Option<f64> {
    let n_pos = y.iter().filter(|&&v| v >= 0.5).count();
    let n_neg = y.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..p.len()).collect();
    order.sort_by(|&a, &b| p[a].total_cmp(&p[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && p[order[j + 1]] == p[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; tied block i..=j shares the mean rank
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if y[idx] >= 0.5 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub fpr: f64,
    pub tpr: f64,
    pub threshold: f64,
}

/// ROC points at every distinct score threshold, from (0, 0) to (1, 1).
pub fn roc_curve(y: &[f64], p: &[f64]) -> Vec<RocPoint> {
    let n_pos = y.iter().filter(|&&v| v >= 0.5).count() as f64;
    let n_neg = y.len() as f64 - n_pos;
    let rate = |count: f64, total: f64| if total > 0.0 { count / total } else { 0.0 };

    let mut order: Vec<usize> = (0..p.len()).collect();
    order.sort_by(|&a, &b| p[b].total_cmp(&p[a]));

    let mut points = vec![RocPoint {
        fpr: 0.0,
        tpr: 0.0,
        threshold: f64::INFINITY,
    }];
    let (mut tp, mut fp) = (0.0, 0.0);
    for (k, &idx) in order.iter().enumerate() {
        if y[idx] >= 0.5 {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let last_of_threshold = order.get(k + 1).map_or(true, |&next| p[next] != p[idx]);
        if last_of_threshold {
            points.push(RocPoint {
                fpr: rate(fp, n_neg),
                tpr: rate(tp, n_pos),
                threshold: p[idx],
            });
        }
    }
    points
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub mean_predicted: f64,
    pub fraction_positive: f64,
    pub count: usize,
}

/// Reliability curve over `n_bins` uniform buckets of [0, 1].
///
/// A probability lying exactly on an inner edge counts toward the lower
/// bucket. Empty buckets are omitted.
pub fn calibration_curve(y: &[f64], p: &[f64], n_bins: usize) -> Vec<CalibrationBin> {
    let n_bins = n_bins.max(1);
    let edges: Vec<f64> = (1..n_bins).map(|k| k as f64 / n_bins as f64).collect();

    let mut sum_pred = vec![0.0; n_bins];
    let mut sum_true = vec![0.0; n_bins];
    let mut counts = vec![0usize; n_bins];
    for (&y, &p) in y.iter().zip(p) {
        let bin = edges.iter().filter(|&&e| e < p).count();
        sum_pred[bin] += p;
        sum_true[bin] += y;
        counts[bin] += 1;
    }

    (0..n_bins)
        .filter(|&b| counts[b] > 0)
        .map(|b| CalibrationBin {
            mean_predicted: sum_pred[b] / counts[b] as f64,
            fraction_positive: sum_true[b] / counts[b] as f64,
            count: counts[b],
        })
        .collect()
}

/// Test-set scores reported by the trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub roc_auc: Option<f64>,
    pub brier: f64,
}

impl EvaluationMetrics {
    pub fn compute(y: &[f64], p: &[f64]) -> Self {
        EvaluationMetrics {
            accuracy: accuracy(y, p),
            roc_auc: roc_auc(y, p),
            brier: brier_score(y, p),
        }
    }
}
