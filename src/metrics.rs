use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Regression-style scores between predicted and true class labels.
///
/// The labels are discrete classes, so these read as "distance between
/// class ids" rather than a proper classification score. They are kept
/// because the tracking history is keyed on them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

pub fn eval_metrics(actual: &[f32], pred: &[f32]) -> Result<RegressionMetrics> {
    check_len(actual.len(), pred.len())?;
    let n = actual.len();
    if n == 0 {
        return Ok(RegressionMetrics { rmse: 0.0, mae: 0.0, r2: 1.0 });
    }

    let pairs = || actual.iter().zip(pred).map(|(&a, &p)| (a as f64, p as f64));
    let ss_res: f64 = pairs().map(|(a, p)| (a - p).powi(2)).sum();
    let abs_err: f64 = pairs().map(|(a, p)| (a - p).abs()).sum();

    let mean = pairs().map(|(a, _)| a).sum::<f64>() / n as f64;
    let ss_tot: f64 = pairs().map(|(a, _)| (a - mean).powi(2)).sum();

    // Constant targets: perfect predictions score 1, anything else 0.
    let r2 = if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    };

    Ok(RegressionMetrics {
        rmse: (ss_res / n as f64).sqrt(),
        mae: abs_err / n as f64,
        r2,
    })
}

/// Fraction of predictions that differ from the label.
pub fn error_rate(pred: &[f32], labels: &[f32]) -> Result<f64> {
    check_len(labels.len(), pred.len())?;
    if pred.is_empty() {
        return Ok(0.0);
    }
    let wrong = pred.iter().zip(labels).filter(|(p, l)| p != l).count();
    Ok(wrong as f64 / pred.len() as f64)
}

/// Mean negative log-probability of the true class. `probs` is row-major,
/// `num_class` entries per row.
pub fn multi_logloss(probs: &[f32], labels: &[f32], num_class: usize) -> Result<f64> {
    check_len(labels.len() * num_class, probs.len())?;
    if labels.is_empty() {
        return Ok(0.0);
    }
    let mut total = 0.0;
    for (row, (row_probs, &label)) in probs.chunks(num_class).zip(labels).enumerate() {
        let p = *row_probs
            .get(label as usize)
            .ok_or(Error::LabelOutOfRange { row, label, num_class })? as f64;
        total -= p.clamp(1e-15, 1.0 - 1e-15).ln();
    }
    Ok(total / labels.len() as f64)
}

/// Multi-class error rate from row-major class probabilities.
pub fn merror(probs: &[f32], labels: &[f32], num_class: usize) -> Result<f64> {
    check_len(labels.len() * num_class, probs.len())?;
    let pred: Vec<f32> = probs.chunks(num_class).map(|row| argmax(row) as f32).collect();
    error_rate(&pred, labels)
}

/// Turns each row of `num_class` raw scores into probabilities.
pub fn softmax_in_place(scores: &mut [f32], num_class: usize) {
    for row in scores.chunks_mut(num_class) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
}

/// Index of the largest value; the first one wins on ties.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::LengthMismatch { expected, actual })
    }
}
