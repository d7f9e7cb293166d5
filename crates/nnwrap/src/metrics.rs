//! Scoring functions used by `score`.
use ndarray::{Array1, Array2, ArrayD, Axis};

use crate::error::{Error, Result};
use crate::targets::LabelValue;

/// Fraction of samples whose predicted labels all match the true labels.
///
/// With several outputs a sample only counts as correct when every output
/// matches (subset accuracy). Optional per-sample weights.
pub fn accuracy(
    y_true: &ArrayD<LabelValue>,
    y_pred: &ArrayD<LabelValue>,
    sample_weight: Option<&Array1<f64>>,
) -> Result<f64> {
    let n = y_true.shape().first().copied().unwrap_or(0);
    let y_true = to_rows(y_true, n)?;
    let y_pred = to_rows(y_pred, n)?;
    if y_true.dim() != y_pred.dim() {
        return Err(Error::shape(format!(
            "y_true has shape {:?} but y_pred has shape {:?}",
            y_true.dim(),
            y_pred.dim()
        )));
    }

    let correct = y_true
        .axis_iter(Axis(0))
        .zip(y_pred.axis_iter(Axis(0)))
        .map(|(t, p)| if t == p { 1.0 } else { 0.0 });

    weighted_mean(correct, sample_weight, n)
}

/// Coefficient of determination, averaged uniformly over outputs.
///
/// An output whose true values are constant scores 1.0 when predicted
/// exactly and 0.0 otherwise.
pub fn r2(
    y_true: &ArrayD<f64>,
    y_pred: &ArrayD<f64>,
    sample_weight: Option<&Array1<f64>>,
) -> Result<f64> {
    let n = y_true.shape().first().copied().unwrap_or(0);
    let y_true = to_rows(y_true, n)?;
    let y_pred = to_rows(y_pred, n)?;
    if y_true.dim() != y_pred.dim() {
        return Err(Error::shape(format!(
            "y_true has shape {:?} but y_pred has shape {:?}",
            y_true.dim(),
            y_pred.dim()
        )));
    }
    if n < 2 {
        log::warn!("R^2 score is not well-defined with less than two samples");
        return Ok(f64::NAN);
    }

    let weights = match sample_weight {
        Some(w) => {
            if w.len() != n {
                return Err(Error::shape(format!(
                    "sample_weight has {} entries, expected {}",
                    w.len(),
                    n
                )));
            }
            w.clone()
        }
        None => Array1::ones(n),
    };
    let total_weight = weights.sum();
    if total_weight == 0.0 {
        return Err(Error::shape("sample weights sum to zero"));
    }

    let mut scores = Vec::with_capacity(y_true.ncols());
    for (t, p) in y_true.axis_iter(Axis(1)).zip(y_pred.axis_iter(Axis(1))) {
        let mean = t.iter().zip(weights.iter()).map(|(v, w)| v * w).sum::<f64>() / total_weight;
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for ((tv, pv), w) in t.iter().zip(p.iter()).zip(weights.iter()) {
            numerator += w * (tv - pv) * (tv - pv);
            denominator += w * (tv - mean) * (tv - mean);
        }
        let score = if denominator == 0.0 {
            if numerator == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            1.0 - numerator / denominator
        };
        scores.push(score);
    }

    Ok(scores.iter().sum::<f64>() / scores.len() as f64)
}

fn weighted_mean<I>(values: I, sample_weight: Option<&Array1<f64>>, n: usize) -> Result<f64>
where
    I: Iterator<Item = f64>,
{
    match sample_weight {
        Some(w) => {
            if w.len() != n {
                return Err(Error::shape(format!(
                    "sample_weight has {} entries, expected {}",
                    w.len(),
                    n
                )));
            }
            let total = w.sum();
            if total == 0.0 {
                return Err(Error::shape("sample weights sum to zero"));
            }
            Ok(values.zip(w.iter()).map(|(v, w)| v * w).sum::<f64>() / total)
        }
        None => {
            if n == 0 {
                return Err(Error::shape("cannot score an empty set of samples"));
            }
            Ok(values.sum::<f64>() / n as f64)
        }
    }
}

/// Lay out an array as `n` rows, e.g. a squeezed prediction back into
/// `(n_samples, n_outputs)`.
fn to_rows<T: Clone>(a: &ArrayD<T>, n: usize) -> Result<Array2<T>> {
    if n == 0 || a.len() % n != 0 {
        return Err(Error::shape(format!(
            "cannot lay out {} values as {} samples",
            a.len(),
            n
        )));
    }
    Array2::from_shape_vec((n, a.len() / n), a.iter().cloned().collect())
        .map_err(|e| Error::shape(e.to_string()))
}
