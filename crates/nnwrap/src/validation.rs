//! Input checks run before any model work.
use ndarray::{Array1, ArrayD};

use crate::error::{Error, Result};
use crate::targets::LabelValue;

/// `X` must be at least 2D, hold at least one sample and be finite.
pub fn check_x(x: &ArrayD<f64>) -> Result<()> {
    if x.ndim() < 2 {
        return Err(Error::shape(format!(
            "Expected an array with at least 2 dimensions, got {}D. Reshape your data with \
             one row per sample",
            x.ndim()
        )));
    }
    if x.shape()[0] == 0 {
        return Err(Error::shape("Found array with 0 samples"));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(Error::Type("Input X contains NaN or infinity".to_string()));
    }
    Ok(())
}

/// Checks `X` and `y` on their own and that they describe the same samples.
pub fn check_x_y(x: &ArrayD<f64>, y: &ArrayD<LabelValue>) -> Result<()> {
    check_x(x)?;
    check_y(y)?;
    if x.shape()[0] != y.shape()[0] {
        return Err(Error::shape(format!(
            "Found input variables with inconsistent numbers of samples: [{}, {}]",
            x.shape()[0],
            y.shape()[0]
        )));
    }
    Ok(())
}

/// `y` must be 1D or 2D with finite numeric labels.
pub fn check_y(y: &ArrayD<LabelValue>) -> Result<()> {
    if !matches!(y.ndim(), 1 | 2) {
        return Err(Error::shape(format!(
            "y must be 1D or 2D, got an array with {} dimensions",
            y.ndim()
        )));
    }
    if y
        .iter()
        .any(|v| matches!(v, LabelValue::Float(f) if !f.is_finite()))
    {
        return Err(Error::Type("Input y contains NaN or infinity".to_string()));
    }
    Ok(())
}

/// One finite weight per sample.
pub fn check_sample_weight(sample_weight: &Array1<f64>, n_samples: usize) -> Result<()> {
    if sample_weight.len() != n_samples {
        return Err(Error::shape(format!(
            "sample_weight.shape == ({},), expected ({},)!",
            sample_weight.len(),
            n_samples
        )));
    }
    if sample_weight.iter().any(|v| !v.is_finite()) {
        return Err(Error::Type(
            "sample_weight contains NaN or infinity".to_string(),
        ));
    }
    Ok(())
}
