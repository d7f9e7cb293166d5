//! Label values and target-type inference.
//!
//! Labels handed to an estimator are arrays of [`LabelValue`], which can hold
//! integer, floating point or text labels. [`infer_target_type`] classifies
//! the structure of such an array the same way a conventional supervised
//! learning toolkit does, and the result drives label negotiation.
use std::cmp::Ordering;
use std::fmt;

use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, Ix2};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single label. Integer and float labels compare numerically with each
/// other; text labels sort after all numeric labels.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl LabelValue {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, LabelValue::Text(_))
    }

    /// Cast to `f64`. Text labels are parsed, so `"2.5"` is castable and
    /// `"cat"` is not.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LabelValue::Int(v) => Some(*v as f64),
            LabelValue::Float(v) => Some(*v),
            LabelValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    fn has_fraction(&self) -> bool {
        match self {
            LabelValue::Float(v) => !v.is_finite() || v.fract() != 0.0,
            _ => false,
        }
    }

    fn is_zero_or_one(&self) -> bool {
        match self {
            LabelValue::Int(v) => *v == 0 || *v == 1,
            LabelValue::Float(v) => *v == 0.0 || *v == 1.0,
            LabelValue::Text(_) => false,
        }
    }
}

impl PartialEq for LabelValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LabelValue {}

impl PartialOrd for LabelValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LabelValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use LabelValue::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Text(_), _) => Ordering::Greater,
            (_, Text(_)) => Ordering::Less,
        }
    }
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelValue::Int(v) => write!(f, "{}", v),
            LabelValue::Float(v) => write!(f, "{}", v),
            LabelValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for LabelValue {
    fn from(value: i64) -> Self {
        LabelValue::Int(value)
    }
}

impl From<i32> for LabelValue {
    fn from(value: i32) -> Self {
        LabelValue::Int(value as i64)
    }
}

impl From<f64> for LabelValue {
    fn from(value: f64) -> Self {
        LabelValue::Float(value)
    }
}

impl From<&str> for LabelValue {
    fn from(value: &str) -> Self {
        LabelValue::Text(value.to_string())
    }
}

impl From<String> for LabelValue {
    fn from(value: String) -> Self {
        LabelValue::Text(value)
    }
}

/// Structural classification of a label array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetType {
    Binary,
    Multiclass,
    MultilabelIndicator,
    MulticlassMultioutput,
    Continuous,
    ContinuousMultioutput,
    Unknown,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Binary => "binary",
            TargetType::Multiclass => "multiclass",
            TargetType::MultilabelIndicator => "multilabel-indicator",
            TargetType::MulticlassMultioutput => "multiclass-multioutput",
            TargetType::Continuous => "continuous",
            TargetType::ContinuousMultioutput => "continuous-multioutput",
            TargetType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a 1D label array from anything convertible to [`LabelValue`].
pub fn labels<T: Into<LabelValue>>(values: Vec<T>) -> ArrayD<LabelValue> {
    values
        .into_iter()
        .map(Into::into)
        .collect::<Array1<LabelValue>>()
        .into_dyn()
}

/// Build a 2D label array from rows. All rows must have the same length.
pub fn label_rows<T: Into<LabelValue>>(rows: Vec<Vec<T>>) -> Result<ArrayD<LabelValue>> {
    let nrows = rows.len();
    let ncols = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut data = Vec::with_capacity(nrows * ncols);
    for (i, row) in rows.into_iter().enumerate() {
        if row.len() != ncols {
            return Err(Error::shape(format!(
                "row {} has {} labels, expected {}",
                i,
                row.len(),
                ncols
            )));
        }
        data.extend(row.into_iter().map(Into::into));
    }
    ArrayD::from_shape_vec(vec![nrows, ncols], data).map_err(|e| Error::shape(e.to_string()))
}

/// View labels as `(n_samples, n_outputs)`. A 1D array becomes one column.
pub fn as_2d(y: &ArrayD<LabelValue>) -> Result<Array2<LabelValue>> {
    match y.ndim() {
        1 => {
            let n = y.len();
            Array2::from_shape_vec((n, 1), y.iter().cloned().collect())
                .map_err(|e| Error::shape(e.to_string()))
        }
        2 => y
            .clone()
            .into_dimensionality::<Ix2>()
            .map_err(|e| Error::shape(e.to_string())),
        d => Err(Error::shape(format!(
            "y must be 1D or 2D, got an array with {} dimensions",
            d
        ))),
    }
}

/// Classify the structure of a 2D label array.
pub fn infer_target_type(y: &ArrayView2<LabelValue>) -> TargetType {
    let (nrows, ncols) = y.dim();
    if nrows == 0 || ncols == 0 {
        return TargetType::Unknown;
    }

    let numeric = y.iter().filter(|v| v.is_numeric()).count();
    if numeric != 0 && numeric != y.len() {
        return TargetType::Unknown;
    }
    let all_numeric = numeric == y.len();

    if ncols > 1 && all_numeric && y.iter().all(LabelValue::is_zero_or_one) {
        return TargetType::MultilabelIndicator;
    }

    if all_numeric && y.iter().any(LabelValue::has_fraction) {
        return if ncols > 1 {
            TargetType::ContinuousMultioutput
        } else {
            TargetType::Continuous
        };
    }

    if ncols > 1 {
        return TargetType::MulticlassMultioutput;
    }

    if unique_sorted(y.column(0)).len() > 2 {
        TargetType::Multiclass
    } else {
        TargetType::Binary
    }
}

/// Distinct values of a label column in ascending order.
pub fn unique_sorted(column: ArrayView1<LabelValue>) -> Vec<LabelValue> {
    let mut values: Vec<LabelValue> = column.iter().cloned().collect();
    values.sort();
    values.dedup();
    values
}

/// Replace each label by its index in the sorted vocabulary `classes`.
pub(crate) fn encode(column: ArrayView1<LabelValue>, classes: &[LabelValue]) -> Result<Vec<f64>> {
    column
        .iter()
        .map(|v| {
            classes
                .binary_search(v)
                .map(|idx| idx as f64)
                .map_err(|_| Error::Type(format!("label {} is not a known class", v)))
        })
        .collect()
}
