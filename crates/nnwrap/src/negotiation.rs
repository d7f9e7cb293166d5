//! Label shape negotiation.
//!
//! Before fitting, caller labels are turned into one 2D `f64` block per model
//! output head. After predicting, the model's raw output blocks are turned
//! back into labels shaped like the caller's `y`. Classification and
//! regression negotiate differently; both implement [`Negotiator`].
use std::fmt;

use ndarray::{concatenate, Array1, Array2, ArrayD, ArrayView1, Axis, Ix2, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metrics;
use crate::model::{ModelTargets, TrainingConfig};
use crate::params::{ParamMap, ParamValue};
use crate::targets::{as_2d, encode, infer_target_type, unique_sorted, LabelValue, TargetType};

/// Probability above which a sigmoid output counts as the positive class.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// What pre-processing learned about the labels of a fit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelMeta {
    pub target_type: TargetType,
    /// Sorted class vocabulary per output; `None` for regression.
    pub classes: Option<Vec<Vec<LabelValue>>>,
    /// Number of outputs as seen by the caller.
    pub n_outputs: usize,
    /// Number of output heads the model must have.
    pub n_outputs_model: usize,
}

impl LabelMeta {
    pub fn n_classes(&self) -> Option<Vec<usize>> {
        self.classes
            .as_ref()
            .map(|classes| classes.iter().map(Vec::len).collect())
    }

    /// Label metadata as build-time parameters: `classes_`, `n_classes_`,
    /// `n_outputs_`, `n_outputs_model_` and `target_type_`. A single output
    /// contributes bare values, several outputs contribute lists.
    pub fn context(&self) -> ParamMap {
        let mut ctx = ParamMap::new();
        if let Some(classes) = &self.classes {
            let per_output: Vec<ParamValue> = classes
                .iter()
                .map(|c| ParamValue::List(c.iter().map(label_param).collect()))
                .collect();
            let n_classes: Vec<ParamValue> = classes.iter().map(|c| c.len().into()).collect();
            if per_output.len() == 1 {
                ctx.insert("classes_".into(), per_output[0].clone());
                ctx.insert("n_classes_".into(), n_classes[0].clone());
            } else {
                ctx.insert("classes_".into(), ParamValue::List(per_output));
                ctx.insert("n_classes_".into(), ParamValue::List(n_classes));
            }
        }
        ctx.insert("n_outputs_".into(), self.n_outputs.into());
        ctx.insert("n_outputs_model_".into(), self.n_outputs_model.into());
        ctx.insert("target_type_".into(), self.target_type.as_str().into());
        ctx
    }
}

fn label_param(label: &LabelValue) -> ParamValue {
    match label {
        LabelValue::Int(v) => ParamValue::Int(*v),
        LabelValue::Float(v) => ParamValue::Float(*v),
        LabelValue::Text(v) => ParamValue::Str(v.clone()),
    }
}

/// Pre-processed labels: one block per model head plus metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Negotiated {
    pub blocks: Vec<Array2<f64>>,
    pub meta: LabelMeta,
}

/// Post-processed model output.
#[derive(Clone, Debug, PartialEq)]
pub struct Decoded<T> {
    pub labels: ArrayD<T>,
    /// Stacked class probabilities, classification only.
    pub probabilities: Option<ArrayD<f64>>,
}

/// Label handling for one kind of estimator.
pub trait Negotiator {
    /// Type of the predicted labels.
    type Label: Clone + fmt::Debug;

    const ESTIMATOR_TYPE: &'static str;

    /// Name an estimator gets when none is given.
    const DEFAULT_NAME: &'static str;

    /// Whether multilabel targets are supported.
    const MULTILABEL: bool = false;

    fn pre_process(y: &ArrayD<LabelValue>) -> Result<Negotiated>;

    fn post_process(meta: &LabelMeta, outputs: Vec<Array2<f64>>) -> Result<Decoded<Self::Label>>;

    /// Adjust blocks to the compiled losses of the model, just before the
    /// output-count check.
    fn encode_for_loss(
        _meta: &LabelMeta,
        blocks: Vec<Array2<f64>>,
        _config: Option<&TrainingConfig>,
    ) -> Vec<Array2<f64>> {
        blocks
    }

    fn score(
        y_true: &ArrayD<LabelValue>,
        y_pred: &ArrayD<Self::Label>,
        sample_weight: Option<&Array1<f64>>,
    ) -> Result<f64>;

    /// Called after scoring with the fitted model's compile configuration.
    fn check_score_compatibility(_config: Option<&TrainingConfig>) {}
}

/// Check that there is one block per model head and lay the blocks out the
/// way the model consumes them.
pub fn to_model_targets(blocks: Vec<Array2<f64>>, model_outputs: usize) -> Result<ModelTargets> {
    if blocks.len() != model_outputs {
        return Err(Error::OutputMismatch {
            model_outputs,
            blocks: blocks.len(),
        });
    }
    let mut blocks = blocks;
    if blocks.len() == 1 {
        return Ok(ModelTargets::Single(blocks.remove(0).into_dyn()));
    }
    Ok(ModelTargets::Multi(
        blocks.into_iter().map(squeeze).collect::<Result<_>>()?,
    ))
}

/// Classification: binary, multiclass, multilabel-indicator and
/// multiclass-multioutput targets.
#[derive(Clone, Copy, Debug, Default)]
pub struct Classification;

impl Negotiator for Classification {
    type Label = LabelValue;

    const ESTIMATOR_TYPE: &'static str = "classifier";
    const DEFAULT_NAME: &'static str = "NeuralNetClassifier";
    const MULTILABEL: bool = true;

    fn pre_process(y: &ArrayD<LabelValue>) -> Result<Negotiated> {
        let y = as_2d(y)?;
        let target_type = infer_target_type(&y.view());
        let n = y.nrows();

        let (blocks, classes) = match target_type {
            TargetType::Binary | TargetType::Multiclass => {
                // single task, one sigmoid or softmax head
                let column = y.column(0);
                let classes = unique_sorted(column);
                let block = code_block(column, &classes, n)?;
                (vec![block], vec![classes])
            }
            TargetType::MultilabelIndicator => {
                // one binary head per label
                let mut blocks = Vec::with_capacity(y.ncols());
                for column in y.axis_iter(Axis(1)) {
                    let values: Vec<f64> = column.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect();
                    blocks.push(column_block(values, n)?);
                }
                let classes = vec![vec![LabelValue::Int(0), LabelValue::Int(1)]; y.ncols()];
                (blocks, classes)
            }
            TargetType::MulticlassMultioutput => {
                // one independent multiclass head per column
                let mut blocks = Vec::with_capacity(y.ncols());
                let mut classes = Vec::with_capacity(y.ncols());
                for column in y.axis_iter(Axis(1)) {
                    let vocabulary = unique_sorted(column);
                    blocks.push(code_block(column, &vocabulary, n)?);
                    classes.push(vocabulary);
                }
                (blocks, classes)
            }
            other => return Err(Error::UnknownTargetType(other)),
        };

        let n_outputs = classes.len();
        let meta = LabelMeta {
            target_type,
            n_outputs,
            n_outputs_model: blocks.len(),
            classes: Some(classes),
        };
        log::debug!(
            "Negotiated {} labels into {} block(s)",
            target_type,
            meta.n_outputs_model
        );
        Ok(Negotiated { blocks, meta })
    }

    fn post_process(meta: &LabelMeta, outputs: Vec<Array2<f64>>) -> Result<Decoded<LabelValue>> {
        let classes = meta
            .classes
            .as_ref()
            .ok_or_else(|| Error::config("classifier was fit without class labels"))?;
        if outputs.len() != classes.len() {
            return Err(Error::OutputMismatch {
                model_outputs: outputs.len(),
                blocks: classes.len(),
            });
        }

        let mut label_blocks = Vec::with_capacity(outputs.len());
        let mut proba_blocks = Vec::with_capacity(outputs.len());
        for (block, vocabulary) in outputs.into_iter().zip(classes) {
            match meta.target_type {
                TargetType::Binary => {
                    if block.ncols() == 1 {
                        // single sigmoid output
                        let column = block.column(0);
                        let labels = column
                            .iter()
                            .map(|&p| lookup_clamped(vocabulary, usize::from(p > DECISION_THRESHOLD)))
                            .collect();
                        label_blocks.push(column_block(labels, block.nrows())?);
                        let negative = column.mapv(|p| 1.0 - p).insert_axis(Axis(1));
                        proba_blocks.push(concatenate(
                            Axis(1),
                            &[negative.view(), column.insert_axis(Axis(1))],
                        )
                        .map_err(|e| Error::shape(e.to_string()))?);
                    } else {
                        let labels = block
                            .axis_iter(Axis(0))
                            .map(|row| {
                                let idx = row.iter().position(|&p| p > DECISION_THRESHOLD).unwrap_or(0);
                                lookup_clamped(vocabulary, idx)
                            })
                            .collect();
                        label_blocks.push(column_block(labels, block.nrows())?);
                        proba_blocks.push(block);
                    }
                }
                TargetType::Multiclass | TargetType::MulticlassMultioutput => {
                    let labels = block
                        .axis_iter(Axis(0))
                        .map(|row| lookup(vocabulary, argmax(row)))
                        .collect::<Result<Vec<_>>>()?;
                    label_blocks.push(column_block(labels, block.nrows())?);
                    proba_blocks.push(block);
                }
                TargetType::MultilabelIndicator => {
                    let labels = block.mapv(|p| lookup_clamped(vocabulary, usize::from(p > DECISION_THRESHOLD)));
                    label_blocks.push(labels);
                    proba_blocks.push(block);
                }
                other => return Err(Error::UnknownTargetType(other)),
            }
        }

        Ok(Decoded {
            labels: squeeze(hstack(&label_blocks)?)?,
            probabilities: Some(squeeze(hstack(&proba_blocks)?)?),
        })
    }

    fn encode_for_loss(
        meta: &LabelMeta,
        blocks: Vec<Array2<f64>>,
        config: Option<&TrainingConfig>,
    ) -> Vec<Array2<f64>> {
        let config = match config {
            Some(config) => config,
            None => return blocks,
        };
        let n_classes = meta.n_classes().unwrap_or_default();
        blocks
            .into_iter()
            .enumerate()
            .map(|(idx, block)| {
                let categorical = config
                    .loss
                    .for_output(idx)
                    .map(is_categorical_crossentropy)
                    .unwrap_or(false);
                if categorical && block.ncols() == 1 {
                    log::trace!("One-hot encoding output {} for a categorical loss", idx);
                    to_categorical(&block, n_classes.get(idx).copied().unwrap_or(0))
                } else {
                    block
                }
            })
            .collect()
    }

    fn score(
        y_true: &ArrayD<LabelValue>,
        y_pred: &ArrayD<LabelValue>,
        sample_weight: Option<&Array1<f64>>,
    ) -> Result<f64> {
        metrics::accuracy(y_true, y_pred, sample_weight)
    }
}

/// Regression: continuous targets, all outputs fed to a single head.
#[derive(Clone, Copy, Debug, Default)]
pub struct Regression;

impl Negotiator for Regression {
    type Label = f64;

    const ESTIMATOR_TYPE: &'static str = "regressor";
    const DEFAULT_NAME: &'static str = "NeuralNetRegressor";

    fn pre_process(y: &ArrayD<LabelValue>) -> Result<Negotiated> {
        let y = to_float(&as_2d(y)?.into_dyn())?;
        let block = y
            .into_dimensionality::<Ix2>()
            .map_err(|e| Error::shape(e.to_string()))?;
        let k = block.ncols();
        let target_type = if k > 1 {
            TargetType::ContinuousMultioutput
        } else {
            TargetType::Continuous
        };
        Ok(Negotiated {
            blocks: vec![block],
            meta: LabelMeta {
                target_type,
                classes: None,
                n_outputs: k,
                n_outputs_model: 1,
            },
        })
    }

    fn post_process(_meta: &LabelMeta, outputs: Vec<Array2<f64>>) -> Result<Decoded<f64>> {
        Ok(Decoded {
            labels: squeeze(hstack(&outputs)?)?,
            probabilities: None,
        })
    }

    fn score(
        y_true: &ArrayD<LabelValue>,
        y_pred: &ArrayD<f64>,
        sample_weight: Option<&Array1<f64>>,
    ) -> Result<f64> {
        metrics::r2(&to_float(y_true)?, y_pred, sample_weight)
    }

    fn check_score_compatibility(config: Option<&TrainingConfig>) {
        let loss = config.and_then(|c| c.loss.for_output(0));
        if !matches!(loss, Some("mean_squared_error") | Some("mse")) {
            log::warn!(
                "R^2 is used to compute the score, it is advisable to use a compatible loss \
                 function such as mean_squared_error (model loss: {:?})",
                loss
            );
        }
    }
}

/// Cast labels to `f64`, failing on the first value that is not numeric or
/// not finite.
pub fn to_float(y: &ArrayD<LabelValue>) -> Result<ArrayD<f64>> {
    let values = y
        .iter()
        .map(|v| match v.as_f64() {
            Some(f) if f.is_finite() => Ok(f),
            Some(_) => Err(Error::Type(format!(
                "label {:?} is NaN or infinity",
                v.to_string()
            ))),
            None => Err(Error::Type(format!(
                "could not convert label {:?} to float",
                v.to_string()
            ))),
        })
        .collect::<Result<Vec<f64>>>()?;
    ArrayD::from_shape_vec(y.raw_dim(), values).map_err(|e| Error::shape(e.to_string()))
}

fn is_categorical_crossentropy(loss: &str) -> bool {
    matches!(
        loss,
        "categorical_crossentropy" | "CategoricalCrossentropy"
    )
}

/// One-hot encode a column of integer codes.
fn to_categorical(block: &Array2<f64>, n_classes: usize) -> Array2<f64> {
    let max_code = block.iter().fold(0usize, |acc, &v| acc.max(v as usize));
    let width = n_classes.max(max_code + 1);
    let mut out = Array2::zeros((block.nrows(), width));
    for (row, &code) in block.column(0).iter().enumerate() {
        out[(row, code as usize)] = 1.0;
    }
    out
}

fn code_block(column: ArrayView1<LabelValue>, classes: &[LabelValue], n: usize) -> Result<Array2<f64>> {
    column_block(encode(column, classes)?, n)
}

fn column_block<T>(values: Vec<T>, n: usize) -> Result<Array2<T>> {
    Array2::from_shape_vec((n, 1), values).map_err(|e| Error::shape(e.to_string()))
}

fn argmax(row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (idx, &value) in row.iter().enumerate() {
        if value > row[best] {
            best = idx;
        }
    }
    best
}

fn lookup(classes: &[LabelValue], idx: usize) -> Result<LabelValue> {
    classes.get(idx).cloned().ok_or_else(|| {
        Error::shape(format!(
            "model predicted class index {} but only {} classes were seen during fit",
            idx,
            classes.len()
        ))
    })
}

/// Binary outputs may point past a single-class vocabulary.
fn lookup_clamped(classes: &[LabelValue], idx: usize) -> LabelValue {
    let idx = idx.min(classes.len().saturating_sub(1));
    classes.get(idx).cloned().unwrap_or(LabelValue::Int(idx as i64))
}

/// Stack 2D blocks side by side.
pub(crate) fn hstack<T: Clone>(blocks: &[Array2<T>]) -> Result<Array2<T>> {
    let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
    concatenate(Axis(1), &views).map_err(|e| Error::shape(e.to_string()))
}

/// Drop every axis of length one.
pub(crate) fn squeeze<T: Clone>(a: Array2<T>) -> Result<ArrayD<T>> {
    let shape: Vec<usize> = a.shape().iter().copied().filter(|&d| d != 1).collect();
    let values: Vec<T> = a.iter().cloned().collect();
    ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| Error::shape(e.to_string()))
}
