//! Interfaces of the opaque model collaborator.
//!
//! The estimator never looks inside a model. It hands over feature arrays and
//! negotiated targets, receives raw outputs, and relies on the model to
//! describe its own options, outputs and serialized form.
use std::collections::BTreeMap;

use anyhow::Result;
use ndarray::{Array2, ArrayD};
use serde::{Deserialize, Serialize};

use crate::params::ParamMap;
use crate::routing::Signature;

/// Loss function name(s) of a compiled model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Loss {
    /// One loss shared by every output.
    Single(String),
    /// One loss per output, in output order.
    PerOutput(Vec<String>),
}

impl Loss {
    pub fn for_output(&self, idx: usize) -> Option<&str> {
        match self {
            Loss::Single(name) => Some(name),
            Loss::PerOutput(names) => names.get(idx).map(String::as_str),
        }
    }
}

/// Compile-time configuration of a model: loss, optimizer and metrics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub loss: Loss,
    pub optimizer: String,
    #[serde(default)]
    pub metrics: Vec<String>,
}

impl TrainingConfig {
    pub fn new(loss: Loss, optimizer: impl Into<String>) -> Self {
        Self {
            loss,
            optimizer: optimizer.into(),
            metrics: Vec::new(),
        }
    }

    pub fn with_metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics = metrics.into_iter().map(Into::into).collect();
        self
    }
}

/// Per-epoch metric values returned by a model's `fit`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub history: BTreeMap<String, Vec<f64>>,
}

impl History {
    pub fn record(&mut self, metric: impl Into<String>, value: f64) {
        self.history.entry(metric.into()).or_default().push(value);
    }

    pub fn epochs(&self) -> usize {
        self.history.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn last(&self, metric: &str) -> Option<f64> {
        self.history.get(metric).and_then(|v| v.last().copied())
    }
}

/// Targets in the form a model consumes: a bare array for a single output
/// head, a list of arrays for several heads.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelTargets {
    Single(ArrayD<f64>),
    Multi(Vec<ArrayD<f64>>),
}

impl ModelTargets {
    pub fn len(&self) -> usize {
        match self {
            ModelTargets::Single(_) => 1,
            ModelTargets::Multi(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Raw model output: one 2D block per output head.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelOutput {
    Single(Array2<f64>),
    Multi(Vec<Array2<f64>>),
}

impl ModelOutput {
    pub fn into_blocks(self) -> Vec<Array2<f64>> {
        match self {
            ModelOutput::Single(block) => vec![block],
            ModelOutput::Multi(blocks) => blocks,
        }
    }
}

/// Serialized form of a model: class name, architecture, training
/// configuration and weight tensors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    pub class: String,
    pub architecture: serde_json::Value,
    pub training_config: TrainingConfig,
    pub weights: Vec<ArrayD<f64>>,
}

/// A trainable model produced by a build specification.
pub trait Model {
    fn class_name(&self) -> &str;

    /// Number of output heads.
    fn n_outputs(&self) -> usize;

    fn fit_signature(&self) -> Signature {
        Signature::default_fit()
    }

    fn predict_signature(&self) -> Signature {
        Signature::default_predict()
    }

    /// `None` when the model has no `evaluate`.
    fn evaluate_signature(&self) -> Option<Signature> {
        Some(Signature::default_evaluate())
    }

    fn fit(&mut self, x: &ArrayD<f64>, y: &ModelTargets, args: &ParamMap) -> Result<History>;

    fn predict(&self, x: &ArrayD<f64>, args: &ParamMap) -> Result<ModelOutput>;

    /// Compile configuration, or `None` for an uncompiled model.
    fn training_config(&self) -> Option<TrainingConfig>;

    fn compile(&mut self, config: &TrainingConfig) -> Result<()>;

    /// Same architecture, freshly initialised weights, not compiled.
    fn clone_untrained(&self) -> Result<Box<dyn Model>>;

    fn architecture(&self) -> Result<serde_json::Value>;

    fn weights(&self) -> Vec<ArrayD<f64>>;

    fn set_weights(&mut self, weights: Vec<ArrayD<f64>>) -> Result<()>;

    fn capture(&self) -> Result<SavedModel> {
        let training_config = self.training_config().ok_or_else(|| {
            anyhow::anyhow!("model {} must be compiled before it can be saved", self.class_name())
        })?;
        Ok(SavedModel {
            class: self.class_name().to_string(),
            architecture: self.architecture()?,
            training_config,
            weights: self.weights(),
        })
    }
}

/// A stateful object that builds models.
pub trait ModelBuilder {
    /// Parameter names `build` accepts.
    fn signature(&self) -> Signature;

    fn build(&mut self, args: &ParamMap) -> Result<Box<dyn Model>>;

    fn box_clone(&self) -> Box<dyn ModelBuilder>;

    /// Internal state to store with a captured estimator. A builder without
    /// state returns `Value::Null`.
    fn capture_state(&self) -> Result<serde_json::Value>;

    /// Load state produced by [`ModelBuilder::capture_state`].
    fn restore_state(&mut self, state: &serde_json::Value) -> Result<()>;
}

impl Clone for Box<dyn ModelBuilder> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Rebuilds an uncompiled model from its class name and architecture.
pub trait ModelLoader {
    fn load(&self, class: &str, architecture: &serde_json::Value) -> Result<Box<dyn Model>>;
}

impl<F> ModelLoader for F
where
    F: Fn(&str, &serde_json::Value) -> Result<Box<dyn Model>>,
{
    fn load(&self, class: &str, architecture: &serde_json::Value) -> Result<Box<dyn Model>> {
        self(class, architecture)
    }
}
