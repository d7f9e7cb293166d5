//! nnwrap: a supervised-learning estimator interface for opaque
//! neural-network models.
//!
//! The crate does no numerical work of its own. A model collaborator
//! ([`model::Model`]) trains and predicts; this crate decides which named
//! parameters each model call receives ([`routing`]), converts caller labels
//! to and from the per-head blocks a model consumes ([`negotiation`]), and
//! wraps it all in an [`estimator::Estimator`] with `fit`, `predict`,
//! `predict_proba`, `score` and `get_params`/`set_params`. State capture and
//! grid search build on top of that.
pub mod build;
pub mod config;
pub mod error;
pub mod estimator;
pub mod metrics;
pub mod model;
pub mod negotiation;
pub mod params;
pub mod persistence;
pub mod routing;
pub mod search;
pub mod targets;
pub mod validation;

#[cfg(test)]
mod testing;

pub use build::{BuildFn, BuildForm, BuildSpec};
pub use error::{Error, Result};
pub use estimator::{Classifier, Estimator, EstimatorBuilder, Regressor, BUILD_FN_PARAM};
pub use model::{History, Model, ModelBuilder, ModelLoader, ModelOutput, ModelTargets, SavedModel};
pub use params::{param_map, Component, HasParams, ParamMap, ParamValue};
pub use routing::Signature;
pub use targets::{label_rows, labels, LabelValue, TargetType};
