use thiserror::Error;

use crate::targets::TargetType;

/// Errors raised by the estimator adapter.
///
/// Input and configuration problems are reported before the model is touched.
/// Failures inside the model collaborator are carried through unchanged in
/// [`Error::Model`].
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or conflicting estimator configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("Estimator {estimator} needs to be fit before `{method}` can be called")]
    NotFitted {
        estimator: String,
        method: &'static str,
    },

    /// Shape or dimensionality problem with `X`, `y` or `sample_weight`.
    #[error("shape error: {0}")]
    Shape(String),

    /// A value could not be converted to the type required.
    #[error("type error: {0}")]
    Type(String),

    #[error("Unknown label type: {0}")]
    UnknownTargetType(TargetType),

    #[error("Detected a model with {model_outputs} outputs, but y has incompatible shape {blocks}")]
    OutputMismatch { model_outputs: usize, blocks: usize },

    #[error(transparent)]
    Model(#[from] anyhow::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Error::Shape(msg.into())
    }
}
