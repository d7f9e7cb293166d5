//! Capturing and restoring estimator state.
//!
//! A captured [`EstimatorState`] is plain data: parameters, label metadata,
//! training history and the serialized model records. Models are rebuilt on
//! restore through a [`ModelLoader`], compiled with their saved training
//! configuration and loaded with their saved weights.
use serde::{Deserialize, Serialize};

use crate::build::{BuildForm, BuildSpec};
use crate::error::{Error, Result};
use crate::estimator::{Estimator, Fitted};
use crate::model::{History, Model, ModelLoader, SavedModel};
use crate::negotiation::{LabelMeta, Negotiator};
use crate::params::ParamMap;
use crate::routing::{LegalParams, Signature};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedState {
    pub model: SavedModel,
    pub history: History,
    pub label_meta: LabelMeta,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimatorState {
    pub name: String,
    pub estimator_type: String,
    pub params: ParamMap,
    pub build_form: BuildForm,
    /// The prebuilt model of the build specification, if that is its form.
    pub prebuilt: Option<SavedModel>,
    /// Captured state of a stateful builder, if that is the form.
    #[serde(default)]
    pub builder_state: Option<serde_json::Value>,
    pub legal_params: Vec<Signature>,
    pub fitted: Option<FittedState>,
}

impl EstimatorState {
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Rebuild a model from its record: load, compile, then set weights.
pub fn restore_model(saved: &SavedModel, loader: &dyn ModelLoader) -> Result<Box<dyn Model>> {
    let mut model = loader.load(&saved.class, &saved.architecture)?;
    model.compile(&saved.training_config)?;
    model.set_weights(saved.weights.clone())?;
    log::trace!("Restored model {}", saved.class);
    Ok(model)
}

impl<N: Negotiator> Estimator<N> {
    pub fn capture_state(&self) -> Result<EstimatorState> {
        let (prebuilt, builder_state) = match &self.build {
            BuildSpec::Prebuilt(model) => (Some(model.capture()?), None),
            BuildSpec::Builder(builder) => (None, Some(builder.capture_state()?)),
            BuildSpec::Function(_) => (None, None),
        };
        let fitted = match &self.fitted {
            Some(fitted) => Some(FittedState {
                model: fitted.model.capture()?,
                history: fitted.history.clone(),
                label_meta: fitted.meta.clone(),
            }),
            None => None,
        };
        Ok(EstimatorState {
            name: self.name.clone(),
            estimator_type: N::ESTIMATOR_TYPE.to_string(),
            params: self.params.clone(),
            build_form: self.build.form(),
            prebuilt,
            builder_state,
            legal_params: self.legal.signatures().to_vec(),
            fitted,
        })
    }

    /// Replace this estimator's state with `state`.
    ///
    /// Function and builder specifications cannot be serialized, so the
    /// estimator must already carry one of the recorded form. A builder is
    /// given its captured state. Every model record is rebuilt and the builder
    /// state loaded into a copy before anything is replaced.
    pub fn restore_state(&mut self, state: EstimatorState, loader: &dyn ModelLoader) -> Result<()> {
        if state.estimator_type != N::ESTIMATOR_TYPE {
            return Err(Error::config(format!(
                "Cannot restore a {} state into {}, which is a {}",
                state.estimator_type,
                self.name,
                N::ESTIMATOR_TYPE
            )));
        }

        let build = match (state.build_form, &state.prebuilt) {
            (BuildForm::Prebuilt, Some(saved)) => {
                Some(BuildSpec::prebuilt(restore_model(saved, loader)?))
            }
            (BuildForm::Builder, _) => match (&self.build, &state.builder_state) {
                (BuildSpec::Builder(current), Some(builder_state)) => {
                    let mut builder = current.box_clone();
                    builder.restore_state(builder_state)?;
                    Some(BuildSpec::Builder(builder))
                }
                (BuildSpec::Builder(_), None) => None,
                _ => {
                    return Err(Error::config(format!(
                        "State was captured with a Builder build specification, {} uses {}",
                        self.name, self.build
                    )))
                }
            },
            (BuildForm::Prebuilt, None) => {
                return Err(Error::config(
                    "State uses a prebuilt model but carries no model record",
                ))
            }
            (form, _) if form == self.build.form() => None,
            (form, _) => {
                return Err(Error::config(format!(
                    "State was captured with a {:?} build specification, {} uses {}",
                    form, self.name, self.build
                )))
            }
        };

        let fitted = match &state.fitted {
            Some(fitted) => Some(Fitted {
                model: restore_model(&fitted.model, loader)?,
                history: fitted.history.clone(),
                meta: fitted.label_meta.clone(),
            }),
            None => None,
        };

        let mut legal = LegalParams::new();
        for signature in state.legal_params {
            legal.register(signature);
        }

        if let Some(build) = build {
            self.build = build;
        }
        self.name = state.name;
        self.params = state.params;
        self.legal = legal;
        self.fitted = fitted;
        log::debug!("Restored state of {} (fitted: {})", self.name, self.is_fitted());
        Ok(())
    }
}
