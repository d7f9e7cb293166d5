use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Model, ModelBuilder};
use crate::params::ParamMap;
use crate::routing::Signature;

pub type BuildFnPtr = fn(&ParamMap) -> anyhow::Result<Box<dyn Model>>;

/// A plain build function together with the parameter names it declares.
#[derive(Clone)]
pub struct BuildFn {
    signature: Signature,
    func: BuildFnPtr,
}

impl BuildFn {
    pub fn new(signature: Signature, func: BuildFnPtr) -> Self {
        Self { signature, func }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn call(&self, args: &ParamMap) -> anyhow::Result<Box<dyn Model>> {
        (self.func)(args)
    }
}

impl PartialEq for BuildFn {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature && self.func as usize == other.func as usize
    }
}

/// How the estimator obtains its model.
///
/// Clones share a prebuilt model; it is never trained in place.
#[derive(Clone)]
pub enum BuildSpec {
    /// A function without call state.
    Function(BuildFn),
    /// An object with a build capability and its own state.
    Builder(Box<dyn ModelBuilder>),
    /// An already configured model; every fit trains a fresh clone of it.
    Prebuilt(Rc<dyn Model>),
}

/// Which of the three forms a [`BuildSpec`] takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildForm {
    Function,
    Builder,
    Prebuilt,
}

impl BuildSpec {
    pub fn prebuilt(model: Box<dyn Model>) -> Self {
        BuildSpec::Prebuilt(Rc::from(model))
    }

    pub fn form(&self) -> BuildForm {
        match self {
            BuildSpec::Function(_) => BuildForm::Function,
            BuildSpec::Builder(_) => BuildForm::Builder,
            BuildSpec::Prebuilt(_) => BuildForm::Prebuilt,
        }
    }

    /// Parameter names accepted when building. Cloning a prebuilt model takes
    /// no routed arguments.
    pub fn signature(&self) -> Signature {
        match self {
            BuildSpec::Function(f) => f.signature().clone(),
            BuildSpec::Builder(b) => b.signature(),
            BuildSpec::Prebuilt(_) => Signature::empty("clone_prebuilt_model"),
        }
    }

    pub(crate) fn build(&mut self, args: &ParamMap) -> Result<Box<dyn Model>> {
        match self {
            BuildSpec::Function(f) => Ok(f.call(args)?),
            BuildSpec::Builder(b) => Ok(b.build(args)?),
            BuildSpec::Prebuilt(model) => clone_prebuilt(model.as_ref()),
        }
    }
}

/// Functions compare by pointer and signature, builders by signature and
/// captured state, prebuilt models by identity.
impl PartialEq for BuildSpec {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BuildSpec::Function(a), BuildSpec::Function(b)) => a == b,
            (BuildSpec::Builder(a), BuildSpec::Builder(b)) => {
                a.signature() == b.signature()
                    && a.capture_state().ok() == b.capture_state().ok()
            }
            (BuildSpec::Prebuilt(a), BuildSpec::Prebuilt(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for BuildSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuildSpec::{:?}({})", self.form(), self)
    }
}

impl fmt::Display for BuildSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildSpec::Function(func) => write!(f, "function {}", func.signature().name()),
            BuildSpec::Builder(b) => write!(f, "builder {}", b.signature().name()),
            BuildSpec::Prebuilt(model) => write!(f, "prebuilt {}", model.class_name()),
        }
    }
}

/// Settle on one build form.
///
/// `own` is the estimator's own build capability, if it has one. It is used
/// when no specification is given and conflicts with a function or builder
/// specification.
pub fn resolve(spec: Option<BuildSpec>, own: Option<Box<dyn ModelBuilder>>) -> Result<BuildSpec> {
    match (spec, own) {
        (None, Some(own)) => Ok(BuildSpec::Builder(own)),
        (None, None) => Err(Error::config(
            "If not using a build specification, the estimator must provide its own build capability",
        )),
        (Some(BuildSpec::Prebuilt(model)), _) => Ok(BuildSpec::Prebuilt(model)),
        (Some(spec @ BuildSpec::Function(_)), None) | (Some(spec @ BuildSpec::Builder(_)), None) => {
            Ok(spec)
        }
        (Some(spec), Some(_)) => Err(Error::config(format!(
            "An estimator with its own build capability cannot also use the {}",
            spec
        ))),
    }
}

/// Clone a prebuilt model and compile the clone with the original's
/// training configuration.
pub(crate) fn clone_prebuilt(model: &dyn Model) -> Result<Box<dyn Model>> {
    let training_config = model.training_config().ok_or_else(|| {
        Error::config(format!(
            "To use {} as a prebuilt model, you must compile it first",
            model.class_name()
        ))
    })?;
    let mut clone = model.clone_untrained()?;
    clone.compile(&training_config)?;
    log::debug!("Cloned prebuilt model {}", model.class_name());
    Ok(clone)
}
