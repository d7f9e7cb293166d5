//! Named parameter values and nested parameter groups.
//!
//! Every value the estimator forwards to a build function or to the model's
//! `fit`/`predict` travels as a [`ParamValue`] inside a [`ParamMap`]. Nested
//! groups ([`Component`]) are addressed with the `component__name` syntax by
//! `get_params`/`set_params`.
use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array2, ArrayD};
use serde::{Deserialize, Serialize};

use crate::build::BuildSpec;
use crate::error::{Error, Result};

/// Separator between a component name and one of its parameters.
pub const NESTED_DELIMITER: &str = "__";

pub type ParamMap = BTreeMap<String, ParamValue>;

/// A parameter value. Serialized without a tag, so JSON configurations can
/// write plain numbers, strings and lists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
    /// Feature or weight arrays (`X`, `sample_weight`).
    Array(ArrayD<f64>),
    /// Negotiated label blocks (`y`).
    Blocks(Vec<Array2<f64>>),
    Component(Component),
    /// The estimator's build specification, exposed as `build_fn`. Holds
    /// code, so it is never serialized.
    #[serde(skip)]
    Build(BuildSpec),
}

impl ParamValue {
    pub fn is_none(&self) -> bool {
        matches!(self, ParamValue::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Integers are widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayD<f64>> {
        match self {
            ParamValue::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_blocks(&self) -> Option<&[Array2<f64>]> {
        match self {
            ParamValue::Blocks(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<&Component> {
        match self {
            ParamValue::Component(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_build(&self) -> Option<&BuildSpec> {
        match self {
            ParamValue::Build(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::None => write!(f, "None"),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(v) => write!(f, "{:?}", v),
            ParamValue::List(values) => {
                write!(f, "[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
            ParamValue::Array(a) => write!(f, "array{:?}", a.shape()),
            ParamValue::Blocks(b) => write!(f, "blocks[{}]", b.len()),
            ParamValue::Component(c) => write!(f, "{}", c),
            ParamValue::Build(b) => write!(f, "{}", b),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<Vec<ParamValue>> for ParamValue {
    fn from(value: Vec<ParamValue>) -> Self {
        ParamValue::List(value)
    }
}

impl From<ArrayD<f64>> for ParamValue {
    fn from(value: ArrayD<f64>) -> Self {
        ParamValue::Array(value)
    }
}

impl From<Component> for ParamValue {
    fn from(value: Component) -> Self {
        ParamValue::Component(value)
    }
}

impl From<BuildSpec> for ParamValue {
    fn from(value: BuildSpec) -> Self {
        ParamValue::Build(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ParamValue::None)
    }
}

/// Collect `(name, value)` pairs into a [`ParamMap`].
pub fn param_map<I, K, V>(pairs: I) -> ParamMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<ParamValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Objects exposing the `get_params`/`set_params` protocol.
pub trait HasParams {
    /// Parameter names mapped to their current values. With `deep`, nested
    /// components contribute `component__name` entries as well.
    fn get_params(&self, deep: bool) -> ParamMap;

    /// Update parameters. Either every update is applied or none is.
    fn set_params(&mut self, params: ParamMap) -> Result<()>;
}

/// A named group of parameters nested inside an estimator, e.g. an optimizer
/// configuration addressed as `optimizer__learning_rate`.
///
/// The set of names is fixed when the component is created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Component {
    name: String,
    params: ParamMap,
}

impl Component {
    pub fn new(name: impl Into<String>, params: ParamMap) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (idx, (key, value)) in self.params.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        write!(f, ")")
    }
}

impl HasParams for Component {
    fn get_params(&self, deep: bool) -> ParamMap {
        collect_params(&self.params, deep)
    }

    fn set_params(&mut self, params: ParamMap) -> Result<()> {
        let owner = self.to_string();
        apply_params(&owner, &mut self.params, params)
    }
}

/// Flatten a parameter store, expanding nested components when `deep`.
pub(crate) fn collect_params(store: &ParamMap, deep: bool) -> ParamMap {
    let mut out = ParamMap::new();
    for (key, value) in store {
        if deep {
            if let ParamValue::Component(component) = value {
                for (sub_key, sub_value) in component.get_params(true) {
                    out.insert(format!("{}{}{}", key, NESTED_DELIMITER, sub_key), sub_value);
                }
            }
        }
        out.insert(key.clone(), value.clone());
    }
    out
}

/// Apply `updates` to `store`. Top-level names must already exist in the
/// store; `component__name` keys are delegated to the component. The store is
/// only modified when every update succeeds.
pub(crate) fn apply_params(owner: &str, store: &mut ParamMap, updates: ParamMap) -> Result<()> {
    if updates.is_empty() {
        return Ok(());
    }

    let mut staged = store.clone();
    let mut nested: BTreeMap<String, ParamMap> = BTreeMap::new();

    for (key, value) in updates {
        let (top, sub) = match key.split_once(NESTED_DELIMITER) {
            Some((top, sub)) => (top.to_string(), Some(sub.to_string())),
            None => (key.clone(), None),
        };
        if !staged.contains_key(&top) {
            return Err(Error::config(format!(
                "Invalid parameter {} for estimator {}. Check the list of available parameters \
                 with `get_params(true)`.",
                top, owner
            )));
        }
        match sub {
            Some(sub) => {
                nested.entry(top).or_default().insert(sub, value);
            }
            None => {
                staged.insert(top, value);
            }
        }
    }

    for (key, sub_params) in nested {
        match staged.get_mut(&key) {
            Some(ParamValue::Component(component)) => component.set_params(sub_params)?,
            _ => {
                return Err(Error::config(format!(
                    "Parameter {} of estimator {} has no nested parameters",
                    key, owner
                )))
            }
        }
    }

    *store = staged;
    Ok(())
}
