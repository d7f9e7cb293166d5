//! Parameter routing.
//!
//! Each callable the estimator talks to (build function, model `fit`,
//! `predict`, `evaluate`) is described by a [`Signature`] listing the
//! parameter names it declares explicitly. Routing a call means filtering a
//! pool of candidate values down to those names and merging the result with
//! call-time arguments.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::params::ParamMap;

/// Declared parameter names of a callable.
///
/// There is no catch-all: a callable accepting arbitrary keyword arguments
/// only receives the names listed here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    name: String,
    params: HashSet<String>,
}

impl Signature {
    pub fn new<I, S>(name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// A callable that declares no parameters.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::<String>::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accepts(&self, param: &str) -> bool {
        self.params.contains(param)
    }

    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(String::as_str)
    }

    /// Conventional keyword options of a neural-network model's `fit`.
    pub fn default_fit() -> Self {
        Self::new(
            "Model.fit",
            [
                "batch_size",
                "epochs",
                "verbose",
                "callbacks",
                "validation_split",
                "validation_data",
                "shuffle",
                "class_weight",
                "sample_weight",
                "initial_epoch",
                "steps_per_epoch",
                "validation_steps",
                "validation_batch_size",
                "validation_freq",
                "max_queue_size",
                "workers",
                "use_multiprocessing",
            ],
        )
    }

    /// Conventional keyword options of a neural-network model's `predict`.
    pub fn default_predict() -> Self {
        Self::new(
            "Model.predict",
            [
                "batch_size",
                "verbose",
                "steps",
                "callbacks",
                "max_queue_size",
                "workers",
                "use_multiprocessing",
            ],
        )
    }

    /// Conventional keyword options of a neural-network model's `evaluate`.
    pub fn default_evaluate() -> Self {
        Self::new(
            "Model.evaluate",
            [
                "batch_size",
                "verbose",
                "sample_weight",
                "steps",
                "callbacks",
                "max_queue_size",
                "workers",
                "use_multiprocessing",
                "return_dict",
            ],
        )
    }
}

/// Subset of `pool` whose names `signature` declares.
pub fn filter(signature: &Signature, pool: &ParamMap) -> ParamMap {
    pool.iter()
        .filter(|(name, _)| signature.accepts(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Union of both maps; `overrides` wins on collision.
pub fn merge(base: ParamMap, overrides: ParamMap) -> ParamMap {
    let mut merged = base;
    merged.extend(overrides);
    merged
}

/// Append-only registry of the signatures that define which parameter names
/// an estimator accepts.
#[derive(Clone, Debug)]
pub struct LegalParams {
    signatures: Vec<Signature>,
    names: HashSet<String>,
}

impl LegalParams {
    pub fn new() -> Self {
        Self {
            signatures: Vec::new(),
            names: HashSet::new(),
        }
    }

    pub fn register(&mut self, signature: Signature) {
        log::trace!("Registering legal parameters of {}", signature.name());
        self.names.extend(signature.params().map(str::to_string));
        self.signatures.push(signature);
    }

    pub fn is_legal(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl Default for LegalParams {
    /// Seeded with the conventional model `fit`, `predict` and `evaluate`
    /// options.
    fn default() -> Self {
        let mut legal = Self::new();
        legal.register(Signature::default_evaluate());
        legal.register(Signature::default_fit());
        legal.register(Signature::default_predict());
        legal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{param_map, ParamValue};

    #[test]
    fn test_filter_keeps_declared_names_only() {
        let sig = Signature::new("build", ["hidden", "X"]);
        let pool = param_map([
            ("hidden", ParamValue::from(32)),
            ("epochs", 5.into()),
            ("X", ParamValue::None),
        ]);
        let routed = filter(&sig, &pool);
        assert_eq!(routed.len(), 2);
        assert!(routed.keys().all(|k| sig.accepts(k)));
        assert!(!routed.contains_key("epochs"));
    }

    #[test]
    fn test_filter_has_no_catch_all() {
        let sig = Signature::new("build", ["kwargs"]);
        let pool = param_map([("hidden", 1), ("depth", 2)]);
        assert!(filter(&sig, &pool).is_empty());
    }

    #[test]
    fn test_merge_override_wins() {
        let base = param_map([("epochs", 1), ("batch_size", 8)]);
        let overrides = param_map([("epochs", 3)]);
        let merged = merge(base, overrides);
        assert_eq!(merged["epochs"], ParamValue::Int(3));
        assert_eq!(merged["batch_size"], ParamValue::Int(8));
    }

    #[test]
    fn test_registry_only_grows() {
        let mut legal = LegalParams::default();
        let before = legal.len();
        assert!(legal.is_legal("epochs"));
        assert!(!legal.is_legal("hidden"));

        legal.register(Signature::new("build", ["hidden"]));
        legal.register(Signature::new("build", ["hidden"]));
        assert_eq!(legal.len(), before + 2);
        assert!(legal.is_legal("hidden"));
        assert!(legal.is_legal("epochs"));
    }
}
