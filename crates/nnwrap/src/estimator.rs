//! The estimator facade.
//!
//! [`Estimator`] wraps a build specification and drives the opaque model
//! through `fit`, `predict`, `predict_proba` and `score`. Parameter routing
//! decides which values each model call receives, label negotiation
//! converts between caller labels and model output blocks.
use std::fmt;
use std::marker::PhantomData;

use ndarray::{Array1, ArrayD};
use serde::{Deserialize, Serialize};

use crate::build::{resolve, BuildFn, BuildSpec};
use crate::error::{Error, Result};
use crate::model::{History, Model, ModelBuilder};
use crate::negotiation::{
    to_model_targets, Classification, Decoded, LabelMeta, Negotiated, Negotiator, Regression,
};
use crate::params::{apply_params, collect_params, HasParams, ParamMap, ParamValue};
use crate::routing::{filter, merge, LegalParams, Signature};
use crate::targets::LabelValue;
use crate::validation::{check_sample_weight, check_x, check_x_y};

/// Name under which `get_params`/`set_params` expose the build specification.
pub const BUILD_FN_PARAM: &str = "build_fn";

pub type Classifier = Estimator<Classification>;
pub type Regressor = Estimator<Regression>;

/// Capability tags of an estimator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatorTags {
    pub estimator_type: String,
    pub multilabel: bool,
    pub multioutput: bool,
    pub requires_y: bool,
}

/// State produced by a successful fit.
pub(crate) struct Fitted {
    pub(crate) model: Box<dyn Model>,
    pub(crate) history: History,
    pub(crate) meta: LabelMeta,
}

/// Estimator interface over a neural-network model.
pub struct Estimator<N: Negotiator> {
    pub(crate) name: String,
    pub(crate) build: BuildSpec,
    pub(crate) params: ParamMap,
    pub(crate) legal: LegalParams,
    pub(crate) fitted: Option<Fitted>,
    _task: PhantomData<N>,
}

/// Step-by-step construction of an [`Estimator`].
pub struct EstimatorBuilder<N: Negotiator> {
    name: Option<String>,
    spec: Option<BuildSpec>,
    own_build: Option<Box<dyn ModelBuilder>>,
    params: ParamMap,
    signatures: Vec<Signature>,
    _task: PhantomData<N>,
}

impl<N: Negotiator> Default for EstimatorBuilder<N> {
    fn default() -> Self {
        Self {
            name: None,
            spec: None,
            own_build: None,
            params: ParamMap::new(),
            signatures: Vec::new(),
            _task: PhantomData,
        }
    }
}

impl<N: Negotiator> EstimatorBuilder<N> {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn spec(mut self, spec: BuildSpec) -> Self {
        self.spec = Some(spec);
        self
    }

    pub fn build_fn(self, func: BuildFn) -> Self {
        self.spec(BuildSpec::Function(func))
    }

    pub fn model_builder(self, builder: Box<dyn ModelBuilder>) -> Self {
        self.spec(BuildSpec::Builder(builder))
    }

    pub fn prebuilt(self, model: Box<dyn Model>) -> Self {
        self.spec(BuildSpec::prebuilt(model))
    }

    /// The estimator's own build capability, used when no specification is
    /// given.
    pub fn own_build(mut self, builder: Box<dyn ModelBuilder>) -> Self {
        self.own_build = Some(builder);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn params(mut self, params: ParamMap) -> Self {
        self.params.extend(params);
        self
    }

    /// Declare extra legal parameter names, e.g. options consumed by a
    /// model's `fit` that are not in the conventional set.
    pub fn legal_signature(mut self, signature: Signature) -> Self {
        self.signatures.push(signature);
        self
    }

    /// Resolve the build specification and check every parameter name
    /// against the legal registry.
    pub fn build(self) -> Result<Estimator<N>> {
        let name = self.name.unwrap_or_else(|| N::DEFAULT_NAME.to_string());
        let build = resolve(self.spec, self.own_build)?;

        let mut legal = LegalParams::default();
        legal.register(build.signature());
        for signature in self.signatures {
            legal.register(signature);
        }

        if let Some(unknown) = self.params.keys().find(|key| !legal.is_legal(key)) {
            return Err(Error::config(format!(
                "Invalid parameter {} for estimator {}. It is not declared by the build \
                 specification or by the model's fit, predict or evaluate options.",
                unknown, name
            )));
        }

        log::debug!("Created {} using the {}", name, build);
        Ok(Estimator {
            name,
            build,
            params: self.params,
            legal,
            fitted: None,
            _task: PhantomData,
        })
    }
}

impl<N: Negotiator> Estimator<N> {
    pub fn builder() -> EstimatorBuilder<N> {
        EstimatorBuilder::default()
    }

    /// Estimator with a build specification and construction parameters.
    pub fn new(spec: BuildSpec, params: ParamMap) -> Result<Self> {
        Self::builder().spec(spec).params(params).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build_spec(&self) -> &BuildSpec {
        &self.build
    }

    pub fn legal_params(&self) -> &LegalParams {
        &self.legal
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn model(&self) -> Option<&dyn Model> {
        self.fitted.as_ref().map(|f| f.model.as_ref())
    }

    pub fn history(&self) -> Option<&History> {
        self.fitted.as_ref().map(|f| &f.history)
    }

    pub fn label_meta(&self) -> Option<&LabelMeta> {
        self.fitted.as_ref().map(|f| &f.meta)
    }

    /// Class vocabulary per output, classifiers only.
    pub fn classes(&self) -> Option<&[Vec<LabelValue>]> {
        self.label_meta()
            .and_then(|meta| meta.classes.as_deref())
    }

    pub fn n_outputs(&self) -> Option<usize> {
        self.label_meta().map(|meta| meta.n_outputs)
    }

    pub fn tags(&self) -> EstimatorTags {
        EstimatorTags {
            estimator_type: N::ESTIMATOR_TYPE.to_string(),
            multilabel: N::MULTILABEL,
            multioutput: true,
            requires_y: true,
        }
    }

    /// Same build specification and parameters, nothing fitted.
    pub fn clone_unfitted(&self) -> Self {
        Self {
            name: self.name.clone(),
            build: self.build.clone(),
            params: self.params.clone(),
            legal: self.legal.clone(),
            fitted: None,
            _task: PhantomData,
        }
    }

    pub fn fit(&mut self, x: &ArrayD<f64>, y: &ArrayD<LabelValue>) -> Result<&mut Self> {
        self.fit_with(x, y, None, &ParamMap::new())
    }

    /// Fit with optional sample weights and call-time arguments.
    ///
    /// A failed fit leaves the previous fitted state in place.
    pub fn fit_with(
        &mut self,
        x: &ArrayD<f64>,
        y: &ArrayD<LabelValue>,
        sample_weight: Option<&Array1<f64>>,
        kwargs: &ParamMap,
    ) -> Result<&mut Self> {
        check_x_y(x, y)?;
        if let Some(sw) = sample_weight {
            check_sample_weight(sw, x.shape()[0])?;
        }

        let Negotiated { blocks, meta } = N::pre_process(y)?;

        let build_signature = self.build.signature();
        let mut pool = merge(self.params.clone(), meta.context());
        if build_signature.accepts("X") {
            pool.insert("X".into(), ParamValue::Array(x.clone()));
        }
        if build_signature.accepts("y") {
            pool.insert("y".into(), ParamValue::Blocks(blocks.clone()));
        }
        if let Some(sw) = sample_weight {
            if build_signature.accepts("sample_weight") {
                pool.insert("sample_weight".into(), ParamValue::Array(sw.clone().into_dyn()));
            }
        }
        let pool = merge(pool, kwargs.clone());
        let build_args = filter(&build_signature, &pool);
        log::trace!(
            "Building model with {:?}",
            build_args.keys().collect::<Vec<_>>()
        );
        let mut model = self.build.build(&build_args)?;

        let fit_signature = model.fit_signature();
        self.legal.register(fit_signature.clone());
        self.legal.register(model.predict_signature());
        if let Some(evaluate) = model.evaluate_signature() {
            self.legal.register(evaluate);
        }

        let blocks = N::encode_for_loss(&meta, blocks, model.training_config().as_ref());
        let targets = to_model_targets(blocks, model.n_outputs())?;

        let mut call_args = kwargs.clone();
        if let Some(sw) = sample_weight {
            if !fit_signature.accepts("sample_weight") {
                return Err(Error::config(format!(
                    "Parameter `sample_weight` is unsupported by {}.fit",
                    model.class_name()
                )));
            }
            call_args.insert("sample_weight".into(), ParamValue::Array(sw.clone().into_dyn()));
        }
        let fit_args = merge(
            filter(&fit_signature, &self.params),
            filter(&fit_signature, &call_args),
        );

        let history = model.fit(x, &targets, &fit_args)?;
        log::debug!(
            "Fitted {} on {} samples ({} target, {} epochs)",
            self.name,
            x.shape()[0],
            meta.target_type,
            history.epochs()
        );
        self.fitted = Some(Fitted {
            model,
            history,
            meta,
        });
        Ok(self)
    }

    pub fn predict(&self, x: &ArrayD<f64>) -> Result<ArrayD<N::Label>> {
        self.predict_with(x, &ParamMap::new())
    }

    pub fn predict_with(&self, x: &ArrayD<f64>, kwargs: &ParamMap) -> Result<ArrayD<N::Label>> {
        Ok(self.decode(x, kwargs, "predict")?.labels)
    }

    pub fn score(&self, x: &ArrayD<f64>, y: &ArrayD<LabelValue>) -> Result<f64> {
        self.score_with(x, y, None, &ParamMap::new())
    }

    /// Accuracy for classifiers, R^2 for regressors.
    pub fn score_with(
        &self,
        x: &ArrayD<f64>,
        y: &ArrayD<LabelValue>,
        sample_weight: Option<&Array1<f64>>,
        kwargs: &ParamMap,
    ) -> Result<f64> {
        let fitted = self.fitted_state("score")?;
        check_x_y(x, y)?;
        if let Some(sw) = sample_weight {
            check_sample_weight(sw, x.shape()[0])?;
        }
        // labels must be valid for this kind of estimator
        N::pre_process(y)?;

        let y_pred = self.predict_with(x, kwargs)?;
        let score = N::score(y, &y_pred, sample_weight)?;
        N::check_score_compatibility(fitted.model.training_config().as_ref());
        Ok(score)
    }

    /// Run the model's `predict` once and post-process the raw outputs.
    fn decode(
        &self,
        x: &ArrayD<f64>,
        kwargs: &ParamMap,
        method: &'static str,
    ) -> Result<Decoded<N::Label>> {
        let fitted = self.fitted_state(method)?;
        check_x(x)?;
        let signature = fitted.model.predict_signature();
        let args = merge(filter(&signature, &self.params), filter(&signature, kwargs));
        let outputs = fitted.model.predict(x, &args)?;
        N::post_process(&fitted.meta, outputs.into_blocks())
    }

    fn fitted_state(&self, method: &'static str) -> Result<&Fitted> {
        self.fitted.as_ref().ok_or_else(|| Error::NotFitted {
            estimator: self.name.clone(),
            method,
        })
    }
}

impl Estimator<Classification> {
    /// Class probabilities, stacked across outputs.
    pub fn predict_proba(&self, x: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        self.predict_proba_with(x, &ParamMap::new())
    }

    pub fn predict_proba_with(&self, x: &ArrayD<f64>, kwargs: &ParamMap) -> Result<ArrayD<f64>> {
        self.decode(x, kwargs, "predict_proba")?
            .probabilities
            .ok_or_else(|| Error::shape("model output carries no class probabilities"))
    }
}

/// The build specification is listed under [`BUILD_FN_PARAM`] next to the
/// construction parameters. Setting it swaps the specification and makes
/// its declared names legal.
impl<N: Negotiator> HasParams for Estimator<N> {
    fn get_params(&self, deep: bool) -> ParamMap {
        let mut params = collect_params(&self.params, deep);
        params.insert(BUILD_FN_PARAM.to_string(), ParamValue::Build(self.build.clone()));
        params
    }

    fn set_params(&mut self, mut params: ParamMap) -> Result<()> {
        let build = match params.remove(BUILD_FN_PARAM) {
            Some(ParamValue::Build(build)) => Some(build),
            Some(other) => {
                return Err(Error::config(format!(
                    "Parameter {} of estimator {} must be a build specification, got {}",
                    BUILD_FN_PARAM, self.name, other
                )))
            }
            None => None,
        };
        apply_params(&self.name, &mut self.params, params)?;
        if let Some(build) = build {
            log::debug!("{} now uses the {}", self.name, build);
            self.legal.register(build.signature());
            self.build = build;
        }
        Ok(())
    }
}

impl<N: Negotiator> fmt::Display for Estimator<N> {
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

impl<N: Negotiator> fmt::Debug for Estimator<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Estimator")
            .field("name", &self.name)
            .field("build", &self.build.form())
            .field("params", &self.params)
            .field("fitted", &self.is_fitted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::param_map;
    use crate::targets::labels;
    use crate::testing::{stub_build_fn, StubBuilder};
    use ndarray::array;

    fn classifier() -> Classifier {
        Classifier::builder()
            .build_fn(stub_build_fn())
            .param("hidden", 8)
            .param("epochs", 2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_unknown_construction_param_rejected() {
        let err = Classifier::builder()
            .build_fn(stub_build_fn())
            .param("not_a_param", 1)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("not_a_param"));
    }

    #[test]
    fn test_registered_signature_makes_param_legal() {
        let est = Classifier::builder()
            .build_fn(stub_build_fn())
            .legal_signature(Signature::new("CustomModel.fit", ["warmup"]))
            .param("warmup", 3)
            .build();
        assert!(est.is_ok());
    }

    #[test]
    fn test_missing_build_spec() {
        let err = Regressor::builder().build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_own_build_conflicts_with_function() {
        let err = Classifier::builder()
            .build_fn(stub_build_fn())
            .own_build(Box::new(StubBuilder::default()))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_predict_before_fit() {
        let est = classifier();
        let err = est.predict(&array![[1.0]].into_dyn()).unwrap_err();
        assert!(matches!(
            err,
            Error::NotFitted {
                method: "predict",
                ..
            }
        ));
        assert!(err.to_string().contains("fit"));
    }

    #[test]
    fn test_fit_predict_binary() {
        let mut est = classifier();
        let x = array![[0.0], [1.0], [0.0], [1.0]].into_dyn();
        let y = labels(vec!["no", "yes", "no", "yes"]);
        est.fit(&x, &y).unwrap();
        assert_eq!(est.predict(&x).unwrap(), y);
        assert_eq!(est.predict_proba(&x).unwrap().shape(), &[4, 2]);
        assert_eq!(est.score(&x, &y).unwrap(), 1.0);
        assert_eq!(
            est.classes().unwrap()[0],
            vec![LabelValue::from("no"), LabelValue::from("yes")]
        );
    }

    #[test]
    fn test_get_set_params() {
        let mut est = classifier();
        let params = est.get_params(true);
        assert_eq!(
            params.keys().collect::<Vec<_>>(),
            vec!["build_fn", "epochs", "hidden"]
        );
        assert_eq!(
            params[BUILD_FN_PARAM],
            ParamValue::Build(BuildSpec::Function(stub_build_fn()))
        );

        est.set_params(param_map([("epochs", 5)])).unwrap();
        assert_eq!(est.get_params(false)["epochs"], ParamValue::Int(5));

        let before = est.get_params(true);
        assert!(est.set_params(param_map([("batch", 5)])).is_err());
        assert_eq!(est.get_params(true), before);
    }

    #[test]
    fn test_set_build_fn_swaps_spec() {
        let mut est = classifier();
        est.set_params(param_map([(
            BUILD_FN_PARAM,
            ParamValue::Build(BuildSpec::Builder(Box::new(StubBuilder::default()))),
        )]))
        .unwrap();
        assert_eq!(est.build_spec().form(), crate::build::BuildForm::Builder);

        let err = est
            .set_params(param_map([(BUILD_FN_PARAM, ParamValue::from("build_stub"))]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(est.build_spec().form(), crate::build::BuildForm::Builder);
    }

    #[test]
    fn test_tags() {
        assert!(classifier().tags().multilabel);
        let reg = Regressor::builder().build_fn(stub_build_fn()).build().unwrap();
        assert!(!reg.tags().multilabel);
        assert_eq!(reg.tags().estimator_type, "regressor");
    }

    #[test]
    fn test_display() {
        assert_eq!(classifier().to_string(), "NeuralNetClassifier(epochs=2, hidden=8)");
    }
}
