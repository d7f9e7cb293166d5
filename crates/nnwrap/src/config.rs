use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::build::BuildSpec;
use crate::error;
use crate::estimator::{Classifier, Estimator, Regressor};
use crate::negotiation::Negotiator;
use crate::params::ParamMap;
use crate::routing::Signature;
use crate::search::{GridSearch, KFold, ParamGrid};

/// Kind of estimator a configuration describes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    #[default]
    Classifier,
    Regressor,
}

impl FromStr for EstimatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "classifier" => Ok(EstimatorKind::Classifier),
            "regressor" => Ok(EstimatorKind::Regressor),
            _ => Err(format!("Unknown estimator kind: {}", s)),
        }
    }
}

/// Grid search settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub grid: ParamGrid,
    pub cv: KFold,
}

impl SearchConfig {
    pub fn grid_search(&self) -> GridSearch {
        GridSearch::new(self.grid.clone(), self.cv)
    }
}

/// Estimator settings loadable from JSON. The build specification itself is
/// code and is supplied when the estimator is created.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub kind: EstimatorKind,
    pub name: Option<String>,
    pub params: ParamMap,
    /// Extra legal parameter names beyond the build specification and the
    /// conventional model options.
    pub legal_params: Vec<Signature>,
    pub search: Option<SearchConfig>,
}

impl EstimatorConfig {
    pub fn classifier(&self, spec: BuildSpec) -> error::Result<Classifier> {
        self.estimator(spec)
    }

    pub fn regressor(&self, spec: BuildSpec) -> error::Result<Regressor> {
        self.estimator(spec)
    }

    fn estimator<N: Negotiator>(&self, spec: BuildSpec) -> error::Result<Estimator<N>> {
        if N::ESTIMATOR_TYPE != kind_name(self.kind) {
            return Err(error::Error::Config(format!(
                "Configuration describes a {}, not a {}",
                kind_name(self.kind),
                N::ESTIMATOR_TYPE
            )));
        }
        let mut builder = Estimator::<N>::builder()
            .spec(spec)
            .params(self.params.clone());
        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }
        for signature in &self.legal_params {
            builder = builder.legal_signature(signature.clone());
        }
        builder.build()
    }
}

fn kind_name(kind: EstimatorKind) -> &'static str {
    match kind {
        EstimatorKind::Classifier => "classifier",
        EstimatorKind::Regressor => "regressor",
    }
}

/// Load an estimator configuration from a JSON file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EstimatorConfig> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
    let config: EstimatorConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
    log::debug!("Loaded {:?} configuration from {}", config.kind, path.as_ref().display());
    Ok(config)
}
