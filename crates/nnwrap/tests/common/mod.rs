#![allow(dead_code)]
//! Shared test doubles: a memorizing model that predicts the training
//! targets of the nearest training row, builders for it and a loader.
use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use ndarray::{Array2, ArrayD, Axis};
use serde::{Deserialize, Serialize};

use nnwrap::model::{Loss, TrainingConfig};
use nnwrap::{
    BuildFn, History, Model, ModelBuilder, ModelOutput, ModelTargets, ParamMap, ParamValue,
    Signature,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Arguments seen by each collaborator call, in call order.
#[derive(Debug, Default)]
pub struct CallLog {
    pub build: Vec<ParamMap>,
    pub fit: Vec<ParamMap>,
    pub targets: Vec<ModelTargets>,
    pub predict: Vec<ParamMap>,
}

pub type SharedLog = Rc<RefCell<CallLog>>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Arch {
    pub n_outputs: usize,
    pub regression: bool,
    pub n_classes: Vec<usize>,
    pub fail_fit: bool,
    /// Predict the first training row's targets for every sample.
    pub underfit: bool,
    pub fit_params: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct MemoModel {
    arch: Arch,
    config: Option<TrainingConfig>,
    rows: Vec<Vec<f64>>,
    targets: Vec<Vec<Vec<f64>>>,
    log: SharedLog,
}

impl MemoModel {
    pub fn new(arch: Arch, log: SharedLog) -> Self {
        Self {
            arch,
            config: None,
            rows: Vec::new(),
            targets: Vec::new(),
            log,
        }
    }

    /// A compiled single-output classifier model usable as a prebuilt model.
    pub fn compiled(n_classes: usize, loss: &str) -> Self {
        let arch = Arch {
            n_outputs: 1,
            n_classes: vec![n_classes],
            ..Arch::default()
        };
        let mut model = Self::new(arch, SharedLog::default());
        model.config = Some(TrainingConfig::new(Loss::Single(loss.into()), "adam"));
        model
    }

    pub fn uncompiled() -> Self {
        Self::new(
            Arch {
                n_outputs: 1,
                ..Arch::default()
            },
            SharedLog::default(),
        )
    }

    fn output_row(&self, head: usize, target: &[f64]) -> Vec<f64> {
        let k = self.arch.n_classes.get(head).copied().unwrap_or(0);
        if self.arch.regression || target.len() > 1 || k <= 2 {
            return target.to_vec();
        }
        let mut row = vec![0.0; k];
        row[(target[0] as usize).min(k - 1)] = 1.0;
        row
    }
}

fn as_rows(a: &ArrayD<f64>, n: usize) -> Vec<Vec<f64>> {
    let width = (a.len() / n.max(1)).max(1);
    let values: Vec<f64> = a.iter().copied().collect();
    values.chunks(width).map(<[f64]>::to_vec).collect()
}

fn to_block(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let width = rows.first().map(Vec::len).unwrap_or(0);
    Ok(Array2::from_shape_vec((rows.len(), width), rows.concat())?)
}

impl Model for MemoModel {
    fn class_name(&self) -> &str {
        "MemoModel"
    }

    fn n_outputs(&self) -> usize {
        self.arch.n_outputs
    }

    fn fit_signature(&self) -> Signature {
        match &self.arch.fit_params {
            Some(params) => Signature::new("MemoModel.fit", params.clone()),
            None => Signature::default_fit(),
        }
    }

    fn fit(&mut self, x: &ArrayD<f64>, y: &ModelTargets, args: &ParamMap) -> Result<History> {
        {
            let mut log = self.log.borrow_mut();
            log.fit.push(args.clone());
            log.targets.push(y.clone());
        }
        if self.arch.fail_fit {
            bail!("MemoModel failed to converge");
        }
        let n = x.shape()[0];
        let heads: Vec<Vec<Vec<f64>>> = match y {
            ModelTargets::Single(a) => vec![as_rows(a, n)],
            ModelTargets::Multi(blocks) => blocks.iter().map(|b| as_rows(b, n)).collect(),
        };
        self.rows = x
            .axis_iter(Axis(0))
            .map(|row| row.iter().copied().collect())
            .collect();
        self.targets = (0..n)
            .map(|i| heads.iter().map(|h| h[i].clone()).collect())
            .collect();

        let epochs = args.get("epochs").and_then(ParamValue::as_i64).unwrap_or(1);
        let mut history = History::default();
        for epoch in 0..epochs {
            history.record("loss", 1.0 / (epoch + 1) as f64);
        }
        Ok(history)
    }

    fn predict(&self, x: &ArrayD<f64>, args: &ParamMap) -> Result<ModelOutput> {
        self.log.borrow_mut().predict.push(args.clone());
        if self.rows.is_empty() {
            bail!("MemoModel has not been trained");
        }
        let mut heads: Vec<Vec<Vec<f64>>> = vec![Vec::new(); self.arch.n_outputs];
        for row in x.axis_iter(Axis(0)) {
            let mut nearest = 0;
            let mut best = f64::INFINITY;
            for (idx, seen) in self.rows.iter().enumerate() {
                if self.arch.underfit {
                    break;
                }
                let d: f64 = seen
                    .iter()
                    .zip(row.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                if d < best {
                    best = d;
                    nearest = idx;
                }
            }
            for (head, target) in self.targets[nearest].iter().enumerate() {
                heads[head].push(self.output_row(head, target));
            }
        }
        let mut blocks = heads
            .iter()
            .map(|rows| to_block(rows))
            .collect::<Result<Vec<_>>>()?;
        Ok(if blocks.len() == 1 {
            ModelOutput::Single(blocks.remove(0))
        } else {
            ModelOutput::Multi(blocks)
        })
    }

    fn training_config(&self) -> Option<TrainingConfig> {
        self.config.clone()
    }

    fn compile(&mut self, config: &TrainingConfig) -> Result<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn clone_untrained(&self) -> Result<Box<dyn Model>> {
        Ok(Box::new(MemoModel::new(self.arch.clone(), self.log.clone())))
    }

    fn architecture(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.arch)?)
    }

    /// Training rows first, then the targets of each head.
    fn weights(&self) -> Vec<ArrayD<f64>> {
        let mut weights = Vec::new();
        if let Ok(rows) = to_block(&self.rows) {
            weights.push(rows.into_dyn());
        }
        for head in 0..self.arch.n_outputs {
            let rows: Vec<Vec<f64>> = self.targets.iter().map(|t| t[head].clone()).collect();
            if let Ok(block) = to_block(&rows) {
                weights.push(block.into_dyn());
            }
        }
        weights
    }

    fn set_weights(&mut self, weights: Vec<ArrayD<f64>>) -> Result<()> {
        let mut weights = weights.into_iter();
        let rows = match weights.next() {
            Some(rows) => rows,
            None => return Ok(()),
        };
        let n = rows.shape()[0];
        self.rows = as_rows(&rows, n);
        let heads: Vec<Vec<Vec<f64>>> = weights.map(|w| as_rows(&w, n)).collect();
        if heads.len() != self.arch.n_outputs {
            bail!("expected {} target tensors, got {}", self.arch.n_outputs, heads.len());
        }
        self.targets = (0..n)
            .map(|i| heads.iter().map(|h| h[i].clone()).collect())
            .collect();
        Ok(())
    }
}

pub const BUILD_PARAMS: [&str; 7] = [
    "hidden",
    "loss",
    "fail_fit",
    "n_heads",
    "n_classes_",
    "n_outputs_model_",
    "target_type_",
];

fn arch_from_args(args: &ParamMap) -> Arch {
    let n_outputs = args
        .get("n_heads")
        .or_else(|| args.get("n_outputs_model_"))
        .and_then(ParamValue::as_i64)
        .unwrap_or(1) as usize;
    let n_classes = match args.get("n_classes_") {
        Some(ParamValue::Int(k)) => vec![*k as usize],
        Some(ParamValue::List(ks)) => ks
            .iter()
            .filter_map(ParamValue::as_i64)
            .map(|k| k as usize)
            .collect(),
        _ => Vec::new(),
    };
    Arch {
        n_outputs,
        regression: args
            .get("target_type_")
            .and_then(ParamValue::as_str)
            .map(|t| t.starts_with("continuous"))
            .unwrap_or(false),
        n_classes,
        fail_fit: args.get("fail_fit").and_then(ParamValue::as_bool).unwrap_or(false),
        underfit: args.get("hidden").and_then(ParamValue::as_i64) == Some(0),
        fit_params: None,
    }
}

fn compiled_memo(arch: Arch, args: &ParamMap, log: SharedLog) -> MemoModel {
    let loss = args.get("loss").and_then(ParamValue::as_str).unwrap_or("mse");
    let mut model = MemoModel::new(arch, log);
    model.config = Some(TrainingConfig::new(Loss::Single(loss.into()), "adam"));
    model
}

fn build_memo(args: &ParamMap) -> Result<Box<dyn Model>> {
    Ok(Box::new(compiled_memo(arch_from_args(args), args, SharedLog::default())))
}

pub fn memo_build_fn() -> BuildFn {
    BuildFn::new(Signature::new("build_memo", BUILD_PARAMS), build_memo)
}

/// Stateful builder recording every call into a shared log. Only the build
/// count is part of its captured state.
#[derive(Clone, Default)]
pub struct MemoBuilder {
    pub log: SharedLog,
    pub builds: usize,
    pub extra_params: Vec<String>,
    pub fit_params: Option<Vec<String>>,
}

impl MemoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build signature also declares `params`.
    pub fn accepting(mut self, params: &[&str]) -> Self {
        self.extra_params.extend(params.iter().map(|p| p.to_string()));
        self
    }

    /// Built models' `fit` only declares `params`.
    pub fn with_fit_params(mut self, params: &[&str]) -> Self {
        self.fit_params = Some(params.iter().map(|p| p.to_string()).collect());
        self
    }
}

impl ModelBuilder for MemoBuilder {
    fn signature(&self) -> Signature {
        Signature::new(
            "MemoBuilder.build",
            BUILD_PARAMS
                .iter()
                .map(|p| p.to_string())
                .chain(self.extra_params.iter().cloned()),
        )
    }

    fn build(&mut self, args: &ParamMap) -> Result<Box<dyn Model>> {
        self.builds += 1;
        self.log.borrow_mut().build.push(args.clone());
        let mut arch = arch_from_args(args);
        arch.fit_params = self.fit_params.clone();
        Ok(Box::new(compiled_memo(arch, args, self.log.clone())))
    }

    fn box_clone(&self) -> Box<dyn ModelBuilder> {
        Box::new(self.clone())
    }

    fn capture_state(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "builds": self.builds }))
    }

    fn restore_state(&mut self, state: &serde_json::Value) -> Result<()> {
        self.builds = state
            .get("builds")
            .and_then(serde_json::Value::as_u64)
            .context("MemoBuilder state has no build count")? as usize;
        Ok(())
    }
}

pub fn memo_loader(class: &str, architecture: &serde_json::Value) -> Result<Box<dyn Model>> {
    if class != "MemoModel" {
        bail!("Unknown model class {}", class);
    }
    let arch: Arch = serde_json::from_value(architecture.clone())
        .context("Failed to parse MemoModel architecture")?;
    Ok(Box::new(MemoModel::new(arch, SharedLog::default())))
}
