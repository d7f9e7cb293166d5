//! Stub model for unit tests. It memorizes its training rows and predicts
//! the targets of the nearest one.
use anyhow::{bail, Result};
use ndarray::{Array2, ArrayD, Axis};

use crate::build::BuildFn;
use crate::model::{History, Loss, Model, ModelBuilder, ModelOutput, ModelTargets, TrainingConfig};
use crate::params::{ParamMap, ParamValue};
use crate::routing::Signature;

#[derive(Clone, Default)]
pub(crate) struct StubModel {
    n_outputs: usize,
    regression: bool,
    n_classes: Vec<usize>,
    config: Option<TrainingConfig>,
    rows: Vec<Vec<f64>>,
    targets: Vec<Vec<Vec<f64>>>,
}

impl StubModel {
    pub(crate) fn from_args(args: &ParamMap) -> Self {
        let n_outputs = args
            .get("n_outputs_model_")
            .and_then(ParamValue::as_i64)
            .unwrap_or(1) as usize;
        let n_classes = match args.get("n_classes_") {
            Some(ParamValue::Int(k)) => vec![*k as usize],
            Some(ParamValue::List(ks)) => ks.iter().filter_map(ParamValue::as_i64).map(|k| k as usize).collect(),
            _ => Vec::new(),
        };
        let regression = args
            .get("target_type_")
            .and_then(ParamValue::as_str)
            .map(|t| t.starts_with("continuous"))
            .unwrap_or(false);
        Self {
            n_outputs,
            regression,
            n_classes,
            config: Some(TrainingConfig::new(Loss::Single("mse".into()), "sgd")),
            ..Self::default()
        }
    }

    pub(crate) fn uncompiled() -> Self {
        Self {
            n_outputs: 1,
            ..Self::default()
        }
    }

    fn output_row(&self, head: usize, target: &[f64]) -> Vec<f64> {
        let k = self.n_classes.get(head).copied().unwrap_or(0);
        if self.regression || target.len() > 1 || k <= 2 {
            return target.to_vec();
        }
        let mut row = vec![0.0; k];
        row[(target[0] as usize).min(k - 1)] = 1.0;
        row
    }
}

fn as_rows(a: &ArrayD<f64>, n: usize) -> Vec<Vec<f64>> {
    let width = a.len() / n.max(1);
    let values: Vec<f64> = a.iter().copied().collect();
    values.chunks(width.max(1)).map(<[f64]>::to_vec).collect()
}

impl Model for StubModel {
    fn class_name(&self) -> &str {
        "StubModel"
    }

    fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    fn fit(&mut self, x: &ArrayD<f64>, y: &ModelTargets, _args: &ParamMap) -> Result<History> {
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
        let mut history = History::default();
        history.record("loss", 0.0);
        Ok(history)
    }

    fn predict(&self, x: &ArrayD<f64>, _args: &ParamMap) -> Result<ModelOutput> {
        if self.rows.is_empty() {
            bail!("StubModel has not been trained");
        }
        let mut blocks: Vec<Vec<Vec<f64>>> = vec![Vec::new(); self.n_outputs];
        for row in x.axis_iter(Axis(0)) {
            let nearest = self
                .rows
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    let d: f64 = r.iter().zip(row.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
                    (i, d)
                })
                .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
                .0;
            for (head, target) in self.targets[nearest].iter().enumerate() {
                blocks[head].push(self.output_row(head, target));
            }
        }
        let blocks = blocks
            .into_iter()
            .map(|rows| {
                let width = rows.first().map(Vec::len).unwrap_or(0);
                let n = rows.len();
                Array2::from_shape_vec((n, width), rows.concat())
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(if blocks.len() == 1 {
            ModelOutput::Single(blocks.into_iter().next().unwrap_or_default())
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
        Ok(Box::new(StubModel {
            config: None,
            rows: Vec::new(),
            targets: Vec::new(),
            ..self.clone()
        }))
    }

    fn architecture(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "n_outputs": self.n_outputs }))
    }

    fn weights(&self) -> Vec<ArrayD<f64>> {
        Vec::new()
    }

    fn set_weights(&mut self, _weights: Vec<ArrayD<f64>>) -> Result<()> {
        Ok(())
    }
}

fn stub_signature() -> Signature {
    Signature::new(
        "build_stub",
        ["hidden", "n_classes_", "n_outputs_model_", "target_type_"],
    )
}

fn build_stub(args: &ParamMap) -> Result<Box<dyn Model>> {
    Ok(Box::new(StubModel::from_args(args)))
}

pub(crate) fn stub_build_fn() -> BuildFn {
    BuildFn::new(stub_signature(), build_stub)
}

/// Builder that counts its builds.
#[derive(Clone, Default)]
pub(crate) struct StubBuilder {
    pub(crate) builds: usize,
}

impl ModelBuilder for StubBuilder {
    fn signature(&self) -> Signature {
        stub_signature()
    }

    fn build(&mut self, args: &ParamMap) -> Result<Box<dyn Model>> {
        self.builds += 1;
        build_stub(args)
    }

    fn box_clone(&self) -> Box<dyn ModelBuilder> {
        Box::new(self.clone())
    }

    fn capture_state(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "builds": self.builds }))
    }

    fn restore_state(&mut self, state: &serde_json::Value) -> Result<()> {
        match state.get("builds").and_then(serde_json::Value::as_u64) {
            Some(builds) => {
                self.builds = builds as usize;
                Ok(())
            }
            None => bail!("StubBuilder state has no build count: {}", state),
        }
    }
}
