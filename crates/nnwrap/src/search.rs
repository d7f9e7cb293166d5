//! Exhaustive hyperparameter search with k-fold cross-validation.
use std::collections::BTreeMap;

use ndarray::{ArrayD, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::estimator::Estimator;
use crate::negotiation::Negotiator;
use crate::params::{HasParams, ParamMap, ParamValue};
use crate::targets::LabelValue;

/// Candidate values per parameter name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    grid: BTreeMap<String, Vec<ParamValue>>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<V: Into<ParamValue>>(mut self, name: impl Into<String>, values: Vec<V>) -> Self {
        self.grid
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Every combination of candidate values, varying the last name (in
    /// sorted order) fastest. An empty grid yields one empty combination.
    pub fn candidates(&self) -> Vec<ParamMap> {
        let mut out = vec![ParamMap::new()];
        for (name, values) in &self.grid {
            let mut next = Vec::with_capacity(out.len() * values.len());
            for partial in &out {
                for value in values {
                    let mut candidate = partial.clone();
                    candidate.insert(name.clone(), value.clone());
                    next.push(candidate);
                }
            }
            out = next;
        }
        out
    }

    pub fn len(&self) -> usize {
        self.grid.values().map(Vec::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Train/test indices of one fold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// K-fold splitter. The first `n_samples % n_splits` folds hold one extra
/// sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl Default for KFold {
    fn default() -> Self {
        Self {
            n_splits: 5,
            shuffle: false,
            seed: 42,
        }
    }
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            ..Self::default()
        }
    }

    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    pub fn split(&self, n_samples: usize) -> Result<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(Error::config(format!(
                "n_splits must be at least 2, got {}",
                self.n_splits
            )));
        }
        if n_samples < self.n_splits {
            return Err(Error::config(format!(
                "Cannot have n_splits={} greater than the number of samples: n_samples={}",
                self.n_splits, n_samples
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed);
            indices.shuffle(&mut rng);
        }

        let base = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for fold in 0..self.n_splits {
            let size = if fold < remainder { base + 1 } else { base };
            let test = indices[start..start + size].to_vec();
            let train = indices[..start]
                .iter()
                .chain(indices[start + size..].iter())
                .copied()
                .collect();
            folds.push(Fold { train, test });
            start += size;
        }
        Ok(folds)
    }
}

/// Cross-validated score of one candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params: ParamMap,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

/// Grid search over a [`ParamGrid`].
#[derive(Clone, Debug)]
pub struct GridSearch {
    grid: ParamGrid,
    cv: KFold,
    results: Vec<CandidateScore>,
    best: Option<usize>,
}

impl GridSearch {
    pub fn new(grid: ParamGrid, cv: KFold) -> Self {
        Self {
            grid,
            cv,
            results: Vec::new(),
            best: None,
        }
    }

    /// Score every candidate and return `estimator` refit on all samples
    /// with the best one.
    pub fn fit<N: Negotiator>(
        &mut self,
        estimator: &Estimator<N>,
        x: &ArrayD<f64>,
        y: &ArrayD<LabelValue>,
    ) -> Result<Estimator<N>> {
        let candidates = self.grid.candidates();
        if candidates.is_empty() {
            return Err(Error::config("Parameter grid has no candidates"));
        }
        let folds = self.cv.split(x.shape()[0])?;

        let mut results = Vec::with_capacity(candidates.len());
        for params in candidates {
            let mut fold_scores = Vec::with_capacity(folds.len());
            for fold in &folds {
                let mut candidate = estimator.clone_unfitted();
                candidate.set_params(params.clone())?;
                candidate.fit(&x.select(Axis(0), &fold.train), &y.select(Axis(0), &fold.train))?;
                fold_scores.push(
                    candidate.score(&x.select(Axis(0), &fold.test), &y.select(Axis(0), &fold.test))?,
                );
            }
            let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
            log::debug!("Candidate {:?} scored {:.4}", params, mean_score);
            results.push(CandidateScore {
                params,
                fold_scores,
                mean_score,
            });
        }

        let mut best = 0;
        for (idx, result) in results.iter().enumerate() {
            if result.mean_score > results[best].mean_score || results[best].mean_score.is_nan() {
                best = idx;
            }
        }
        self.results = results;
        self.best = Some(best);

        let mut refit = estimator.clone_unfitted();
        refit.set_params(self.results[best].params.clone())?;
        refit.fit(x, y)?;
        Ok(refit)
    }

    pub fn results(&self) -> &[CandidateScore] {
        &self.results
    }

    pub fn best_params(&self) -> Option<&ParamMap> {
        self.best.map(|idx| &self.results[idx].params)
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best.map(|idx| self.results[idx].mean_score)
    }
}
