//! Greedy parameter selection.
//!
//! [`GreedySampler::select_next`] evaluates an error-bound estimate on every
//! parameter of the training set and returns the arg-max. Evaluation may run
//! on the rayon pool, but results are collected in training-set order and
//! scanned sequentially, so the selection only depends on the RNG seed.
//!
//! Ties (exact equality with the running maximum) replace the incumbent with
//! probability 1/2, drawn from the sampler's own RNG.

use crate::config::GreedyConfig;
use crate::data::parameter::{Parameter, ParameterSet};
use crate::rom_error::RomError;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

/// Outcome of one greedy step.
#[derive(Clone, Debug, PartialEq)]
pub struct GreedySelection {
    /// Arg-max parameter.
    pub mu: Parameter,
    /// Maximum error bound over the training set.
    pub delta_max: f64,
    /// Position of `mu` in the training set.
    pub index: usize,
}

/// Arg-max search over a training set with a randomized tie-break.
#[derive(Clone, Debug)]
pub struct GreedySampler<R = SmallRng> {
    rng: R,
    parallel: bool,
}

impl GreedySampler<SmallRng> {
    pub fn new(config: &GreedyConfig) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(config.rng_seed),
            parallel: config.parallel,
        }
    }
}

impl<R: Rng> GreedySampler<R> {
    /// Sampler drawing tie-breaks from `rng`.
    pub fn with_rng(rng: R, parallel: bool) -> Self {
        Self { rng, parallel }
    }

    /// Select the training parameter with the largest error bound.
    ///
    /// Failed or NaN evaluations are skipped.
    ///
    /// # Errors
    /// - `EmptyTrainingSet` if `xi_train` is empty.
    /// - `NoCandidateSelected` if every evaluation failed.
    pub fn select_next<F>(
        &mut self,
        xi_train: &ParameterSet,
        error_bound: F,
    ) -> Result<GreedySelection, RomError>
    where
        F: Fn(&Parameter) -> Result<f64, RomError> + Sync,
    {
        if xi_train.is_empty() {
            return Err(RomError::EmptyTrainingSet);
        }
        let bounds: Vec<Result<f64, RomError>> = if self.parallel {
            xi_train.as_slice().par_iter().map(&error_bound).collect()
        } else {
            xi_train.iter().map(&error_bound).collect()
        };

        let mut delta_max = -1.0;
        let mut best: Option<usize> = None;
        let mut failures = 0usize;
        for (index, bound) in bounds.into_iter().enumerate() {
            match bound {
                Ok(delta) if delta.is_nan() => {
                    failures += 1;
                    log::debug!("greedy: NaN bound at {}", xi_train.as_slice()[index]);
                }
                Ok(delta) => {
                    if delta > delta_max {
                        delta_max = delta;
                        best = Some(index);
                    } else if delta == delta_max && self.rng.r#gen::<f64>() >= 0.5 {
                        best = Some(index);
                    }
                }
                Err(e) => {
                    failures += 1;
                    log::debug!("greedy: bound failed at {}: {e}", xi_train.as_slice()[index]);
                }
            }
        }
        if failures > 0 {
            log::warn!("greedy: {failures} of {} bound evaluations failed", xi_train.len());
        }

        let index = best.ok_or(RomError::NoCandidateSelected)?;
        let mu = xi_train.as_slice()[index].clone();
        log::info!("maximum error bound {delta_max:e} at mu = {mu}");
        Ok(GreedySelection {
            mu,
            delta_max,
            index,
        })
    }
}
