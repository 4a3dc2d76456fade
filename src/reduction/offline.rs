//! Offline stage of the reduced-basis method.
//!
//! One iteration performs, in order:
//!
//! 1. truth solve at the current `mu`;
//! 2. enrichment of the basis and Gram-Schmidt on the new vector;
//! 3. rebuild of the reduced operators;
//! 4. reduced solve at the new dimension `N`;
//! 5. rebuild of the error-estimation matrices;
//! 6. greedy selection of the next `mu` while `N < n_max`.
//!
//! The basis is saved after step 2 and a [`TraceRecord`] is appended after
//! step 6, so the files on disk describe one of two consistent states: the
//! basis holds as many vectors as the trace holds records, or exactly one
//! more (the greedy step for the newest vector is pending). [`OfflineStage::run`]
//! resumes from either state without repeating a truth solve.
//!
//! Once `N == n_max` a final diagnostic greedy step records `delta_max` for
//! the complete basis.

use crate::algs::greedy::{GreedySampler, GreedySelection};
use crate::algs::gram_schmidt::GramSchmidt;
use crate::config::OfflineConfig;
use crate::data::basis::BasisStore;
use crate::data::parameter::{Parameter, ParameterSet};
use crate::io::{GreedyTrace, TraceRecord, write_vectors};
use crate::problems::TruthProblem;
use crate::reduction::elliptic_coercive::ReducedProblem;
use crate::rom_error::RomError;
use std::fs;

/// Lifecycle of an [`OfflineStage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OfflineState {
    NotStarted,
    /// Building the `N`-th basis function.
    Running(usize),
    /// Picked up a persisted basis of the given size.
    Resumed(usize),
    /// Stopped without enriching; the basis keeps the given size.
    Stalled(usize),
    Converged,
}

/// Result of [`OfflineStage::run`].
#[derive(Clone, Debug, PartialEq)]
pub enum OfflineOutcome {
    /// The basis reached `n_max`; `delta_max` is the final diagnostic bound.
    Converged { n: usize, delta_max: f64 },
    /// An iteration at `mu` could not enrich the basis; `n` is the last
    /// consistent (persisted) dimension.
    Stalled { mu: Parameter, n: usize, reason: RomError },
}

/// Greedy offline driver for a truth problem and its reduced problem.
pub struct OfflineStage<'s, T, R>
where
    T: TruthProblem,
    R: ReducedProblem,
{
    truth: &'s T,
    reduced: &'s mut R,
    config: OfflineConfig,
    sampler: GreedySampler,
    trace: GreedyTrace,
    state: OfflineState,
}

impl<'s, T, R> OfflineStage<'s, T, R>
where
    T: TruthProblem,
    R: ReducedProblem,
{
    /// # Errors
    /// `Configuration` if `config` fails [`OfflineConfig::validate`].
    pub fn new(truth: &'s T, reduced: &'s mut R, config: OfflineConfig) -> Result<Self, RomError> {
        config.validate()?;
        Ok(Self {
            truth,
            reduced,
            sampler: GreedySampler::new(&config.greedy),
            trace: GreedyTrace::new(config.post_processing_folder()),
            config,
            state: OfflineState::NotStarted,
        })
    }

    /// Replace the greedy sampler, e.g. to inject a differently seeded RNG.
    pub fn with_sampler(mut self, sampler: GreedySampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn state(&self) -> OfflineState {
        self.state
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    /// Build (or finish building) the basis up to `n_max`.
    ///
    /// Truth divergence and Gram-Schmidt degeneracy end the run with
    /// [`OfflineOutcome::Stalled`]; every other failure is returned as an
    /// error. In both cases the files on disk stay resumable.
    ///
    /// # Errors
    /// - `EmptyTrainingSet` if `xi_train` is empty.
    /// - `PersistenceCorruption` if basis and trace on disk disagree.
    /// - `DimensionMismatch` if the persisted basis does not fit the truth problem.
    /// - Reduced-solve, greedy and I/O failures.
    pub fn run(&mut self, xi_train: &ParameterSet) -> Result<OfflineOutcome, RomError> {
        if xi_train.is_empty() {
            return Err(RomError::EmptyTrainingSet);
        }
        let n_max = self.config.n_max;
        let basis_folder = self.config.basis_folder();
        if self.trace.recover()? {
            log::info!("offline: recovered an interrupted greedy trace append");
        }
        let records = self.trace.load()?;
        if !self
            .reduced
            .basis_mut()
            .load(&basis_folder, &self.config.basis_label)?
        {
            *self.reduced.basis_mut() = BasisStore::new();
        }
        let size = self.reduced.basis().size();
        if let Some(found) = self.reduced.basis().vector_len() {
            if found != self.truth.dimension() {
                return Err(RomError::DimensionMismatch {
                    expected: self.truth.dimension(),
                    found,
                });
            }
        }
        let recorded = records.len();
        if size != recorded && size != recorded + 1 {
            return Err(RomError::PersistenceCorruption(format!(
                "basis in {} holds {size} vectors but the greedy trace holds {recorded} records",
                basis_folder.display()
            )));
        }

        if size >= n_max {
            log::info!("basis of size {size} found on disk, offline stage already complete");
            self.rebuild()?;
            let delta_max = match records.last() {
                Some(last) if recorded == size => last.delta_max,
                _ => self.diagnostic_greedy(xi_train)?.delta_max,
            };
            self.state = OfflineState::Converged;
            return Ok(OfflineOutcome::Converged { n: size, delta_max });
        }

        let mut mu = match records.last() {
            None if size == 0 => xi_train.as_slice()[0].clone(),
            last => {
                self.state = OfflineState::Resumed(size);
                log::info!("resuming offline stage at N = {size}");
                self.rebuild()?;
                if size == recorded + 1 {
                    self.greedy_step(xi_train)?.mu
                } else {
                    last.map(|r| r.mu.clone()).ok_or_else(|| {
                        RomError::PersistenceCorruption("greedy trace is empty".into())
                    })?
                }
            }
        };

        let gram_schmidt = GramSchmidt::new(self.truth, self.config.degeneracy_tolerance);
        while self.reduced.basis().size() < n_max {
            let n = self.reduced.basis().size() + 1;
            self.state = OfflineState::Running(n);
            log::info!("offline iteration N = {n}, mu = {mu}");

            let snapshot = match self.truth.solve(&mu) {
                Ok(snapshot) => snapshot,
                Err(reason @ RomError::SolverDivergence(_)) => return Ok(self.stall(mu, reason)),
                Err(e) => return Err(e),
            };
            if self.config.save_snapshots {
                let folder = self.config.snapshots_folder();
                fs::create_dir_all(&folder)?;
                write_vectors(
                    &folder.join(format!("truth_{}", n - 1)),
                    std::slice::from_ref(&snapshot),
                )?;
            }
            match self
                .reduced
                .basis_mut()
                .enrich_with(snapshot, |z| gram_schmidt.apply(z))
            {
                Err(reason @ RomError::NumericalDegeneracy { .. }) => {
                    return Ok(self.stall(mu, reason));
                }
                other => other?,
            }
            self.reduced
                .basis()
                .save(&basis_folder, &self.config.basis_label)?;

            self.reduced.build_reduced_operators()?;
            let u_n = self.reduced.solve(n, &mu)?;
            log::debug!("reduced solution at N = {n}: |u_N| = {:e}", u_n.norm());
            self.reduced.build_error_estimation_matrices()?;

            if n < n_max {
                mu = self.greedy_step(xi_train)?.mu;
            }
        }

        let delta_max = self.diagnostic_greedy(xi_train)?.delta_max;
        self.state = OfflineState::Converged;
        let n = self.reduced.basis().size();
        log::info!("offline stage converged at N = {n}, delta_max = {delta_max:e}");
        Ok(OfflineOutcome::Converged { n, delta_max })
    }

    /// Greedy step for the complete basis, recorded in the trace but not
    /// used to enrich.
    ///
    /// # Errors
    /// `Precondition` if the trace already holds a record for the current
    /// basis size, plus any greedy or I/O failure.
    pub fn diagnostic_greedy(&mut self, xi_train: &ParameterSet) -> Result<GreedySelection, RomError> {
        let recorded = self.trace.load()?.len();
        let size = self.reduced.basis().size();
        if recorded + 1 != size {
            return Err(RomError::Precondition(format!(
                "diagnostic greedy at N = {size} with {recorded} trace records"
            )));
        }
        log::info!("diagnostic greedy step at N = {size}");
        self.greedy_step(xi_train)
    }

    fn greedy_step(&mut self, xi_train: &ParameterSet) -> Result<GreedySelection, RomError> {
        let n = self.reduced.basis().size();
        let reduced: &R = &*self.reduced;
        let selection = self
            .sampler
            .select_next(xi_train, |mu| reduced.greedy_error_bound(mu))?;
        self.trace.append(&TraceRecord {
            n,
            delta_max: selection.delta_max,
            mu: selection.mu.clone(),
        })?;
        Ok(selection)
    }

    fn rebuild(&mut self) -> Result<(), RomError> {
        self.reduced.build_reduced_operators()?;
        self.reduced.build_error_estimation_matrices()
    }

    fn stall(&mut self, mu: Parameter, reason: RomError) -> OfflineOutcome {
        let n = self.reduced.basis().size();
        log::warn!("offline stage stalled at mu = {mu}: {reason}; last consistent N = {n}");
        self.state = OfflineState::Stalled(n);
        OfflineOutcome::Stalled { mu, n, reason }
    }
}
