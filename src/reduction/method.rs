//! Reduction method: training/testing sets, offline stage and error analysis
//! for one reduced problem, optionally preceded by an auxiliary reduction.
//!
//! An auxiliary reduction (typically a successive-constraints computation of
//! the coercivity lower bound) has its own lifecycle. [`ReductionMethod`]
//! forwards every lifecycle call to it first and then runs its own step, so
//! the auxiliary is always complete before the main reduction needs it.

use crate::config::OfflineConfig;
use crate::data::parameter::{ParameterSet, ParameterSpace, Sampling};
use crate::problems::TruthProblem;
use crate::reduction::elliptic_coercive::ReducedProblem;
use crate::reduction::error_analysis::{ErrorAnalysisReport, error_analysis};
use crate::reduction::offline::{OfflineOutcome, OfflineStage};
use crate::rom_error::RomError;
use rand::Rng;

const XI_TRAIN_FILE: &str = "xi_train.txt";
const XI_TEST_FILE: &str = "xi_test.txt";

/// Lifecycle of a sub-reduction sequenced before the main one.
pub trait AuxiliaryReduction {
    fn name(&self) -> &str;

    fn set_n_max(&mut self, n_max: usize) -> Result<(), RomError>;

    fn set_xi_train(&mut self, xi_train: &ParameterSet) -> Result<(), RomError>;

    fn set_xi_test(&mut self, xi_test: &ParameterSet) -> Result<(), RomError>;

    fn offline(&mut self) -> Result<(), RomError>;

    fn error_analysis(&mut self, n_max: Option<usize>) -> Result<(), RomError>;
}

pub struct ReductionMethod<'a, T, R>
where
    T: TruthProblem,
    R: ReducedProblem,
{
    truth: &'a T,
    reduced: R,
    config: OfflineConfig,
    xi_train: ParameterSet,
    xi_test: ParameterSet,
    auxiliary: Option<Box<dyn AuxiliaryReduction + 'a>>,
}

impl<'a, T, R> ReductionMethod<'a, T, R>
where
    T: TruthProblem,
    R: ReducedProblem,
{
    pub fn new(truth: &'a T, reduced: R, config: OfflineConfig) -> Result<Self, RomError> {
        config.validate()?;
        Ok(Self {
            truth,
            reduced,
            config,
            xi_train: ParameterSet::default(),
            xi_test: ParameterSet::default(),
            auxiliary: None,
        })
    }

    pub fn with_auxiliary(mut self, auxiliary: Box<dyn AuxiliaryReduction + 'a>) -> Self {
        self.auxiliary = Some(auxiliary);
        self
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn reduced(&self) -> &R {
        &self.reduced
    }

    pub fn xi_train(&self) -> &ParameterSet {
        &self.xi_train
    }

    pub fn xi_test(&self) -> &ParameterSet {
        &self.xi_test
    }

    pub fn set_n_max(&mut self, n_max: usize) -> Result<(), RomError> {
        if let Some(aux) = self.auxiliary.as_mut() {
            aux.set_n_max(n_max)?;
        }
        let config = OfflineConfig {
            n_max,
            ..self.config.clone()
        };
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn set_xi_train(&mut self, xi_train: ParameterSet) -> Result<(), RomError> {
        if let Some(aux) = self.auxiliary.as_mut() {
            aux.set_xi_train(&xi_train)?;
        }
        self.xi_train = xi_train;
        Ok(())
    }

    pub fn set_xi_test(&mut self, xi_test: ParameterSet) -> Result<(), RomError> {
        if let Some(aux) = self.auxiliary.as_mut() {
            aux.set_xi_test(&xi_test)?;
        }
        self.xi_test = xi_test;
        Ok(())
    }

    /// Import `xi_train.txt` from the output folder or sample `n` fresh
    /// parameters and export them there. Returns whether the set was imported.
    pub fn initialize_training_set<G: Rng + ?Sized>(
        &mut self,
        space: &ParameterSpace,
        n: usize,
        sampling: Sampling,
        enable_import: bool,
        rng: &mut G,
    ) -> Result<bool, RomError> {
        let path = self.config.output_folder.join(XI_TRAIN_FILE);
        let (set, imported) =
            ParameterSet::import_or_sample(path, space, n, sampling, enable_import, rng)?;
        self.set_xi_train(set)?;
        Ok(imported)
    }

    /// Same as [`Self::initialize_training_set`] for `xi_test.txt`.
    pub fn initialize_testing_set<G: Rng + ?Sized>(
        &mut self,
        space: &ParameterSpace,
        n: usize,
        sampling: Sampling,
        enable_import: bool,
        rng: &mut G,
    ) -> Result<bool, RomError> {
        let path = self.config.output_folder.join(XI_TEST_FILE);
        let (set, imported) =
            ParameterSet::import_or_sample(path, space, n, sampling, enable_import, rng)?;
        self.set_xi_test(set)?;
        Ok(imported)
    }

    /// Run the auxiliary offline stage, then the greedy offline stage.
    pub fn offline(&mut self) -> Result<OfflineOutcome, RomError> {
        if let Some(aux) = self.auxiliary.as_mut() {
            log::info!("offline stage of auxiliary reduction `{}`", aux.name());
            aux.offline()?;
        }
        OfflineStage::new(self.truth, &mut self.reduced, self.config.clone())?.run(&self.xi_train)
    }

    /// Run the auxiliary error analysis, then analyse the reduced problem
    /// on the testing set.
    pub fn error_analysis(&mut self, n_max: Option<usize>) -> Result<ErrorAnalysisReport, RomError> {
        if let Some(aux) = self.auxiliary.as_mut() {
            log::info!("error analysis of auxiliary reduction `{}`", aux.name());
            aux.error_analysis(n_max)?;
        }
        error_analysis(self.truth, &self.reduced, &self.xi_test, n_max)
    }
}
