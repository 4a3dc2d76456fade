//! RomError: Unified error type for reduced-basis public APIs
//!
//! Every fallible operation in the crate returns this error. Component-local
//! numerical issues that callers are expected to recover from (a stalled
//! enrichment, an undefined effectivity) are reported as structured outcomes
//! instead; see [`crate::reduction::offline::OfflineOutcome`] and
//! [`crate::reduction::error_analysis::Effectivity`].

use thiserror::Error;

/// Unified error type for reduced-basis operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RomError {
    /// The candidate vector is (numerically) linearly dependent on the basis.
    #[error(
        "numerical degeneracy: residual norm {norm:e} is below tolerance {tolerance:e}; candidate adds no new information"
    )]
    NumericalDegeneracy { norm: f64, tolerance: f64 },
    /// A truth or reduced solve failed to produce a solution.
    #[error("solver divergence: {0}")]
    SolverDivergence(String),
    /// The greedy search was handed an empty training set.
    #[error("greedy search needs a non-empty training set")]
    EmptyTrainingSet,
    /// Every error-bound evaluation of the greedy search failed.
    #[error("greedy search could not select a candidate: every error bound evaluation failed")]
    NoCandidateSelected,
    /// Persisted data does not match its expected shape or record counts.
    #[error("persistence corruption: {0}")]
    PersistenceCorruption(String),
    /// An operation was invoked before its inputs exist (e.g. enrichment of an empty basis).
    #[error("precondition violated: {0}")]
    Precondition(String),
    /// A required capability or setting was not provided.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Vector/matrix/parameter sizes are inconsistent.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    /// A degree of freedom index outside the function space.
    #[error("invalid DOF {dof} for a space of dimension {dim}")]
    InvalidDof { dof: usize, dim: usize },
    /// A component name or index not known to the function space.
    #[error("unknown component `{0}`")]
    UnknownComponent(String),
    /// Mesh or element geometry is not usable.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(String),
    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for RomError {
    fn from(err: std::io::Error) -> Self {
        RomError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RomError {
    fn from(err: serde_json::Error) -> Self {
        RomError::Serialization(err.to_string())
    }
}
