//! Reduced problems and the drivers that build and assess them.

pub mod elliptic_coercive;
pub mod error_analysis;
pub mod method;
pub mod offline;

pub use elliptic_coercive::{EllipticCoerciveReducedProblem, ReducedProblem};
pub use error_analysis::{
    Effectivity, ErrorAnalysisReport, ErrorAnalysisRow, ErrorAnalysisTable, error_analysis,
};
pub use method::{AuxiliaryReduction, ReductionMethod};
pub use offline::{OfflineOutcome, OfflineStage, OfflineState};
