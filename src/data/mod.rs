//! Owned data: parameters and parameter sets, and the reduced basis.

pub mod basis;
pub mod parameter;

pub use basis::{BasisStore, BasisView};
pub use parameter::{Parameter, ParameterSet, ParameterSpace, Sampling};
