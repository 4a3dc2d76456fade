#![cfg_attr(docsrs, feature(doc_cfg))]
//! # reduced-basis
//!
//! reduced-basis builds certified reduced-order models of parametrized,
//! affine, coercive PDE problems. Given a truth solver `mu ↦ u(mu)` it grows
//! an orthonormal reduced basis greedily, assembles the reduced operators
//! and the residual-based error estimator, and reports error and
//! effectivity statistics on a testing set.
//!
//! ## Features
//! - Greedy offline stage with resumable on-disk state (basis file plus an
//!   append-only post-processing trace)
//! - Gram-Schmidt enrichment in a problem-defined inner product
//! - Reduced meshes for hyper-reduction: grow a cell subset from requested
//!   DOF tuples and renumber DOFs on restricted function spaces
//! - Lagrange function spaces on structured meshes with named components,
//!   subspaces and collapsed spaces
//! - Error analysis of solution and output, with explicit undefined
//!   effectivities
//!
//! ## Determinism
//!
//! Greedy ties are broken with a `SmallRng` seeded from [`config::GreedyConfig`];
//! parallel evaluation is collected in training-set order, so the selected
//! parameters only depend on the seed.
//!
//! ## Persistence
//!
//! Whole-file artifacts are written to a temporary sibling and renamed; the
//! greedy trace is append-only. See [`io`].

pub mod algs;
pub mod config;
pub mod data;
pub mod debug_invariants;
pub mod discretization;
pub mod function_space;
pub mod io;
pub mod mesh;
pub mod mesh_generation;
pub mod problems;
pub mod reduction;
pub mod rom_error;

pub use debug_invariants::DebugInvariants;
pub use rom_error::RomError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::gram_schmidt::GramSchmidt;
    pub use crate::algs::greedy::{GreedySampler, GreedySelection};
    pub use crate::algs::reduced_mesh::{ReducedMesh, ReducedMeshState, SharedReducedMesh};
    pub use crate::config::{GreedyConfig, OfflineConfig, RebuildPolicy, ReducedMeshConfig};
    pub use crate::data::basis::{BasisStore, BasisView};
    pub use crate::data::parameter::{Parameter, ParameterSet, ParameterSpace, Sampling};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::function_space::{Component, ComponentSpec, ElementSpec, FunctionSpace};
    pub use crate::mesh::{CellPartition, CellType, Mesh};
    pub use crate::problems::{AffineTruthProblem, InnerProduct, TruthProblem};
    pub use crate::reduction::{
        AuxiliaryReduction, Effectivity, EllipticCoerciveReducedProblem, OfflineOutcome,
        OfflineStage, ReducedProblem, ReductionMethod,
    };
    pub use crate::rom_error::RomError;
}
