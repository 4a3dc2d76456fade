//! Re-export public algorithms.

pub mod assembly;
pub mod gram_schmidt;
pub mod greedy;
pub mod reduced_mesh;
pub mod submesh;

pub use assembly::{FormTerm, SparseMatrix, assemble_bilinear_form, evaluate_sparse_matrix_at_dofs};
pub use gram_schmidt::GramSchmidt;
pub use greedy::{GreedySampler, GreedySelection};
pub use reduced_mesh::{ReducedMesh, ReducedMeshState, SharedReducedMesh};
pub use submesh::{SubmeshMaps, extract_cells};
