//! Runtime discretization helpers for basis/quadrature evaluation and element integration.

pub mod runtime;

pub use runtime::{
    Basis, BasisTabulation, ElementRuntime, ElementTabulation, LocalNode, QuadratureRule,
    local_form_matrix, local_load_vector, local_stiffness_matrix, tabulate_element,
};
