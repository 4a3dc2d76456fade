//! Truth-problem collaborators.
//!
//! The offline machinery only sees a full-order problem through these
//! traits: an inner product for orthogonalization, a parametrized solve, a
//! coercivity lower bound and, for affine problems, the parameter-separable
//! operator and right-hand-side terms.

pub mod thermal_block;

pub use thermal_block::ThermalBlock;

use crate::data::parameter::Parameter;
use crate::rom_error::RomError;
use nalgebra::{DMatrix, DVector};

/// Symmetric positive-definite bilinear form `X(a, b)`.
pub trait InnerProduct {
    fn evaluate_form(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64;

    /// `sqrt(X(v, v))`.
    fn norm(&self, v: &DVector<f64>) -> f64 {
        self.evaluate_form(v, v).max(0.0).sqrt()
    }
}

impl InnerProduct for DMatrix<f64> {
    fn evaluate_form(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        a.dot(&(self * b))
    }
}

impl<T: InnerProduct + ?Sized> InnerProduct for &T {
    fn evaluate_form(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        (**self).evaluate_form(a, b)
    }
}

/// Euclidean inner product.
#[derive(Clone, Copy, Debug, Default)]
pub struct Euclidean;

impl InnerProduct for Euclidean {
    fn evaluate_form(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        a.dot(b)
    }
}

/// Full-order parametrized problem.
pub trait TruthProblem: InnerProduct + Sync {
    /// Number of truth degrees of freedom.
    fn dimension(&self) -> usize;

    /// Truth solution at `mu`.
    ///
    /// # Errors
    /// `SolverDivergence` if the solver does not converge.
    fn solve(&self, mu: &Parameter) -> Result<DVector<f64>, RomError>;

    /// Lower bound of the coercivity constant at `mu`.
    ///
    /// Problems used with rigorous error bounds must override this; the
    /// default reports a configuration error.
    fn alpha_lb(&self, mu: &Parameter) -> Result<f64, RomError> {
        let _ = mu;
        Err(RomError::Configuration(
            "truth problem does not provide a coercivity lower bound".into(),
        ))
    }

    /// Norm in which errors are measured; the inner-product norm by default.
    fn error_norm(&self, mu: &Parameter, error: &DVector<f64>) -> Result<f64, RomError> {
        let _ = mu;
        Ok(self.norm(error))
    }

    /// Output functional `s(u; mu)`.
    fn output(&self, mu: &Parameter, solution: &DVector<f64>) -> Result<f64, RomError>;
}

/// Truth problem with `A(mu) = Σ θ_a^q(mu) A_q` and `f(mu) = Σ θ_f^q(mu) f_q`.
pub trait AffineTruthProblem: TruthProblem {
    fn operator_terms(&self) -> &[DMatrix<f64>];

    fn rhs_terms(&self) -> &[DVector<f64>];

    fn theta_a(&self, mu: &Parameter) -> Vec<f64>;

    fn theta_f(&self, mu: &Parameter) -> Vec<f64>;

    /// Riesz representer of the functional `v ↦ rhsᵀ v` in the inner product.
    fn riesz_representer(&self, rhs: &DVector<f64>) -> Result<DVector<f64>, RomError>;

    /// Whether the output equals the right-hand side functional.
    fn is_compliant(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_inner_product() {
        let x = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 3.0]);
        let a = DVector::from_vec(vec![1.0, 1.0]);
        let b = DVector::from_vec(vec![1.0, 2.0]);
        assert_eq!(x.evaluate_form(&a, &b), 8.0);
        assert_eq!(InnerProduct::norm(&x, &a), 5.0_f64.sqrt());
        assert_eq!(Euclidean.evaluate_form(&a, &b), 3.0);
    }
}
