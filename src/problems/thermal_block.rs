//! One-dimensional thermal block.
//!
//! Steady heat conduction on `[0, 1]` split into `Q` equal blocks with
//! conductivity `mu_q` on block `q`:
//!
//! ```text
//! -(k(x; mu) u')' = 1,   u(0) = 0,   k u'(1) = 0,   k = mu_q on block q
//! ```
//!
//! discretized with P1 elements. The operator is affine,
//! `A(mu) = Σ mu_q A_q`, the load has a single term, the inner product is
//! `X = A(mu = 1)` and, since `a(v, v; mu) >= min_q mu_q ‖v‖²_X`,
//! `alpha_lb(mu) = min_q mu_q` is a rigorous coercivity bound. Errors are
//! measured in the energy norm and the output is compliant, `s = fᵀ u`.

use super::{AffineTruthProblem, InnerProduct, TruthProblem};
use crate::data::parameter::{Parameter, ParameterSpace};
use crate::discretization::runtime::{
    ElementRuntime, local_load_vector, local_stiffness_matrix, tabulate_element,
};
use crate::function_space::{DofKey, ElementSpec, FunctionSpace, NodeKey};
use crate::mesh_generation::interval_mesh;
use crate::rom_error::RomError;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use std::sync::Arc;

/// Affine 1D thermal block with homogeneous Dirichlet condition at `x = 0`.
#[derive(Clone, Debug)]
pub struct ThermalBlock {
    n_blocks: usize,
    operators: Vec<DMatrix<f64>>,
    rhs: Vec<DVector<f64>>,
    inner: DMatrix<f64>,
    inner_factor: Cholesky<f64, Dyn>,
}

impl ThermalBlock {
    /// `n_blocks` blocks of `cells_per_block` P1 elements each.
    pub fn new(n_blocks: usize, cells_per_block: usize) -> Result<Self, RomError> {
        if n_blocks == 0 || cells_per_block == 0 {
            return Err(RomError::Configuration(
                "thermal block needs at least one block and one cell per block".into(),
            ));
        }
        let n_cells = n_blocks * cells_per_block;
        let mesh = Arc::new(interval_mesh(n_cells, 0.0, 1.0)?);
        let space = FunctionSpace::new(Arc::clone(&mesh), ElementSpec::lagrange(1))?;

        // Truth unknowns are every DOF except the one at x = 0.
        let clamped = space
            .dof_for_key(&DofKey {
                field: 0,
                node: NodeKey::Vertex(0),
            })
            .ok_or_else(|| RomError::InvalidGeometry("no DOF at x = 0".into()))?;
        let free = |dof: usize| match dof.cmp(&clamped) {
            std::cmp::Ordering::Less => Some(dof),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(dof - 1),
        };
        let n = space.dim() - 1;

        let runtime = ElementRuntime::lagrange(mesh.cell_type(), 1)?;
        let mut operators = vec![DMatrix::zeros(n, n); n_blocks];
        let mut load = DVector::zeros(n);
        for (position, &cell) in space.cells().iter().enumerate() {
            let block = cell / cells_per_block;
            let tab = tabulate_element(&runtime, &mesh.cell_coordinates(cell)?)?;
            let k = local_stiffness_matrix(&tab);
            let f = local_load_vector(&tab, |_| 1.0);
            let dofs = space.cell_dofs(position);
            for (i, &row) in dofs.iter().enumerate() {
                let Some(r) = free(row) else { continue };
                load[r] += f[i];
                for (j, &col) in dofs.iter().enumerate() {
                    if let Some(c) = free(col) {
                        operators[block][(r, c)] += k[i * dofs.len() + j];
                    }
                }
            }
        }

        let inner = operators
            .iter()
            .fold(DMatrix::zeros(n, n), |acc, a| acc + a);
        let inner_factor = Cholesky::new(inner.clone()).ok_or_else(|| {
            RomError::SolverDivergence("inner product matrix is not positive definite".into())
        })?;
        log::debug!("thermal block: {n_blocks} blocks, {n} truth DOFs");
        Ok(Self {
            n_blocks,
            operators,
            rhs: vec![load],
            inner,
            inner_factor,
        })
    }

    pub fn n_blocks(&self) -> usize {
        self.n_blocks
    }

    /// `[min, max]` for every conductivity.
    pub fn parameter_space(&self, min: f64, max: f64) -> Result<ParameterSpace, RomError> {
        ParameterSpace::new(vec![(min, max); self.n_blocks])
    }

    /// `A(mu) = Σ mu_q A_q`.
    pub fn operator(&self, mu: &Parameter) -> Result<DMatrix<f64>, RomError> {
        self.check(mu)?;
        let n = self.dimension();
        Ok(self
            .operators
            .iter()
            .zip(mu.as_slice())
            .fold(DMatrix::zeros(n, n), |acc, (a, &m)| acc + a * m))
    }

    fn check(&self, mu: &Parameter) -> Result<(), RomError> {
        if mu.len() != self.n_blocks {
            return Err(RomError::DimensionMismatch {
                expected: self.n_blocks,
                found: mu.len(),
            });
        }
        Ok(())
    }
}

impl InnerProduct for ThermalBlock {
    fn evaluate_form(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        self.inner.evaluate_form(a, b)
    }
}

impl TruthProblem for ThermalBlock {
    fn dimension(&self) -> usize {
        self.inner.nrows()
    }

    fn solve(&self, mu: &Parameter) -> Result<DVector<f64>, RomError> {
        let a = self.operator(mu)?;
        let factor = Cholesky::new(a).ok_or_else(|| {
            RomError::SolverDivergence(format!("truth operator at {mu} is not positive definite"))
        })?;
        Ok(factor.solve(&self.rhs[0]))
    }

    fn alpha_lb(&self, mu: &Parameter) -> Result<f64, RomError> {
        self.check(mu)?;
        Ok(mu.as_slice().iter().copied().fold(f64::INFINITY, f64::min))
    }

    fn error_norm(&self, mu: &Parameter, error: &DVector<f64>) -> Result<f64, RomError> {
        let a = self.operator(mu)?;
        Ok(a.evaluate_form(error, error).max(0.0).sqrt())
    }

    fn output(&self, mu: &Parameter, solution: &DVector<f64>) -> Result<f64, RomError> {
        self.check(mu)?;
        Ok(self.rhs[0].dot(solution))
    }
}

impl AffineTruthProblem for ThermalBlock {
    fn operator_terms(&self) -> &[DMatrix<f64>] {
        &self.operators
    }

    fn rhs_terms(&self) -> &[DVector<f64>] {
        &self.rhs
    }

    fn theta_a(&self, mu: &Parameter) -> Vec<f64> {
        mu.as_slice().to_vec()
    }

    fn theta_f(&self, _mu: &Parameter) -> Vec<f64> {
        vec![1.0]
    }

    fn riesz_representer(&self, rhs: &DVector<f64>) -> Result<DVector<f64>, RomError> {
        if rhs.len() != self.dimension() {
            return Err(RomError::DimensionMismatch {
                expected: self.dimension(),
                found: rhs.len(),
            });
        }
        Ok(self.inner_factor.solve(rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn homogeneous_block_matches_exact_solution() {
        // k = 1 everywhere: u = x - x²/2, P1 is nodally exact in 1D.
        let tb = ThermalBlock::new(2, 4).unwrap();
        let u = tb.solve(&Parameter::new(vec![1.0, 1.0])).unwrap();
        assert_eq!(u.len(), 8);
        for (i, value) in u.iter().enumerate() {
            let x = (i + 1) as f64 / 8.0;
            assert!((value - (x - 0.5 * x * x)).abs() < 1e-12);
        }
    }

    #[test]
    fn alpha_lb_is_min_conductivity() {
        let tb = ThermalBlock::new(3, 2).unwrap();
        let mu = Parameter::new(vec![2.0, 0.5, 4.0]);
        assert_eq!(tb.alpha_lb(&mu).unwrap(), 0.5);
        assert!(matches!(
            tb.alpha_lb(&Parameter::new(vec![1.0])),
            Err(RomError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn non_positive_conductivity_diverges() {
        let tb = ThermalBlock::new(2, 2).unwrap();
        assert!(matches!(
            tb.solve(&Parameter::new(vec![1.0, -1.0])),
            Err(RomError::SolverDivergence(_))
        ));
    }

    #[test]
    fn riesz_representer_solves_with_inner_product() {
        let tb = ThermalBlock::new(2, 3).unwrap();
        let r = tb.riesz_representer(&tb.rhs_terms()[0]).unwrap();
        let u1 = tb.solve(&Parameter::new(vec![1.0, 1.0])).unwrap();
        assert!((r - u1).amax() < 1e-12);
    }
}
