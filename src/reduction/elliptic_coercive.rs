//! Reduced problems and the affine elliptic coercive reduced-basis problem.
//!
//! For an affine truth problem `A(mu) = Σ θ_a^q A_q`, `f(mu) = Σ θ_f^q f_q`
//! and a basis `Z` of size `N`, the reduced problem stores
//!
//! - `A_N^q = Zᵀ A_q Z` and `f_N^q = Zᵀ f_q`;
//! - the Riesz representers `r_f^q = X⁻¹ f_q` and `r_a^{q,n} = X⁻¹ A_q ζ_n`
//!   and their Gram blocks `Cff`, `Cfa`, `Caa`, from which the dual norm of
//!   the residual is assembled in `O(Q² N²)`:
//!
//! ```text
//! ε²(mu) = Σ θ_f θ_f' Cff - 2 Σ θ_f θ_a u_n Cfa + Σ θ_a θ_a' u_n u_m Caa
//! ```
//!
//! Any leading `n ≤ N` block can be solved, so error analysis at
//! intermediate sizes needs no rebuild.

use crate::data::basis::BasisStore;
use crate::data::parameter::Parameter;
use crate::problems::AffineTruthProblem;
use crate::rom_error::RomError;
use nalgebra::{Cholesky, DMatrix, DVector};

/// Surrogate built on a [`BasisStore`].
///
/// `n` arguments select the leading `n` basis functions; `u_n` are reduced
/// coefficients of length `n`.
pub trait ReducedProblem: Sync {
    fn basis(&self) -> &BasisStore;

    fn basis_mut(&mut self) -> &mut BasisStore;

    /// Rebuild the reduced operators for the current basis.
    fn build_reduced_operators(&mut self) -> Result<(), RomError>;

    /// Rebuild the error-estimation matrices for the current basis.
    fn build_error_estimation_matrices(&mut self) -> Result<(), RomError>;

    /// Reduced coefficients at `mu` with the first `n` basis functions.
    fn solve(&self, n: usize, mu: &Parameter) -> Result<DVector<f64>, RomError>;

    /// Output `s_N(mu)`.
    fn output(&self, n: usize, mu: &Parameter, u_n: &DVector<f64>) -> Result<f64, RomError>;

    /// Upper bound of the solution error.
    fn error_bound(&self, n: usize, mu: &Parameter, u_n: &DVector<f64>) -> Result<f64, RomError>;

    /// Upper bound of the output error.
    fn output_error_bound(
        &self,
        n: usize,
        mu: &Parameter,
        u_n: &DVector<f64>,
    ) -> Result<f64, RomError>;

    /// Solve with the full basis and bound the error; the greedy indicator.
    fn greedy_error_bound(&self, mu: &Parameter) -> Result<f64, RomError> {
        let n = self.basis().size();
        let u_n = self.solve(n, mu)?;
        self.error_bound(n, mu, &u_n)
    }

    /// `Σ u_n[i] Z_i`.
    fn reconstruct(&self, u_n: &DVector<f64>) -> Result<DVector<f64>, RomError> {
        self.basis().truncate(u_n.len())?.reconstruct(u_n)
    }
}

/// Reduced-basis problem for an affine, coercive, compliant truth problem.
#[derive(Debug)]
pub struct EllipticCoerciveReducedProblem<'a, P> {
    truth: &'a P,
    basis: BasisStore,
    operators: Vec<DMatrix<f64>>,
    rhs: Vec<DVector<f64>>,
    /// Basis size the reduced operators were built for.
    operators_size: Option<usize>,
    cff: DMatrix<f64>,
    cfa: Vec<Vec<DVector<f64>>>,
    caa: Vec<Vec<DMatrix<f64>>>,
    estimator_size: Option<usize>,
}

impl<'a, P: AffineTruthProblem> EllipticCoerciveReducedProblem<'a, P> {
    pub fn new(truth: &'a P) -> Self {
        Self {
            truth,
            basis: BasisStore::new(),
            operators: Vec::new(),
            rhs: Vec::new(),
            operators_size: None,
            cff: DMatrix::zeros(0, 0),
            cfa: Vec::new(),
            caa: Vec::new(),
            estimator_size: None,
        }
    }

    pub fn truth(&self) -> &'a P {
        self.truth
    }

    /// Reduced operator terms `A_N^q`.
    pub fn reduced_operators(&self) -> &[DMatrix<f64>] {
        &self.operators
    }

    /// Reduced right-hand-side terms `f_N^q`.
    pub fn reduced_rhs(&self) -> &[DVector<f64>] {
        &self.rhs
    }

    fn check_n(&self, n: usize, built: Option<usize>, what: &str) -> Result<(), RomError> {
        let size = built.ok_or_else(|| RomError::Precondition(format!("{what} not built")))?;
        if size != self.basis.size() {
            return Err(RomError::Precondition(format!(
                "{what} built for N = {size}, basis has {}",
                self.basis.size()
            )));
        }
        if n == 0 || n > size {
            return Err(RomError::Precondition(format!(
                "reduced dimension {n} outside 1..={size}"
            )));
        }
        Ok(())
    }

    fn thetas(&self, mu: &Parameter) -> Result<(Vec<f64>, Vec<f64>), RomError> {
        let theta_a = self.truth.theta_a(mu);
        let theta_f = self.truth.theta_f(mu);
        if theta_a.len() != self.truth.operator_terms().len() {
            return Err(RomError::DimensionMismatch {
                expected: self.truth.operator_terms().len(),
                found: theta_a.len(),
            });
        }
        if theta_f.len() != self.truth.rhs_terms().len() {
            return Err(RomError::DimensionMismatch {
                expected: self.truth.rhs_terms().len(),
                found: theta_f.len(),
            });
        }
        Ok((theta_a, theta_f))
    }

    fn check_coefficients(n: usize, u_n: &DVector<f64>) -> Result<(), RomError> {
        if u_n.len() != n {
            return Err(RomError::DimensionMismatch {
                expected: n,
                found: u_n.len(),
            });
        }
        Ok(())
    }

    /// Dual norm of the residual squared, `ε²(mu)`, clamped at zero.
    pub fn residual_dual_norm_squared(
        &self,
        n: usize,
        mu: &Parameter,
        u_n: &DVector<f64>,
    ) -> Result<f64, RomError> {
        self.check_n(n, self.estimator_size, "error estimation matrices")?;
        Self::check_coefficients(n, u_n)?;
        let (theta_a, theta_f) = self.thetas(mu)?;

        let mut eps2 = 0.0;
        for (p, tp) in theta_f.iter().enumerate() {
            for (q, tq) in theta_f.iter().enumerate() {
                eps2 += tp * tq * self.cff[(p, q)];
            }
        }
        for (p, tf) in theta_f.iter().enumerate() {
            for (q, ta) in theta_a.iter().enumerate() {
                eps2 -= 2.0 * tf * ta * self.cfa[p][q].rows(0, n).dot(u_n);
            }
        }
        for (p, tp) in theta_a.iter().enumerate() {
            for (q, tq) in theta_a.iter().enumerate() {
                let block = self.caa[p][q].view((0, 0), (n, n));
                eps2 += tp * tq * u_n.dot(&(block * u_n));
            }
        }
        Ok(eps2.max(0.0))
    }

    fn alpha_lb(&self, mu: &Parameter) -> Result<f64, RomError> {
        let alpha = self.truth.alpha_lb(mu)?;
        if !(alpha > 0.0) {
            return Err(RomError::Configuration(format!(
                "coercivity lower bound at {mu} is {alpha}, expected a positive value"
            )));
        }
        Ok(alpha)
    }
}

impl<'a, P: AffineTruthProblem> ReducedProblem for EllipticCoerciveReducedProblem<'a, P> {
    fn basis(&self) -> &BasisStore {
        &self.basis
    }

    fn basis_mut(&mut self) -> &mut BasisStore {
        &mut self.basis
    }

    fn build_reduced_operators(&mut self) -> Result<(), RomError> {
        if self.basis.is_empty() {
            return Err(RomError::Precondition(
                "reduced operators need at least one basis function".into(),
            ));
        }
        let z = DMatrix::from_columns(self.basis.as_slice());
        let zt = z.transpose();
        self.operators = self
            .truth
            .operator_terms()
            .iter()
            .map(|a| &zt * a * &z)
            .collect();
        self.rhs = self.truth.rhs_terms().iter().map(|f| &zt * f).collect();
        self.operators_size = Some(self.basis.size());
        log::debug!(
            "built {} reduced operator and {} rhs terms for N = {}",
            self.operators.len(),
            self.rhs.len(),
            self.basis.size()
        );
        Ok(())
    }

    fn build_error_estimation_matrices(&mut self) -> Result<(), RomError> {
        if self.basis.is_empty() {
            return Err(RomError::Precondition(
                "error estimation needs at least one basis function".into(),
            ));
        }
        let x = self.truth;
        let riesz_f = self
            .truth
            .rhs_terms()
            .iter()
            .map(|f| x.riesz_representer(f))
            .collect::<Result<Vec<_>, _>>()?;
        let riesz_a = self
            .truth
            .operator_terms()
            .iter()
            .map(|a| {
                self.basis
                    .iter()
                    .map(|zeta| x.riesz_representer(&(a * zeta)))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let qf = riesz_f.len();
        let n = self.basis.size();
        self.cff = DMatrix::from_fn(qf, qf, |p, q| x.evaluate_form(&riesz_f[p], &riesz_f[q]));
        self.cfa = riesz_f
            .iter()
            .map(|rf| {
                riesz_a
                    .iter()
                    .map(|ra| DVector::from_fn(n, |i, _| x.evaluate_form(rf, &ra[i])))
                    .collect()
            })
            .collect();
        self.caa = riesz_a
            .iter()
            .map(|rp| {
                riesz_a
                    .iter()
                    .map(|rq| DMatrix::from_fn(n, n, |i, j| x.evaluate_form(&rp[i], &rq[j])))
                    .collect()
            })
            .collect();
        self.estimator_size = Some(n);
        log::debug!("built error estimation matrices for N = {n}");
        Ok(())
    }

    fn solve(&self, n: usize, mu: &Parameter) -> Result<DVector<f64>, RomError> {
        self.check_n(n, self.operators_size, "reduced operators")?;
        let (theta_a, theta_f) = self.thetas(mu)?;
        let mut a = DMatrix::zeros(n, n);
        for (t, a_q) in theta_a.iter().zip(&self.operators) {
            a += a_q.view((0, 0), (n, n)) * *t;
        }
        let mut f = DVector::zeros(n);
        for (t, f_q) in theta_f.iter().zip(&self.rhs) {
            f += f_q.rows(0, n) * *t;
        }
        let factor = Cholesky::new(a).ok_or_else(|| {
            RomError::SolverDivergence(format!(
                "reduced operator of size {n} at {mu} is not positive definite"
            ))
        })?;
        Ok(factor.solve(&f))
    }

    fn output(&self, n: usize, mu: &Parameter, u_n: &DVector<f64>) -> Result<f64, RomError> {
        if !self.truth.is_compliant() {
            return Err(RomError::Configuration(
                "only compliant outputs are supported".into(),
            ));
        }
        self.check_n(n, self.operators_size, "reduced operators")?;
        Self::check_coefficients(n, u_n)?;
        let (_, theta_f) = self.thetas(mu)?;
        Ok(theta_f
            .iter()
            .zip(&self.rhs)
            .map(|(t, f_q)| t * f_q.rows(0, n).dot(u_n))
            .sum())
    }

    fn error_bound(&self, n: usize, mu: &Parameter, u_n: &DVector<f64>) -> Result<f64, RomError> {
        let eps2 = self.residual_dual_norm_squared(n, mu, u_n)?;
        Ok((eps2 / self.alpha_lb(mu)?).sqrt())
    }

    fn output_error_bound(
        &self,
        n: usize,
        mu: &Parameter,
        u_n: &DVector<f64>,
    ) -> Result<f64, RomError> {
        let eps2 = self.residual_dual_norm_squared(n, mu, u_n)?;
        Ok(eps2 / self.alpha_lb(mu)?)
    }
}
