//! Gram-Schmidt orthonormalization of the newest basis vector.

use crate::data::basis::BasisStore;
use crate::problems::InnerProduct;
use crate::rom_error::RomError;
use nalgebra::DVector;

/// Residual-to-previous-norm ratio below which a projection pass is repeated.
const REORTHOGONALIZE: f64 = 0.7;

/// Modified Gram-Schmidt in the inner product `X`, with one
/// reorthogonalization pass when the projection cancels most of the norm.
///
/// [`GramSchmidt::apply`] treats the last vector of the store as a raw
/// candidate: it is made X-orthogonal to every previous vector and then
/// normalized, in place. Previous vectors are assumed orthonormal already.
#[derive(Clone, Copy, Debug)]
pub struct GramSchmidt<X> {
    inner: X,
    tolerance: f64,
}

impl<X: InnerProduct> GramSchmidt<X> {
    /// `tolerance` is relative: the candidate is degenerate when its residual
    /// norm is at most `tolerance` times its initial norm.
    pub fn new(inner: X, tolerance: f64) -> Self {
        Self { inner, tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Orthonormalize the newest vector of `basis` against the others.
    ///
    /// # Errors
    /// - `Precondition` if the basis is empty.
    /// - `NumericalDegeneracy` if the candidate is (numerically) in the span
    ///   of the previous vectors; the candidate is left partially projected
    ///   and should be discarded by the caller.
    pub fn apply(&self, basis: &mut BasisStore) -> Result<(), RomError> {
        let (candidate, previous) = basis.split_last_mut().ok_or_else(|| {
            RomError::Precondition("Gram-Schmidt needs a candidate vector in the basis".into())
        })?;
        let initial = self.inner.norm(candidate);
        let mut residual = initial;
        if !previous.is_empty() {
            // A second pass restores orthogonality lost to cancellation.
            for _ in 0..2 {
                for z in previous.iter() {
                    let coefficient =
                        self.inner.evaluate_form(candidate, z) / self.inner.evaluate_form(z, z);
                    candidate.axpy(-coefficient, z, 1.0);
                }
                let projected = self.inner.norm(candidate);
                let cancelled = projected < REORTHOGONALIZE * residual;
                residual = projected;
                if !cancelled {
                    break;
                }
            }
        }
        if !(residual.is_finite() && residual > 0.0 && residual > self.tolerance * initial) {
            return Err(RomError::NumericalDegeneracy {
                norm: residual,
                tolerance: self.tolerance * initial,
            });
        }
        *candidate /= residual;
        log::debug!(
            "Gram-Schmidt: N = {}, residual {residual:e} of initial {initial:e}",
            previous.len() + 1
        );
        Ok(())
    }
}

/// Largest entry of `|G - I|` where `G_ij = X(Z_i, Z_j)`.
pub fn orthonormality_defect<X: InnerProduct + ?Sized>(inner: &X, vectors: &[DVector<f64>]) -> f64 {
    let mut defect: f64 = 0.0;
    for (i, zi) in vectors.iter().enumerate() {
        for (j, zj) in vectors.iter().enumerate() {
            let target = if i == j { 1.0 } else { 0.0 };
            defect = defect.max((inner.evaluate_form(zi, zj) - target).abs());
        }
    }
    defect
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problems::Euclidean;
    use nalgebra::DMatrix;

    fn v(values: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(values)
    }

    #[test]
    fn first_vector_is_only_normalized() {
        let mut z = BasisStore::new();
        z.enrich(v(&[3.0, 4.0])).unwrap();
        GramSchmidt::new(Euclidean, 1e-10).apply(&mut z).unwrap();
        assert_eq!(z.get(0), Some(&v(&[0.6, 0.8])));
    }

    #[test]
    fn empty_basis_is_a_precondition_error() {
        let mut z = BasisStore::new();
        let err = GramSchmidt::new(Euclidean, 1e-10).apply(&mut z).unwrap_err();
        assert!(matches!(err, RomError::Precondition(_)));
    }

    #[test]
    fn weighted_inner_product() {
        let x = DMatrix::from_row_slice(3, 3, &[2.0, 1.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0, 1.0]);
        let gs = GramSchmidt::new(&x, 1e-10);
        let mut z = BasisStore::new();
        for candidate in [v(&[1.0, 0.0, 0.0]), v(&[1.0, 1.0, 0.0]), v(&[0.0, 1.0, 1.0])] {
            z.enrich(candidate).unwrap();
            gs.apply(&mut z).unwrap();
        }
        assert!(orthonormality_defect(&x, z.as_slice()) < 1e-12);
    }

    #[test]
    fn dependent_candidate_is_degenerate() {
        let gs = GramSchmidt::new(Euclidean, 1e-8);
        let mut z = BasisStore::new();
        z.enrich(v(&[1.0, 1.0])).unwrap();
        gs.apply(&mut z).unwrap();
        let err = z
            .enrich_with(v(&[2.0, 2.0 + 1e-12]), |z| gs.apply(z))
            .unwrap_err();
        assert!(matches!(err, RomError::NumericalDegeneracy { .. }));
        assert_eq!(z.size(), 1);
    }

    #[test]
    fn near_dependent_candidate_stays_orthogonal_at_default_tolerance() {
        let tolerance = crate::config::OfflineConfig::default().degeneracy_tolerance;
        let gs = GramSchmidt::new(Euclidean, tolerance);
        let first = v(&[1.0, 2.0, -1.0, 0.5]);
        let w = v(&[0.3, -0.1, 0.7, 1.1]);
        let mut z = BasisStore::new();
        z.enrich(first.clone()).unwrap();
        gs.apply(&mut z).unwrap();
        let candidate = &first * 3.1 + &w * (5e-8 * first.norm());
        z.enrich_with(candidate, |z| gs.apply(z)).unwrap();
        assert!(orthonormality_defect(&Euclidean, z.as_slice()) < 1e-10);
    }

    #[test]
    fn zero_candidate_is_degenerate() {
        let gs = GramSchmidt::new(Euclidean, 0.0);
        let mut z = BasisStore::new();
        z.enrich(v(&[0.0, 0.0])).unwrap();
        assert!(matches!(gs.apply(&mut z), Err(RomError::NumericalDegeneracy { .. })));
    }
}
