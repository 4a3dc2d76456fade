use nalgebra::{DMatrix, DVector};
use proptest::prelude::*;
use reduced_basis::algs::gram_schmidt::{GramSchmidt, orthonormality_defect};
use reduced_basis::config::OfflineConfig;
use reduced_basis::data::basis::BasisStore;
use reduced_basis::problems::{Euclidean, InnerProduct};
use reduced_basis::rom_error::RomError;

/// SPD matrix `L Lᵀ + n I` from arbitrary entries.
fn spd(n: usize, entries: &[f64]) -> DMatrix<f64> {
    let l = DMatrix::from_fn(n, n, |i, j| if j <= i { entries[i * n + j] } else { 0.0 });
    &l * l.transpose() + DMatrix::identity(n, n) * n as f64
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn gram_matrix_is_identity(
        n in 2usize..8,
        seed in prop::collection::vec(-1.0f64..1.0, 64),
        candidates in prop::collection::vec(prop::collection::vec(-10.0f64..10.0, 8), 1..6),
    ) {
        let x = spd(n, &seed);
        let gs = GramSchmidt::new(&x, 1e-4);
        let mut basis = BasisStore::new();
        for raw in candidates.iter().take(n) {
            let candidate = DVector::from_column_slice(&raw[..n]);
            match basis.enrich_with(candidate, |z| gs.apply(z)) {
                Ok(()) => {
                    prop_assert!(orthonormality_defect(&x, basis.as_slice()) < 1e-10);
                }
                Err(RomError::NumericalDegeneracy { .. }) => {}
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            }
        }
        prop_assert!(basis.size() <= n);
    }

    #[test]
    fn near_dependent_candidates_at_default_tolerance(
        n in 3usize..8,
        seed in prop::collection::vec(-1.0f64..1.0, 64),
        spanning in prop::collection::vec(prop::collection::vec(-10.0f64..10.0, 8), 2..4),
        coefficients in prop::collection::vec(-5.0f64..5.0, 4),
        direction in prop::collection::vec(-1.0f64..1.0, 8),
        exponent in -7.5f64..-2.0,
    ) {
        let x = spd(n, &seed);
        let gs = GramSchmidt::new(&x, OfflineConfig::default().degeneracy_tolerance);
        let mut basis = BasisStore::new();
        for raw in spanning.iter().take(n - 1) {
            let _ = basis.enrich_with(DVector::from_column_slice(&raw[..n]), |z| gs.apply(z));
        }
        prop_assume!(!basis.is_empty());
        let combination = basis
            .as_slice()
            .iter()
            .zip(&coefficients)
            .fold(DVector::zeros(n), |acc, (z, c)| acc + z * *c);
        let scale = InnerProduct::norm(&x, &combination).max(1.0) * 10f64.powf(exponent);
        let candidate = combination + DVector::from_column_slice(&direction[..n]) * scale;
        match basis.enrich_with(candidate, |z| gs.apply(z)) {
            Ok(()) => prop_assert!(orthonormality_defect(&x, basis.as_slice()) < 1e-10),
            Err(RomError::NumericalDegeneracy { .. }) => {}
            Err(e) => return Err(TestCaseError::fail(e.to_string())),
        }
    }

    #[test]
    fn first_vector_is_normalized_only(raw in prop::collection::vec(0.1f64..5.0, 1..10)) {
        let v = DVector::from_vec(raw);
        let mut basis = BasisStore::new();
        basis.enrich(v.clone()).unwrap();
        GramSchmidt::new(Euclidean, 1e-12).apply(&mut basis).unwrap();
        let z = &basis.as_slice()[0];
        prop_assert!((Euclidean.norm(z) - 1.0).abs() < 1e-12);
        let scaled = z * v.norm();
        for (a, b) in scaled.iter().zip(v.iter()) {
            prop_assert!((a - b).abs() <= 1e-12 * b.abs().max(1.0));
        }
    }
}

#[test]
fn enrichment_of_an_empty_basis_fails_fast() {
    let mut basis = BasisStore::new();
    assert!(matches!(
        GramSchmidt::new(Euclidean, 1e-10).apply(&mut basis),
        Err(RomError::Precondition(_))
    ));
}
