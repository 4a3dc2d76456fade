#![allow(dead_code)]
use reduced_basis::data::parameter::{ParameterSet, Sampling};
use reduced_basis::function_space::{ElementSpec, FunctionSpace};
use reduced_basis::mesh::Mesh;
use reduced_basis::mesh_generation::unit_square_mesh;
use reduced_basis::problems::ThermalBlock;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::sync::Arc;

/// Fresh per-process scratch directory under the system temp dir.
pub fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rb-it-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// 3x3 quadrilateral mesh of the unit square.
pub fn unit_square() -> Arc<Mesh> {
    Arc::new(unit_square_mesh(3, 3).unwrap())
}

pub fn taylor_hood() -> ElementSpec {
    ElementSpec::mixed(vec![ElementSpec::vector(2, 2), ElementSpec::lagrange(1)])
}

pub fn space(element: ElementSpec) -> FunctionSpace {
    FunctionSpace::new(unit_square(), element).unwrap()
}

/// Uniform training set drawn with a fixed seed.
pub fn training_set(problem: &ThermalBlock, n: usize, seed: u64) -> ParameterSet {
    let space = problem.parameter_space(0.1, 10.0).unwrap();
    ParameterSet::sample(&space, n, Sampling::LogUniform, &mut ChaCha8Rng::seed_from_u64(seed)).unwrap()
}

/// `|a - b| <= atol + rtol * |b|` for every pair.
pub fn assert_isclose(got: &[f64], want: &[f64]) {
    assert_eq!(got.len(), want.len());
    for (i, (a, b)) in got.iter().zip(want).enumerate() {
        assert!(
            (a - b).abs() <= 1e-8 + 1e-5 * b.abs(),
            "entry {i}: {a} != {b}\n got={got:?}\nwant={want:?}"
        );
    }
}
