mod util;

use nalgebra::DVector;
use reduced_basis::config::OfflineConfig;
use reduced_basis::data::basis::BasisStore;
use reduced_basis::data::parameter::Parameter;
use reduced_basis::io::GreedyTrace;
use reduced_basis::problems::{InnerProduct, ThermalBlock, TruthProblem};
use reduced_basis::reduction::{
    EllipticCoerciveReducedProblem, OfflineOutcome, OfflineStage, OfflineState, ReducedProblem,
};
use reduced_basis::rom_error::RomError;
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use util::*;

fn config(folder: &Path, n_max: usize) -> OfflineConfig {
    OfflineConfig {
        n_max,
        output_folder: folder.to_path_buf(),
        ..OfflineConfig::default()
    }
}

fn run(problem: &ThermalBlock, folder: &Path, n_max: usize) -> (OfflineOutcome, OfflineState) {
    let xi = training_set(problem, 40, 3);
    let mut reduced = EllipticCoerciveReducedProblem::new(problem);
    let mut stage = OfflineStage::new(problem, &mut reduced, config(folder, n_max)).unwrap();
    let outcome = stage.run(&xi).unwrap();
    (outcome, stage.state())
}

fn trace(folder: &Path) -> GreedyTrace {
    GreedyTrace::new(folder.join("post_processing"))
}

/// Remove the last `k` records from both trace files.
fn drop_trace_records(folder: &Path, k: usize) {
    for file in ["delta_max.txt", "mu_greedy.txt"] {
        let path: PathBuf = folder.join("post_processing").join(file);
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        let kept: String = lines[..lines.len() - k].iter().map(|l| format!("{l}\n")).collect();
        fs::write(&path, kept).unwrap();
    }
}

#[test]
#[serial]
fn greedy_bound_decreases_with_n() {
    let problem = ThermalBlock::new(4, 4).unwrap();
    let folder = scratch("monotone");
    let (outcome, state) = run(&problem, &folder, 4);
    assert_eq!(state, OfflineState::Converged);
    let OfflineOutcome::Converged { n, delta_max } = outcome else {
        panic!("expected convergence, got {outcome:?}");
    };
    assert_eq!(n, 4);

    let records = trace(&folder).load().unwrap();
    assert_eq!(records.iter().map(|r| r.n).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    for pair in records.windows(2) {
        assert!(
            pair[1].delta_max <= pair[0].delta_max * (1.0 + 1e-6),
            "delta_max grew from {} to {}",
            pair[0].delta_max,
            pair[1].delta_max
        );
    }
    // Four blocks span a four-dimensional manifold.
    assert!(delta_max < 1e-4 * records[0].delta_max);
    assert_eq!(delta_max, records[3].delta_max);

    let mut basis = BasisStore::new();
    assert!(basis.load(folder.join("basis"), "basis").unwrap());
    assert_eq!(basis.size(), 4);
    for i in 0..4 {
        for j in 0..4 {
            let g = problem.evaluate_form(&basis.as_slice()[i], &basis.as_slice()[j]);
            let target = if i == j { 1.0 } else { 0.0 };
            assert!((g - target).abs() < 1e-10, "Gram[{i}][{j}] = {g}");
        }
    }
    let _ = fs::remove_dir_all(&folder);
}

#[test]
#[serial]
fn rerun_of_a_complete_basis_is_idempotent() {
    let problem = ThermalBlock::new(3, 4).unwrap();
    let folder = scratch("rerun");
    let (first, _) = run(&problem, &folder, 3);
    let records = trace(&folder).load().unwrap();

    let (second, state) = run(&problem, &folder, 3);
    assert_eq!(state, OfflineState::Converged);
    assert_eq!(first, second);
    assert_eq!(trace(&folder).load().unwrap(), records);
    let _ = fs::remove_dir_all(&folder);
}

#[test]
#[serial]
fn interrupted_run_resumes_without_repeating_iterations() {
    let problem = ThermalBlock::new(4, 3).unwrap();
    let fresh = scratch("fresh");
    let (reference, _) = run(&problem, &fresh, 4);
    let reference_trace = trace(&fresh).load().unwrap();

    let resumed = scratch("resumed");
    run(&problem, &resumed, 2);
    let (outcome, state) = run(&problem, &resumed, 4);
    assert_eq!(state, OfflineState::Converged);
    assert!(matches!(outcome, OfflineOutcome::Converged { n: 4, .. }));
    let resumed_trace = trace(&resumed).load().unwrap();
    assert_eq!(resumed_trace.len(), 4);
    for (a, b) in resumed_trace.iter().zip(&reference_trace) {
        assert_eq!(a.n, b.n);
        assert_eq!(a.mu, b.mu);
        assert!((a.delta_max - b.delta_max).abs() <= 1e-9 * b.delta_max.abs().max(1e-300));
    }
    assert!(matches!(reference, OfflineOutcome::Converged { n: 4, .. }));
    let _ = fs::remove_dir_all(&fresh);
    let _ = fs::remove_dir_all(&resumed);
}

#[test]
#[serial]
fn pending_greedy_step_is_finished_on_resume() {
    let problem = ThermalBlock::new(3, 4).unwrap();
    let fresh = scratch("pending-fresh");
    run(&problem, &fresh, 3);
    let reference_trace = trace(&fresh).load().unwrap();

    let folder = scratch("pending");
    run(&problem, &folder, 2);
    // Basis of size 2, greedy record for N = 2 missing.
    drop_trace_records(&folder, 1);
    let snapshots_before = fs::read_dir(folder.join("snapshots")).unwrap().count();

    let (outcome, _) = run(&problem, &folder, 3);
    assert!(matches!(outcome, OfflineOutcome::Converged { n: 3, .. }));
    let records = trace(&folder).load().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[1].mu, reference_trace[1].mu);
    assert_eq!(records[2].mu, reference_trace[2].mu);
    // Only the third truth solve happened on resume.
    assert_eq!(fs::read_dir(folder.join("snapshots")).unwrap().count(), snapshots_before + 1);
    let _ = fs::remove_dir_all(&fresh);
    let _ = fs::remove_dir_all(&folder);
}

#[test]
#[serial]
fn interrupted_trace_append_is_recovered() {
    let problem = ThermalBlock::new(3, 4).unwrap();
    let fresh = scratch("torn-append-fresh");
    run(&problem, &fresh, 3);
    let reference_trace = trace(&fresh).load().unwrap();

    let folder = scratch("torn-append");
    run(&problem, &folder, 2);
    // The last delta_max line was written but its mu_greedy line was not.
    let mu_path = folder.join("post_processing").join("mu_greedy.txt");
    let text = fs::read_to_string(&mu_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    let kept: String = lines[..lines.len() - 1].iter().map(|l| format!("{l}\n")).collect();
    fs::write(&mu_path, kept).unwrap();

    let (outcome, state) = run(&problem, &folder, 3);
    assert_eq!(state, OfflineState::Converged);
    assert!(matches!(outcome, OfflineOutcome::Converged { n: 3, .. }));
    let records = trace(&folder).load().unwrap();
    assert_eq!(records.iter().map(|r| r.n).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(records[1].mu, reference_trace[1].mu);
    assert_eq!(records[2].mu, reference_trace[2].mu);
    let _ = fs::remove_dir_all(&fresh);
    let _ = fs::remove_dir_all(&folder);
}

#[test]
#[serial]
fn inconsistent_trace_is_corruption() {
    let problem = ThermalBlock::new(3, 2).unwrap();
    let folder = scratch("corrupt");
    run(&problem, &folder, 3);
    drop_trace_records(&folder, 2);

    let xi = training_set(&problem, 10, 3);
    let mut reduced = EllipticCoerciveReducedProblem::new(&problem);
    let mut stage = OfflineStage::new(&problem, &mut reduced, config(&folder, 4)).unwrap();
    assert!(matches!(stage.run(&xi), Err(RomError::PersistenceCorruption(_))));
    let _ = fs::remove_dir_all(&folder);
}

#[test]
#[serial]
fn linearly_dependent_snapshot_stalls() {
    let problem = ThermalBlock::new(2, 4).unwrap();
    let folder = scratch("degenerate");
    let (outcome, state) = run(&problem, &folder, 3);
    let OfflineOutcome::Stalled { n, reason, mu } = outcome else {
        panic!("expected a stall, got {outcome:?}");
    };
    assert_eq!(n, 2);
    assert_eq!(state, OfflineState::Stalled(2));
    assert!(matches!(reason, RomError::NumericalDegeneracy { .. }));
    assert_eq!(trace(&folder).load().unwrap().last().map(|r| r.mu.clone()), Some(mu));
    let mut basis = BasisStore::new();
    basis.load(folder.join("basis"), "basis").unwrap();
    assert_eq!(basis.size(), 2);
    let _ = fs::remove_dir_all(&folder);
}

/// Truth problem whose solver never converges.
struct Diverging<'a>(&'a ThermalBlock);

impl InnerProduct for Diverging<'_> {
    fn evaluate_form(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        self.0.evaluate_form(a, b)
    }
}

impl TruthProblem for Diverging<'_> {
    fn dimension(&self) -> usize {
        self.0.dimension()
    }

    fn solve(&self, mu: &Parameter) -> Result<DVector<f64>, RomError> {
        Err(RomError::SolverDivergence(format!("no convergence at {mu}")))
    }

    fn output(&self, mu: &Parameter, solution: &DVector<f64>) -> Result<f64, RomError> {
        self.0.output(mu, solution)
    }
}

#[test]
#[serial]
fn truth_divergence_stalls_before_enrichment() {
    let problem = ThermalBlock::new(2, 4).unwrap();
    let truth = Diverging(&problem);
    let folder = scratch("diverging");
    let xi = training_set(&problem, 5, 1);
    let mut reduced = EllipticCoerciveReducedProblem::new(&problem);
    let mut stage = OfflineStage::new(&truth, &mut reduced, config(&folder, 2)).unwrap();
    let outcome = stage.run(&xi).unwrap();
    assert_eq!(
        outcome,
        OfflineOutcome::Stalled {
            mu: xi.as_slice()[0].clone(),
            n: 0,
            reason: RomError::SolverDivergence(format!("no convergence at {}", xi.as_slice()[0])),
        }
    );
    assert_eq!(stage.state(), OfflineState::Stalled(0));
    assert!(reduced.basis().is_empty());
    assert!(!folder.join("basis").exists());
    let _ = fs::remove_dir_all(&folder);
}
