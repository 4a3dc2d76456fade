//! Error analysis of a reduced problem over a test set.
//!
//! For every `mu` in the test set and every `n = 1..=N` the truth and
//! reduced solutions are compared; per `n` the driver reports the geometric
//! means of the error and of its bound, and the min / geometric mean / max
//! of the effectivity `bound / error`. The same table is produced for the
//! output.

use crate::data::parameter::{Parameter, ParameterSet};
use crate::problems::TruthProblem;
use crate::reduction::elliptic_coercive::ReducedProblem;
use crate::rom_error::RomError;
use itertools::{Itertools, MinMaxResult};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::fmt;

/// Ratio `bound / error`, undefined when the error is exactly zero.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Effectivity {
    Value(f64),
    Undefined,
}

impl Effectivity {
    pub fn new(bound: f64, error: f64) -> Self {
        if error == 0.0 {
            Effectivity::Undefined
        } else {
            Effectivity::Value(bound / error)
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Effectivity::Value(v) => Some(v),
            Effectivity::Undefined => None,
        }
    }
}

impl fmt::Display for Effectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effectivity::Value(v) => write!(f, "{v:.4e}"),
            Effectivity::Undefined => f.write_str("undefined"),
        }
    }
}

/// Statistics for one reduced dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorAnalysisRow {
    pub n: usize,
    pub gmean_error: f64,
    pub gmean_bound: f64,
    pub min_effectivity: Effectivity,
    pub gmean_effectivity: Effectivity,
    pub max_effectivity: Effectivity,
    /// Test points whose error was exactly zero.
    pub undefined_effectivities: usize,
}

/// One row per reduced dimension.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErrorAnalysisTable {
    pub rows: Vec<ErrorAnalysisRow>,
}

impl fmt::Display for ErrorAnalysisTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>4} {:>12} {:>12} {:>12} {:>12} {:>12}",
            "N", "gmean(err)", "gmean(delta)", "min(eff)", "gmean(eff)", "max(eff)"
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>4} {:>12.4e} {:>12.4e} {:>12} {:>12} {:>12}",
                row.n,
                row.gmean_error,
                row.gmean_bound,
                row.min_effectivity.to_string(),
                row.gmean_effectivity.to_string(),
                row.max_effectivity.to_string()
            )?;
        }
        Ok(())
    }
}

/// Solution and output tables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErrorAnalysisReport {
    pub solution: ErrorAnalysisTable,
    pub output: ErrorAnalysisTable,
}

/// Errors and bounds at one test point, indexed by `n - 1`.
struct PointSample {
    solution: Vec<(f64, f64)>,
    output: Vec<(f64, f64)>,
}

fn sample_point<T, R>(
    truth: &T,
    reduced: &R,
    mu: &Parameter,
    n_max: usize,
) -> Result<PointSample, RomError>
where
    T: TruthProblem + ?Sized,
    R: ReducedProblem + ?Sized,
{
    let u = truth.solve(mu)?;
    let s = truth.output(mu, &u)?;
    let mut solution = Vec::with_capacity(n_max);
    let mut output = Vec::with_capacity(n_max);
    for n in 1..=n_max {
        let u_n = reduced.solve(n, mu)?;
        let error = truth.error_norm(mu, &(&u - reduced.reconstruct(&u_n)?))?;
        solution.push((error, reduced.error_bound(n, mu, &u_n)?));
        let s_n = reduced.output(n, mu, &u_n)?;
        output.push(((s - s_n).abs(), reduced.output_error_bound(n, mu, &u_n)?));
    }
    Ok(PointSample { solution, output })
}

fn gmean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v.ln(), c + 1));
    if count == 0 { f64::NAN } else { (sum / count as f64).exp() }
}

fn tabulate(samples: &[Vec<(f64, f64)>], n_max: usize) -> ErrorAnalysisTable {
    let rows = (0..n_max)
        .map(|i| {
            let column: Vec<(f64, f64)> = samples.iter().map(|s| s[i]).collect();
            let effectivities: Vec<f64> = column
                .iter()
                .filter_map(|&(error, bound)| Effectivity::new(bound, error).value())
                .collect();
            let (min, max) = match effectivities.iter().copied().minmax_by(f64::total_cmp) {
                MinMaxResult::NoElements => (Effectivity::Undefined, Effectivity::Undefined),
                MinMaxResult::OneElement(v) => (Effectivity::Value(v), Effectivity::Value(v)),
                MinMaxResult::MinMax(lo, hi) => (Effectivity::Value(lo), Effectivity::Value(hi)),
            };
            ErrorAnalysisRow {
                n: i + 1,
                gmean_error: gmean(column.iter().map(|c| c.0)),
                gmean_bound: gmean(column.iter().map(|c| c.1)),
                min_effectivity: min,
                gmean_effectivity: if effectivities.is_empty() {
                    Effectivity::Undefined
                } else {
                    Effectivity::Value(gmean(effectivities.iter().copied()))
                },
                max_effectivity: max,
                undefined_effectivities: column.len() - effectivities.len(),
            }
        })
        .collect();
    ErrorAnalysisTable { rows }
}

/// Compare `reduced` against `truth` on `xi_test` for `n = 1..=n_max`.
///
/// `n_max` defaults to the basis size. Test points are evaluated in
/// parallel; the tables do not depend on evaluation order.
///
/// # Errors
/// - `EmptyTrainingSet` if `xi_test` is empty.
/// - `Precondition` if `n_max` is zero or exceeds the basis size.
/// - Any truth or reduced solve failure.
pub fn error_analysis<T, R>(
    truth: &T,
    reduced: &R,
    xi_test: &ParameterSet,
    n_max: Option<usize>,
) -> Result<ErrorAnalysisReport, RomError>
where
    T: TruthProblem + ?Sized,
    R: ReducedProblem + ?Sized,
{
    if xi_test.is_empty() {
        return Err(RomError::EmptyTrainingSet);
    }
    let size = reduced.basis().size();
    let n_max = n_max.unwrap_or(size);
    if n_max == 0 || n_max > size {
        return Err(RomError::Precondition(format!(
            "error analysis up to N = {n_max} with a basis of size {size}"
        )));
    }
    log::info!("error analysis on {} test parameters, N = 1..={n_max}", xi_test.len());

    let samples = xi_test
        .as_slice()
        .par_iter()
        .map(|mu| sample_point(truth, reduced, mu, n_max))
        .collect::<Result<Vec<_>, _>>()?;
    let (solution, output): (Vec<_>, Vec<_>) =
        samples.into_iter().map(|s| (s.solution, s.output)).unzip();

    let report = ErrorAnalysisReport {
        solution: tabulate(&solution, n_max),
        output: tabulate(&output, n_max),
    };
    for (name, table) in [("solution", &report.solution), ("output", &report.output)] {
        log::info!("error analysis ({name}):\n{table}");
        for row in table.rows.iter().filter(|r| r.undefined_effectivities > 0) {
            log::warn!(
                "N = {}: effectivity undefined at {} test points (zero error)",
                row.n,
                row.undefined_effectivities
            );
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_error_is_undefined() {
        assert_eq!(Effectivity::new(1.0, 0.0), Effectivity::Undefined);
        assert_eq!(Effectivity::new(2.0, 0.5), Effectivity::Value(4.0));
        assert_eq!(Effectivity::Undefined.to_string(), "undefined");
    }

    #[test]
    fn table_aggregates_per_n() {
        let samples = vec![
            vec![(1.0, 2.0), (0.0, 1e-3)],
            vec![(4.0, 8.0), (0.5, 1.0)],
        ];
        let table = tabulate(&samples, 2);
        let first = &table.rows[0];
        assert!((first.gmean_error - 2.0).abs() < 1e-12);
        assert!((first.gmean_bound - 4.0).abs() < 1e-12);
        assert_eq!(first.min_effectivity, Effectivity::Value(2.0));
        assert_eq!(first.undefined_effectivities, 0);
        let second = &table.rows[1];
        assert_eq!(second.undefined_effectivities, 1);
        assert_eq!(second.min_effectivity, Effectivity::Value(2.0));
        assert_eq!(second.max_effectivity, Effectivity::Value(2.0));
        assert_eq!(second.gmean_error, 0.0);
    }

    #[test]
    fn all_zero_errors_leave_effectivity_undefined() {
        let table = tabulate(&[vec![(0.0, 0.0)]], 1);
        assert_eq!(table.rows[0].gmean_effectivity, Effectivity::Undefined);
        assert_eq!(table.rows[0].min_effectivity, Effectivity::Undefined);
    }
}
