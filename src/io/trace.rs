//! Greedy post-processing trace.
//!
//! Two append-only text files in the post-processing folder, one line per
//! offline iteration:
//!
//! - `delta_max.txt`: `"<N> <delta_max>"`
//! - `mu_greedy.txt`: `"<mu_greedy>"`
//!
//! Lines are never rewritten. Each record is a single `write_all` of a full
//! line followed by `sync_data`; on load a torn trailing line or a count
//! mismatch between the two files is reported as corruption.
//!
//! `delta_max.txt` is always appended first, so an interrupted append leaves
//! exactly one orphan `delta_max` record. [`GreedyTrace::recover`] drops it,
//! and the greedy step of that iteration is then redone by the offline stage.

use crate::data::parameter::Parameter;
use crate::io::write_atomic;
use crate::rom_error::RomError;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const DELTA_MAX_FILE: &str = "delta_max.txt";
const MU_GREEDY_FILE: &str = "mu_greedy.txt";

/// One greedy iteration: reduced dimension, maximum bound, selected parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceRecord {
    pub n: usize,
    pub delta_max: f64,
    pub mu: Parameter,
}

/// Handle on the trace files of one post-processing folder.
#[derive(Clone, Debug)]
pub struct GreedyTrace {
    folder: PathBuf,
}

impl GreedyTrace {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Append one record to both files.
    pub fn append(&self, record: &TraceRecord) -> Result<(), RomError> {
        fs::create_dir_all(&self.folder)?;
        append_line(
            &self.folder.join(DELTA_MAX_FILE),
            &format!("{} {}\n", record.n, record.delta_max),
        )?;
        append_line(
            &self.folder.join(MU_GREEDY_FILE),
            &format!("{}\n", record.mu),
        )
    }

    /// Drop an orphan trailing `delta_max` record left by an interrupted
    /// [`append`](Self::append). Returns whether a record was dropped.
    ///
    /// Any other disagreement between the files is left for
    /// [`load`](Self::load) to report.
    pub fn recover(&self) -> Result<bool, RomError> {
        let delta_path = self.folder.join(DELTA_MAX_FILE);
        let deltas = read_lines(&delta_path)?;
        let mus = read_lines(&self.folder.join(MU_GREEDY_FILE))?;
        if deltas.len() != mus.len() + 1 {
            return Ok(false);
        }
        log::warn!(
            "greedy trace: dropping orphan record `{}` from {}",
            deltas[mus.len()],
            delta_path.display()
        );
        let kept: String = deltas[..mus.len()].iter().map(|l| format!("{l}\n")).collect();
        write_atomic(&delta_path, kept.as_bytes())?;
        Ok(true)
    }

    /// Load every record, in append order. Missing files mean an empty trace.
    pub fn load(&self) -> Result<Vec<TraceRecord>, RomError> {
        let deltas = read_lines(&self.folder.join(DELTA_MAX_FILE))?;
        let mus = read_lines(&self.folder.join(MU_GREEDY_FILE))?;
        if deltas.len() != mus.len() {
            return Err(RomError::PersistenceCorruption(format!(
                "{} holds {} records but {} holds {}",
                DELTA_MAX_FILE,
                deltas.len(),
                MU_GREEDY_FILE,
                mus.len()
            )));
        }
        let mut records = Vec::with_capacity(deltas.len());
        for (line, mu) in deltas.iter().zip(&mus) {
            let mut fields = line.split_whitespace();
            let (Some(n), Some(delta), None) = (fields.next(), fields.next(), fields.next()) else {
                return Err(RomError::PersistenceCorruption(format!(
                    "malformed {DELTA_MAX_FILE} record `{line}`"
                )));
            };
            let n = n.parse::<usize>().map_err(|e| {
                RomError::PersistenceCorruption(format!("bad N in `{line}`: {e}"))
            })?;
            let delta_max = delta.parse::<f64>().map_err(|e| {
                RomError::PersistenceCorruption(format!("bad delta_max in `{line}`: {e}"))
            })?;
            records.push(TraceRecord {
                n,
                delta_max,
                mu: mu.parse()?,
            });
        }
        for (i, record) in records.iter().enumerate() {
            if record.n != i + 1 {
                return Err(RomError::PersistenceCorruption(format!(
                    "trace record {} is labelled N = {}",
                    i + 1,
                    record.n
                )));
            }
        }
        Ok(records)
    }
}

fn append_line(path: &Path, line: &str) -> Result<(), RomError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.sync_data()?;
    Ok(())
}

fn read_lines(path: &Path) -> Result<Vec<String>, RomError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path)?;
    if !text.is_empty() && !text.ends_with('\n') {
        return Err(RomError::PersistenceCorruption(format!(
            "{} ends with a partially written record",
            path.display()
        )));
    }
    Ok(text.lines().map(str::to_owned).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rb-trace-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn record(n: usize, delta_max: f64, mu: &[f64]) -> TraceRecord {
        TraceRecord {
            n,
            delta_max,
            mu: Parameter::new(mu.to_vec()),
        }
    }

    #[test]
    fn appends_are_order_stable() {
        let trace = GreedyTrace::new(scratch("order"));
        assert!(trace.load().unwrap().is_empty());
        trace.append(&record(1, 0.5, &[1.0, 2.0])).unwrap();
        trace.append(&record(2, 0.125, &[3.0, 0.25])).unwrap();
        let records = trace.load().unwrap();
        assert_eq!(records, vec![record(1, 0.5, &[1.0, 2.0]), record(2, 0.125, &[3.0, 0.25])]);
        let text = fs::read_to_string(trace.folder().join(DELTA_MAX_FILE)).unwrap();
        assert_eq!(text, "1 0.5\n2 0.125\n");
    }

    #[test]
    fn torn_line_is_corruption() {
        let trace = GreedyTrace::new(scratch("torn"));
        trace.append(&record(1, 0.5, &[1.0])).unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(trace.folder().join(DELTA_MAX_FILE))
            .unwrap();
        file.write_all(b"2 0.2").unwrap();
        assert!(matches!(trace.load(), Err(RomError::PersistenceCorruption(_))));
    }

    #[test]
    fn orphan_delta_record_is_recovered() {
        let trace = GreedyTrace::new(scratch("orphan"));
        assert!(!trace.recover().unwrap());
        trace.append(&record(1, 0.5, &[1.0])).unwrap();
        append_line(&trace.folder().join(DELTA_MAX_FILE), "2 0.25\n").unwrap();
        assert!(trace.recover().unwrap());
        assert_eq!(trace.load().unwrap(), vec![record(1, 0.5, &[1.0])]);
        trace.append(&record(2, 0.125, &[2.0])).unwrap();
        assert_eq!(trace.load().unwrap().len(), 2);
        assert!(!trace.recover().unwrap());
    }

    #[test]
    fn unequal_files_are_corruption() {
        let trace = GreedyTrace::new(scratch("unequal"));
        trace.append(&record(1, 0.5, &[1.0])).unwrap();
        append_line(&trace.folder().join(MU_GREEDY_FILE), "2\n").unwrap();
        assert!(!trace.recover().unwrap());
        assert!(matches!(trace.load(), Err(RomError::PersistenceCorruption(_))));
    }
}
