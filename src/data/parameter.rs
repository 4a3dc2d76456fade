//! Parameter vectors (`mu`), parameter boxes and training/test sets.
//!
//! A [`ParameterSet`] is the ordered, read-only collection the greedy search
//! iterates over (`xi_train`) or the error analysis evaluates (`xi_test`).
//! Sets are sampled from a [`ParameterSpace`] with an injectable random
//! source, and can be exported/imported as one parameter per text line.

use crate::io::write_atomic;
use crate::rom_error::RomError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::str::FromStr;

/// A point of the parameter domain.
///
/// Equality and hashing are bitwise on the components so that a parameter
/// can key caches and reload decisions; `Display` prints the shortest
/// representation that parses back to the same bits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Parameter(Vec<f64>);

impl Parameter {
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        Self(values.into())
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of components.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize) -> Option<f64> {
        self.0.get(i).copied()
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl Eq for Parameter {}

impl Hash for Parameter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for v in &self.0 {
            v.to_bits().hash(state);
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

impl FromStr for Parameter {
    type Err = RomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| {
                RomError::PersistenceCorruption(format!("malformed parameter `{s}`"))
            })?;
        let values = inner
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<f64>().map_err(|e| {
                    RomError::PersistenceCorruption(format!(
                        "malformed parameter component `{part}`: {e}"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(values))
    }
}

/// A box `[min_0, max_0] x ... x [min_{d-1}, max_{d-1}]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    ranges: Vec<(f64, f64)>,
}

impl ParameterSpace {
    pub fn new(ranges: Vec<(f64, f64)>) -> Result<Self, RomError> {
        if ranges.is_empty() {
            return Err(RomError::Configuration(
                "parameter space needs at least one range".into(),
            ));
        }
        for (i, &(lo, hi)) in ranges.iter().enumerate() {
            if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
                return Err(RomError::Configuration(format!(
                    "invalid range {i}: [{lo}, {hi}]"
                )));
            }
        }
        Ok(Self { ranges })
    }

    pub fn dimension(&self) -> usize {
        self.ranges.len()
    }

    pub fn ranges(&self) -> &[(f64, f64)] {
        &self.ranges
    }

    pub fn contains(&self, mu: &Parameter) -> bool {
        mu.len() == self.dimension()
            && mu
                .as_slice()
                .iter()
                .zip(&self.ranges)
                .all(|(v, &(lo, hi))| lo <= *v && *v <= hi)
    }

    /// Lower corner of the box.
    pub fn min_corner(&self) -> Parameter {
        Parameter::new(self.ranges.iter().map(|r| r.0).collect::<Vec<_>>())
    }
}

/// Distribution used by [`ParameterSet::sample`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sampling {
    /// Independent uniform draws per component.
    #[default]
    Uniform,
    /// Uniform in `ln(mu)`; every range must be strictly positive.
    LogUniform,
    /// Tensor grid with `m` equispaced values per component, `m^d >= n`,
    /// in lexicographic order and cut after `n` points.
    Equispaced,
}

/// Finite ordered collection of parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    points: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new(points: Vec<Parameter>) -> Self {
        Self { points }
    }

    /// Draw `n` parameters from `space`.
    pub fn sample<R: Rng + ?Sized>(
        space: &ParameterSpace,
        n: usize,
        sampling: Sampling,
        rng: &mut R,
    ) -> Result<Self, RomError> {
        let points = match sampling {
            Sampling::Uniform => (0..n)
                .map(|_| {
                    Parameter::new(
                        space
                            .ranges()
                            .iter()
                            .map(|&(lo, hi)| if lo == hi { lo } else { rng.gen_range(lo..=hi) })
                            .collect::<Vec<_>>(),
                    )
                })
                .collect(),
            Sampling::LogUniform => {
                if let Some((lo, hi)) = space.ranges().iter().find(|r| r.0 <= 0.0) {
                    return Err(RomError::Configuration(format!(
                        "log-uniform sampling needs a positive range, got [{lo}, {hi}]"
                    )));
                }
                (0..n)
                    .map(|_| {
                        Parameter::new(
                            space
                                .ranges()
                                .iter()
                                .map(|&(lo, hi)| {
                                    let (a, b) = (lo.ln(), hi.ln());
                                    if a == b { lo } else { rng.gen_range(a..=b).exp() }
                                })
                                .collect::<Vec<_>>(),
                        )
                    })
                    .collect()
            }
            Sampling::Equispaced => equispaced(space, n),
        };
        Ok(Self { points })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.points.iter()
    }

    pub fn as_slice(&self) -> &[Parameter] {
        &self.points
    }

    pub fn get(&self, i: usize) -> Option<&Parameter> {
        self.points.get(i)
    }

    /// Write one parameter per line, replacing `path` atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RomError> {
        let mut text = String::new();
        for mu in &self.points {
            text.push_str(&mu.to_string());
            text.push('\n');
        }
        write_atomic(path.as_ref(), text.as_bytes())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RomError> {
        let text = fs::read_to_string(path.as_ref())?;
        let points = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Parameter::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { points })
    }

    /// Import `path` when it holds exactly `n` parameters of the right
    /// dimension, otherwise sample and export a fresh set.
    ///
    /// Returns the set and whether it was imported.
    pub fn import_or_sample<R: Rng + ?Sized>(
        path: impl AsRef<Path>,
        space: &ParameterSpace,
        n: usize,
        sampling: Sampling,
        enable_import: bool,
        rng: &mut R,
    ) -> Result<(Self, bool), RomError> {
        let path = path.as_ref();
        if enable_import && path.exists() {
            match Self::load(path) {
                Ok(set) if set.len() == n && set.iter().all(|mu| mu.len() == space.dimension()) => {
                    log::info!("imported {n} parameters from {}", path.display());
                    return Ok((set, true));
                }
                Ok(set) => log::info!(
                    "ignoring {}: holds {} parameters, {n} requested",
                    path.display(),
                    set.len()
                ),
                Err(e) => log::warn!("ignoring {}: {e}", path.display()),
            }
        }
        let set = Self::sample(space, n, sampling, rng)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        set.save(path)?;
        Ok((set, false))
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

fn equispaced(space: &ParameterSpace, n: usize) -> Vec<Parameter> {
    if n == 0 {
        return Vec::new();
    }
    let d = space.dimension();
    let mut m = 1usize;
    while m.checked_pow(d as u32).is_some_and(|total| total < n) {
        m += 1;
    }
    let axis = |k: usize, (lo, hi): (f64, f64)| {
        if m == 1 {
            0.5 * (lo + hi)
        } else {
            lo + (hi - lo) * k as f64 / (m - 1) as f64
        }
    };
    let mut points = Vec::with_capacity(n);
    let mut index = vec![0usize; d];
    while points.len() < n {
        points.push(Parameter::new(
            index
                .iter()
                .zip(space.ranges())
                .map(|(&k, &r)| axis(k, r))
                .collect::<Vec<_>>(),
        ));
        // odometer increment, last component fastest
        for slot in index.iter_mut().rev() {
            *slot += 1;
            if *slot < m {
                break;
            }
            *slot = 0;
        }
    }
    points
}
