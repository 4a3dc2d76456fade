//! BasisStore: the ordered reduced basis `Z`.
//!
//! The store is the sole owner and writer of the basis vectors. Offline
//! enrichment appends a raw snapshot which is then orthonormalized in place
//! (see [`crate::algs::gram_schmidt`]); during offline the store only grows.
//! Error analysis at intermediate sizes goes through [`BasisStore::truncate`],
//! a read-only view of the leading vectors.
//!
//! # Invariants
//!
//! - All vectors have the same length.
//! - After every successful enrichment the vectors are orthonormal in the
//!   problem inner product (checked by the orthogonalizer, not the store).

use crate::debug_invariants::DebugInvariants;
use crate::io::vectors::{read_vectors, write_vectors};
use crate::rom_error::RomError;
use nalgebra::DVector;
use std::fs;
use std::path::{Path, PathBuf};

/// Ordered collection of basis vectors.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasisStore {
    vectors: Vec<DVector<f64>>,
}

impl BasisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw (not yet orthogonalized) snapshot.
    ///
    /// # Errors
    /// `DimensionMismatch` if the snapshot length differs from the basis.
    pub fn enrich(&mut self, snapshot: DVector<f64>) -> Result<(), RomError> {
        if let Some(first) = self.vectors.first() {
            if first.len() != snapshot.len() {
                return Err(RomError::DimensionMismatch {
                    expected: first.len(),
                    found: snapshot.len(),
                });
            }
        }
        self.vectors.push(snapshot);
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        self.debug_assert_invariants();
        Ok(())
    }

    /// Append `snapshot` and run `finish` on the store; if `finish` fails the
    /// snapshot is removed again and the store is left as it was.
    pub fn enrich_with<F>(&mut self, snapshot: DVector<f64>, finish: F) -> Result<(), RomError>
    where
        F: FnOnce(&mut BasisStore) -> Result<(), RomError>,
    {
        let before = self.vectors.len();
        self.enrich(snapshot)?;
        if let Err(e) = finish(self) {
            self.vectors.truncate(before);
            return Err(e);
        }
        Ok(())
    }

    /// Current reduced dimension `N`.
    #[inline]
    pub fn size(&self) -> usize {
        self.vectors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Length of the stored vectors (truth dimension), if any.
    pub fn vector_len(&self) -> Option<usize> {
        self.vectors.first().map(|v| v.len())
    }

    pub fn get(&self, i: usize) -> Option<&DVector<f64>> {
        self.vectors.get(i)
    }

    pub fn as_slice(&self) -> &[DVector<f64>] {
        &self.vectors
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DVector<f64>> {
        self.vectors.iter()
    }

    /// Mutable newest vector together with the ones before it.
    pub fn split_last_mut(&mut self) -> Option<(&mut DVector<f64>, &[DVector<f64>])> {
        self.vectors
            .split_last_mut()
            .map(|(last, rest)| (last, &*rest))
    }

    /// Read-only view of the first `n` vectors.
    ///
    /// # Errors
    /// `Precondition` if `n` exceeds the current size.
    pub fn truncate(&self, n: usize) -> Result<BasisView<'_>, RomError> {
        if n > self.vectors.len() {
            return Err(RomError::Precondition(format!(
                "cannot view {n} basis functions of a basis of size {}",
                self.vectors.len()
            )));
        }
        Ok(BasisView {
            vectors: &self.vectors[..n],
        })
    }

    /// Full view of the store.
    pub fn view(&self) -> BasisView<'_> {
        BasisView {
            vectors: &self.vectors,
        }
    }

    /// Persist the ordered basis as `<directory>/<label>.basis`.
    pub fn save(&self, directory: impl AsRef<Path>, label: &str) -> Result<(), RomError> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;
        write_vectors(&basis_path(directory, label), &self.vectors)
    }

    /// Restore a basis written by [`BasisStore::save`], replacing the contents.
    ///
    /// Returns `Ok(false)` and leaves the store untouched if no file exists.
    pub fn load(&mut self, directory: impl AsRef<Path>, label: &str) -> Result<bool, RomError> {
        let path = basis_path(directory.as_ref(), label);
        if !path.exists() {
            return Ok(false);
        }
        let vectors = read_vectors(&path)?;
        log::debug!("loaded {} basis functions from {}", vectors.len(), path.display());
        self.vectors = vectors;
        Ok(true)
    }

    /// Whether `<directory>/<label>.basis` exists.
    pub fn exists(directory: impl AsRef<Path>, label: &str) -> bool {
        basis_path(directory.as_ref(), label).exists()
    }
}

fn basis_path(directory: &Path, label: &str) -> PathBuf {
    directory.join(format!("{label}.basis"))
}

impl DebugInvariants for BasisStore {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "BasisStore");
    }

    fn validate_invariants(&self) -> Result<(), RomError> {
        if let Some(len) = self.vector_len() {
            if let Some(bad) = self.vectors.iter().find(|v| v.len() != len) {
                return Err(RomError::DimensionMismatch {
                    expected: len,
                    found: bad.len(),
                });
            }
        }
        Ok(())
    }
}

/// Borrowed prefix of a [`BasisStore`].
#[derive(Clone, Copy, Debug)]
pub struct BasisView<'a> {
    vectors: &'a [DVector<f64>],
}

impl<'a> BasisView<'a> {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn as_slice(&self) -> &'a [DVector<f64>] {
        self.vectors
    }

    /// Expand reduced coefficients into a full-order vector: `Σ c_i Z_i`.
    pub fn reconstruct(&self, coefficients: &DVector<f64>) -> Result<DVector<f64>, RomError> {
        if coefficients.len() != self.vectors.len() {
            return Err(RomError::DimensionMismatch {
                expected: self.vectors.len(),
                found: coefficients.len(),
            });
        }
        let first = self.vectors.first().ok_or_else(|| {
            RomError::Precondition("cannot reconstruct from an empty basis".into())
        })?;
        let mut out = DVector::zeros(first.len());
        for (z, c) in self.vectors.iter().zip(coefficients.iter()) {
            out.axpy(*c, z, 1.0);
        }
        Ok(out)
    }
}
