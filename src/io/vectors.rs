//! Bit-exact binary storage of an ordered list of equally sized vectors.
//!
//! Layout (all header integers little-endian):
//!
//! | bytes | content |
//! |---|---|
//! | 8 | magic `RBVECS01` |
//! | 8 | `1` if the payload is little-endian, `0` otherwise |
//! | 8 | vector count |
//! | 8 | vector length |
//! | `count * length * 8` | `f64` payload in native byte order |

use crate::io::write_atomic;
use crate::rom_error::RomError;
use nalgebra::DVector;
use std::fs;
use std::path::Path;

const MAGIC: &[u8; 8] = b"RBVECS01";
const HEADER_LEN: usize = 32;

/// Write `vectors` to `path` atomically.
pub fn write_vectors(path: &Path, vectors: &[DVector<f64>]) -> Result<(), RomError> {
    let length = vectors.first().map_or(0, |v| v.len());
    if let Some(bad) = vectors.iter().find(|v| v.len() != length) {
        return Err(RomError::DimensionMismatch {
            expected: length,
            found: bad.len(),
        });
    }
    let mut bytes = Vec::with_capacity(HEADER_LEN + vectors.len() * length * 8);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&u64::from(cfg!(target_endian = "little")).to_le_bytes());
    bytes.extend_from_slice(&(vectors.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&(length as u64).to_le_bytes());
    for v in vectors {
        bytes.extend_from_slice(bytemuck::cast_slice::<f64, u8>(v.as_slice()));
    }
    write_atomic(path, &bytes)
}

/// Read vectors written by [`write_vectors`].
///
/// Any mismatch between header and payload is `PersistenceCorruption`.
pub fn read_vectors(path: &Path) -> Result<Vec<DVector<f64>>, RomError> {
    let bytes = fs::read(path)?;
    let corrupt = |what: String| RomError::PersistenceCorruption(format!("{}: {what}", path.display()));
    if bytes.len() < HEADER_LEN || &bytes[..8] != MAGIC {
        return Err(corrupt("missing vector file header".into()));
    }
    let word = |i: usize| {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[8 * i..8 * (i + 1)]);
        u64::from_le_bytes(buf)
    };
    let little = word(1) == 1;
    if little != cfg!(target_endian = "little") {
        return Err(corrupt("payload byte order differs from this platform".into()));
    }
    let count = word(2) as usize;
    let length = word(3) as usize;
    let expected = count
        .checked_mul(length)
        .and_then(|n| n.checked_mul(8))
        .ok_or_else(|| corrupt(format!("implausible shape {count} x {length}")))?;
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != expected {
        return Err(corrupt(format!(
            "expected {expected} payload bytes for {count} x {length}, found {}",
            payload.len()
        )));
    }
    if length == 0 {
        return Ok(vec![DVector::zeros(0); count]);
    }
    let values: Vec<f64> = bytemuck::pod_collect_to_vec(payload);
    Ok(values
        .chunks_exact(length)
        .map(|chunk| DVector::from_column_slice(chunk))
        .collect())
}
