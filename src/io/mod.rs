//! Persistence helpers shared by the basis, the reduced mesh and the
//! offline stage.
//!
//! Whole-file artifacts are replaced with [`write_atomic`]: the payload is
//! written and synced to a hidden temporary sibling which is then renamed
//! over the destination, so an interrupted save leaves either the previous
//! file or the new one, never a torn mix. Append-only text logs live in
//! [`trace`].

pub mod trace;
pub mod vectors;

use crate::rom_error::RomError;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub use trace::{GreedyTrace, TraceRecord};
pub use vectors::{read_vectors, write_vectors};

/// Replace `path` with `bytes` through write-then-rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RomError> {
    let tmp = temporary_sibling(path)?;
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    sync_parent(path);
    Ok(())
}

fn temporary_sibling(path: &Path) -> Result<PathBuf, RomError> {
    let name = path
        .file_name()
        .ok_or_else(|| RomError::Io(format!("`{}` has no file name", path.display())))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(format!(".tmp{}", std::process::id()));
    Ok(path.with_file_name(tmp_name))
}

// Best effort: not every platform lets a directory be opened for syncing.
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_and_leaves_no_temporary() {
        let dir = std::env::temp_dir().join(format!("rb-io-atomic-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("payload.txt");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        let leftovers: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        fs::remove_dir_all(&dir).unwrap();
    }
}
