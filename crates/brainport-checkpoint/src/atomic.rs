//! Write-to-temp-then-rename file replacement.
//!
//! The temp file lives in the target's directory so the final `rename` never
//! crosses filesystems. Until [`StagedWrite::commit`] runs, the previous
//! contents of the target are untouched; a process killed between staging and
//! commit leaves at most a stray `.brainport-*.tmp` file behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const TEMP_PREFIX: &str = ".brainport-";
pub const TEMP_SUFFIX: &str = ".tmp";

/// Fully written and synced bytes waiting to replace `target`.
pub struct StagedWrite {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    pub fn stage(target: &Path, bytes: &[u8]) -> io::Result<Self> {
        let dir = parent_dir(target);
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        Ok(Self {
            tmp,
            target: target.to_path_buf(),
        })
    }

    pub fn temp_path(&self) -> &Path {
        self.tmp.path()
    }

    /// Atomically replace the target with the staged bytes.
    pub fn commit(self) -> io::Result<()> {
        let target = self.target;
        self.tmp.persist(&target).map_err(|e| e.error)?;
        sync_dir(parent_dir(&target));
        Ok(())
    }
}

pub fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    StagedWrite::stage(target, bytes)?.commit()
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    // Persist the rename itself; best-effort, the data is already synced.
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
