use crate::atomic::write_atomic;
use crate::{
    CheckpointError, CheckpointStore, CreatedEdges, FailureRecord, IdMapping, Progress,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const MAPPING_FILE: &str = "id_mapping.json";
pub const PROGRESS_FILE: &str = "import_progress.json";
pub const CREATED_LINKS_FILE: &str = "links_created.json";
pub const FAILURES_FILE: &str = "failures.json";

/// JSON files in one state directory.
///
/// Only one import process may use a directory at a time; nothing here locks.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Like [`FileCheckpointStore::new`] but creates the directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CheckpointError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.dir.join(MAPPING_FILE)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.dir.join(PROGRESS_FILE)
    }

    pub fn created_links_path(&self) -> PathBuf {
        self.dir.join(CREATED_LINKS_FILE)
    }

    pub fn failures_path(&self) -> PathBuf {
        self.dir.join(FAILURES_FILE)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<IdMapping, CheckpointError> {
        Ok(read_json(&self.mapping_path())?.unwrap_or_default())
    }

    fn save(&self, mapping: &IdMapping) -> Result<(), CheckpointError> {
        write_json(&self.mapping_path(), mapping)
    }

    fn load_progress(&self) -> Result<Option<Progress>, CheckpointError> {
        match read_json(&self.progress_path()) {
            Ok(progress) => Ok(progress),
            Err(CheckpointError::Corrupt { path, reason }) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %reason,
                    "ignoring unreadable progress file; it will be rewritten"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn save_progress(&self, progress: &Progress) -> Result<(), CheckpointError> {
        write_json(&self.progress_path(), progress)
    }

    fn load_created_edges(&self) -> Result<CreatedEdges, CheckpointError> {
        Ok(read_json(&self.created_links_path())?.unwrap_or_default())
    }

    fn save_created_edges(&self, edges: &CreatedEdges) -> Result<(), CheckpointError> {
        write_json(&self.created_links_path(), edges)
    }

    fn load_failures(&self) -> Result<Vec<FailureRecord>, CheckpointError> {
        Ok(read_json(&self.failures_path())?.unwrap_or_default())
    }

    fn save_failures(&self, failures: &[FailureRecord]) -> Result<(), CheckpointError> {
        write_json(&self.failures_path(), failures)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CheckpointError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CheckpointError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if text.trim().is_empty() {
        return Err(CheckpointError::Corrupt {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        });
    }
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| CheckpointError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CheckpointError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes).map_err(|source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    })
}
