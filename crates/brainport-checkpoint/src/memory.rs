use crate::{
    CheckpointError, CheckpointStore, CreatedEdges, FailureRecord, IdMapping, Progress,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MemoryState {
    mapping: Option<IdMapping>,
    progress: Option<Progress>,
    edges: Option<CreatedEdges>,
    failures: Vec<FailureRecord>,
    mapping_saves: usize,
}

/// In-memory store for tests. Clones share state, so a test can keep a handle
/// while the importer owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds a mapping from an earlier run.
    pub fn with_mapping(mapping: IdMapping) -> Self {
        let store = Self::default();
        store.state.lock().mapping = Some(mapping);
        store
    }

    pub fn saved_mapping(&self) -> IdMapping {
        self.state.lock().mapping.clone().unwrap_or_default()
    }

    /// Number of `save` calls so far.
    pub fn mapping_saves(&self) -> usize {
        self.state.lock().mapping_saves
    }

    pub fn saved_progress(&self) -> Option<Progress> {
        self.state.lock().progress.clone()
    }

    pub fn saved_edges(&self) -> CreatedEdges {
        self.state.lock().edges.clone().unwrap_or_default()
    }

    pub fn saved_failures(&self) -> Vec<FailureRecord> {
        self.state.lock().failures.clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> Result<IdMapping, CheckpointError> {
        Ok(self.saved_mapping())
    }

    fn save(&self, mapping: &IdMapping) -> Result<(), CheckpointError> {
        let mut state = self.state.lock();
        state.mapping = Some(mapping.clone());
        state.mapping_saves += 1;
        Ok(())
    }

    fn load_progress(&self) -> Result<Option<Progress>, CheckpointError> {
        Ok(self.saved_progress())
    }

    fn save_progress(&self, progress: &Progress) -> Result<(), CheckpointError> {
        self.state.lock().progress = Some(progress.clone());
        Ok(())
    }

    fn load_created_edges(&self) -> Result<CreatedEdges, CheckpointError> {
        Ok(self.saved_edges())
    }

    fn save_created_edges(&self, edges: &CreatedEdges) -> Result<(), CheckpointError> {
        self.state.lock().edges = Some(edges.clone());
        Ok(())
    }

    fn load_failures(&self) -> Result<Vec<FailureRecord>, CheckpointError> {
        Ok(self.saved_failures())
    }

    fn save_failures(&self, failures: &[FailureRecord]) -> Result<(), CheckpointError> {
        self.state.lock().failures = failures.to_vec();
        Ok(())
    }
}
