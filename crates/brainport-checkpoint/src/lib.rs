//! Brainport checkpoint store
//!
//! Durable state that makes an import resumable:
//!
//! - **ID mapping**: source thought id -> destination thought id. Grows
//!   monotonically, entries are never overwritten.
//! - **Progress**: advisory counters for reporting.
//! - **Created links**: keys of links already created remotely, so repeated
//!   invocations do not duplicate them.
//! - **Failures**: failed items not yet resolved by a later run, for
//!   inspection and retry.
//!
//! Every write hands the store the full current state (never a delta) and the
//! file-backed store replaces files atomically (see [`atomic`]).

pub mod atomic;
mod file_store;
mod memory;


pub use file_store::{
    FileCheckpointStore, CREATED_LINKS_FILE, FAILURES_FILE, MAPPING_FILE, PROGRESS_FILE,
};
pub use memory::MemoryCheckpointStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error(
        "checkpoint `{}` is corrupt ({reason}); fix or delete it before resuming",
        path.display()
    )]
    Corrupt { path: PathBuf, reason: String },
    #[error("checkpoint i/o failed on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode checkpoint: {0}")]
    Encode(#[from] serde_json::Error),
}

// ============================================================================
// State types
// ============================================================================

/// Source id -> destination id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdMapping(BTreeMap<String, String>);

impl IdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.0.get(source_id).map(String::as_str)
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.0.contains_key(source_id)
    }

    /// Record a mapping. An existing entry is never replaced; returns whether
    /// the entry was inserted.
    pub fn put(&mut self, source_id: impl Into<String>, dest_id: impl Into<String>) -> bool {
        match self.0.entry(source_id.into()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(dest_id.into());
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True if every entry of `other` is present here with the same value.
    pub fn is_superset_of(&self, other: &IdMapping) -> bool {
        other.iter().all(|(k, v)| self.get(k) == Some(v))
    }
}

impl FromIterator<(String, String)> for IdMapping {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut mapping = IdMapping::new();
        for (k, v) in iter {
            mapping.put(k, v);
        }
        mapping
    }
}

/// Advisory counters. Never consulted for correctness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Size of the ID mapping at the time of the flush.
    pub total_mapped: usize,
    /// Failed thought creations in the current run.
    pub total_failed: usize,
    /// Index (in source order) of the last thought attempted.
    #[serde(default)]
    pub last_index: Option<usize>,
    #[serde(default)]
    pub links_created: usize,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Identity of a link for "already created" bookkeeping.
///
/// `relation` is the lower-cased relation kind from the source, not the wire
/// code, so kinds that share a code stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub from: String,
    pub to: String,
    #[serde(deserialize_with = "relation_name")]
    pub relation: String,
}

impl EdgeKey {
    pub fn new(from: impl Into<String>, to: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            relation: relation.into(),
        }
    }
}

/// Ledgers written with numeric relation codes load as the matching kind name.
fn relation_name<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Code(u64),
        Name(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Name(name) => name,
        Raw::Code(1) => "child".to_string(),
        Raw::Code(2) => "parent".to_string(),
        Raw::Code(3) => "jump".to_string(),
        Raw::Code(4) => "sibling".to_string(),
        Raw::Code(other) => other.to_string(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreatedEdges(BTreeSet<EdgeKey>);

impl CreatedEdges {
    pub fn contains(&self, key: &EdgeKey) -> bool {
        self.0.contains(key)
    }

    pub fn insert(&mut self, key: EdgeKey) -> bool {
        self.0.insert(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EdgeKey> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedItem {
    Thought,
    Link,
    Note,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub item: FailedItem,
    /// Source id of the thought (or of the link's `from` endpoint).
    pub source_id: String,
    /// Source id of the link's `to` endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Relation kind of a failed link, as in [`EdgeKey::relation`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// HTTP status when the service answered with one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl FailureRecord {
    /// The item this record is about, ignoring when and why it failed.
    pub fn subject(&self) -> (FailedItem, &str, Option<&str>, Option<&str>) {
        (
            self.item,
            &self.source_id,
            self.target_id.as_deref(),
            self.relation.as_deref(),
        )
    }
}

/// Combine the persisted failure list with the current run's failures.
///
/// Earlier records survive unless `resolved` says a later run succeeded for the
/// same item, or the current run failed it again (the newer record replaces
/// it).
pub fn merge_failures(
    previous: &[FailureRecord],
    current: &[FailureRecord],
    resolved: impl Fn(&FailureRecord) -> bool,
) -> Vec<FailureRecord> {
    let mut merged: Vec<FailureRecord> = previous
        .iter()
        .filter(|old| !current.iter().any(|new| new.subject() == old.subject()))
        .cloned()
        .collect();
    merged.extend(current.iter().cloned());
    merged.retain(|f| !resolved(f));
    merged
}

// ============================================================================
// Store interface
// ============================================================================

pub trait CheckpointStore {
    /// Load the persisted mapping; empty on first run.
    fn load(&self) -> Result<IdMapping, CheckpointError>;

    /// Persist the full mapping atomically.
    fn save(&self, mapping: &IdMapping) -> Result<(), CheckpointError>;

    /// `None` when absent. Progress is advisory, so stores may also return
    /// `None` for an unreadable file.
    fn load_progress(&self) -> Result<Option<Progress>, CheckpointError>;

    fn save_progress(&self, progress: &Progress) -> Result<(), CheckpointError>;

    fn load_created_edges(&self) -> Result<CreatedEdges, CheckpointError>;

    fn save_created_edges(&self, edges: &CreatedEdges) -> Result<(), CheckpointError>;

    /// Persisted failure records; empty when none were written.
    fn load_failures(&self) -> Result<Vec<FailureRecord>, CheckpointError>;

    /// Replace the failure side file with the given records.
    fn save_failures(&self, failures: &[FailureRecord]) -> Result<(), CheckpointError>;
}

// ============================================================================
// Checkpoint (get / put / flush)
// ============================================================================

/// The mapping the import driver works against, backed by a store.
pub struct Checkpoint<S: CheckpointStore> {
    store: S,
    mapping: IdMapping,
    unflushed: usize,
}

impl<S: CheckpointStore> Checkpoint<S> {
    /// Load the persisted mapping. Fails on a corrupt checkpoint.
    pub fn open(store: S) -> Result<Self, CheckpointError> {
        let mapping = store.load()?;
        Ok(Self {
            store,
            mapping,
            unflushed: 0,
        })
    }

    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.mapping.get(source_id)
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.mapping.contains(source_id)
    }

    /// Record a new mapping in memory. Returns `false` (and changes nothing)
    /// if the source id is already mapped.
    pub fn put(&mut self, source_id: impl Into<String>, dest_id: impl Into<String>) -> bool {
        let inserted = self.mapping.put(source_id, dest_id);
        if inserted {
            self.unflushed += 1;
        }
        inserted
    }

    /// Persist the full mapping.
    pub fn flush(&mut self) -> Result<(), CheckpointError> {
        self.store.save(&self.mapping)?;
        tracing::debug!(entries = self.mapping.len(), "checkpoint flushed");
        self.unflushed = 0;
        Ok(())
    }

    /// Entries added since the last flush.
    pub fn unflushed(&self) -> usize {
        self.unflushed
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn mapping(&self) -> &IdMapping {
        &self.mapping
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
