//! Offline import status: compares the source graph with the checkpoint
//! directory without contacting the service.

use brainport_checkpoint::{CheckpointError, CheckpointStore, FileCheckpointStore};
use brainport_import::{edge_key, ImportPhase};
use brainport_source::SourceGraph;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeCount {
    pub total: usize,
    pub mapped: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub thoughts_total: usize,
    pub thoughts_mapped: usize,
    pub links_total: usize,
    pub links_created: usize,
    pub orphan_links: usize,
    pub notes: usize,
    pub entity_types: BTreeMap<String, TypeCount>,
    pub phase: ImportPhase,
    /// Entries in the failure side file not yet resolved by a later run.
    pub outstanding_failures: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusReport {
    pub fn collect(graph: &SourceGraph, store: &FileCheckpointStore) -> Result<Self, CheckpointError> {
        let mapping = store.load()?;
        let edges = store.load_created_edges()?;
        let progress = store.load_progress()?;
        let failures = store.load_failures()?;

        let mut entity_types: BTreeMap<String, TypeCount> = graph
            .entity_type_counts()
            .into_iter()
            .map(|(ty, total)| (ty, TypeCount { total, mapped: 0 }))
            .collect();
        for thought in graph.thoughts.iter().filter(|t| mapping.contains(&t.id)) {
            entity_types
                .entry(thought.entity_type_key())
                .or_default()
                .mapped += 1;
        }

        let created: BTreeSet<_> = graph
            .links
            .iter()
            .map(edge_key)
            .filter(|k| edges.contains(k))
            .collect();

        Ok(Self {
            thoughts_total: graph.thoughts.len(),
            thoughts_mapped: graph
                .thoughts
                .iter()
                .filter(|t| mapping.contains(&t.id))
                .count(),
            links_total: graph.links.len(),
            links_created: created.len(),
            orphan_links: graph.orphan_links().len(),
            notes: graph.note_count(),
            entity_types,
            phase: ImportPhase::from_state(graph, &mapping, &edges),
            outstanding_failures: failures.len(),
            updated_at: progress.and_then(|p| p.updated_at),
        })
    }

    pub fn thoughts_remaining(&self) -> usize {
        self.thoughts_total - self.thoughts_mapped
    }

    /// Distinct importable links not yet in the ledger.
    pub fn links_remaining(&self, graph: &SourceGraph) -> usize {
        let importable: BTreeSet<_> = graph
            .links
            .iter()
            .filter(|l| !graph.is_orphan(l))
            .map(edge_key)
            .collect();
        importable.len().saturating_sub(self.links_created)
    }

    pub fn percent_mapped(&self) -> f64 {
        if self.thoughts_total == 0 {
            return 100.0;
        }
        self.thoughts_mapped as f64 * 100.0 / self.thoughts_total as f64
    }
}
