use crate::edge_key;
use brainport_checkpoint::{CreatedEdges, FailedItem, FailureRecord, IdMapping};
use brainport_source::SourceGraph;
use serde::Serialize;
use std::fmt;

// ============================================================================
// Phase
// ============================================================================

/// Where an import stands, derived from persisted state alone so either phase
/// can be re-entered after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    NotStarted,
    ImportingThoughts,
    ImportingLinks,
    Complete,
}

impl ImportPhase {
    pub fn from_state(graph: &SourceGraph, mapping: &IdMapping, edges: &CreatedEdges) -> Self {
        let all_thoughts_mapped = graph.thoughts.iter().all(|t| mapping.contains(&t.id));
        let all_links_created = graph
            .links
            .iter()
            .filter(|l| !graph.is_orphan(l))
            .all(|l| edges.contains(&edge_key(l)));

        if all_thoughts_mapped && all_links_created {
            Self::Complete
        } else if mapping.is_empty() && edges.is_empty() {
            Self::NotStarted
        } else if !all_thoughts_mapped {
            Self::ImportingThoughts
        } else {
            Self::ImportingLinks
        }
    }
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not started",
            Self::ImportingThoughts => "importing thoughts",
            Self::ImportingLinks => "importing links",
            Self::Complete => "complete",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Tallies
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhaseTally {
    pub total: usize,
    pub created: usize,
    pub already_mapped: usize,
    pub failed: usize,
    /// Left for a later run because of `max_thoughts`.
    pub not_attempted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkTally {
    pub total: usize,
    pub created: usize,
    pub already_created: usize,
    /// An endpoint had no destination id. Includes `orphaned`.
    pub skipped: usize,
    /// An endpoint is not in the source graph at all.
    pub orphaned: usize,
    pub failed: usize,
    pub not_attempted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NoteTally {
    pub attached: usize,
    pub failed: usize,
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub thoughts: PhaseTally,
    pub links: LinkTally,
    pub notes: NoteTally,
    /// Failures from this run.
    pub failures: Vec<FailureRecord>,
    /// Entries left in the failure side file, this run's and earlier ones.
    pub outstanding_failures: usize,
    pub phase: ImportPhase,
}

impl Default for ImportReport {
    fn default() -> Self {
        Self {
            thoughts: PhaseTally::default(),
            links: LinkTally::default(),
            notes: NoteTally::default(),
            failures: Vec::new(),
            outstanding_failures: 0,
            phase: ImportPhase::NotStarted,
        }
    }
}

impl ImportReport {
    /// Failed thought and link creations. Note failures are reported
    /// separately in `notes`.
    pub fn failed(&self) -> usize {
        self.thoughts.failed + self.links.failed
    }

    pub fn failures_of(&self, item: FailedItem) -> impl Iterator<Item = &FailureRecord> {
        self.failures.iter().filter(move |f| f.item == item)
    }

    pub fn summary_line(&self) -> String {
        format!(
            "created={} nodes, {} edges, failed={}",
            self.thoughts.created,
            self.links.created,
            self.failed()
        )
    }
}
