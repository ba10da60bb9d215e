//! Brainport import driver
//!
//! Replays a [`SourceGraph`] against a [`GraphClient`] in two phases:
//!
//! 1. **Thoughts**, in document order. Each created thought is recorded in the
//!    ID mapping; already-mapped thoughts are skipped without a remote call.
//! 2. **Links**, in document order, with both endpoints translated through the
//!    mapping. Links whose endpoints are not mapped yet are skipped (never
//!    failed), and created links go into a ledger so reruns do not repeat them.
//!
//! State is flushed every `checkpoint_every` successful creates and at the end
//! of each phase, so killing the process loses at most that tail. Per-item
//! remote errors are recorded and skipped; only checkpoint errors abort.

mod pacer;
mod report;

#[cfg(test)]
mod tests;

pub use pacer::{NoPacer, Pacer, ThreadPacer};
pub use report::{ImportPhase, ImportReport, LinkTally, NoteTally, PhaseTally};

use brainport_checkpoint::{
    merge_failures, Checkpoint, CheckpointError, CheckpointStore, CreatedEdges, EdgeKey,
    FailedItem, FailureRecord, Progress,
};
use brainport_remote::{GraphClient, NewLink, NewThought, RemoteError};
use brainport_source::{Link, SourceGraph, Thought};
use chrono::Utc;
use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_CHECKPOINT_EVERY: usize = 5;
pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Flush after this many successful creates (values below 1 act as 1).
    pub checkpoint_every: usize,
    /// Pause after every remote call.
    pub delay: Duration,
    /// Cap on thought creation attempts in one run.
    pub max_thoughts: Option<usize>,
    /// Cap on link creation attempts in one run.
    pub max_links: Option<usize>,
    pub import_links: bool,
    pub attach_notes: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            delay: DEFAULT_DELAY,
            max_thoughts: None,
            max_links: None,
            import_links: true,
            attach_notes: true,
        }
    }
}

/// Ledger key for a link, in source ids. Keyed on the relation kind, so an
/// unrecognised kind and `jump` stay separate even though both go out as the
/// same code.
pub fn edge_key(link: &Link) -> EdgeKey {
    EdgeKey::new(
        &link.thought_id_a,
        &link.thought_id_b,
        relation_key(link),
    )
}

fn relation_key(link: &Link) -> String {
    link.relation.as_str().to_ascii_lowercase()
}

pub struct Importer<C, S: CheckpointStore, P = ThreadPacer> {
    client: C,
    checkpoint: Checkpoint<S>,
    edges: CreatedEdges,
    /// Persisted failures not yet resolved, as of the last write.
    outstanding: Vec<FailureRecord>,
    /// Source ids whose note was attached during this importer's lifetime.
    noted: HashSet<String>,
    pacer: P,
    options: ImportOptions,
}

impl<C: GraphClient, S: CheckpointStore> Importer<C, S, ThreadPacer> {
    /// Load the persisted mapping and link ledger from `store`.
    pub fn new(client: C, store: S, options: ImportOptions) -> Result<Self, ImportError> {
        if let Some(progress) = store.load_progress()? {
            tracing::info!(
                mapped = progress.total_mapped,
                links = progress.links_created,
                last_index = ?progress.last_index,
                "resuming from checkpoint"
            );
        }
        let edges = store.load_created_edges()?;
        let outstanding = store.load_failures()?;
        let checkpoint = Checkpoint::open(store)?;

        Ok(Self {
            client,
            checkpoint,
            edges,
            outstanding,
            noted: HashSet::new(),
            pacer: ThreadPacer,
            options,
        })
    }
}

impl<C: GraphClient, S: CheckpointStore, P: Pacer> Importer<C, S, P> {
    pub fn with_pacer<Q: Pacer>(self, pacer: Q) -> Importer<C, S, Q> {
        Importer {
            client: self.client,
            checkpoint: self.checkpoint,
            edges: self.edges,
            outstanding: self.outstanding,
            noted: self.noted,
            pacer,
            options: self.options,
        }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    pub fn checkpoint(&self) -> &Checkpoint<S> {
        &self.checkpoint
    }

    pub fn created_edges(&self) -> &CreatedEdges {
        &self.edges
    }

    /// Failures from this and earlier runs that no run has resolved yet.
    pub fn outstanding_failures(&self) -> &[FailureRecord] {
        &self.outstanding
    }

    pub fn phase(&self, graph: &SourceGraph) -> ImportPhase {
        ImportPhase::from_state(graph, self.checkpoint.mapping(), &self.edges)
    }

    /// Run both phases and update the failure side file.
    pub fn run(&mut self, graph: &SourceGraph) -> Result<ImportReport, ImportError> {
        let mut report = ImportReport::default();
        tracing::info!(
            thoughts = graph.thoughts.len(),
            links = graph.links.len(),
            already_mapped = self.checkpoint.len(),
            phase = %self.phase(graph),
            "starting import"
        );

        self.import_thoughts(graph, &mut report)?;

        if self.options.import_links {
            self.import_links(graph, &mut report)?;
        } else {
            report.links.total = graph.links.len();
            report.links.not_attempted = graph
                .links
                .iter()
                .filter(|l| !self.edges.contains(&edge_key(l)))
                .count();
        }

        report.phase = self.phase(graph);
        self.write_failures(&mut report)?;

        tracing::info!(
            thoughts_created = report.thoughts.created,
            links_created = report.links.created,
            failed = report.failed(),
            outstanding_failures = report.outstanding_failures,
            phase = %report.phase,
            "import finished"
        );
        Ok(report)
    }

    /// Phase A.
    pub fn import_thoughts(
        &mut self,
        graph: &SourceGraph,
        report: &mut ImportReport,
    ) -> Result<(), ImportError> {
        let every = self.options.checkpoint_every.max(1);
        let mut attempts = 0usize;
        let mut since_flush = 0usize;
        let mut last_index = None;
        report.thoughts.total = graph.thoughts.len();

        for (index, thought) in graph.thoughts.iter().enumerate() {
            if self.checkpoint.contains(&thought.id) {
                report.thoughts.already_mapped += 1;
                continue;
            }
            if self.options.max_thoughts.is_some_and(|max| attempts >= max) {
                report.thoughts.not_attempted += 1;
                continue;
            }
            attempts += 1;
            last_index = Some(index);

            let result = self.client.create_thought(&NewThought::from_source(thought));
            self.pace();

            match result {
                Ok(dest_id) => {
                    tracing::info!(
                        source_id = %thought.id,
                        dest_id = %dest_id,
                        name = %thought.name,
                        "created thought"
                    );
                    self.checkpoint.put(thought.id.as_str(), dest_id.as_str());
                    report.thoughts.created += 1;
                    since_flush += 1;
                    if since_flush >= every {
                        self.flush_mapping(report, last_index)?;
                        since_flush = 0;
                    }

                    if self.options.attach_notes {
                        if let Some(note) = thought.note.as_deref().filter(|n| !n.trim().is_empty())
                        {
                            self.attach_note(thought, &dest_id, note, report);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        source_id = %thought.id,
                        name = %thought.name,
                        status = ?err.status(),
                        error = %err,
                        "thought creation failed"
                    );
                    report.thoughts.failed += 1;
                    report.failures.push(failure_record(
                        FailedItem::Thought,
                        &thought.id,
                        None,
                        Some(&thought.name),
                        &err,
                    ));
                }
            }
        }

        self.flush_mapping(report, last_index)?;
        Ok(())
    }

    /// Phase B. Runs against whatever the mapping holds, complete or not.
    pub fn import_links(
        &mut self,
        graph: &SourceGraph,
        report: &mut ImportReport,
    ) -> Result<(), ImportError> {
        let every = self.options.checkpoint_every.max(1);
        let mut attempts = 0usize;
        let mut since_flush = 0usize;
        report.links.total = graph.links.len();

        for link in &graph.links {
            let key = edge_key(link);
            if self.edges.contains(&key) {
                report.links.already_created += 1;
                continue;
            }

            let (Some(from), Some(to)) = (
                self.checkpoint.get(&link.thought_id_a),
                self.checkpoint.get(&link.thought_id_b),
            ) else {
                report.links.skipped += 1;
                if graph.is_partial() {
                    tracing::warn!(
                        from = %link.thought_id_a,
                        to = %link.thought_id_b,
                        "skipping link whose endpoint is not mapped yet"
                    );
                } else if graph.is_orphan(link) {
                    report.links.orphaned += 1;
                    tracing::warn!(
                        from = %link.thought_id_a,
                        to = %link.thought_id_b,
                        "skipping link with an endpoint outside the source graph"
                    );
                } else {
                    tracing::warn!(
                        from = %link.thought_id_a,
                        to = %link.thought_id_b,
                        "skipping link whose endpoint has not been imported"
                    );
                }
                continue;
            };

            if self.options.max_links.is_some_and(|max| attempts >= max) {
                report.links.not_attempted += 1;
                continue;
            }
            attempts += 1;

            let body = NewLink::from_source(link, from, to);
            let result = self.client.create_link(&body);
            self.pace();

            match result {
                Ok(dest_id) => {
                    tracing::info!(
                        from = %link.thought_id_a,
                        to = %link.thought_id_b,
                        relation = body.relation,
                        dest_id = %dest_id,
                        "created link"
                    );
                    self.edges.insert(key);
                    report.links.created += 1;
                    since_flush += 1;
                    if since_flush >= every {
                        self.flush_edges()?;
                        since_flush = 0;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        from = %link.thought_id_a,
                        to = %link.thought_id_b,
                        status = ?err.status(),
                        error = %err,
                        "link creation failed"
                    );
                    report.links.failed += 1;
                    let mut record = failure_record(
                        FailedItem::Link,
                        &link.thought_id_a,
                        Some(&link.thought_id_b),
                        link.name.as_deref(),
                        &err,
                    );
                    record.relation = Some(relation_key(link));
                    report.failures.push(record);
                }
            }
        }

        self.flush_edges()?;
        Ok(())
    }

    fn attach_note(
        &mut self,
        thought: &Thought,
        dest_id: &str,
        markdown: &str,
        report: &mut ImportReport,
    ) {
        let result = self.client.attach_note(dest_id, markdown);
        self.pace();

        match result {
            Ok(()) => {
                tracing::debug!(source_id = %thought.id, dest_id = %dest_id, "attached note");
                report.notes.attached += 1;
                self.noted.insert(thought.id.clone());
            }
            Err(err) => {
                tracing::warn!(
                    source_id = %thought.id,
                    dest_id = %dest_id,
                    status = ?err.status(),
                    error = %err,
                    "note attachment failed; thought stays imported"
                );
                report.notes.failed += 1;
                report.failures.push(failure_record(
                    FailedItem::Note,
                    &thought.id,
                    None,
                    Some(&thought.name),
                    &err,
                ));
            }
        }
    }

    /// Merge this run's failures into the side file. Earlier records stay until
    /// a run succeeds for the same item.
    fn write_failures(&mut self, report: &mut ImportReport) -> Result<(), CheckpointError> {
        let merged = merge_failures(&self.outstanding, &report.failures, |f| self.is_resolved(f));
        let superseded = self
            .outstanding
            .iter()
            .filter(|old| report.failures.iter().any(|new| new.subject() == old.subject()))
            .count();
        let resolved = (self.outstanding.len() - superseded + report.failures.len())
            .saturating_sub(merged.len());
        self.checkpoint.store().save_failures(&merged)?;
        if resolved > 0 {
            tracing::info!(resolved, "cleared failures that have since succeeded");
        }
        report.outstanding_failures = merged.len();
        self.outstanding = merged;
        Ok(())
    }

    fn is_resolved(&self, failure: &FailureRecord) -> bool {
        match failure.item {
            FailedItem::Thought => self.checkpoint.contains(&failure.source_id),
            FailedItem::Link => match (&failure.target_id, &failure.relation) {
                (Some(to), Some(relation)) => self
                    .edges
                    .contains(&EdgeKey::new(&failure.source_id, to, relation)),
                _ => false,
            },
            FailedItem::Note => self.noted.contains(&failure.source_id),
        }
    }

    fn flush_mapping(
        &mut self,
        report: &ImportReport,
        last_index: Option<usize>,
    ) -> Result<(), CheckpointError> {
        self.checkpoint.flush()?;
        let progress = Progress {
            total_mapped: self.checkpoint.len(),
            total_failed: report.thoughts.failed,
            last_index,
            links_created: self.edges.len(),
            updated_at: Some(Utc::now()),
        };
        self.checkpoint.store().save_progress(&progress)
    }

    fn flush_edges(&mut self) -> Result<(), CheckpointError> {
        self.checkpoint.store().save_created_edges(&self.edges)?;
        tracing::debug!(entries = self.edges.len(), "link ledger flushed");
        Ok(())
    }

    fn pace(&mut self) {
        self.pacer.pause(self.options.delay);
    }
}

fn failure_record(
    item: FailedItem,
    source_id: &str,
    target_id: Option<&str>,
    name: Option<&str>,
    err: &RemoteError,
) -> FailureRecord {
    FailureRecord {
        item,
        source_id: source_id.to_string(),
        target_id: target_id.map(str::to_string),
        relation: None,
        name: name.map(str::to_string),
        status: err.status(),
        detail: err.to_string(),
        at: Utc::now(),
    }
}
