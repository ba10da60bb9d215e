//! Driver tests against the in-process client and store

use super::*;
use brainport_checkpoint::{IdMapping, MemoryCheckpointStore};
use brainport_remote::MockGraphClient;
use serde_json::json;

fn graph(doc: serde_json::Value) -> SourceGraph {
    let thoughts = serde_json::from_value(doc["thoughts"].clone()).unwrap();
    let links = serde_json::from_value(doc.get("links").cloned().unwrap_or(json!([]))).unwrap();
    let notes = serde_json::from_value(doc.get("notes").cloned().unwrap_or(json!([]))).unwrap();
    SourceGraph::from_parts(None, thoughts, links, notes).unwrap()
}

fn numbered(n: usize) -> SourceGraph {
    let thoughts: Vec<_> = (1..=n)
        .map(|i| json!({ "id": format!("t{i}"), "name": format!("Thought {i}") }))
        .collect();
    graph(json!({ "thoughts": thoughts }))
}

fn quick() -> ImportOptions {
    ImportOptions {
        delay: Duration::ZERO,
        ..ImportOptions::default()
    }
}

fn importer<'a>(
    client: &'a MockGraphClient,
    store: &MemoryCheckpointStore,
    options: ImportOptions,
) -> Importer<&'a MockGraphClient, MemoryCheckpointStore, NoPacer> {
    Importer::new(client, store.clone(), options)
        .unwrap()
        .with_pacer(NoPacer::default())
}

#[test]
fn mapped_thoughts_are_not_recreated() {
    let g = numbered(3);
    let mut prior = IdMapping::new();
    prior.put("t2", "existing-2");
    let store = MemoryCheckpointStore::with_mapping(prior);
    let client = MockGraphClient::new();

    let report = importer(&client, &store, quick()).run(&g).unwrap();

    assert_eq!(report.thoughts.created, 2);
    assert_eq!(report.thoughts.already_mapped, 1);
    assert_eq!(client.thought_calls(), 2);
    assert_eq!(store.saved_mapping().get("t2"), Some("existing-2"));
}

#[test]
fn flushes_every_k_successes_and_at_phase_end() {
    let g = numbered(12);
    let store = MemoryCheckpointStore::new();
    let client = MockGraphClient::new();
    let options = ImportOptions {
        checkpoint_every: 5,
        ..quick()
    };

    importer(&client, &store, options).run(&g).unwrap();

    // 5, 10, end of phase
    assert_eq!(store.mapping_saves(), 3);
    assert_eq!(store.saved_mapping().len(), 12);
    let progress = store.saved_progress().unwrap();
    assert_eq!(progress.total_mapped, 12);
    assert_eq!(progress.last_index, Some(11));
}

#[test]
fn pauses_after_every_remote_call() {
    let g = graph(json!({
        "thoughts": [
            { "id": "a", "name": "A", "note": "about A" },
            { "id": "b", "name": "B" }
        ],
        "links": [ { "thoughtIdA": "a", "thoughtIdB": "b", "relation": "child" } ]
    }));
    let store = MemoryCheckpointStore::new();
    let client = MockGraphClient::new();
    let mut imp = importer(&client, &store, quick());

    imp.run(&g).unwrap();

    // two thoughts, one note, one link
    assert_eq!(imp.pacer().pauses, 4);
    assert_eq!(client.note_calls(), 1);
}

#[test]
fn note_failure_keeps_thought_mapped() {
    let g = graph(json!({
        "thoughts": [ { "id": "a", "name": "A" } ],
        "notes": [ { "thoughtId": "a", "markdown": "# A" } ]
    }));
    let store = MemoryCheckpointStore::new();
    let client = MockGraphClient::new().failing_note_for("dest-1");

    let report = importer(&client, &store, quick()).run(&g).unwrap();

    assert_eq!(report.thoughts.created, 1);
    assert_eq!(report.notes.failed, 1);
    assert_eq!(report.failed(), 0);
    assert_eq!(store.saved_mapping().get("a"), Some("dest-1"));
    let failures = store.saved_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].item, FailedItem::Note);
}

#[test]
fn note_failure_outlives_later_runs() {
    let g = graph(json!({
        "thoughts": [
            { "id": "a", "name": "A", "note": "# A" },
            { "id": "b", "name": "B" }
        ]
    }));
    let store = MemoryCheckpointStore::new();

    let rejecting = MockGraphClient::new().failing_note_for("dest-1");
    let first = importer(&rejecting, &store, quick()).run(&g).unwrap();
    assert_eq!(first.notes.failed, 1);
    assert_eq!(first.outstanding_failures, 1);

    let healthy = MockGraphClient::new();
    let second = importer(&healthy, &store, quick()).run(&g).unwrap();
    assert_eq!(healthy.note_calls(), 0);
    assert!(second.failures.is_empty());
    assert_eq!(second.outstanding_failures, 1);

    let kept = store.saved_failures();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].item, FailedItem::Note);
    assert_eq!(kept[0].source_id, "a");
}

#[test]
fn failures_from_another_source_survive_until_resolved() {
    let first_batch = graph(json!({ "thoughts": [ { "id": "p", "name": "P" } ] }));
    let second_batch = graph(json!({ "thoughts": [ { "id": "q", "name": "Q" } ] }));
    let store = MemoryCheckpointStore::new();

    let failing = MockGraphClient::new().failing_thought("P");
    importer(&failing, &store, quick()).run(&first_batch).unwrap();
    assert_eq!(store.saved_failures().len(), 1);

    let healthy = MockGraphClient::new();
    importer(&healthy, &store, quick()).run(&second_batch).unwrap();
    let kept = store.saved_failures();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].source_id, "p");

    let retry = MockGraphClient::new();
    let report = importer(&retry, &store, quick()).run(&first_batch).unwrap();
    assert_eq!(report.thoughts.created, 1);
    assert_eq!(report.outstanding_failures, 0);
    assert!(store.saved_failures().is_empty());
}

#[test]
fn repeated_failure_replaces_the_earlier_record() {
    let g = numbered(1);
    let store = MemoryCheckpointStore::new();

    for _ in 0..2 {
        let failing = MockGraphClient::new().failing_thought("Thought 1");
        importer(&failing, &store, quick()).run(&g).unwrap();
    }

    assert_eq!(store.saved_failures().len(), 1);
}

#[test]
fn notes_can_be_disabled() {
    let g = graph(json!({ "thoughts": [ { "id": "a", "name": "A", "note": "text" } ] }));
    let store = MemoryCheckpointStore::new();
    let client = MockGraphClient::new();
    let options = ImportOptions {
        attach_notes: false,
        ..quick()
    };

    importer(&client, &store, options).run(&g).unwrap();
    assert_eq!(client.note_calls(), 0);
}

#[test]
fn max_thoughts_caps_attempts_not_skips() {
    let g = numbered(10);
    let mut prior = IdMapping::new();
    prior.put("t1", "existing-1");
    let store = MemoryCheckpointStore::with_mapping(prior);
    let client = MockGraphClient::new().failing_thought("Thought 2");
    let options = ImportOptions {
        max_thoughts: Some(3),
        ..quick()
    };

    let report = importer(&client, &store, options).run(&g).unwrap();

    assert_eq!(client.thought_calls(), 3);
    assert_eq!(report.thoughts.already_mapped, 1);
    assert_eq!(report.thoughts.failed, 1);
    assert_eq!(report.thoughts.created, 2);
    assert_eq!(report.thoughts.not_attempted, 6);
    assert_eq!(report.phase, ImportPhase::ImportingThoughts);
}

#[test]
fn network_errors_are_recorded_and_skipped() {
    let g = numbered(3);
    let store = MemoryCheckpointStore::new();
    let client = MockGraphClient::new().unreachable_thought("Thought 2");

    let report = importer(&client, &store, quick()).run(&g).unwrap();

    assert_eq!(report.thoughts.created, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source_id, "t2");
    assert_eq!(report.failures[0].status, None);
    assert!(!store.saved_mapping().contains("t2"));
}

#[test]
fn links_use_mapped_ids_and_relation_codes() {
    let g = graph(json!({
        "thoughts": [ { "id": "a", "name": "A" }, { "id": "b", "name": "B" } ],
        "links": [
            { "thoughtIdA": "a", "thoughtIdB": "b", "relation": "parent" },
            { "thoughtIdA": "b", "thoughtIdB": "a", "relation": 4 }
        ]
    }));
    let store = MemoryCheckpointStore::new();
    let client = MockGraphClient::new();

    let report = importer(&client, &store, quick()).run(&g).unwrap();

    let links = client.created_links();
    assert_eq!(report.links.created, 2);
    assert_eq!(links[0].1.thought_id_a, "dest-1");
    assert_eq!(links[0].1.thought_id_b, "dest-2");
    assert_eq!(links[0].1.relation, 2);
    assert_eq!(links[1].1.thought_id_a, "dest-2");
    assert_eq!(links[1].1.relation, 4);
    assert_eq!(store.saved_edges().len(), 2);
    assert_eq!(report.phase, ImportPhase::Complete);
}

#[test]
fn duplicate_links_in_document_are_created_once() {
    let g = graph(json!({
        "thoughts": [ { "id": "a", "name": "A" }, { "id": "b", "name": "B" } ],
        "links": [
            { "thoughtIdA": "a", "thoughtIdB": "b", "relation": "jump" },
            { "thoughtIdA": "a", "thoughtIdB": "b", "relation": "jump" }
        ]
    }));
    let store = MemoryCheckpointStore::new();
    let client = MockGraphClient::new();

    let report = importer(&client, &store, quick()).run(&g).unwrap();

    assert_eq!(client.link_calls(), 1);
    assert_eq!(report.links.already_created, 1);
}

#[test]
fn unknown_relation_is_not_confused_with_jump() {
    let g = graph(json!({
        "thoughts": [ { "id": "a", "name": "A" }, { "id": "b", "name": "B" } ],
        "links": [
            { "thoughtIdA": "a", "thoughtIdB": "b", "relation": "jump" },
            { "thoughtIdA": "a", "thoughtIdB": "b", "relation": "unknown_kind" }
        ]
    }));
    let store = MemoryCheckpointStore::new();
    let client = MockGraphClient::new();

    let report = importer(&client, &store, quick()).run(&g).unwrap();

    assert_eq!(client.link_calls(), 2);
    assert_eq!(report.links.created, 2);
    assert_eq!(report.links.already_created, 0);
    let codes: Vec<u8> = client.created_links().iter().map(|(_, l)| l.relation).collect();
    assert_eq!(codes, vec![3, 3]);

    let edges = store.saved_edges();
    assert!(edges.contains(&EdgeKey::new("a", "b", "jump")));
    assert!(edges.contains(&EdgeKey::new("a", "b", "unknown_kind")));

    let rerun = MockGraphClient::new();
    let again = importer(&rerun, &store, quick()).run(&g).unwrap();
    assert_eq!(rerun.link_calls(), 0);
    assert_eq!(again.links.already_created, 2);
}

#[test]
fn batch_links_to_other_batches_are_not_orphans() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        brainport_source::batch_file_path(dir.path(), 2),
        json!({
            "thoughts": [ { "id": "p", "name": "P" } ],
            "links": [ { "thoughtIdA": "p", "thoughtIdB": "from-batch-1" } ]
        })
        .to_string(),
    )
    .unwrap();
    let g = brainport_source::load_batch_file(&brainport_source::batch_file_path(dir.path(), 2))
        .unwrap();
    let store = MemoryCheckpointStore::new();
    let client = MockGraphClient::new();

    let report = importer(&client, &store, quick()).run(&g).unwrap();

    assert_eq!(client.link_calls(), 0);
    assert_eq!(report.links.skipped, 1);
    assert_eq!(report.links.orphaned, 0);
}

#[test]
fn unmapped_and_orphan_endpoints_are_skipped_separately() {
    let g = graph(json!({
        "thoughts": [ { "id": "a", "name": "A" }, { "id": "b", "name": "Broken" } ],
        "links": [
            { "thoughtIdA": "a", "thoughtIdB": "b" },
            { "thoughtIdA": "a", "thoughtIdB": "ghost" }
        ]
    }));
    let store = MemoryCheckpointStore::new();
    let client = MockGraphClient::new().failing_thought("Broken");

    let report = importer(&client, &store, quick()).run(&g).unwrap();

    assert_eq!(client.link_calls(), 0);
    assert_eq!(report.links.skipped, 2);
    assert_eq!(report.links.orphaned, 1);
    assert_eq!(report.links.failed, 0);
    assert!(report.failures_of(FailedItem::Link).next().is_none());
}

#[test]
fn failed_links_are_retried_on_next_run() {
    let g = graph(json!({
        "thoughts": [ { "id": "a", "name": "A" }, { "id": "b", "name": "B" } ],
        "links": [ { "thoughtIdA": "a", "thoughtIdB": "b", "name": "flaky" } ]
    }));
    let store = MemoryCheckpointStore::new();

    let flaky = MockGraphClient::new().failing_link("flaky");
    let first = importer(&flaky, &store, quick()).run(&g).unwrap();
    assert_eq!(first.links.failed, 1);
    assert_eq!(first.phase, ImportPhase::ImportingLinks);
    assert_eq!(store.saved_failures()[0].target_id.as_deref(), Some("b"));

    let healthy = MockGraphClient::new();
    let second = importer(&healthy, &store, quick()).run(&g).unwrap();
    assert_eq!(healthy.thought_calls(), 0);
    assert_eq!(second.links.created, 1);
    assert_eq!(second.phase, ImportPhase::Complete);
    assert!(store.saved_failures().is_empty());
}

#[test]
fn links_can_be_deferred() {
    let g = graph(json!({
        "thoughts": [ { "id": "a", "name": "A" }, { "id": "b", "name": "B" } ],
        "links": [ { "thoughtIdA": "a", "thoughtIdB": "b" } ]
    }));
    let store = MemoryCheckpointStore::new();
    let client = MockGraphClient::new();
    let options = ImportOptions {
        import_links: false,
        ..quick()
    };

    let report = importer(&client, &store, options).run(&g).unwrap();

    assert_eq!(client.link_calls(), 0);
    assert_eq!(report.links.not_attempted, 1);
    assert_eq!(report.phase, ImportPhase::ImportingLinks);
}

#[test]
fn max_links_caps_attempts() {
    let g = graph(json!({
        "thoughts": [ { "id": "a", "name": "A" }, { "id": "b", "name": "B" } ],
        "links": [
            { "thoughtIdA": "a", "thoughtIdB": "b", "relation": 1 },
            { "thoughtIdA": "a", "thoughtIdB": "b", "relation": 2 },
            { "thoughtIdA": "a", "thoughtIdB": "b", "relation": 3 }
        ]
    }));
    let store = MemoryCheckpointStore::new();
    let client = MockGraphClient::new();
    let options = ImportOptions {
        max_links: Some(2),
        ..quick()
    };

    let report = importer(&client, &store, options).run(&g).unwrap();

    assert_eq!(client.link_calls(), 2);
    assert_eq!(report.links.not_attempted, 1);
}

#[test]
fn phase_follows_persisted_state() {
    let g = graph(json!({
        "thoughts": [ { "id": "a", "name": "A" }, { "id": "b", "name": "B" } ],
        "links": [
            { "thoughtIdA": "a", "thoughtIdB": "b" },
            { "thoughtIdA": "a", "thoughtIdB": "ghost" }
        ]
    }));
    let mut mapping = IdMapping::new();
    let mut edges = CreatedEdges::default();
    assert_eq!(ImportPhase::from_state(&g, &mapping, &edges), ImportPhase::NotStarted);

    mapping.put("a", "d1");
    assert_eq!(
        ImportPhase::from_state(&g, &mapping, &edges),
        ImportPhase::ImportingThoughts
    );

    mapping.put("b", "d2");
    assert_eq!(
        ImportPhase::from_state(&g, &mapping, &edges),
        ImportPhase::ImportingLinks
    );

    // the orphan never blocks completion
    edges.insert(edge_key(&g.links[0]));
    assert_eq!(ImportPhase::from_state(&g, &mapping, &edges), ImportPhase::Complete);
}

#[test]
fn empty_graph_is_complete() {
    let g = graph(json!({ "thoughts": [] }));
    let store = MemoryCheckpointStore::new();
    let client = MockGraphClient::new();

    let report = importer(&client, &store, quick()).run(&g).unwrap();
    assert_eq!(report.phase, ImportPhase::Complete);
    assert_eq!(report.summary_line(), "created=0 nodes, 0 edges, failed=0");
}

/// Fails every mapping save after the first `ok_saves`.
#[derive(Clone)]
struct BrittleStore {
    inner: MemoryCheckpointStore,
    ok_saves: usize,
}

impl CheckpointStore for BrittleStore {
    fn load(&self) -> Result<IdMapping, CheckpointError> {
        self.inner.load()
    }

    fn save(&self, mapping: &IdMapping) -> Result<(), CheckpointError> {
        if self.inner.mapping_saves() >= self.ok_saves {
            return Err(CheckpointError::Io {
                path: "id_mapping.json".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        self.inner.save(mapping)
    }

    fn load_progress(&self) -> Result<Option<Progress>, CheckpointError> {
        self.inner.load_progress()
    }

    fn save_progress(&self, progress: &Progress) -> Result<(), CheckpointError> {
        self.inner.save_progress(progress)
    }

    fn load_created_edges(&self) -> Result<CreatedEdges, CheckpointError> {
        self.inner.load_created_edges()
    }

    fn save_created_edges(&self, edges: &CreatedEdges) -> Result<(), CheckpointError> {
        self.inner.save_created_edges(edges)
    }

    fn load_failures(&self) -> Result<Vec<FailureRecord>, CheckpointError> {
        self.inner.load_failures()
    }

    fn save_failures(&self, failures: &[FailureRecord]) -> Result<(), CheckpointError> {
        self.inner.save_failures(failures)
    }
}

#[test]
fn checkpoint_failure_aborts_and_rerun_resumes_from_last_flush() {
    let g = numbered(8);
    let inner = MemoryCheckpointStore::new();
    let brittle = BrittleStore {
        inner: inner.clone(),
        ok_saves: 1,
    };
    let options = ImportOptions {
        checkpoint_every: 3,
        ..quick()
    };

    let client = MockGraphClient::new();
    let err = Importer::new(&client, brittle, options.clone())
        .unwrap()
        .with_pacer(NoPacer::default())
        .run(&g)
        .unwrap_err();
    assert!(matches!(err, ImportError::Checkpoint(_)));
    // flushed at 3, aborted at 6
    assert_eq!(client.thought_calls(), 6);
    assert_eq!(inner.saved_mapping().len(), 3);

    let rerun = MockGraphClient::new();
    let report = importer(&rerun, &inner, options).run(&g).unwrap();
    assert_eq!(rerun.thought_calls(), 5);
    assert_eq!(report.thoughts.already_mapped, 3);
    assert_eq!(inner.saved_mapping().len(), 8);
}
