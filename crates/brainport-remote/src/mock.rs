//! Scripted in-process client for tests and dry runs.

use crate::{GraphClient, NewLink, NewThought, RemoteError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Records every call and hands out sequential ids (`dest-1`, `dest-2`, ...).
///
/// Failures are scripted by thought name, link name, or destination thought
/// id for notes. Scripted failures answer with status 500.
#[derive(Debug, Default)]
pub struct MockGraphClient {
    next_id: AtomicUsize,
    thought_calls: AtomicUsize,
    link_calls: AtomicUsize,
    note_calls: AtomicUsize,
    failing_thoughts: HashSet<String>,
    unreachable_thoughts: HashSet<String>,
    failing_links: HashSet<String>,
    failing_notes: Option<HashSet<String>>,
    thoughts: Mutex<Vec<(String, NewThought)>>,
    links: Mutex<Vec<(String, NewLink)>>,
    notes: Mutex<Vec<(String, String)>>,
}

impl MockGraphClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thoughts with this name get a 500.
    pub fn failing_thought(mut self, name: impl Into<String>) -> Self {
        self.failing_thoughts.insert(name.into());
        self
    }

    /// Thoughts with this name get a network error.
    pub fn unreachable_thought(mut self, name: impl Into<String>) -> Self {
        self.unreachable_thoughts.insert(name.into());
        self
    }

    /// Links with this name get a 500.
    pub fn failing_link(mut self, name: impl Into<String>) -> Self {
        self.failing_links.insert(name.into());
        self
    }

    /// Notes for this destination id get a 500.
    pub fn failing_note_for(mut self, dest_id: impl Into<String>) -> Self {
        self.failing_notes
            .get_or_insert_with(HashSet::new)
            .insert(dest_id.into());
        self
    }

    pub fn thought_calls(&self) -> usize {
        self.thought_calls.load(Ordering::SeqCst)
    }

    pub fn link_calls(&self) -> usize {
        self.link_calls.load(Ordering::SeqCst)
    }

    pub fn note_calls(&self) -> usize {
        self.note_calls.load(Ordering::SeqCst)
    }

    /// Total create calls (thoughts and links); notes excluded.
    pub fn create_calls(&self) -> usize {
        self.thought_calls() + self.link_calls()
    }

    /// Successfully created thoughts as `(dest_id, body)`.
    pub fn created_thoughts(&self) -> Vec<(String, NewThought)> {
        self.thoughts.lock().clone()
    }

    pub fn created_links(&self) -> Vec<(String, NewLink)> {
        self.links.lock().clone()
    }

    /// Attached notes as `(dest_thought_id, markdown)`.
    pub fn attached_notes(&self) -> Vec<(String, String)> {
        self.notes.lock().clone()
    }

    fn mint_id(&self) -> String {
        format!("dest-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

fn scripted_failure(what: &str) -> RemoteError {
    RemoteError::Status {
        status: 500,
        body: format!("scripted failure for {what}"),
    }
}

impl GraphClient for MockGraphClient {
    fn create_thought(&self, thought: &NewThought) -> Result<String, RemoteError> {
        self.thought_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable_thoughts.contains(&thought.name) {
            return Err(RemoteError::Network("connection reset by peer".to_string()));
        }
        if self.failing_thoughts.contains(&thought.name) {
            return Err(scripted_failure(&thought.name));
        }
        let id = self.mint_id();
        self.thoughts.lock().push((id.clone(), thought.clone()));
        Ok(id)
    }

    fn create_link(&self, link: &NewLink) -> Result<String, RemoteError> {
        self.link_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(name) = &link.name {
            if self.failing_links.contains(name) {
                return Err(scripted_failure(name));
            }
        }
        let id = self.mint_id();
        self.links.lock().push((id.clone(), link.clone()));
        Ok(id)
    }

    fn attach_note(&self, thought_id: &str, markdown: &str) -> Result<(), RemoteError> {
        self.note_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failing) = &self.failing_notes {
            if failing.contains(thought_id) {
                return Err(scripted_failure(thought_id));
            }
        }
        self.notes
            .lock()
            .push((thought_id.to_string(), markdown.to_string()));
        Ok(())
    }
}
