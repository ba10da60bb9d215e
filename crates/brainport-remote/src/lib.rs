//! Brainport remote graph client
//!
//! Three operations against the destination service, each exactly one round
//! trip with no retries (retrying is the import driver's business):
//!
//! - create a thought -> destination id
//! - create a link between two destination thoughts -> destination id
//! - attach a markdown note to a destination thought (best-effort)
//!
//! Non-2xx answers come back as [`RemoteError::Status`]; transport failures as
//! [`RemoteError::Network`]. Neither panics or aborts the caller.

pub mod http;
pub mod mock;

pub use http::{BrainInfo, ClientConfig, EndpointLayout, HttpGraphClient};
pub use mock::MockGraphClient;

use brainport_source::{Link, RelationKind, Thought};
use serde::Serialize;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl RemoteError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

// ============================================================================
// Relation encoding
// ============================================================================

/// Relation used for anything outside the four known kinds.
pub const DEFAULT_RELATION_CODE: u8 = 3;

/// Wire code for a relation kind: `child=1, parent=2, jump=3, sibling=4`.
/// Unknown kinds map to [`DEFAULT_RELATION_CODE`] (jump).
pub fn relation_code(kind: &RelationKind) -> u8 {
    match kind {
        RelationKind::Child => 1,
        RelationKind::Parent => 2,
        RelationKind::Jump => 3,
        RelationKind::Sibling => 4,
        RelationKind::Other(_) => DEFAULT_RELATION_CODE,
    }
}

// ============================================================================
// Wire bodies
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewThought {
    pub name: String,
    pub kind: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreground_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    pub ac_type: i64,
}

impl NewThought {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: 1,
            label: None,
            foreground_color: None,
            background_color: None,
            ac_type: 0,
        }
    }

    /// Wire body for a source thought, filling label and color from the
    /// entity type when the thought has none.
    pub fn from_source(thought: &Thought) -> Self {
        Self {
            name: thought.name.clone(),
            kind: thought.kind.unwrap_or(1),
            label: thought.effective_label(),
            foreground_color: thought.effective_foreground_color(),
            background_color: thought.background_color.clone(),
            ac_type: thought.ac_type.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLink {
    pub thought_id_a: String,
    pub thought_id_b: String,
    pub relation: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thickness: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<i64>,
}

impl NewLink {
    /// Wire body for a source link whose endpoints map to `from_dest`/`to_dest`.
    pub fn from_source(link: &Link, from_dest: &str, to_dest: &str) -> Self {
        Self {
            thought_id_a: from_dest.to_string(),
            thought_id_b: to_dest.to_string(),
            relation: relation_code(&link.relation),
            name: link.name.clone().filter(|n| !n.is_empty()),
            color: link.color.clone(),
            thickness: link.thickness,
            direction: link.direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteBody<'a> {
    pub markdown: &'a str,
}

// ============================================================================
// Client interface
// ============================================================================

pub trait GraphClient {
    fn create_thought(&self, thought: &NewThought) -> Result<String, RemoteError>;

    fn create_link(&self, link: &NewLink) -> Result<String, RemoteError>;

    /// Best-effort enrichment; callers must not undo the thought on failure.
    fn attach_note(&self, thought_id: &str, markdown: &str) -> Result<(), RemoteError>;
}

impl<T: GraphClient + ?Sized> GraphClient for &T {
    fn create_thought(&self, thought: &NewThought) -> Result<String, RemoteError> {
        (**self).create_thought(thought)
    }

    fn create_link(&self, link: &NewLink) -> Result<String, RemoteError> {
        (**self).create_link(link)
    }

    fn attach_note(&self, thought_id: &str, markdown: &str) -> Result<(), RemoteError> {
        (**self).attach_note(thought_id, markdown)
    }
}
