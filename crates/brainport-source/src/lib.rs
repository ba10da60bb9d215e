//! Brainport source loader
//!
//! Reads an exported knowledge graph into memory:
//!
//! ```text
//! {
//!   "brain":    { "name": "..." },                       (optional)
//!   "thoughts": [ { "id", "name", "label"?, "entityType"?, ... } ],
//!   "links":    [ { "thoughtIdA", "thoughtIdB", "relation", ... } ],
//!   "notes":    [ { "thoughtId", "markdown" } ]           (optional)
//! }
//! ```
//!
//! Numbered batch files (`import_batch_<n>.json`) share the thought/link shape
//! but only require `thoughts`.
//!
//! Loading has no side effects beyond reading the file. Everything returned is
//! immutable for the rest of the run.

pub mod palette;
pub mod relation;

pub use relation::RelationKind;

use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("source document `{}` does not exist", path.display())]
    Missing { path: PathBuf },
    #[error("failed to read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("source document `{}` is malformed: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
    #[error("source document `{}` is missing required top-level array `{key}`", path.display())]
    MissingKey { path: PathBuf, key: &'static str },
    #[error("thought id `{id}` appears more than once in the source document")]
    DuplicateThought { id: String },
}

// ============================================================================
// Data model
// ============================================================================

/// A source node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thought {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub foreground_color: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
    /// Thought kind as the destination service understands it (1 = normal).
    #[serde(default)]
    pub kind: Option<i64>,
    /// Access control type (0 = public).
    #[serde(default)]
    pub ac_type: Option<i64>,
    #[serde(default)]
    pub note: Option<String>,
}

impl Thought {
    /// Explicit label, else the upper-cased entity type.
    pub fn effective_label(&self) -> Option<String> {
        match (&self.label, &self.entity_type) {
            (Some(label), _) if !label.trim().is_empty() => Some(label.clone()),
            (_, Some(entity_type)) if !entity_type.trim().is_empty() => {
                Some(palette::label_for_entity_type(entity_type))
            }
            _ => None,
        }
    }

    /// Explicit foreground color, else the entity type's palette color.
    pub fn effective_foreground_color(&self) -> Option<String> {
        if let Some(color) = &self.foreground_color {
            return Some(color.clone());
        }
        self.entity_type
            .as_deref()
            .map(|t| palette::color_for_entity_type(t).to_string())
    }

    /// Lower-cased entity type for grouping; `unknown` when absent.
    pub fn entity_type_key(&self) -> String {
        self.entity_type
            .as_deref()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// A source edge.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    /// Source-side id of the `from` endpoint.
    pub thought_id_a: String,
    /// Source-side id of the `to` endpoint.
    pub thought_id_b: String,
    #[serde(default)]
    pub relation: RelationKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub thickness: Option<i64>,
    #[serde(default)]
    pub direction: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub thought_id: String,
    pub markdown: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BrainMeta {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourceDocument {
    #[serde(default)]
    brain: Option<BrainMeta>,
    thoughts: Vec<Thought>,
    links: Vec<Link>,
    #[serde(default)]
    notes: Vec<Note>,
}

#[derive(Debug, Deserialize)]
struct BatchDocument {
    #[serde(default)]
    count: Option<usize>,
    thoughts: Vec<Thought>,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    notes: Vec<Note>,
}

/// The loaded graph, in source-document order.
#[derive(Debug, Clone, Default)]
pub struct SourceGraph {
    pub brain_name: Option<String>,
    pub thoughts: Vec<Thought>,
    pub links: Vec<Link>,
    index: HashMap<String, usize>,
    partial: bool,
}

impl SourceGraph {
    /// Build a graph from already-parsed parts. Notes are merged into their
    /// thoughts; an inline `note` on a thought takes precedence.
    pub fn from_parts(
        brain_name: Option<String>,
        mut thoughts: Vec<Thought>,
        links: Vec<Link>,
        notes: Vec<Note>,
    ) -> Result<Self, LoadError> {
        let mut index = HashMap::with_capacity(thoughts.len());
        for (i, thought) in thoughts.iter().enumerate() {
            if index.insert(thought.id.clone(), i).is_some() {
                return Err(LoadError::DuplicateThought {
                    id: thought.id.clone(),
                });
            }
        }

        for note in notes {
            match index.get(&note.thought_id) {
                Some(&i) => {
                    let thought = &mut thoughts[i];
                    if thought.note.is_none() {
                        thought.note = Some(note.markdown);
                    }
                }
                None => {
                    tracing::warn!(
                        thought_id = %note.thought_id,
                        "note refers to a thought that is not in the source document"
                    );
                }
            }
        }

        Ok(Self {
            brain_name,
            thoughts,
            links,
            index,
            partial: false,
        })
    }

    pub fn thought(&self, id: &str) -> Option<&Thought> {
        self.index.get(id).map(|&i| &self.thoughts[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// True for a batch file: thoughts outside this graph may still exist in
    /// other batches, so a missing endpoint is not evidence of an orphan.
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Links with at least one endpoint that is not a loaded thought.
    pub fn orphan_links(&self) -> Vec<&Link> {
        self.links.iter().filter(|l| self.is_orphan(l)).collect()
    }

    pub fn is_orphan(&self, link: &Link) -> bool {
        !self.contains(&link.thought_id_a) || !self.contains(&link.thought_id_b)
    }

    pub fn note_count(&self) -> usize {
        self.thoughts.iter().filter(|t| t.note.is_some()).count()
    }

    /// Thought counts per entity type (`unknown` when absent), sorted by name.
    pub fn entity_type_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for thought in &self.thoughts {
            *counts.entry(thought.entity_type_key()).or_insert(0) += 1;
        }
        counts
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Load the full export (`thoughts` and `links` are required).
pub fn load_source_graph(path: &Path) -> Result<SourceGraph, LoadError> {
    let value = read_json(path)?;
    require_array(path, &value, "thoughts")?;
    require_array(path, &value, "links")?;

    let doc: SourceDocument = serde_json::from_value(value).map_err(|e| LoadError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let brain_name = doc.brain.unwrap_or_default().name;
    SourceGraph::from_parts(brain_name, doc.thoughts, doc.links, doc.notes)
}

/// Load one numbered batch file (`links` is optional).
pub fn load_batch_file(path: &Path) -> Result<SourceGraph, LoadError> {
    let value = read_json(path)?;
    require_array(path, &value, "thoughts")?;

    let doc: BatchDocument = serde_json::from_value(value).map_err(|e| LoadError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if let Some(count) = doc.count {
        if count != doc.thoughts.len() {
            tracing::warn!(
                path = %path.display(),
                declared = count,
                actual = doc.thoughts.len(),
                "batch file count does not match its thoughts"
            );
        }
    }

    let mut graph = SourceGraph::from_parts(None, doc.thoughts, doc.links, doc.notes)?;
    graph.partial = true;
    Ok(graph)
}

pub fn batch_file_path(dir: &Path, batch: u32) -> PathBuf {
    dir.join(format!("import_batch_{batch}.json"))
}

fn read_json(path: &Path) -> Result<Value, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => LoadError::Missing {
            path: path.to_path_buf(),
        },
        _ => LoadError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    serde_json::from_str(&text).map_err(|e| LoadError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn require_array(path: &Path, value: &Value, key: &'static str) -> Result<(), LoadError> {
    match value.get(key) {
        Some(Value::Array(_)) => Ok(()),
        _ => Err(LoadError::MissingKey {
            path: path.to_path_buf(),
            key,
        }),
    }
}
