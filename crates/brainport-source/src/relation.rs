//! Relation kinds carried by source links.
//!
//! Exports are inconsistent: some store the relation as a name (`"child"`),
//! others as the destination service's integer code (`1`). Both parse into
//! [`RelationKind`]. Unrecognised values are preserved as
//! [`RelationKind::Other`] so the link is still imported (with the fallback
//! relation), never dropped.

use serde::{Deserialize, Deserializer};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum RelationKind {
    Child,
    Parent,
    #[default]
    Jump,
    Sibling,
    /// Anything the export used that is not one of the four known kinds.
    Other(String),
}

impl RelationKind {
    /// Parse a relation name (case-insensitive) or a numeric code given as text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "child" => Self::Child,
            "parent" => Self::Parent,
            "jump" => Self::Jump,
            "sibling" => Self::Sibling,
            other => match other.parse::<i64>() {
                Ok(code) => Self::from_code(code),
                Err(_) => Self::Other(trimmed.to_string()),
            },
        }
    }

    /// Interpret an integer relation code as written by the destination service.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Child,
            2 => Self::Parent,
            3 => Self::Jump,
            4 => Self::Sibling,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Child => "child",
            Self::Parent => "parent",
            Self::Jump => "jump",
            Self::Sibling => "sibling",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RelationKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            Name(String),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Code(code)) => Self::from_code(code),
            Some(Raw::Name(name)) => Self::parse(&name),
            None => Self::default(),
        })
    }
}
