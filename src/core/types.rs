use serde::{Deserialize, Serialize};
use std::fmt;

/// Field map of a document. Full documents hold all of their fields,
/// phantoms hold only the shell projection.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Stable document id, unique within its [`DocumentKind`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Actor,
    Scene,
}

/// Actor fields that stay resident while phantom.
const ACTOR_SHELL_FIELDS: &[&str] = &["name", "img", "type", "folder", "sort", "ownership"];

/// Scene fields that stay resident while phantom.
const SCENE_SHELL_FIELDS: &[&str] = &[
    "name",
    "thumb",
    "navigation",
    "navName",
    "folder",
    "sort",
    "active",
];

impl DocumentKind {
    pub const ALL: [DocumentKind; 2] = [DocumentKind::Actor, DocumentKind::Scene];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Actor => "actor",
            Self::Scene => "scene",
        }
    }

    /// Fields kept in the phantom projection for this kind.
    pub fn shell_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Actor => ACTOR_SHELL_FIELDS,
            Self::Scene => SCENE_SHELL_FIELDS,
        }
    }

    pub fn is_shell_field(&self, field: &str) -> bool {
        self.shell_fields().contains(&field)
    }

    /// Builds the phantom projection of a full field map.
    pub fn project(&self, full: &Fields) -> Fields {
        self.shell_fields()
            .iter()
            .filter_map(|name| full.get(*name).map(|v| (name.to_string(), v.clone())))
            .collect()
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Globally unique address of a document: its class plus its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey {
    pub kind: DocumentKind,
    pub id: DocumentId,
}

impl DocumentKey {
    pub fn new(kind: DocumentKind, id: impl Into<DocumentId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn actor(id: impl Into<DocumentId>) -> Self {
        Self::new(DocumentKind::Actor, id)
    }

    pub fn scene(id: impl Into<DocumentId>) -> Self {
        Self::new(DocumentKind::Scene, id)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
