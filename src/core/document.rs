//! Live document cell shared between the host registry and the engine.
//!
//! A [`Document`] is always handed out as an `Arc<Document>`. Swapping between
//! the full and phantom representation only rewrites the cell's body, so any
//! holder of the handle keeps pointing at the same document.

use super::error::{PhantomError, Result};
use super::types::{DocumentId, DocumentKey, DocumentKind, Fields};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub type DocumentHandle = Arc<Document>;

/// In-flight swap-in shared by every caller that asked for the same document.
pub type HydrationTask = Shared<BoxFuture<'static, Result<DocumentHandle>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepresentationState {
    Full,
    Phantom,
    Hydrating,
}

/// Pointer from a phantom shell to the archive entry holding its full data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRef {
    pub key: DocumentKey,
    pub archived_at: DateTime<Utc>,
    pub revision: u64,
}

/// Minimal resident projection of a phantomized document.
#[derive(Debug, Clone, PartialEq)]
pub struct PhantomShell {
    pub fields: Fields,
    pub archive_ref: ArchiveRef,
}

#[derive(Debug)]
enum Body {
    Full(Fields),
    Phantom(PhantomShell),
}

pub struct Document {
    key: DocumentKey,
    body: RwLock<Body>,
    /// Bumped on every content mutation, never on representation swaps.
    revision: AtomicU64,
    hydration: Mutex<Option<HydrationTask>>,
    /// Serializes archive operations for this document.
    swap_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("revision", &self.revision())
            .finish()
    }
}

impl Document {
    pub fn new(kind: DocumentKind, id: impl Into<DocumentId>, fields: Fields) -> DocumentHandle {
        Arc::new(Self {
            key: DocumentKey::new(kind, id),
            body: RwLock::new(Body::Full(fields)),
            revision: AtomicU64::new(0),
            hydration: Mutex::new(None),
            swap_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn actor(id: impl Into<DocumentId>, fields: Fields) -> DocumentHandle {
        Self::new(DocumentKind::Actor, id, fields)
    }

    pub fn scene(id: impl Into<DocumentId>, fields: Fields) -> DocumentHandle {
        Self::new(DocumentKind::Scene, id, fields)
    }

    /// Builds a document from a JSON object; non-object values yield an empty field map.
    pub fn from_json(kind: DocumentKind, id: impl Into<DocumentId>, value: Value) -> DocumentHandle {
        let fields = match value {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        Self::new(kind, id, fields)
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn id(&self) -> &DocumentId {
        &self.key.id
    }

    pub fn kind(&self) -> DocumentKind {
        self.key.kind
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn is_phantom(&self) -> bool {
        matches!(*self.read_body(), Body::Phantom(_))
    }

    pub fn is_hydrating(&self) -> bool {
        self.lock_slot().is_some()
    }

    pub fn state(&self) -> RepresentationState {
        if self.is_hydrating() {
            return RepresentationState::Hydrating;
        }
        if self.is_phantom() {
            RepresentationState::Phantom
        } else {
            RepresentationState::Full
        }
    }

    pub fn name(&self) -> Option<String> {
        self.field("name")
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Reads a resident field: any field when full, shell fields only when phantom.
    pub fn field(&self, name: &str) -> Option<Value> {
        match &*self.read_body() {
            Body::Full(fields) => fields.get(name).cloned(),
            Body::Phantom(shell) => shell.fields.get(name).cloned(),
        }
    }

    /// Runs `f` against whatever fields are currently resident.
    pub fn with_fields<R>(&self, f: impl FnOnce(&Fields) -> R) -> R {
        match &*self.read_body() {
            Body::Full(fields) => f(fields),
            Body::Phantom(shell) => f(&shell.fields),
        }
    }

    /// Full field map, or `None` while phantom.
    pub fn full_fields(&self) -> Option<Fields> {
        match &*self.read_body() {
            Body::Full(fields) => Some(fields.clone()),
            Body::Phantom(_) => None,
        }
    }

    pub fn archive_ref(&self) -> Option<ArchiveRef> {
        match &*self.read_body() {
            Body::Full(_) => None,
            Body::Phantom(shell) => Some(shell.archive_ref.clone()),
        }
    }

    /// Merges `patch` into the document.
    ///
    /// A phantom only accepts patches that touch its shell fields; anything
    /// else must be applied after hydration.
    pub fn update(&self, patch: Fields) -> Result<()> {
        let mut body = self.body.write()?;
        match &mut *body {
            Body::Full(fields) => {
                for (name, value) in patch {
                    fields.insert(name, value);
                }
            }
            Body::Phantom(shell) => {
                if let Some(field) = patch.keys().find(|k| !self.key.kind.is_shell_field(k)) {
                    return Err(PhantomError::StillPhantom {
                        key: self.key.clone(),
                        field: field.clone(),
                    });
                }
                for (name, value) in patch {
                    shell.fields.insert(name, value);
                }
            }
        }
        self.revision.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub(crate) fn snapshot_full(&self) -> Option<(Fields, u64)> {
        let body = self.read_body();
        match &*body {
            Body::Full(fields) => Some((fields.clone(), self.revision())),
            Body::Phantom(_) => None,
        }
    }

    /// Shell fields plus the revision they were read at, or `None` when full.
    pub(crate) fn snapshot_shell(&self) -> Option<(PhantomShell, u64)> {
        let body = self.read_body();
        match &*body {
            Body::Full(_) => None,
            Body::Phantom(shell) => Some((shell.clone(), self.revision())),
        }
    }

    /// Replaces the full body with `shell` if nothing mutated the document
    /// since `expected_revision`.
    pub(crate) fn become_phantom(&self, shell: PhantomShell, expected_revision: u64) -> Result<bool> {
        let mut body = self.write_body()?;
        if self.revision() != expected_revision || matches!(*body, Body::Phantom(_)) {
            return Ok(false);
        }
        *body = Body::Phantom(shell);
        Ok(true)
    }

    /// Restores a full body if the shell was not mutated since `expected_revision`.
    pub(crate) fn become_full(&self, fields: Fields, expected_revision: u64) -> Result<bool> {
        let mut body = self.write_body()?;
        if self.revision() != expected_revision || matches!(*body, Body::Full(_)) {
            return Ok(false);
        }
        *body = Body::Full(fields);
        Ok(true)
    }

    pub(crate) fn hydration_slot(&self) -> MutexGuard<'_, Option<HydrationTask>> {
        self.lock_slot()
    }

    pub(crate) fn detach_hydration(&self) {
        self.lock_slot().take();
    }

    pub(crate) async fn swap_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.swap_lock.lock().await
    }

    fn read_body(&self) -> RwLockReadGuard<'_, Body> {
        // A poisoned body still holds a consistent representation: every
        // write replaces it in a single assignment.
        self.body.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_body(&self) -> Result<RwLockWriteGuard<'_, Body>> {
        Ok(self.body.write()?)
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<HydrationTask>> {
        self.hydration
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
