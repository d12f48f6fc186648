use crate::core::{DocumentHandle, Fields, PhantomError, Result};
use crate::hydration::HydrationCoordinator;
use serde_json::Value;
use std::sync::Arc;

/// Upper bound on hydrate-then-read attempts when a scan keeps evicting the
/// document between the two steps.
const READ_ATTEMPTS: usize = 3;

/// Result of a synchronous field read.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRead {
    /// The field is resident; `None` when the document does not have it.
    Ready(Option<Value>),
    /// The document is phantom and the field is not part of its shell.
    /// Hydration has been scheduled; ask again once it completes.
    Pending,
}

impl FieldRead {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// The resident value, or `placeholder` while pending.
    pub fn or_placeholder(self, placeholder: Value) -> Value {
        match self {
            Self::Ready(value) => value.unwrap_or(Value::Null),
            Self::Pending => placeholder,
        }
    }
}

/// Allow-list accessor over a live document.
///
/// Shell fields are served directly, even from a phantom. Every other
/// access hydrates the document first. The wrapped handle is the caller's
/// own, so identity is unchanged across swaps.
#[derive(Clone)]
pub struct Interceptor {
    doc: DocumentHandle,
    coordinator: Arc<HydrationCoordinator>,
}

impl Interceptor {
    pub(crate) fn new(doc: DocumentHandle, coordinator: Arc<HydrationCoordinator>) -> Self {
        Self { doc, coordinator }
    }

    pub fn document(&self) -> &DocumentHandle {
        &self.doc
    }

    pub fn is_phantom(&self) -> bool {
        self.coordinator.is_phantom(&self.doc)
    }

    /// Readable without hydration.
    pub fn is_allowed(&self, field: &str) -> bool {
        self.doc.kind().is_shell_field(field)
    }

    pub async fn hydrate(&self) -> Result<()> {
        self.coordinator.ensure_hydrated(&self.doc).await.map(|_| ())
    }

    pub async fn get(&self, field: &str) -> Result<Option<Value>> {
        if self.is_allowed(field) {
            return Ok(self.doc.field(field));
        }
        self.read(|fields| fields.get(field).cloned()).await
    }

    /// Non-blocking read. Guarded fields of a phantom come back as
    /// [`FieldRead::Pending`] after scheduling hydration.
    pub fn peek(&self, field: &str) -> FieldRead {
        if self.is_allowed(field) || !self.is_phantom() {
            return FieldRead::Ready(self.doc.field(field));
        }
        self.coordinator.prioritize(&self.doc);
        FieldRead::Pending
    }

    /// Runs `f` against the full field map, hydrating first.
    pub async fn read<R>(&self, f: impl FnOnce(&Fields) -> R) -> Result<R> {
        let mut f = Some(f);
        for _ in 0..READ_ATTEMPTS {
            self.hydrate().await?;
            if let Some(fields) = self.doc.full_fields() {
                if let Some(f) = f.take() {
                    return Ok(f(&fields));
                }
            }
        }
        Err(PhantomError::StillPhantom {
            key: self.doc.key().clone(),
            field: "*".to_string(),
        })
    }

    /// Applies `patch`, hydrating first unless it only touches shell fields.
    pub async fn update(&self, patch: Fields) -> Result<()> {
        if !patch.keys().all(|k| self.is_allowed(k)) {
            self.hydrate().await?;
        }
        self.doc.update(patch)
    }
}
