//! Interfaces to the host application.
//!
//! The engine never creates or destroys documents. It reads them from a
//! [`DocumentRegistry`], asks a [`WorldContext`] whether a document is in
//! use, waits on an [`IdleSource`] before background work and reports to
//! the user through a [`Notifier`].

pub mod notify;
pub mod world;

use crate::core::{Document, DocumentHandle, DocumentId, DocumentKey, DocumentKind};
use async_trait::async_trait;

pub use notify::{MemoryNotifier, Notice, NoticeLevel, Notifier, TracingNotifier};
pub use world::LocalWorld;

pub trait DocumentRegistry: Send + Sync {
    /// Every live document of `kind`, in a stable order.
    fn documents(&self, kind: DocumentKind) -> Vec<DocumentHandle>;

    fn get(&self, key: &DocumentKey) -> Option<DocumentHandle>;

    /// Resolves a bare id, trying actors before scenes.
    fn find(&self, id: &DocumentId) -> Option<DocumentHandle> {
        DocumentKind::ALL
            .iter()
            .find_map(|kind| self.get(&DocumentKey::new(*kind, id.clone())))
    }

    fn contains(&self, key: &DocumentKey) -> bool {
        self.get(key).is_some()
    }
}

/// Session state deciding whether a document may be evicted.
pub trait WorldContext: Send + Sync {
    /// Whether this operator manages document lifecycles (session owner).
    fn is_privileged(&self) -> bool;

    fn has_player_owner(&self, doc: &Document) -> bool;

    /// Whether a detail view of the document is currently open.
    fn is_rendered(&self, key: &DocumentKey) -> bool;

    /// Whether the document takes part in the running encounter.
    fn in_active_encounter(&self, key: &DocumentKey) -> bool;

    /// Scene activated for all participants.
    fn active_scene(&self) -> Option<DocumentId>;

    /// Scene this operator is currently looking at.
    fn viewed_scene(&self) -> Option<DocumentId>;

    fn is_scene_in_use(&self, id: &DocumentId) -> bool {
        self.active_scene().as_ref() == Some(id) || self.viewed_scene().as_ref() == Some(id)
    }
}

/// Source of idle windows for background work.
#[async_trait]
pub trait IdleSource: Send + Sync {
    /// Resolves once the host has spare capacity.
    async fn wait_for_idle(&self);
}

/// Treats the next scheduler turn as an idle window.
#[derive(Debug, Default, Clone, Copy)]
pub struct YieldIdle;

#[async_trait]
impl IdleSource for YieldIdle {
    async fn wait_for_idle(&self) {
        tokio::task::yield_now().await;
    }
}
