//! Phantom/full representation state per document class.

pub mod scene;
pub mod store;
mod swap;

use crate::core::{Document, DocumentHandle, DocumentKind, Result};
use async_trait::async_trait;

pub use scene::ScenePhantomStore;
pub use store::PhantomStore;
pub use swap::{StoreContext, SwapCounters};

/// Contract shared by the per-class phantom stores.
#[async_trait]
pub trait PhantomLifecycle: Send + Sync {
    fn kind(&self) -> DocumentKind;

    /// Opens the backing archive. Must complete before any swap; idempotent.
    async fn initialize(&self) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// Pure O(1) check of the current representation.
    fn is_phantom(&self, doc: &Document) -> bool {
        doc.is_phantom()
    }

    /// Archives the full data, then replaces it with the shell projection.
    /// No-op on a phantom.
    async fn swap_out(&self, doc: &DocumentHandle) -> Result<()>;

    /// Restores the archived full data in place. No-op on a full document.
    async fn swap_in(&self, doc: &DocumentHandle) -> Result<()>;

    fn counters(&self) -> SwapCounters;
}
