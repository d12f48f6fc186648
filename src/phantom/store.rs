use super::swap::{StoreContext, SwapCounters, SwapEngine};
use super::PhantomLifecycle;
use crate::core::{DocumentHandle, DocumentKind, Result};
use crate::storage::ArchiveStore;
use async_trait::async_trait;
use std::sync::Arc;

/// Phantom store for actors.
pub struct PhantomStore {
    engine: SwapEngine,
}

impl PhantomStore {
    pub fn new(archive: Arc<dyn ArchiveStore>, ctx: StoreContext) -> Self {
        Self {
            engine: SwapEngine::new(DocumentKind::Actor, archive, ctx),
        }
    }
}

#[async_trait]
impl PhantomLifecycle for PhantomStore {
    fn kind(&self) -> DocumentKind {
        self.engine.kind()
    }

    async fn initialize(&self) -> Result<()> {
        self.engine.initialize().await
    }

    fn is_initialized(&self) -> bool {
        self.engine.is_initialized()
    }

    async fn swap_out(&self, doc: &DocumentHandle) -> Result<()> {
        self.engine.swap_out(doc).await
    }

    async fn swap_in(&self, doc: &DocumentHandle) -> Result<()> {
        self.engine.swap_in(doc).await
    }

    fn counters(&self) -> SwapCounters {
        self.engine.counters()
    }
}
