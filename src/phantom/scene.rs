use super::swap::{StoreContext, SwapCounters, SwapEngine};
use super::PhantomLifecycle;
use crate::core::{DocumentHandle, DocumentKind, PhantomError, Result};
use crate::host::WorldContext;
use crate::storage::ArchiveStore;
use async_trait::async_trait;
use std::sync::Arc;

/// Phantom store for scenes.
///
/// Unlike actors, a scene that is active or currently viewed is never
/// swapped out, whoever asks.
pub struct ScenePhantomStore {
    engine: SwapEngine,
    world: Arc<dyn WorldContext>,
}

impl ScenePhantomStore {
    pub fn new(
        archive: Arc<dyn ArchiveStore>,
        ctx: StoreContext,
        world: Arc<dyn WorldContext>,
    ) -> Self {
        Self {
            engine: SwapEngine::new(DocumentKind::Scene, archive, ctx),
            world,
        }
    }
}

#[async_trait]
impl PhantomLifecycle for ScenePhantomStore {
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
        if !doc.is_phantom() && self.world.is_scene_in_use(doc.id()) {
            return Err(PhantomError::InUse {
                key: doc.key().clone(),
                reason: "scene is active or being viewed".to_string(),
            });
        }
        self.engine.swap_out(doc).await
    }

    async fn swap_in(&self, doc: &DocumentHandle) -> Result<()> {
        self.engine.swap_in(doc).await
    }

    fn counters(&self) -> SwapCounters {
        self.engine.counters()
    }
}
