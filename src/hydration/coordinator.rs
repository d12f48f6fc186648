use crate::core::{
    DocumentHandle, DocumentId, DocumentKey, DocumentKind, HydrationTask, PhantomError, Result,
};
use crate::host::DocumentRegistry;
use crate::phantom::PhantomLifecycle;
use futures::FutureExt;
use std::fmt;
use std::sync::Arc;
use tracing::{Level, event};

/// Something that can be resolved to a live document.
#[derive(Debug, Clone)]
pub enum HydrationTarget {
    /// Bare id, looked up among actors first, then scenes
    Id(DocumentId),
    Key(DocumentKey),
    Document(DocumentHandle),
}

impl fmt::Display for HydrationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Key(key) => write!(f, "{}", key),
            Self::Document(doc) => write!(f, "{}", doc.key()),
        }
    }
}

impl From<DocumentHandle> for HydrationTarget {
    fn from(doc: DocumentHandle) -> Self {
        Self::Document(doc)
    }
}

impl From<&DocumentHandle> for HydrationTarget {
    fn from(doc: &DocumentHandle) -> Self {
        Self::Document(doc.clone())
    }
}

impl From<DocumentKey> for HydrationTarget {
    fn from(key: DocumentKey) -> Self {
        Self::Key(key)
    }
}

impl From<DocumentId> for HydrationTarget {
    fn from(id: DocumentId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for HydrationTarget {
    fn from(id: &str) -> Self {
        Self::Id(DocumentId::new(id))
    }
}

/// Deduplicating front of the phantom stores: at most one swap-in per
/// document is in flight, and every concurrent caller joins it.
pub struct HydrationCoordinator {
    actors: Arc<dyn PhantomLifecycle>,
    scenes: Arc<dyn PhantomLifecycle>,
    registry: Arc<dyn DocumentRegistry>,
}

impl HydrationCoordinator {
    pub fn new(
        actors: Arc<dyn PhantomLifecycle>,
        scenes: Arc<dyn PhantomLifecycle>,
        registry: Arc<dyn DocumentRegistry>,
    ) -> Self {
        Self {
            actors,
            scenes,
            registry,
        }
    }

    pub fn store_for(&self, kind: DocumentKind) -> &Arc<dyn PhantomLifecycle> {
        match kind {
            DocumentKind::Actor => &self.actors,
            DocumentKind::Scene => &self.scenes,
        }
    }

    pub fn is_phantom(&self, doc: &DocumentHandle) -> bool {
        self.store_for(doc.kind()).is_phantom(doc)
    }

    pub fn resolve(&self, target: HydrationTarget) -> Option<DocumentHandle> {
        match target {
            HydrationTarget::Document(doc) => Some(doc),
            HydrationTarget::Key(key) => self.registry.get(&key),
            HydrationTarget::Id(id) => self.registry.find(&id),
        }
    }

    /// Resolves once `doc` is full.
    ///
    /// Full documents resolve immediately. Concurrent callers for the same
    /// phantom share one swap-in and observe the same outcome.
    pub async fn ensure_hydrated(&self, doc: &DocumentHandle) -> Result<DocumentHandle> {
        match self.hydration_task(doc) {
            Some(task) => task.await,
            None => Ok(doc.clone()),
        }
    }

    /// Resolves `target` and waits until it is full.
    pub async fn hydrate(&self, target: impl Into<HydrationTarget>) -> Result<DocumentHandle> {
        let target = target.into();
        let doc = self
            .resolve(target.clone())
            .ok_or_else(|| PhantomError::DocumentNotFound(target.to_string()))?;
        self.ensure_hydrated(&doc).await
    }

    /// Hydrates in the background; the outcome is only logged.
    ///
    /// Returns `false` when the target could not be resolved or no runtime
    /// is available to run the hydration.
    pub fn prioritize(&self, target: impl Into<HydrationTarget>) -> bool {
        let target = target.into();
        let Some(doc) = self.resolve(target.clone()) else {
            event!(Level::DEBUG, target = ?target, "prioritize: no such document");
            return false;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            event!(Level::WARN, document = %doc.key(), "prioritize called outside a runtime");
            return false;
        };

        if let Some(task) = self.hydration_task(&doc) {
            let key = doc.key().clone();
            runtime.spawn(async move {
                if let Err(err) = task.await {
                    event!(Level::WARN, document = %key, error = %err, "background hydration failed");
                }
            });
        }
        true
    }

    /// Returns the in-flight hydration of `doc`, starting one if `doc` is a
    /// phantom with nothing attached. `None` means the document is full.
    ///
    /// The slot is inspected and filled under one lock, so two callers can
    /// never both start a swap-in for the same document.
    pub fn hydration_task(&self, doc: &DocumentHandle) -> Option<HydrationTask> {
        let mut slot = doc.hydration_slot();
        if let Some(task) = slot.as_ref() {
            return Some(task.clone());
        }
        if !doc.is_phantom() {
            return None;
        }

        let store = self.store_for(doc.kind()).clone();
        let target = doc.clone();
        // Spawned so the swap runs to completion even if every caller goes away.
        let swap = tokio::spawn(async move {
            let result = store.swap_in(&target).await;
            target.detach_hydration();
            result.map(|()| target)
        });

        let owner = doc.clone();
        let task = async move {
            match swap.await {
                Ok(result) => result,
                Err(join_err) => {
                    owner.detach_hydration();
                    Err(PhantomError::Execution(format!("hydration task: {}", join_err)))
                }
            }
        }
        .boxed()
        .shared();

        *slot = Some(task.clone());
        Some(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityTracker, SignalBus};
    use crate::config::{ArchiveMissPolicy, EngineConfig};
    use crate::core::{Document, Fields, RepresentationState};
    use crate::host::{LocalWorld, TracingNotifier};
    use crate::phantom::{PhantomStore, ScenePhantomStore, StoreContext};
    use crate::storage::{ArchiveStore, MemoryArchive};
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        coordinator: Arc<HydrationCoordinator>,
        actor_archive: Arc<MemoryArchive>,
        actors: Arc<dyn PhantomLifecycle>,
        world: Arc<LocalWorld>,
    }

    async fn fixture(config: EngineConfig) -> Fixture {
        let world = Arc::new(LocalWorld::new(true));
        let ctx = StoreContext {
            config: Arc::new(config),
            signals: SignalBus::new(Arc::new(ActivityTracker::new())),
            notifier: Arc::new(TracingNotifier),
        };
        let actor_archive =
            Arc::new(MemoryArchive::new().with_latency(Duration::from_millis(20)));
        let actors: Arc<dyn PhantomLifecycle> =
            Arc::new(PhantomStore::new(actor_archive.clone(), ctx.clone()));
        let scenes: Arc<dyn PhantomLifecycle> = Arc::new(ScenePhantomStore::new(
            Arc::new(MemoryArchive::new()),
            ctx,
            world.clone(),
        ));
        actors.initialize().await.unwrap();
        scenes.initialize().await.unwrap();

        Fixture {
            coordinator: Arc::new(HydrationCoordinator::new(
                actors.clone(),
                scenes,
                world.clone(),
            )),
            actor_archive,
            actors,
            world,
        }
    }

    fn orc(id: &str) -> DocumentHandle {
        Document::from_json(
            DocumentKind::Actor,
            id,
            json!({"name": "Orc", "system": {"hp": 15}}),
        )
    }

    #[tokio::test]
    async fn test_full_document_resolves_immediately() {
        let f = fixture(EngineConfig::default()).await;
        let doc = f.world.add(orc("o1"));

        let resolved = f.coordinator.ensure_hydrated(&doc).await.unwrap();
        assert!(Arc::ptr_eq(&resolved, &doc));
        assert_eq!(f.actor_archive.stats().await.reads, 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_swap_in() {
        let f = fixture(EngineConfig::default()).await;
        let doc = f.world.add(orc("o1"));
        f.actors.swap_out(&doc).await.unwrap();

        let mut handles = vec![];
        for _ in 0..10 {
            let coordinator = f.coordinator.clone();
            let doc = doc.clone();
            handles.push(tokio::spawn(async move {
                coordinator.ensure_hydrated(&doc).await
            }));
        }
        for handle in handles {
            let resolved = handle.await.unwrap().unwrap();
            assert!(Arc::ptr_eq(&resolved, &doc));
        }

        assert_eq!(f.actor_archive.stats().await.reads, 1);
        assert_eq!(doc.state(), RepresentationState::Full);
        assert_eq!(doc.field("system"), Some(json!({"hp": 15})));
    }

    #[tokio::test]
    async fn test_document_reports_hydrating_while_in_flight() {
        let f = fixture(EngineConfig::default()).await;
        let doc = f.world.add(orc("o1"));
        f.actors.swap_out(&doc).await.unwrap();

        let task = f.coordinator.hydration_task(&doc).unwrap();
        assert_eq!(doc.state(), RepresentationState::Hydrating);
        task.await.unwrap();
        assert_eq!(doc.state(), RepresentationState::Full);
    }

    #[tokio::test]
    async fn test_failure_detaches_so_retry_works() {
        let f = fixture(EngineConfig::default().archive_miss_policy(ArchiveMissPolicy::KeepPhantom))
            .await;
        let doc = f.world.add(orc("o1"));
        f.actors.swap_out(&doc).await.unwrap();
        let entry = f.actor_archive.forget(doc.key()).await.unwrap();

        let (a, b) = tokio::join!(
            f.coordinator.ensure_hydrated(&doc),
            f.coordinator.ensure_hydrated(&doc)
        );
        assert_eq!(a.unwrap_err(), PhantomError::ArchiveMiss(doc.key().clone()));
        assert_eq!(b.unwrap_err(), PhantomError::ArchiveMiss(doc.key().clone()));
        assert!(!doc.is_hydrating());
        assert!(doc.is_phantom());

        f.actor_archive.write(&entry).await.unwrap();
        f.coordinator.ensure_hydrated(&doc).await.unwrap();
        assert!(!doc.is_phantom());
    }

    #[tokio::test]
    async fn test_mutation_during_hydration_discards_restore() {
        let f = fixture(EngineConfig::default()).await;
        let doc = f.world.add(orc("o1"));
        f.actors.swap_out(&doc).await.unwrap();

        let rename = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let mut patch = Fields::new();
            patch.insert("name".into(), json!("Orc Chieftain"));
            doc.update(patch).unwrap();
        };
        let (a, b, _) = tokio::join!(
            f.coordinator.ensure_hydrated(&doc),
            f.coordinator.ensure_hydrated(&doc),
            rename
        );

        let expected = PhantomError::ConcurrentMutation(doc.key().clone());
        assert_eq!(a.unwrap_err(), expected);
        assert_eq!(b.unwrap_err(), expected);
        assert_eq!(doc.state(), RepresentationState::Phantom);
        assert!(f.actor_archive.peek(doc.key()).await.is_some());

        f.coordinator.ensure_hydrated(&doc).await.unwrap();
        assert_eq!(doc.name().as_deref(), Some("Orc Chieftain"));
        assert_eq!(doc.field("system"), Some(json!({"hp": 15})));
    }

    #[tokio::test]
    async fn test_hydrate_by_key() {
        let f = fixture(EngineConfig::default()).await;
        let doc = f.world.add(orc("o1"));
        f.actors.swap_out(&doc).await.unwrap();

        let resolved = f.coordinator.hydrate(DocumentKey::actor("o1")).await.unwrap();
        assert!(Arc::ptr_eq(&resolved, &doc));
        assert!(!doc.is_phantom());
        assert_eq!(
            f.coordinator.hydrate("ghost").await.unwrap_err(),
            PhantomError::DocumentNotFound("ghost".to_string())
        );
    }

    #[tokio::test]
    async fn test_prioritize_by_id() {
        let f = fixture(EngineConfig::default()).await;
        let doc = f.world.add(orc("o1"));
        f.actors.swap_out(&doc).await.unwrap();

        assert!(f.coordinator.prioritize("o1"));
        assert!(!f.coordinator.prioritize("nobody"));

        for _ in 0..100 {
            if !doc.is_phantom() && !doc.is_hydrating() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(doc.state(), RepresentationState::Full);
        assert_eq!(f.actor_archive.stats().await.reads, 1);
    }
}
