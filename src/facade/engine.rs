use crate::activity::{ActivityTracker, Signal, SignalBus};
use crate::config::EngineConfig;
use crate::core::{Document, DocumentHandle, DocumentKind, PhantomError, RepresentationState, Result};
use crate::decay::{DecayReport, DecayScanner, DecayWorker, spawn_decay_worker, spawn_delayed};
use crate::host::{DocumentRegistry, IdleSource, Notifier, TracingNotifier, WorldContext, YieldIdle};
use crate::hydration::{HydrationCoordinator, HydrationTarget};
use crate::phantom::{PhantomLifecycle, PhantomStore, ScenePhantomStore, StoreContext, SwapCounters};
use crate::proxy::{ActorProxy, Proxy, SceneProxy};
use crate::recovery::{Exorcist, RecoveryReport};
use crate::storage::{ArchiveStore, FileArchive, MemoryArchive};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{Level, event};

/// Collects the collaborators of a [`PhantomEngine`].
///
/// Only the host is required. Archives default to [`MemoryArchive`], the
/// idle source to [`YieldIdle`] and notifications to [`TracingNotifier`].
pub struct PhantomEngineBuilder {
    config: EngineConfig,
    registry: Option<Arc<dyn DocumentRegistry>>,
    world: Option<Arc<dyn WorldContext>>,
    idle: Arc<dyn IdleSource>,
    notifier: Arc<dyn Notifier>,
    actor_archive: Option<Arc<dyn ArchiveStore>>,
    scene_archive: Option<Arc<dyn ArchiveStore>>,
}

impl Default for PhantomEngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            registry: None,
            world: None,
            idle: Arc::new(YieldIdle),
            notifier: Arc::new(TracingNotifier),
            actor_archive: None,
            scene_archive: None,
        }
    }
}

impl PhantomEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses one object as both document registry and world context.
    pub fn host<H>(mut self, host: Arc<H>) -> Self
    where
        H: DocumentRegistry + WorldContext + 'static,
    {
        self.registry = Some(host.clone());
        self.world = Some(host);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn DocumentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn world(mut self, world: Arc<dyn WorldContext>) -> Self {
        self.world = Some(world);
        self
    }

    pub fn idle_source(mut self, idle: Arc<dyn IdleSource>) -> Self {
        self.idle = idle;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn actor_archive(mut self, archive: Arc<dyn ArchiveStore>) -> Self {
        self.actor_archive = Some(archive);
        self
    }

    pub fn scene_archive(mut self, archive: Arc<dyn ArchiveStore>) -> Self {
        self.scene_archive = Some(archive);
        self
    }

    /// File archives for both classes under `root`.
    pub fn archive_dir<P: AsRef<Path>>(self, root: P) -> Self {
        let root = root.as_ref();
        self.actor_archive(Arc::new(FileArchive::new(root, DocumentKind::Actor)))
            .scene_archive(Arc::new(FileArchive::new(root, DocumentKind::Scene)))
    }

    /// Wires every component. No I/O happens here; call
    /// [`PhantomEngine::connect`] before the first swap.
    pub fn init(self) -> Result<PhantomEngine> {
        self.config.validate()?;
        let registry = self
            .registry
            .ok_or_else(|| PhantomError::Config("a document registry is required".to_string()))?;
        let world = self
            .world
            .ok_or_else(|| PhantomError::Config("a world context is required".to_string()))?;

        let config = Arc::new(self.config);
        let tracker = Arc::new(ActivityTracker::new());
        let signals = SignalBus::new(tracker.clone());
        let ctx = StoreContext {
            config: config.clone(),
            signals: signals.clone(),
            notifier: self.notifier.clone(),
        };

        let actor_archive = self
            .actor_archive
            .unwrap_or_else(|| Arc::new(MemoryArchive::new()));
        let scene_archive = self
            .scene_archive
            .unwrap_or_else(|| Arc::new(MemoryArchive::new()));
        let actors: Arc<dyn PhantomLifecycle> =
            Arc::new(PhantomStore::new(actor_archive, ctx.clone()));
        let scenes: Arc<dyn PhantomLifecycle> =
            Arc::new(ScenePhantomStore::new(scene_archive, ctx, world.clone()));

        let coordinator = Arc::new(HydrationCoordinator::new(
            actors.clone(),
            scenes.clone(),
            registry.clone(),
        ));
        let scanner = |store: &Arc<dyn PhantomLifecycle>| {
            Arc::new(DecayScanner::new(
                store.clone(),
                registry.clone(),
                world.clone(),
                tracker.clone(),
                self.notifier.clone(),
                config.clone(),
            ))
        };
        let actor_decay = scanner(&actors);
        let scene_decay = scanner(&scenes);
        let exorcist = Exorcist::new(
            coordinator.clone(),
            registry.clone(),
            world.clone(),
            self.notifier.clone(),
        );

        Ok(PhantomEngine {
            config,
            registry,
            idle: self.idle,
            notifier: self.notifier,
            tracker,
            signals,
            actors,
            scenes,
            coordinator,
            actor_decay,
            scene_decay,
            exorcist: Arc::new(exorcist),
        })
    }
}

/// Representation counts for one document class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassStats {
    pub total: usize,
    pub full: usize,
    pub phantom: usize,
    pub hydrating: usize,
    pub swaps: SwapCounters,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub actors: ClassStats,
    pub scenes: ClassStats,
    /// Documents with an activity record
    pub tracked: usize,
}

/// Background tasks started by [`PhantomEngine::start`].
pub struct EngineWorkers {
    workers: Vec<DecayWorker>,
}

impl EngineWorkers {
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Stops every worker, letting an in-progress scan finish first.
    pub async fn stop(self) -> Result<()> {
        let mut first_err = None;
        for worker in self.workers {
            let name = worker.name();
            if let Err(err) = worker.stop().await {
                event!(Level::ERROR, worker = name, error = %err, "worker did not stop cleanly");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Entry point of the phantom system.
///
/// Routes every call to the actor or scene side based on the document's
/// kind.
///
/// # Examples
///
/// ```
/// use rustphantom::{Document, DocumentKind, LocalWorld, PhantomEngine};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> rustphantom::Result<()> {
/// let world = Arc::new(LocalWorld::new(true));
/// let goblin = world.add(Document::from_json(
///     DocumentKind::Actor,
///     "goblin",
///     json!({"name": "Goblin", "system": {"hp": 7}}),
/// ));
///
/// let engine = PhantomEngine::builder().host(world.clone()).init()?;
/// engine.connect().await?;
///
/// engine.swap_out(&goblin).await?;
/// assert!(engine.is_phantom(&goblin));
/// assert_eq!(goblin.name().as_deref(), Some("Goblin"));
///
/// engine.ensure_hydrated(&goblin).await?;
/// assert_eq!(goblin.field("system"), Some(json!({"hp": 7})));
/// # Ok(())
/// # }
/// ```
pub struct PhantomEngine {
    config: Arc<EngineConfig>,
    registry: Arc<dyn DocumentRegistry>,
    idle: Arc<dyn IdleSource>,
    notifier: Arc<dyn Notifier>,
    tracker: Arc<ActivityTracker>,
    signals: SignalBus,
    actors: Arc<dyn PhantomLifecycle>,
    scenes: Arc<dyn PhantomLifecycle>,
    coordinator: Arc<HydrationCoordinator>,
    actor_decay: Arc<DecayScanner>,
    scene_decay: Arc<DecayScanner>,
    exorcist: Arc<Exorcist>,
}

impl PhantomEngine {
    pub fn builder() -> PhantomEngineBuilder {
        PhantomEngineBuilder::new()
    }

    /// Opens both archives. Idempotent.
    pub async fn connect(&self) -> Result<()> {
        self.actors.initialize().await?;
        self.scenes.initialize().await?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.actors.is_initialized() && self.scenes.is_initialized()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<ActivityTracker> {
        &self.tracker
    }

    pub fn coordinator(&self) -> &Arc<HydrationCoordinator> {
        &self.coordinator
    }

    pub fn store(&self, kind: DocumentKind) -> &Arc<dyn PhantomLifecycle> {
        match kind {
            DocumentKind::Actor => &self.actors,
            DocumentKind::Scene => &self.scenes,
        }
    }

    pub fn decay_scanner(&self, kind: DocumentKind) -> &Arc<DecayScanner> {
        match kind {
            DocumentKind::Actor => &self.actor_decay,
            DocumentKind::Scene => &self.scene_decay,
        }
    }

    pub fn is_phantom(&self, doc: &Document) -> bool {
        self.store(doc.kind()).is_phantom(doc)
    }

    pub async fn ensure_hydrated(&self, doc: &DocumentHandle) -> Result<DocumentHandle> {
        self.coordinator.ensure_hydrated(doc).await
    }

    /// Looks `target` up in the registry and hydrates it.
    pub async fn hydrate(&self, target: impl Into<HydrationTarget>) -> Result<DocumentHandle> {
        self.coordinator.hydrate(target).await
    }

    /// Starts hydrating `target` in the background. See
    /// [`HydrationCoordinator::prioritize`].
    pub fn prioritize(&self, target: impl Into<HydrationTarget>) -> bool {
        self.coordinator.prioritize(target)
    }

    pub async fn swap_out(&self, actor: &DocumentHandle) -> Result<()> {
        self.actors.swap_out(actor).await
    }

    /// Goes through the hydration gate, so it joins any in-flight swap-in.
    pub async fn swap_in(&self, actor: &DocumentHandle) -> Result<()> {
        self.ensure_kind(actor, DocumentKind::Actor)?;
        self.coordinator.ensure_hydrated(actor).await.map(|_| ())
    }

    pub async fn swap_out_scene(&self, scene: &DocumentHandle) -> Result<()> {
        self.scenes.swap_out(scene).await
    }

    pub async fn swap_in_scene(&self, scene: &DocumentHandle) -> Result<()> {
        self.ensure_kind(scene, DocumentKind::Scene)?;
        self.coordinator.ensure_hydrated(scene).await.map(|_| ())
    }

    pub async fn exorcise(&self) -> Result<RecoveryReport> {
        self.exorcist.perform().await
    }

    /// One decay pass over both classes.
    pub async fn process_decay(&self) -> Result<(DecayReport, DecayReport)> {
        let actors = self.actor_decay.process_decay().await?;
        let scenes = self.scene_decay.process_decay().await?;
        Ok((actors, scenes))
    }

    /// Phantomizes every unprotected document regardless of idle time.
    pub async fn phantomize_all(&self) -> Result<(DecayReport, DecayReport)> {
        let actors = self.actor_decay.phantomize_all().await?;
        let scenes = self.scene_decay.phantomize_all().await?;
        self.notifier.info(&format!(
            "Phantomized {} actors and {} scenes.",
            actors.swapped_out, scenes.swapped_out
        ));
        Ok((actors, scenes))
    }

    /// Decay pass run once shortly after startup, skipped when some actor
    /// is already a phantom. Returns the number of documents swapped out.
    pub async fn initial_scan(&self) -> Result<usize> {
        let any_phantom = self
            .registry
            .documents(DocumentKind::Actor)
            .iter()
            .any(|doc| self.actors.is_phantom(doc));
        if any_phantom {
            event!(Level::DEBUG, "phantoms already present; skipping initial scan");
            return Ok(0);
        }

        event!(Level::INFO, "performing initial scan");
        let (actors, scenes) = self.process_decay().await?;
        let optimized = actors.swapped_out + scenes.swapped_out;
        if optimized > 0 {
            self.notifier.info(&format!(
                "Initial scan complete. Optimized {} entities.",
                optimized
            ));
        }
        Ok(optimized)
    }

    /// Records host activity and forwards it to subscribers.
    pub fn record_activity(&self, signal: Signal) {
        self.signals.emit(signal);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.signals.subscribe()
    }

    pub fn actor_proxy(&self, actor: DocumentHandle) -> Result<ActorProxy> {
        ActorProxy::new(actor, self.coordinator.clone())
    }

    pub fn scene_proxy(&self, scene: DocumentHandle) -> Result<SceneProxy> {
        SceneProxy::new(scene, self.coordinator.clone())
    }

    pub fn proxy(&self, doc: DocumentHandle) -> Proxy {
        Proxy::wrap(doc, self.coordinator.clone())
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            actors: self.class_stats(DocumentKind::Actor),
            scenes: self.class_stats(DocumentKind::Scene),
            tracked: self.tracker.len(),
        }
    }

    /// Spawns the periodic decay loops and, if enabled, the delayed initial
    /// scan. Must be called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>) -> EngineWorkers {
        let interval = self.config.check_interval_duration();
        let ceiling = self.config.idle_wait_ceiling_duration();
        let mut workers = vec![
            spawn_decay_worker(self.actor_decay.clone(), self.idle.clone(), interval, ceiling),
            spawn_decay_worker(self.scene_decay.clone(), self.idle.clone(), interval, ceiling),
        ];

        if self.config.initial_scan {
            let engine = self.clone();
            workers.push(spawn_delayed(
                "initial-scan",
                self.config.initial_scan_delay_duration(),
                async move {
                    if let Err(err) = engine.initial_scan().await {
                        event!(Level::ERROR, error = %err, "initial scan failed");
                    }
                },
            ));
        }

        event!(Level::INFO, workers = workers.len(), "phantom engine workers started");
        EngineWorkers { workers }
    }

    fn class_stats(&self, kind: DocumentKind) -> ClassStats {
        let mut stats = ClassStats {
            swaps: self.store(kind).counters(),
            ..ClassStats::default()
        };
        for doc in self.registry.documents(kind) {
            stats.total += 1;
            match doc.state() {
                RepresentationState::Full => stats.full += 1,
                RepresentationState::Phantom => stats.phantom += 1,
                RepresentationState::Hydrating => stats.hydrating += 1,
            }
        }
        stats
    }

    fn ensure_kind(&self, doc: &Document, expected: DocumentKind) -> Result<()> {
        if doc.kind() != expected {
            return Err(PhantomError::WrongKind {
                expected,
                found: doc.kind(),
            });
        }
        Ok(())
    }
}
