use crate::activity::ActivityTracker;
use crate::config::EngineConfig;
use crate::core::{Document, DocumentHandle, DocumentKey, DocumentKind, PhantomError, Result};
use crate::host::{DocumentRegistry, Notifier, WorldContext};
use crate::phantom::PhantomLifecycle;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Level, event, info_span};

/// Why a document is kept out of a decay pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    AlreadyPhantom,
    Hydrating,
    PlayerOwned,
    Rendered,
    InEncounter,
    SceneInUse,
}

/// Outcome of one decay pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayReport {
    pub kind: DocumentKind,
    /// The operator is not privileged; nothing was examined
    pub skipped: bool,
    pub candidates: usize,
    pub swapped_out: usize,
    pub failures: Vec<(DocumentKey, PhantomError)>,
    /// Activity records dropped for documents that no longer exist
    pub pruned: usize,
}

impl DecayReport {
    fn new(kind: DocumentKind) -> Self {
        Self {
            kind,
            skipped: false,
            candidates: 0,
            swapped_out: 0,
            failures: Vec::new(),
            pruned: 0,
        }
    }
}

/// Idle-based eviction sweep for one document class.
pub struct DecayScanner {
    kind: DocumentKind,
    store: Arc<dyn PhantomLifecycle>,
    registry: Arc<dyn DocumentRegistry>,
    world: Arc<dyn WorldContext>,
    tracker: Arc<ActivityTracker>,
    notifier: Arc<dyn Notifier>,
    config: Arc<EngineConfig>,
    /// Held for the duration of a pass; passes never overlap.
    scanning: Mutex<()>,
}

impl DecayScanner {
    pub fn new(
        store: Arc<dyn PhantomLifecycle>,
        registry: Arc<dyn DocumentRegistry>,
        world: Arc<dyn WorldContext>,
        tracker: Arc<ActivityTracker>,
        notifier: Arc<dyn Notifier>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            kind: store.kind(),
            store,
            registry,
            world,
            tracker,
            notifier,
            config,
            scanning: Mutex::new(()),
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// First exclusion rule `doc` hits, if any. Idle time is not considered.
    pub fn exclusion(&self, doc: &Document) -> Option<Exclusion> {
        let key = doc.key();
        if doc.is_hydrating() {
            return Some(Exclusion::Hydrating);
        }
        if self.store.is_phantom(doc) {
            return Some(Exclusion::AlreadyPhantom);
        }
        match self.kind {
            DocumentKind::Actor => {
                if self.world.has_player_owner(doc) {
                    return Some(Exclusion::PlayerOwned);
                }
            }
            DocumentKind::Scene => {
                if self.world.is_scene_in_use(doc.id()) {
                    return Some(Exclusion::SceneInUse);
                }
            }
        }
        if self.world.is_rendered(key) {
            return Some(Exclusion::Rendered);
        }
        if self.world.in_active_encounter(key) {
            return Some(Exclusion::InEncounter);
        }
        None
    }

    pub fn is_eligible_at(&self, doc: &Document, now: DateTime<Utc>) -> bool {
        self.exclusion(doc).is_none()
            && self
                .tracker
                .is_idle(doc.key(), now, self.idle_threshold())
    }

    pub fn collect_candidates_at(&self, now: DateTime<Utc>) -> Vec<DocumentHandle> {
        self.registry
            .documents(self.kind)
            .into_iter()
            .filter(|doc| self.is_eligible_at(doc, now))
            .collect()
    }

    pub async fn process_decay(&self) -> Result<DecayReport> {
        self.process_decay_at(Utc::now()).await
    }

    /// Phantomizes every eligible document idle for longer than the threshold at `now`.
    pub async fn process_decay_at(&self, now: DateTime<Utc>) -> Result<DecayReport> {
        let _scan = self.scanning.lock().await;
        let mut report = DecayReport::new(self.kind);
        if !self.world.is_privileged() {
            report.skipped = true;
            return Ok(report);
        }

        let span = info_span!("decay.scan", kind = %self.kind);
        let candidates = {
            let _enter = span.enter();
            event!(Level::DEBUG, "running decay scan");
            report.pruned = self.prune_activity();
            self.collect_candidates_at(now)
        };
        report.candidates = candidates.len();
        if candidates.is_empty() {
            return Ok(report);
        }

        event!(Level::INFO, kind = %self.kind, count = candidates.len(), "phantomizing inactive documents");
        self.notifier.info(&format!(
            "Cleaning up {} inactive {}s...",
            candidates.len(),
            self.kind
        ));

        self.swap_out_sequentially(candidates, &mut report, |doc| self.is_eligible_at(doc, now))
            .await;
        Ok(report)
    }

    /// Phantomizes every document that passes the exclusion checks,
    /// regardless of idle time.
    pub async fn phantomize_all(&self) -> Result<DecayReport> {
        let _scan = self.scanning.lock().await;
        if !self.world.is_privileged() {
            return Err(PhantomError::Unauthorized(
                "only the session owner can phantomize documents".to_string(),
            ));
        }

        let mut report = DecayReport::new(self.kind);
        let candidates: Vec<_> = self
            .registry
            .documents(self.kind)
            .into_iter()
            .filter(|doc| self.exclusion(doc).is_none())
            .collect();
        report.candidates = candidates.len();
        if candidates.is_empty() {
            return Ok(report);
        }

        event!(Level::INFO, kind = %self.kind, count = candidates.len(), "phantomizing all eligible documents");
        self.swap_out_sequentially(candidates, &mut report, |doc| self.exclusion(doc).is_none())
            .await;
        Ok(report)
    }

    /// One swap at a time, so the archive's write path is never flooded.
    /// `still_eligible` is re-checked right before each swap.
    async fn swap_out_sequentially(
        &self,
        candidates: Vec<DocumentHandle>,
        report: &mut DecayReport,
        still_eligible: impl Fn(&Document) -> bool,
    ) {
        for doc in candidates {
            if !still_eligible(&doc) {
                event!(Level::DEBUG, document = %doc.key(), "skipping: became active during scan");
                continue;
            }
            match self.store.swap_out(&doc).await {
                Ok(()) => report.swapped_out += 1,
                Err(err) => {
                    event!(Level::WARN, document = %doc.key(), error = %err, "swap-out failed during decay");
                    report.failures.push((doc.key().clone(), err));
                }
            }
        }
    }

    fn prune_activity(&self) -> usize {
        let kind = self.kind;
        let registry = &self.registry;
        self.tracker
            .prune(|key| key.kind != kind || registry.contains(key))
    }

    /// Thresholds beyond the representable range mean "never idle".
    fn idle_threshold(&self) -> Duration {
        i64::try_from(self.config.idle_threshold_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::SignalBus;
    use crate::core::Fields;
    use crate::host::{LocalWorld, MemoryNotifier};
    use crate::phantom::{PhantomStore, ScenePhantomStore, StoreContext};
    use crate::storage::{ArchiveOp, MemoryArchive};
    use serde_json::json;

    const THRESHOLD_MIN: i64 = 30;

    struct Fixture {
        world: Arc<LocalWorld>,
        tracker: Arc<ActivityTracker>,
        notifier: Arc<MemoryNotifier>,
        archive: Arc<MemoryArchive>,
        actors: DecayScanner,
        scenes: DecayScanner,
    }

    async fn fixture() -> Fixture {
        fixture_with(EngineConfig::default()).await
    }

    async fn fixture_with(config: EngineConfig) -> Fixture {
        let world = Arc::new(LocalWorld::new(true));
        let tracker = Arc::new(ActivityTracker::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let config = Arc::new(config);
        let ctx = StoreContext {
            config: config.clone(),
            signals: SignalBus::new(tracker.clone()),
            notifier: notifier.clone(),
        };
        let archive = Arc::new(MemoryArchive::new());
        let actor_store: Arc<dyn PhantomLifecycle> =
            Arc::new(PhantomStore::new(archive.clone(), ctx.clone()));
        let scene_store: Arc<dyn PhantomLifecycle> = Arc::new(ScenePhantomStore::new(
            Arc::new(MemoryArchive::new()),
            ctx,
            world.clone(),
        ));
        actor_store.initialize().await.unwrap();
        scene_store.initialize().await.unwrap();

        let scanner = |store: Arc<dyn PhantomLifecycle>| {
            DecayScanner::new(
                store,
                world.clone(),
                world.clone(),
                tracker.clone(),
                notifier.clone(),
                config.clone(),
            )
        };
        Fixture {
            actors: scanner(actor_store),
            scenes: scanner(scene_store),
            world,
            tracker,
            notifier,
            archive,
        }
    }

    fn goblin(id: &str) -> DocumentHandle {
        Document::from_json(
            DocumentKind::Actor,
            id,
            json!({"name": format!("Goblin {}", id), "system": {"hp": 7}}),
        )
    }

    #[tokio::test]
    async fn test_threshold_boundary_is_strict() {
        let f = fixture().await;
        let doc = f.world.add(goblin("g1"));
        let t0 = Utc::now();
        f.tracker.touch_at(doc.key(), t0);

        let at_boundary = t0 + Duration::minutes(THRESHOLD_MIN);
        let report = f.actors.process_decay_at(at_boundary).await.unwrap();
        assert_eq!(report.swapped_out, 0);
        assert!(!doc.is_phantom());

        let past = at_boundary + Duration::milliseconds(1);
        let report = f.actors.process_decay_at(past).await.unwrap();
        assert_eq!(report.swapped_out, 1);
        assert!(doc.is_phantom());
    }

    #[tokio::test]
    async fn test_untouched_documents_are_candidates() {
        let f = fixture().await;
        let doc = f.world.add(goblin("g1"));

        let report = f.actors.process_decay().await.unwrap();
        assert_eq!(report.swapped_out, 1);
        assert!(doc.is_phantom());
    }

    #[tokio::test]
    async fn test_exclusions() {
        let f = fixture().await;
        let owned = f.world.add(goblin("owned"));
        let rendered = f.world.add(goblin("rendered"));
        let fighting = f.world.add(goblin("fighting"));
        let idle = f.world.add(goblin("idle"));
        f.world.set_player_owned(owned.key(), true);
        f.world.set_rendered(rendered.key(), true);
        f.world.add_combatant(fighting.key());

        assert_eq!(f.actors.exclusion(&owned), Some(Exclusion::PlayerOwned));
        assert_eq!(f.actors.exclusion(&rendered), Some(Exclusion::Rendered));
        assert_eq!(f.actors.exclusion(&fighting), Some(Exclusion::InEncounter));

        let report = f.actors.process_decay().await.unwrap();
        assert_eq!(report.swapped_out, 1);
        assert!(idle.is_phantom());
        assert!(!owned.is_phantom());
        assert!(!rendered.is_phantom());
        assert!(!fighting.is_phantom());
    }

    #[tokio::test]
    async fn test_active_scene_is_never_phantomized() {
        let f = fixture().await;
        let tavern = f.world.add(Document::scene("tavern", Fields::new()));
        let crypt = f.world.add(Document::scene("crypt", Fields::new()));
        f.world.set_active_scene(Some(tavern.id().clone()));

        assert_eq!(f.scenes.exclusion(&tavern), Some(Exclusion::SceneInUse));
        let report = f.scenes.process_decay().await.unwrap();
        assert_eq!(report.swapped_out, 1);
        assert!(!tavern.is_phantom());
        assert!(crypt.is_phantom());
    }

    #[tokio::test]
    async fn test_unprivileged_scan_is_a_no_op() {
        let f = fixture().await;
        let doc = f.world.add(goblin("g1"));
        f.world.set_privileged(false);

        let report = f.actors.process_decay().await.unwrap();
        assert!(report.skipped);
        assert!(!doc.is_phantom());
        assert!(f.archive.journal().is_empty());
        assert!(matches!(
            f.actors.phantomize_all().await,
            Err(PhantomError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_notification_only_with_candidates() {
        let f = fixture().await;
        let report = f.actors.process_decay().await.unwrap();
        assert_eq!(report.candidates, 0);
        assert!(f.notifier.messages().is_empty());

        f.world.add(goblin("g1"));
        f.world.add(goblin("g2"));
        f.actors.process_decay().await.unwrap();
        assert_eq!(
            f.notifier.messages(),
            vec!["Cleaning up 2 inactive actors...".to_string()]
        );
    }

    #[tokio::test]
    async fn test_swaps_are_sequential() {
        let f = fixture().await;
        for i in 0..5 {
            f.world.add(goblin(&format!("g{}", i)));
        }
        let report = f.actors.process_decay().await.unwrap();
        assert_eq!(report.swapped_out, 5);

        let journal = f.archive.journal();
        assert_eq!(journal.len(), 10);
        for pair in journal.chunks(2) {
            match (&pair[0], &pair[1]) {
                (ArchiveOp::WriteStarted(a), ArchiveOp::WriteFinished(b)) => assert_eq!(a, b),
                other => panic!("interleaved writes: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_phantomize_all_ignores_idle_time() {
        let f = fixture().await;
        let recent = f.world.add(goblin("recent"));
        let owned = f.world.add(goblin("owned"));
        f.tracker.touch(recent.key());
        f.world.set_player_owned(owned.key(), true);

        assert_eq!(f.actors.process_decay().await.unwrap().swapped_out, 0);
        let report = f.actors.phantomize_all().await.unwrap();
        assert_eq!(report.swapped_out, 1);
        assert!(recent.is_phantom());
        assert!(!owned.is_phantom());
    }

    #[tokio::test]
    async fn test_scan_prunes_activity_of_removed_documents() {
        let f = fixture().await;
        let doc = f.world.add(goblin("g1"));
        f.tracker.touch(doc.key());
        f.world.remove(doc.key());

        let report = f.actors.process_decay().await.unwrap();
        assert_eq!(report.pruned, 1);
        assert!(f.tracker.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_threshold_never_evicts_touched_documents() {
        for threshold_ms in [u64::MAX, 1u64 << 63] {
            let config = EngineConfig {
                idle_threshold_ms: threshold_ms,
                ..EngineConfig::default()
            };
            let f = fixture_with(config).await;
            let doc = f.world.add(goblin("g1"));
            f.tracker.touch(doc.key());

            let report = f.actors.process_decay().await.unwrap();
            assert_eq!(report.swapped_out, 0);
            assert!(!doc.is_phantom());

            let much_later = Utc::now() + Duration::days(365 * 100);
            let report = f.actors.process_decay_at(much_later).await.unwrap();
            assert_eq!(report.swapped_out, 0);
        }
    }
}
