//! Integration tests for idle-based decay scans

use chrono::{Duration as ChronoDuration, Utc};
use rustphantom::storage::ArchiveOp;
use rustphantom::{
    Document, DocumentId, DocumentKind, EngineConfig, LocalWorld, MemoryArchive, MemoryNotifier,
    PhantomEngine, PhantomError, Signal,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn engine_with(
    world: Arc<LocalWorld>,
    archive: Arc<MemoryArchive>,
    notifier: Arc<MemoryNotifier>,
) -> PhantomEngine {
    let engine = PhantomEngine::builder()
        .host(world)
        .actor_archive(archive)
        .notifier(notifier)
        .init()
        .unwrap();
    engine.connect().await.unwrap();
    engine
}

fn kobold(id: &str) -> Arc<Document> {
    Document::from_json(
        DocumentKind::Actor,
        id,
        json!({"name": format!("Kobold {}", id), "system": {"hp": 5}}),
    )
}

#[tokio::test]
async fn scan_writes_archive_entries_one_at_a_time() {
    let world = Arc::new(LocalWorld::new(true));
    let archive = Arc::new(MemoryArchive::new().with_latency(Duration::from_millis(5)));
    let engine = engine_with(world.clone(), archive.clone(), Arc::new(MemoryNotifier::new())).await;
    let docs: Vec<_> = (0..5).map(|i| world.add(kobold(&format!("k{}", i)))).collect();

    let (report, _) = engine.process_decay().await.unwrap();
    assert_eq!(report.swapped_out, 5);
    assert!(docs.iter().all(|doc| doc.is_phantom()));

    let writes: Vec<_> = archive
        .journal()
        .into_iter()
        .filter(|op| matches!(op, ArchiveOp::WriteStarted(_) | ArchiveOp::WriteFinished(_)))
        .collect();
    assert_eq!(writes.len(), 10);
    for pair in writes.chunks(2) {
        match (&pair[0], &pair[1]) {
            (ArchiveOp::WriteStarted(started), ArchiveOp::WriteFinished(finished)) => {
                assert_eq!(started, finished)
            }
            other => panic!("overlapping archive writes: {:?}", other),
        }
    }
}

#[tokio::test]
async fn recently_touched_documents_survive() {
    let world = Arc::new(LocalWorld::new(true));
    let archive = Arc::new(MemoryArchive::new());
    let engine = engine_with(world.clone(), archive, Arc::new(MemoryNotifier::new())).await;
    let busy = world.add(kobold("busy"));
    let idle = world.add(kobold("idle"));
    let parent = world.add(kobold("parent"));

    engine.record_activity(Signal::Updated(busy.key().clone()));
    engine.record_activity(Signal::ChildUpdated {
        parent: parent.key().clone(),
    });
    engine.process_decay().await.unwrap();

    assert!(!busy.is_phantom());
    assert!(!parent.is_phantom());
    assert!(idle.is_phantom());
}

#[tokio::test]
async fn threshold_comparison_is_strict() {
    let world = Arc::new(LocalWorld::new(true));
    let engine = PhantomEngine::builder()
        .config(EngineConfig::default().idle_threshold(Duration::from_secs(60)))
        .host(world.clone())
        .init()
        .unwrap();
    engine.connect().await.unwrap();
    let doc = world.add(kobold("k"));
    let touched = Utc::now();
    engine.tracker().touch_at(doc.key(), touched);

    let scanner = engine.decay_scanner(DocumentKind::Actor);
    let exactly = touched + ChronoDuration::seconds(60);
    assert_eq!(scanner.process_decay_at(exactly).await.unwrap().swapped_out, 0);
    assert!(!doc.is_phantom());

    let later = exactly + ChronoDuration::milliseconds(1);
    assert_eq!(scanner.process_decay_at(later).await.unwrap().swapped_out, 1);
    assert!(doc.is_phantom());
}

#[tokio::test]
async fn protected_documents_are_never_phantomized() {
    let world = Arc::new(LocalWorld::new(true));
    let engine = engine_with(
        world.clone(),
        Arc::new(MemoryArchive::new()),
        Arc::new(MemoryNotifier::new()),
    )
    .await;

    let hero = world.add(kobold("hero"));
    let token = world.add(kobold("token"));
    let combatant = world.add(kobold("combatant"));
    world.set_player_owned(hero.key(), true);
    world.set_rendered(token.key(), true);
    world.add_combatant(combatant.key());

    let active = world.add(Document::scene("active", Default::default()));
    let viewed = world.add(Document::scene("viewed", Default::default()));
    let unused = world.add(Document::scene("unused", Default::default()));
    world.set_active_scene(Some(DocumentId::new("active")));
    world.set_viewed_scene(Some(DocumentId::new("viewed")));

    let (actors, scenes) = engine.phantomize_all().await.unwrap();
    assert_eq!(actors.swapped_out, 0);
    assert_eq!(scenes.swapped_out, 1);
    assert!(!hero.is_phantom());
    assert!(!token.is_phantom());
    assert!(!combatant.is_phantom());
    assert!(!active.is_phantom());
    assert!(!viewed.is_phantom());
    assert!(unused.is_phantom());

    assert!(matches!(
        engine.swap_out_scene(&active).await,
        Err(PhantomError::InUse { .. })
    ));

    world.end_encounter();
    engine.process_decay().await.unwrap();
    assert!(combatant.is_phantom());
}

#[tokio::test]
async fn unprivileged_scan_does_nothing() {
    let world = Arc::new(LocalWorld::new(false));
    let archive = Arc::new(MemoryArchive::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let engine = engine_with(world.clone(), archive.clone(), notifier.clone()).await;
    let doc = world.add(kobold("k"));

    let (actors, scenes) = engine.process_decay().await.unwrap();
    assert!(actors.skipped && scenes.skipped);
    assert!(!doc.is_phantom());
    assert!(archive.journal().is_empty());
    assert!(notifier.messages().is_empty());

    assert!(matches!(
        engine.phantomize_all().await,
        Err(PhantomError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn scan_announces_cleanup_only_when_needed() {
    let world = Arc::new(LocalWorld::new(true));
    let notifier = Arc::new(MemoryNotifier::new());
    let engine = engine_with(world.clone(), Arc::new(MemoryArchive::new()), notifier.clone()).await;

    engine.process_decay().await.unwrap();
    assert!(notifier.messages().is_empty());

    for i in 0..3 {
        world.add(kobold(&format!("k{}", i)));
    }
    engine.process_decay().await.unwrap();
    assert_eq!(
        notifier.messages(),
        vec!["Cleaning up 3 inactive actors...".to_string()]
    );
}

#[tokio::test]
async fn write_failure_keeps_document_full_and_scan_continues() {
    let world = Arc::new(LocalWorld::new(true));
    let archive = Arc::new(MemoryArchive::new());
    let engine = engine_with(world.clone(), archive.clone(), Arc::new(MemoryNotifier::new())).await;
    let broken = world.add(kobold("broken"));
    let fine = world.add(kobold("fine"));
    archive.fail_writes_for(broken.key().clone()).unwrap();

    let (report, _) = engine.process_decay().await.unwrap();
    assert_eq!(report.swapped_out, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0],
        (ref key, PhantomError::ArchiveWrite { .. }) if key == broken.key()
    ));
    assert!(!broken.is_phantom());
    assert_eq!(broken.field("system"), Some(json!({"hp": 5})));
    assert!(fine.is_phantom());
}

#[tokio::test]
async fn hydrating_documents_are_skipped() {
    let world = Arc::new(LocalWorld::new(true));
    let archive = Arc::new(MemoryArchive::new().with_latency(Duration::from_millis(30)));
    let engine = engine_with(world.clone(), archive, Arc::new(MemoryNotifier::new())).await;
    let doc = world.add(kobold("k"));
    engine.swap_out(&doc).await.unwrap();

    let task = engine.coordinator().hydration_task(&doc).unwrap();
    assert!(doc.is_hydrating());
    let (report, _) = engine.process_decay().await.unwrap();
    assert_eq!(report.candidates, 0);

    task.await.unwrap();
    assert!(!doc.is_phantom());
}
