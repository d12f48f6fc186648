// ============================================================================
// RustPhantom Library
// ============================================================================
//
// Memory-pressure relief for large document worlds: idle actors and scenes
// are swapped out to an archive and left behind as lightweight phantoms,
// then hydrated back in place on first real access.

pub mod activity;
pub mod config;
pub mod core;
pub mod decay;
pub mod facade;
pub mod host;
pub mod hydration;
pub mod phantom;
pub mod proxy;
pub mod recovery;
pub mod storage;

// Re-export main types for convenience
pub use activity::{ActivityTracker, Signal, SignalBus};
pub use config::{ArchiveMissPolicy, EngineConfig};
pub use core::{
    Document, DocumentHandle, DocumentId, DocumentKey, DocumentKind, Fields, PhantomError,
    RepresentationState, Result,
};
pub use decay::{DecayReport, DecayScanner, DecayWorker};
pub use facade::{EngineStats, EngineWorkers, PhantomEngine, PhantomEngineBuilder};
pub use host::{
    DocumentRegistry, IdleSource, LocalWorld, MemoryNotifier, Notifier, TracingNotifier,
    WorldContext,
};
pub use hydration::{HydrationCoordinator, HydrationTarget};
pub use phantom::{PhantomLifecycle, PhantomStore, ScenePhantomStore};
pub use proxy::{ActorProxy, FieldRead, Proxy, SceneProxy};
pub use recovery::{Exorcist, RecoveryReport};
pub use storage::{ArchiveEntry, ArchiveStore, FileArchive, MemoryArchive};
