use crate::activity::{Signal, SignalBus};
use crate::config::{ArchiveMissPolicy, EngineConfig};
use crate::core::{
    ArchiveRef, Document, DocumentHandle, DocumentKey, DocumentKind, PhantomError, PhantomShell,
    Result,
};
use crate::host::Notifier;
use crate::storage::{ArchiveEntry, ArchiveStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::{Instrument, Level, event, info_span};

/// Shared collaborators of both phantom stores.
#[derive(Clone)]
pub struct StoreContext {
    pub config: Arc<EngineConfig>,
    pub signals: SignalBus,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapCounters {
    pub swapped_out: u64,
    pub swapped_in: u64,
    pub archive_misses: u64,
    pub failures: u64,
}

/// Archive-backed swap logic for one document class.
pub(crate) struct SwapEngine {
    kind: DocumentKind,
    archive: Arc<dyn ArchiveStore>,
    ctx: StoreContext,
    initialized: AtomicBool,
    swapped_out: AtomicU64,
    swapped_in: AtomicU64,
    archive_misses: AtomicU64,
    failures: AtomicU64,
}

impl SwapEngine {
    pub(crate) fn new(kind: DocumentKind, archive: Arc<dyn ArchiveStore>, ctx: StoreContext) -> Self {
        Self {
            kind,
            archive,
            ctx,
            initialized: AtomicBool::new(false),
            swapped_out: AtomicU64::new(0),
            swapped_in: AtomicU64::new(0),
            archive_misses: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub(crate) fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub(crate) async fn initialize(&self) -> Result<()> {
        self.archive.initialize().await?;
        if !self.initialized.swap(true, Ordering::AcqRel) {
            event!(Level::INFO, kind = %self.kind, "phantom archive ready");
        }
        Ok(())
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn counters(&self) -> SwapCounters {
        SwapCounters {
            swapped_out: self.swapped_out.load(Ordering::Relaxed),
            swapped_in: self.swapped_in.load(Ordering::Relaxed),
            archive_misses: self.archive_misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn check_document(&self, doc: &Document) -> Result<()> {
        if doc.kind() != self.kind {
            return Err(PhantomError::WrongKind {
                expected: self.kind,
                found: doc.kind(),
            });
        }
        if !self.is_initialized() {
            return Err(PhantomError::NotInitialized(self.kind));
        }
        Ok(())
    }

    pub(crate) async fn swap_out(&self, doc: &DocumentHandle) -> Result<()> {
        self.check_document(doc)?;
        let span = info_span!("phantom.swap_out", document = %doc.key());
        let result = self.swap_out_inner(doc).instrument(span).await;
        if result.is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    pub(crate) async fn swap_in(&self, doc: &DocumentHandle) -> Result<()> {
        self.check_document(doc)?;
        let span = info_span!("phantom.swap_in", document = %doc.key());
        let result = self.swap_in_inner(doc).instrument(span).await;
        if result.is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn swap_out_inner(&self, doc: &DocumentHandle) -> Result<()> {
        let _guard = doc.swap_guard().await;
        let Some((fields, revision)) = doc.snapshot_full() else {
            return Ok(());
        };
        let key = doc.key().clone();
        if doc.is_hydrating() {
            return Err(PhantomError::InUse {
                key,
                reason: "hydration in progress".to_string(),
            });
        }

        let started = Instant::now();
        let entry = ArchiveEntry::new(key.clone(), revision, fields);
        // The entry must be durable before the in-memory data is dropped.
        if let Err(err) = self.archive.write(&entry).await {
            event!(Level::ERROR, error = %err, "archive write failed; document stays full");
            return Err(match err {
                PhantomError::ArchiveWrite { .. } => err,
                other => PhantomError::ArchiveWrite {
                    key,
                    reason: other.to_string(),
                },
            });
        }

        let shell = PhantomShell {
            fields: self.kind.project(&entry.data),
            archive_ref: ArchiveRef {
                key: key.clone(),
                archived_at: entry.archived_at,
                revision,
            },
        };
        if !doc.become_phantom(shell, revision)? {
            event!(Level::WARN, "document mutated during swap-out; discarding archived copy");
            if let Err(err) = self.archive.delete(&key).await {
                event!(Level::WARN, error = %err, "failed to discard stale archive entry");
            }
            return Err(PhantomError::ConcurrentMutation(key));
        }

        self.swapped_out.fetch_add(1, Ordering::Relaxed);
        self.telemetry("swapped out", &key, started);
        self.ctx.signals.emit(Signal::SwappedOut(key));
        Ok(())
    }

    async fn swap_in_inner(&self, doc: &DocumentHandle) -> Result<()> {
        let _guard = doc.swap_guard().await;
        let Some((shell, revision)) = doc.snapshot_shell() else {
            return Ok(());
        };
        let key = doc.key().clone();
        let started = Instant::now();

        let entry = match self.archive.read(&key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return self.archive_miss(doc, shell, revision),
            Err(err) => {
                event!(Level::ERROR, error = %err, "archive read failed; document stays phantom");
                return Err(match err {
                    PhantomError::ArchiveRead { .. } => err,
                    other => PhantomError::ArchiveRead {
                        key,
                        reason: other.to_string(),
                    },
                });
            }
        };

        let mut restored = entry.data;
        // Shell fields edited while phantom win over the archived copy.
        if revision != entry.revision {
            for (name, value) in shell.fields {
                restored.insert(name, value);
            }
        }

        if !doc.become_full(restored, revision)? {
            event!(Level::WARN, "document mutated during swap-in; result discarded");
            return Err(PhantomError::ConcurrentMutation(key));
        }

        if !self.ctx.config.retain_archive_entries {
            if let Err(err) = self.archive.delete(&key).await {
                event!(Level::WARN, error = %err, "failed to remove consumed archive entry");
            }
        }

        self.swapped_in.fetch_add(1, Ordering::Relaxed);
        self.telemetry("hydrated", &key, started);
        if self.ctx.config.verbose_notifications {
            let name = doc.name().unwrap_or_else(|| key.to_string());
            self.ctx.notifier.info(&format!("Hydrated {}", name));
        }
        self.ctx.signals.emit(Signal::Hydrated(key));
        Ok(())
    }

    fn archive_miss(&self, doc: &Document, shell: PhantomShell, revision: u64) -> Result<()> {
        let key = doc.key().clone();
        self.archive_misses.fetch_add(1, Ordering::Relaxed);
        match self.ctx.config.archive_miss_policy {
            ArchiveMissPolicy::Placeholder => {
                event!(
                    Level::ERROR,
                    "archive entry missing; restoring placeholder with shell fields only"
                );
                if !doc.become_full(shell.fields, revision)? {
                    event!(Level::WARN, "document mutated while resolving archive miss");
                }
            }
            ArchiveMissPolicy::KeepPhantom => {
                event!(Level::ERROR, "archive entry missing; document stays phantom");
            }
        }
        Err(PhantomError::ArchiveMiss(key))
    }

    fn telemetry(&self, action: &'static str, key: &DocumentKey, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if self.ctx.config.debug_mode {
            event!(Level::INFO, document = %key, elapsed_ms, "{}", action);
        } else {
            event!(Level::DEBUG, document = %key, elapsed_ms, "{}", action);
        }
    }
}
