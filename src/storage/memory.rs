use super::engine::{ArchiveEntry, ArchiveStore};
use crate::core::{DocumentKey, PhantomError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// One observed archive operation, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOp {
    WriteStarted(DocumentKey),
    WriteFinished(DocumentKey),
    Read(DocumentKey),
    Delete(DocumentKey),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub writes: u64,
    pub reads: u64,
    pub deletes: u64,
    pub entries: usize,
}

/// Archive kept in process memory.
///
/// Besides serving as a volatile backend it records every operation, which
/// makes ordering and deduplication observable. Latency and write failures
/// can be injected to exercise slow or broken storage.
pub struct MemoryArchive {
    entries: RwLock<HashMap<DocumentKey, ArchiveEntry>>,
    initialized: AtomicBool,
    journal: Mutex<Vec<ArchiveOp>>,
    writes: AtomicU64,
    reads: AtomicU64,
    deletes: AtomicU64,
    latency: Option<Duration>,
    failing_writes: Mutex<HashSet<DocumentKey>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            initialized: AtomicBool::new(false),
            journal: Mutex::new(Vec::new()),
            writes: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            latency: None,
            failing_writes: Mutex::new(HashSet::new()),
        }
    }

    /// Delay every read and write by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every write for `key` fail until [`MemoryArchive::heal`] is called
    pub fn fail_writes_for(&self, key: DocumentKey) -> Result<()> {
        self.failing_writes.lock()?.insert(key);
        Ok(())
    }

    pub fn heal(&self, key: &DocumentKey) -> Result<()> {
        self.failing_writes.lock()?.remove(key);
        Ok(())
    }

    /// Drop an entry without going through the store contract (simulates archive loss).
    pub async fn forget(&self, key: &DocumentKey) -> Option<ArchiveEntry> {
        self.entries.write().await.remove(key)
    }

    pub async fn peek(&self, key: &DocumentKey) -> Option<ArchiveEntry> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn stats(&self) -> ArchiveStats {
        ArchiveStats {
            writes: self.writes.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            entries: self.entries.read().await.len(),
        }
    }

    pub fn journal(&self) -> Vec<ArchiveOp> {
        self.journal
            .lock()
            .map(|ops| ops.clone())
            .unwrap_or_default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn record(&self, op: ArchiveOp) -> Result<()> {
        self.journal.lock()?.push(op);
        Ok(())
    }

    fn ensure_initialized(&self, key: &DocumentKey) -> Result<()> {
        if !self.is_initialized() {
            return Err(PhantomError::NotInitialized(key.kind));
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MemoryArchive {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchive {
    async fn initialize(&self) -> Result<()> {
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn write(&self, entry: &ArchiveEntry) -> Result<()> {
        self.ensure_initialized(&entry.key)?;
        self.record(ArchiveOp::WriteStarted(entry.key.clone()))?;
        self.simulate_latency().await;

        if self.failing_writes.lock()?.contains(&entry.key) {
            return Err(PhantomError::ArchiveWrite {
                key: entry.key.clone(),
                reason: "injected write failure".to_string(),
            });
        }

        self.entries
            .write()
            .await
            .insert(entry.key.clone(), entry.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.record(ArchiveOp::WriteFinished(entry.key.clone()))?;
        Ok(())
    }

    async fn read(&self, key: &DocumentKey) -> Result<Option<ArchiveEntry>> {
        self.ensure_initialized(key)?;
        self.simulate_latency().await;
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.record(ArchiveOp::Read(key.clone()))?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &DocumentKey) -> Result<()> {
        self.ensure_initialized(key)?;
        self.entries.write().await.remove(key);
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.record(ArchiveOp::Delete(key.clone()))?;
        Ok(())
    }

    async fn contains(&self, key: &DocumentKey) -> Result<bool> {
        self.ensure_initialized(key)?;
        Ok(self.entries.read().await.contains_key(key))
    }
}
