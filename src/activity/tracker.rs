use crate::core::DocumentKey;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Last-interaction timestamps per document, kept for the current session only.
///
/// A document without a record has never been touched this session and is
/// treated as maximally idle.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    last_active: RwLock<HashMap<DocumentKey, DateTime<Utc>>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self, key: &DocumentKey) {
        self.touch_at(key, Utc::now());
    }

    /// Records activity at `at`; an older timestamp never replaces a newer one.
    pub fn touch_at(&self, key: &DocumentKey, at: DateTime<Utc>) {
        let mut map = self.write();
        map.entry(key.clone())
            .and_modify(|last| {
                if at > *last {
                    *last = at;
                }
            })
            .or_insert(at);
    }

    pub fn last_active(&self, key: &DocumentKey) -> Option<DateTime<Utc>> {
        self.read().get(key).copied()
    }

    /// Time since the last interaction, `None` when never touched.
    pub fn idle_for(&self, key: &DocumentKey, now: DateTime<Utc>) -> Option<Duration> {
        self.last_active(key).map(|last| now - last)
    }

    /// Strictly more idle than `threshold` at `now`. Untouched documents always are.
    pub fn is_idle(&self, key: &DocumentKey, now: DateTime<Utc>, threshold: Duration) -> bool {
        match self.idle_for(key, now) {
            Some(idle) => idle > threshold,
            None => true,
        }
    }

    pub fn forget(&self, key: &DocumentKey) {
        self.write().remove(key);
    }

    /// Drops records for which `keep` returns false. Returns how many were removed.
    pub fn prune(&self, mut keep: impl FnMut(&DocumentKey) -> bool) -> usize {
        let mut map = self.write();
        let before = map.len();
        map.retain(|key, _| keep(key));
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<DocumentKey, DateTime<Utc>>> {
        self.last_active
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<DocumentKey, DateTime<Utc>>> {
        self.last_active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
