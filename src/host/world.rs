use super::{DocumentRegistry, WorldContext};
use crate::core::{Document, DocumentHandle, DocumentId, DocumentKey, DocumentKind};
use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct WorldState {
    actors: Vec<DocumentHandle>,
    scenes: Vec<DocumentHandle>,
    privileged: bool,
    player_owned: HashSet<DocumentKey>,
    rendered: HashSet<DocumentKey>,
    combatants: HashSet<DocumentKey>,
    active_scene: Option<DocumentId>,
    viewed_scene: Option<DocumentId>,
}

impl WorldState {
    fn collection(&self, kind: DocumentKind) -> &Vec<DocumentHandle> {
        match kind {
            DocumentKind::Actor => &self.actors,
            DocumentKind::Scene => &self.scenes,
        }
    }

    fn collection_mut(&mut self, kind: DocumentKind) -> &mut Vec<DocumentHandle> {
        match kind {
            DocumentKind::Actor => &mut self.actors,
            DocumentKind::Scene => &mut self.scenes,
        }
    }
}

/// In-process host: a document registry plus the session facts the engine
/// consults, all mutable by the embedding application.
#[derive(Default)]
pub struct LocalWorld {
    state: RwLock<WorldState>,
}

impl LocalWorld {
    pub fn new(privileged: bool) -> Self {
        Self {
            state: RwLock::new(WorldState {
                privileged,
                ..WorldState::default()
            }),
        }
    }

    /// Registers `doc`, replacing any document with the same key.
    pub fn add(&self, doc: DocumentHandle) -> DocumentHandle {
        let mut state = self.write();
        let docs = state.collection_mut(doc.kind());
        docs.retain(|d| d.key() != doc.key());
        docs.push(doc.clone());
        doc
    }

    pub fn remove(&self, key: &DocumentKey) -> Option<DocumentHandle> {
        let mut state = self.write();
        let docs = state.collection_mut(key.kind);
        let index = docs.iter().position(|d| d.key() == key)?;
        Some(docs.remove(index))
    }

    pub fn set_privileged(&self, privileged: bool) {
        self.write().privileged = privileged;
    }

    pub fn set_player_owned(&self, key: &DocumentKey, owned: bool) {
        toggle(&mut self.write().player_owned, key, owned);
    }

    pub fn set_rendered(&self, key: &DocumentKey, rendered: bool) {
        toggle(&mut self.write().rendered, key, rendered);
    }

    pub fn add_combatant(&self, key: &DocumentKey) {
        self.write().combatants.insert(key.clone());
    }

    pub fn end_encounter(&self) {
        self.write().combatants.clear();
    }

    pub fn set_active_scene(&self, id: Option<DocumentId>) {
        self.write().active_scene = id;
    }

    pub fn set_viewed_scene(&self, id: Option<DocumentId>) {
        self.write().viewed_scene = id;
    }

    fn read(&self) -> RwLockReadGuard<'_, WorldState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, WorldState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn toggle(set: &mut HashSet<DocumentKey>, key: &DocumentKey, present: bool) {
    if present {
        set.insert(key.clone());
    } else {
        set.remove(key);
    }
}

impl DocumentRegistry for LocalWorld {
    fn documents(&self, kind: DocumentKind) -> Vec<DocumentHandle> {
        self.read().collection(kind).clone()
    }

    fn get(&self, key: &DocumentKey) -> Option<DocumentHandle> {
        self.read()
            .collection(key.kind)
            .iter()
            .find(|d| d.key() == key)
            .cloned()
    }
}

impl WorldContext for LocalWorld {
    fn is_privileged(&self) -> bool {
        self.read().privileged
    }

    fn has_player_owner(&self, doc: &Document) -> bool {
        self.read().player_owned.contains(doc.key())
    }

    fn is_rendered(&self, key: &DocumentKey) -> bool {
        self.read().rendered.contains(key)
    }

    fn in_active_encounter(&self, key: &DocumentKey) -> bool {
        self.read().combatants.contains(key)
    }

    fn active_scene(&self) -> Option<DocumentId> {
        self.read().active_scene.clone()
    }

    fn viewed_scene(&self) -> Option<DocumentId> {
        self.read().viewed_scene.clone()
    }
}
