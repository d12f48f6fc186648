//! Transparent access to documents that may currently be phantoms.
//!
//! [`ActorProxy`] and [`SceneProxy`] expose the shell fields as plain getters
//! and route every other read or write through hydration.

pub mod interceptor;

use crate::core::{DocumentHandle, DocumentId, DocumentKind, PhantomError, Result};
use crate::hydration::HydrationCoordinator;
use std::ops::Deref;
use std::sync::Arc;

pub use interceptor::{FieldRead, Interceptor};

fn check_kind(doc: &DocumentHandle, expected: DocumentKind) -> Result<()> {
    if doc.kind() != expected {
        return Err(PhantomError::WrongKind {
            expected,
            found: doc.kind(),
        });
    }
    Ok(())
}

fn string_field(inner: &Interceptor, field: &str) -> Option<String> {
    inner
        .document()
        .field(field)
        .and_then(|v| v.as_str().map(str::to_string))
}

#[derive(Clone)]
pub struct ActorProxy {
    inner: Interceptor,
}

impl ActorProxy {
    pub fn new(doc: DocumentHandle, coordinator: Arc<HydrationCoordinator>) -> Result<Self> {
        check_kind(&doc, DocumentKind::Actor)?;
        Ok(Self {
            inner: Interceptor::new(doc, coordinator),
        })
    }

    pub fn id(&self) -> &DocumentId {
        self.inner.document().id()
    }

    pub fn name(&self) -> Option<String> {
        string_field(&self.inner, "name")
    }

    pub fn img(&self) -> Option<String> {
        string_field(&self.inner, "img")
    }

    pub fn actor_type(&self) -> Option<String> {
        string_field(&self.inner, "type")
    }
}

impl Deref for ActorProxy {
    type Target = Interceptor;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Clone)]
pub struct SceneProxy {
    inner: Interceptor,
}

impl SceneProxy {
    pub fn new(doc: DocumentHandle, coordinator: Arc<HydrationCoordinator>) -> Result<Self> {
        check_kind(&doc, DocumentKind::Scene)?;
        Ok(Self {
            inner: Interceptor::new(doc, coordinator),
        })
    }

    pub fn id(&self) -> &DocumentId {
        self.inner.document().id()
    }

    pub fn name(&self) -> Option<String> {
        string_field(&self.inner, "name")
    }

    pub fn thumb(&self) -> Option<String> {
        string_field(&self.inner, "thumb")
    }

    /// Shown in the navigation bar
    pub fn navigation(&self) -> bool {
        self.inner
            .document()
            .field("navigation")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

impl Deref for SceneProxy {
    type Target = Interceptor;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// A proxy of either class.
#[derive(Clone)]
pub enum Proxy {
    Actor(ActorProxy),
    Scene(SceneProxy),
}

impl Proxy {
    pub fn wrap(doc: DocumentHandle, coordinator: Arc<HydrationCoordinator>) -> Self {
        match doc.kind() {
            DocumentKind::Actor => Self::Actor(ActorProxy {
                inner: Interceptor::new(doc, coordinator),
            }),
            DocumentKind::Scene => Self::Scene(SceneProxy {
                inner: Interceptor::new(doc, coordinator),
            }),
        }
    }
}

impl Deref for Proxy {
    type Target = Interceptor;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Actor(proxy) => &proxy.inner,
            Self::Scene(proxy) => &proxy.inner,
        }
    }
}
