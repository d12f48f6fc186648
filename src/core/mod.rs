pub mod document;
pub mod error;
pub mod types;

pub use document::{
    ArchiveRef, Document, DocumentHandle, HydrationTask, PhantomShell, RepresentationState,
};
pub use error::{PhantomError, Result};
pub use types::{DocumentId, DocumentKey, DocumentKind, Fields};
