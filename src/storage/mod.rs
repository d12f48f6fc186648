pub mod engine;
pub mod memory;
pub mod persistence;

pub use engine::{ARCHIVE_FORMAT_VERSION, ArchiveEntry, ArchiveStore};
pub use memory::{ArchiveOp, ArchiveStats, MemoryArchive};
pub use persistence::FileArchive;
