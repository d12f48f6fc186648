//! Background reclamation of idle documents.

pub mod scanner;
pub mod worker;

pub use scanner::{DecayReport, DecayScanner, Exclusion};
pub use worker::{DecayWorker, spawn_decay_worker, spawn_delayed};
