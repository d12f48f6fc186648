//! Bulk forced recovery ("exorcism") of every phantom.

pub mod exorcism;

pub use exorcism::{Exorcist, RecoveryReport};
