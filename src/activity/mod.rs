pub mod signals;
pub mod tracker;

pub use signals::{Signal, SignalBus};
pub use tracker::ActivityTracker;
