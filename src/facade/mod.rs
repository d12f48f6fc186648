pub mod engine;

pub use engine::{ClassStats, EngineStats, EngineWorkers, PhantomEngine, PhantomEngineBuilder};
