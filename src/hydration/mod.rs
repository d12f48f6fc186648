pub mod coordinator;

pub use coordinator::{HydrationCoordinator, HydrationTarget};
