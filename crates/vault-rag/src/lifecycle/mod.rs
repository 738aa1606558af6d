//! Document lifecycle: expiry sweeps, pre-expiry notices and per-document locking

mod locks;
mod manager;

pub use locks::DocumentLocks;
pub use manager::{LifecycleHandle, LifecycleManager, SweepReport};
