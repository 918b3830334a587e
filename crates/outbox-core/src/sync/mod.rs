//! Queue dispatch, version tracking, and conflict arbitration

mod conflict;
mod queue;
mod version_tracker;

pub use conflict::ConflictResolver;
pub use queue::{DispatchSummary, SyncQueueManager};
pub use version_tracker::EntityVersionTracker;
