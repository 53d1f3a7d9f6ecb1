pub mod driver;
pub mod timers;

pub use driver::{CommittedEntry, DriverMessage, NodeDriver, NodeHandle, NodeStatus, Outbox};
pub use timers::TokioTimers;
