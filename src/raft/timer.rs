use std::time::Duration;

use rand::Rng;

/// The two logical countdowns a node owns. `reset_*` replaces any pending
/// deadline for that timer; `cancel_*` is idempotent and may be called with
/// nothing pending. When a deadline passes, whoever implements this trait
/// feeds the matching [`crate::raft::message::TimeoutKind`] back into the
/// node as an input.
///
/// Implementations decide what "time" means: the runtime arms real tokio
/// sleeps, the test harness moves a virtual timeline. Randomization of the
/// election window lives here too, never inside the node, so identical
/// input sequences replay identically.
pub trait Timers: Send {
    /// Restart the election countdown (a leader was heard from, or a vote
    /// was granted, or an election just started).
    fn reset_receive_heartbeat(&mut self);

    /// Restart the leader's heartbeat cadence.
    fn reset_send_heartbeat(&mut self);

    fn cancel_receive_heartbeat(&mut self);

    fn cancel_send_heartbeat(&mut self);
}

/// Sample an election timeout from `min_ms..=max_ms`. The window should sit
/// well above the heartbeat interval so followers are not spooked into
/// elections by ordinary scheduling jitter.
pub fn random_election_timeout(min_ms: u64, max_ms: u64) -> Duration {
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(min_ms..=max_ms))
}
