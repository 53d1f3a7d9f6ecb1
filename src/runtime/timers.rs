use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::NodeConfig;
use crate::raft::message::TimeoutKind;
use crate::raft::timer::{random_election_timeout, Timers};

/// Production timers: each reset spawns a sleep that feeds the matching
/// [`TimeoutKind`] back to the node's event loop. At most one task per
/// timer is alive; reset aborts the previous one first.
pub struct TokioTimers {
    timeout_tx: mpsc::Sender<TimeoutKind>,
    election_window_ms: (u64, u64),
    heartbeat_interval: Duration,
    receive_task: Option<JoinHandle<()>>,
    send_task: Option<JoinHandle<()>>,
}

impl TokioTimers {
    pub fn new(timeout_tx: mpsc::Sender<TimeoutKind>, config: &NodeConfig) -> Self {
        Self {
            timeout_tx,
            election_window_ms: (
                config.election_timeout_min_ms,
                config.election_timeout_max_ms,
            ),
            heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
            receive_task: None,
            send_task: None,
        }
    }

    fn arm(&self, delay: Duration, kind: TimeoutKind) -> JoinHandle<()> {
        let tx = self.timeout_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(kind).await;
        })
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        self.cancel_receive_heartbeat();
        self.cancel_send_heartbeat();
    }
}

impl Timers for TokioTimers {
    fn reset_receive_heartbeat(&mut self) {
        self.cancel_receive_heartbeat();
        let (min, max) = self.election_window_ms;
        let delay = random_election_timeout(min, max);
        self.receive_task = Some(self.arm(delay, TimeoutKind::ReceiveHeartbeat));
    }

    fn reset_send_heartbeat(&mut self) {
        self.cancel_send_heartbeat();
        self.send_task = Some(self.arm(self.heartbeat_interval, TimeoutKind::SendHeartbeat));
    }

    fn cancel_receive_heartbeat(&mut self) {
        if let Some(task) = self.receive_task.take() {
            task.abort();
        }
    }

    fn cancel_send_heartbeat(&mut self) {
        if let Some(task) = self.send_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> NodeConfig {
        NodeConfig {
            election_timeout_min_ms: 10,
            election_timeout_max_ms: 20,
            heartbeat_interval_ms: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_armed_timer_fires() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timers = TokioTimers::new(tx, &fast_config());
        timers.reset_send_heartbeat();
        assert_eq!(rx.recv().await, Some(TimeoutKind::SendHeartbeat));
    }

    #[tokio::test]
    async fn test_cancel_suppresses_firing() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timers = TokioTimers::new(tx, &fast_config());
        timers.reset_receive_heartbeat();
        timers.cancel_receive_heartbeat();
        // Idempotent.
        timers.cancel_receive_heartbeat();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reset_replaces_pending_deadline() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timers = TokioTimers::new(tx, &fast_config());
        timers.reset_send_heartbeat();
        timers.reset_send_heartbeat();
        assert_eq!(rx.recv().await, Some(TimeoutKind::SendHeartbeat));
        // Only one task survived the replacement.
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(rx.try_recv().is_err());
    }
}
