//! Liveness watchdog
//!
//! One watchdog task per instance. It wakes on a fixed period and, once the
//! instance has gone quiet for longer than the timeout, marks it stopped and
//! unavailable and exits. Every inbound message replaces the task.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::debug;

use crate::instance::SharedInstance;

/// How often the watchdog checks the instance
pub const HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(10);

/// Silence after which an instance is considered gone
pub const INSTANCE_TIMEOUT: Duration = Duration::from_secs(120);

/// Handle to the watchdog task of one instance
#[derive(Debug, Default)]
pub struct Watchdog {
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any running task and start a fresh one
    pub fn rearm(&mut self, instance: SharedInstance) {
        self.cancel();
        self.handle = Some(tokio::spawn(watch_instance(instance)));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether a task is armed and has not fired yet
    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn watch_instance(instance: SharedInstance) {
    let mut ticker = interval_at(Instant::now() + HEALTH_CHECK_PERIOD, HEALTH_CHECK_PERIOD);

    loop {
        ticker.tick().await;

        let mut inst = instance.lock().await;
        if inst.is_stale(Instant::now()) {
            inst.mark_timed_out();
            return;
        }
        debug!("Instance {} alive", inst.instance_id());
    }
}
