//! Periodic health checks for one server type

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::ServerRegistry;

/// Shortest sweep period; `tokio::time::interval` rejects zero
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Background task re-checking every server of a type on an interval.
///
/// The task stops when the monitor is dropped.
pub struct HealthMonitor {
    server_type: String,
    handle: JoinHandle<()>,
}

impl HealthMonitor {
    /// Start checking immediately, then once per `interval`.
    ///
    /// Intervals below [`MIN_INTERVAL`] are raised to it.
    pub fn spawn(
        registry: Arc<ServerRegistry>,
        server_type: impl Into<String>,
        interval: Duration,
    ) -> Self {
        let server_type = server_type.into();
        let task_type = server_type.clone();

        let interval = if interval < MIN_INTERVAL {
            warn!(server_type = %server_type, ?interval, "Health check interval too short, using 1ms");
            MIN_INTERVAL
        } else {
            interval
        };

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match registry.check_all_connections(&task_type).await {
                    Ok(statuses) => {
                        debug!(server_type = %task_type, checked = statuses.len(), "Health sweep done")
                    }
                    Err(e) => warn!(server_type = %task_type, error = %e, "Health sweep failed"),
                }
            }
        });

        Self {
            server_type,
            handle,
        }
    }

    pub fn server_type(&self) -> &str {
        &self.server_type
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the monitor now
    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
