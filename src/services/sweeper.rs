//! Periodic expiry and eviction pass over all command queues
//!
//! Queue operations already sweep lazily; this pass keeps memory bounded for
//! terminals that stopped polling altogether.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::bridge::{Bridge, SweepSummary};

/// Runs `Bridge::sweep` on a fixed interval until shutdown
pub struct CommandSweeper {
    bridge: Bridge,
    check_interval: Duration,
}

impl CommandSweeper {
    pub fn new(bridge: Bridge, check_interval: Duration) -> Self {
        Self {
            bridge,
            check_interval,
        }
    }

    /// Start the sweep loop; returns once `shutdown` flips to true or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = self.check_interval.as_millis() as u64, "Command sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.bridge.sweep().await;
                    if summary != SweepSummary::default() {
                        debug!(
                            expired = summary.expired,
                            queues_evicted = summary.queues_evicted,
                            statuses_evicted = summary.statuses_evicted,
                            "Sweep finished"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Command sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ManualClock;
    use crate::config::AppConfig;
    use crate::domain::TerminalId;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_expires_and_stops() {
        let clock = Arc::new(ManualClock::default());
        let bridge = Bridge::with_clock(&AppConfig::default(), clock.clone());
        let terminal = TerminalId::parse("T1").unwrap();
        bridge.submit_command(&terminal, json!("x")).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(CommandSweeper::new(bridge.clone(), Duration::from_secs(1)).run(rx));

        clock.advance(chrono::Duration::seconds(301));
        tokio::time::sleep(Duration::from_secs(2)).await;

        let stats = bridge.queue_stats(&terminal).await.unwrap();
        assert_eq!(stats.expired_total, 1);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
