//! The bridge: one object owning all relay state, shared by every handler
//!
//! This module handles:
//! - Status ingest from EAs and status queries from the mobile app
//! - Command submission, polling (via `PollCoordinator`) and acknowledgment
//! - Trade event retention and the heartbeat summary

mod poll;

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use poll::{CommandBatch, DeliveredCommand, PollCoordinator};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::domain::{AckOutcome, CommandId, StatusReport, StatusSnapshot, TerminalId, TradeEvent};
use crate::error::Result;
use crate::store::{CommandStore, QueueStats, StatusStore, TradeLog};

/// Snapshot of all terminals for the mobile overview
#[derive(Debug, Clone, Serialize)]
pub struct StatusOverview {
    pub terminals: Vec<StatusSnapshot>,
    pub total_terminals: usize,
    pub online_terminals: usize,
    pub total_trades: usize,
}

/// Aggregate liveness figures
#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub timestamp: DateTime<Utc>,
    pub terminals_count: usize,
    pub online_terminals: usize,
    pub pending_commands: usize,
    pub delivered_commands: usize,
    pub trades_count: usize,
}

/// Outcome of one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub expired: usize,
    pub queues_evicted: usize,
    pub statuses_evicted: usize,
}

/// Relay state shared across request handlers
#[derive(Clone)]
pub struct Bridge {
    statuses: StatusStore,
    commands: CommandStore,
    poller: PollCoordinator,
    trades: TradeLog,
    clock: Arc<dyn Clock>,
    online_window: Duration,
    status_retention: Option<Duration>,
}

impl Bridge {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let commands = CommandStore::new(config.queue.policy());
        Self {
            statuses: StatusStore::new(),
            poller: PollCoordinator::new(commands.clone(), config.queue.max_poll_batch),
            commands,
            trades: TradeLog::new(config.trades.max_retained),
            clock,
            online_window: config.status.online_window(),
            status_retention: config.status.retention(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Accept a status report from an EA; stale reports fail with `StaleUpdate`
    /// and leave both the snapshot and the trade log untouched. The trade is
    /// logged under the terminal's status lock, so per terminal the log follows
    /// `observed_at` order.
    pub fn ingest(&self, report: StatusReport) -> Result<StatusSnapshot> {
        let trades = &self.trades;
        let trade = report.trade;
        let snapshot = self.statuses.update_status_with(
            &report.terminal_id,
            report.payload,
            report.observed_at,
            self.now(),
            |accepted| {
                if let Some(trade) = trade {
                    trades.record(TradeEvent {
                        terminal_id: accepted.terminal_id.clone(),
                        trade,
                        received_at: accepted.received_at,
                    });
                }
            },
        )?;

        debug!(
            terminal = %report.terminal_id,
            observed_at = report.observed_at,
            "Status updated"
        );
        Ok(snapshot)
    }

    pub fn status(&self, terminal_id: &TerminalId) -> Result<StatusSnapshot> {
        self.statuses.get_status(terminal_id)
    }

    pub async fn status_overview(&self) -> StatusOverview {
        let terminals = self.statuses.list();
        StatusOverview {
            total_terminals: terminals.len(),
            online_terminals: self.statuses.online_count(self.now(), self.online_window),
            total_trades: self.trades.len(),
            terminals,
        }
    }

    pub async fn submit_command(
        &self,
        terminal_id: &TerminalId,
        payload: serde_json::Value,
    ) -> Result<CommandId> {
        let id = self
            .commands
            .enqueue(terminal_id, payload, self.clock.as_ref())
            .await?;
        info!(terminal = %terminal_id, command_id = id, "Command queued");
        Ok(id)
    }

    pub async fn poll_commands(
        &self,
        raw_terminal_id: &str,
        limit: Option<usize>,
    ) -> Result<CommandBatch> {
        self.poller
            .poll(raw_terminal_id, limit, self.clock.as_ref())
            .await
    }

    pub async fn acknowledge(
        &self,
        terminal_id: &TerminalId,
        command_id: CommandId,
    ) -> Result<AckOutcome> {
        let outcome = self
            .commands
            .acknowledge(terminal_id, command_id, self.clock.as_ref())
            .await?;
        info!(
            terminal = %terminal_id,
            command_id,
            outcome = outcome.as_str(),
            "Command ack received"
        );
        Ok(outcome)
    }

    pub async fn queue_stats(&self, terminal_id: &TerminalId) -> Option<QueueStats> {
        self.commands.stats(terminal_id).await
    }

    pub fn recent_trades(&self, terminal_id: Option<&TerminalId>, limit: usize) -> Vec<TradeEvent> {
        self.trades.recent(terminal_id, limit)
    }

    pub async fn heartbeat(&self) -> Heartbeat {
        let now = self.now();
        let totals = self.commands.total_stats().await;
        Heartbeat {
            timestamp: now,
            terminals_count: self.statuses.len(),
            online_terminals: self.statuses.online_count(now, self.online_window),
            pending_commands: totals.pending,
            delivered_commands: totals.delivered,
            trades_count: self.trades.len(),
        }
    }

    /// Expire and collect across all terminals, then drop idle queues and,
    /// when a status retention is configured, silent terminals' snapshots
    pub async fn sweep(&self) -> SweepSummary {
        let expired = self.commands.sweep_all(self.clock.as_ref()).await;
        let queues_evicted = self.commands.evict_idle(self.clock.as_ref());
        let statuses_evicted = self
            .status_retention
            .map_or(0, |retention| self.statuses.evict_idle(self.now(), retention));

        SweepSummary {
            expired,
            queues_evicted,
            statuses_evicted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use serde_json::json;

    fn bridge() -> (Bridge, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let bridge = Bridge::with_clock(&AppConfig::default(), clock.clone());
        (bridge, clock)
    }

    fn tid(raw: &str) -> TerminalId {
        TerminalId::parse(raw).unwrap()
    }

    fn report(terminal: &str, observed_at: i64, payload: serde_json::Value) -> StatusReport {
        StatusReport {
            terminal_id: tid(terminal),
            payload,
            observed_at,
            trade: None,
        }
    }

    #[tokio::test]
    async fn test_stale_status_scenario() {
        let (bridge, _) = bridge();

        bridge.ingest(report("T1", 100, json!("P1"))).unwrap();
        let err = bridge.ingest(report("T1", 90, json!("P0"))).unwrap_err();
        assert!(matches!(err, BridgeError::StaleUpdate { .. }));

        assert_eq!(bridge.status(&tid("T1")).unwrap().payload, json!("P1"));
    }

    #[tokio::test]
    async fn test_ack_and_redelivery_scenario() {
        let (bridge, clock) = bridge();
        let t1 = tid("T1");

        let c1 = bridge.submit_command(&t1, json!("C1")).await.unwrap();
        let c2 = bridge.submit_command(&t1, json!("C2")).await.unwrap();
        let c3 = bridge.submit_command(&t1, json!("C3")).await.unwrap();

        let batch = bridge.poll_commands("T1", Some(10)).await.unwrap();
        let ids: Vec<_> = batch.commands.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![c1, c2, c3]);

        assert_eq!(
            bridge.acknowledge(&t1, c2).await.unwrap(),
            AckOutcome::Acknowledged
        );

        // Still inside the redelivery window: nothing new
        assert_eq!(bridge.poll_commands("T1", Some(10)).await.unwrap().count, 0);

        clock.advance(Duration::seconds(30));
        let batch = bridge.poll_commands("T1", Some(10)).await.unwrap();
        let ids: Vec<_> = batch.commands.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![c1, c3]);
    }

    #[tokio::test]
    async fn test_expired_command_is_not_polled_and_late_ack_is_noop() {
        let (bridge, clock) = bridge();
        let t1 = tid("T1");

        let id = bridge.submit_command(&t1, json!("close")).await.unwrap();
        bridge.poll_commands("T1", None).await.unwrap();

        clock.advance(Duration::seconds(300));
        assert_eq!(bridge.poll_commands("T1", None).await.unwrap().count, 0);
        assert_eq!(bridge.acknowledge(&t1, id).await.unwrap(), AckOutcome::Expired);
    }

    #[tokio::test]
    async fn test_trades_recorded_only_for_accepted_reports() {
        let (bridge, _) = bridge();

        let mut accepted = report("T1", 10, json!({}));
        accepted.trade = Some(json!({"ticket": 1}));
        bridge.ingest(accepted).unwrap();

        let mut stale = report("T1", 5, json!({}));
        stale.trade = Some(json!({"ticket": 2}));
        assert!(bridge.ingest(stale).is_err());

        let trades = bridge.recent_trades(None, 10);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].trade, json!({"ticket": 1}));
    }

    #[tokio::test]
    async fn test_heartbeat_and_overview() {
        let (bridge, clock) = bridge();
        bridge.ingest(report("A", 1, json!({}))).unwrap();
        clock.advance(Duration::seconds(400));
        bridge.ingest(report("B", 1, json!({}))).unwrap();
        bridge.submit_command(&tid("B"), json!("x")).await.unwrap();

        let heartbeat = bridge.heartbeat().await;
        assert_eq!(heartbeat.terminals_count, 2);
        assert_eq!(heartbeat.online_terminals, 1);
        assert_eq!(heartbeat.pending_commands, 1);

        let overview = bridge.status_overview().await;
        assert_eq!(overview.total_terminals, 2);
        assert_eq!(overview.online_terminals, 1);
        assert_eq!(overview.terminals[0].terminal_id, tid("A"));
    }

    #[tokio::test]
    async fn test_sweep_expires_without_traffic() {
        let (bridge, clock) = bridge();
        bridge.submit_command(&tid("T1"), json!("x")).await.unwrap();

        clock.advance(Duration::seconds(301));
        assert_eq!(bridge.sweep().await.expired, 1);
        let stats = bridge.queue_stats(&tid("T1")).await.unwrap();
        assert_eq!(stats.expired_total, 1);
        assert_eq!(stats.active(), 0);
    }

    #[test]
    fn test_trades_follow_observed_order_under_contention() {
        let (bridge, _) = bridge();

        std::thread::scope(|scope| {
            for worker in 0..4i64 {
                let bridge = bridge.clone();
                scope.spawn(move || {
                    for i in 0..25i64 {
                        let observed_at = i * 4 + worker;
                        let mut update = report("T1", observed_at, json!({}));
                        update.trade = Some(json!({ "observed_at": observed_at }));
                        let _ = bridge.ingest(update);
                    }
                });
            }
        });

        let logged: Vec<i64> = bridge
            .recent_trades(None, 100)
            .iter()
            .map(|t| t.trade["observed_at"].as_i64().unwrap())
            .collect();
        assert!(!logged.is_empty());
        assert!(logged.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(logged.last(), Some(&99));
    }

    #[tokio::test]
    async fn test_sweep_evicts_idle_queue_and_keeps_ids_increasing() {
        let (bridge, clock) = bridge();
        let t1 = tid("T1");

        let id = bridge.submit_command(&t1, json!("x")).await.unwrap();
        bridge.poll_commands("T1", None).await.unwrap();
        bridge.acknowledge(&t1, id).await.unwrap();

        // Past settled retention and the idle window
        clock.advance(Duration::seconds(300));
        bridge.sweep().await;
        clock.advance(Duration::seconds(3600));
        let summary = bridge.sweep().await;
        assert_eq!(summary.queues_evicted, 1);
        assert!(bridge.queue_stats(&t1).await.is_none());

        assert_eq!(bridge.acknowledge(&t1, id).await.unwrap(), AckOutcome::Settled);
        assert!(bridge.submit_command(&t1, json!("y")).await.unwrap() > id);
    }

    #[tokio::test]
    async fn test_status_retention_is_opt_in() {
        let clock = Arc::new(ManualClock::default());
        let mut config = AppConfig::default();
        let default_bridge = Bridge::with_clock(&config, clock.clone());
        config.status.retention_secs = 600;
        let retaining_bridge = Bridge::with_clock(&config, clock.clone());

        default_bridge.ingest(report("T1", 1, json!({}))).unwrap();
        retaining_bridge.ingest(report("T1", 1, json!({}))).unwrap();
        clock.advance(Duration::seconds(601));

        assert_eq!(default_bridge.sweep().await.statuses_evicted, 0);
        assert_eq!(retaining_bridge.sweep().await.statuses_evicted, 1);
        assert!(default_bridge.status(&tid("T1")).is_ok());
        assert!(retaining_bridge.status(&tid("T1")).is_err());
    }
}
