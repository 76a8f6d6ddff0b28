use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{StatusSnapshot, TerminalId};
use crate::error::{BridgeError, Result};

/// Latest status snapshot per terminal.
///
/// Each update runs under the map's entry lock for its key, so the
/// monotonicity check and the replacement happen as one step. Readers get
/// owned clones and never see a half-written snapshot.
#[derive(Debug, Clone, Default)]
pub struct StatusStore {
    snapshots: Arc<DashMap<TerminalId, StatusSnapshot>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot unless one with an equal or newer `observed_at` exists
    pub fn update_status(
        &self,
        terminal_id: &TerminalId,
        payload: serde_json::Value,
        observed_at: i64,
        now: DateTime<Utc>,
    ) -> Result<StatusSnapshot> {
        self.update_status_with(terminal_id, payload, observed_at, now, |_| {})
    }

    /// Like `update_status`, running `on_accept` while the terminal's entry is
    /// still locked. `on_accept` must not touch this store.
    pub fn update_status_with<F>(
        &self,
        terminal_id: &TerminalId,
        payload: serde_json::Value,
        observed_at: i64,
        now: DateTime<Utc>,
        on_accept: F,
    ) -> Result<StatusSnapshot>
    where
        F: FnOnce(&StatusSnapshot),
    {
        let snapshot = StatusSnapshot {
            terminal_id: terminal_id.clone(),
            payload,
            observed_at,
            received_at: now,
        };

        match self.snapshots.entry(terminal_id.clone()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get().observed_at;
                if !entry.get().is_superseded_by(observed_at) {
                    warn!(
                        terminal = %terminal_id,
                        observed_at,
                        current,
                        "Dropping stale status update"
                    );
                    return Err(BridgeError::StaleUpdate {
                        terminal_id: terminal_id.to_string(),
                        observed_at,
                        current,
                    });
                }
                on_accept(&snapshot);
                entry.insert(snapshot.clone());
            }
            Entry::Vacant(entry) => {
                debug!(terminal = %terminal_id, "First status from terminal");
                on_accept(&snapshot);
                entry.insert(snapshot.clone());
            }
        }

        Ok(snapshot)
    }

    pub fn get_status(&self, terminal_id: &TerminalId) -> Result<StatusSnapshot> {
        self.snapshots
            .get(terminal_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BridgeError::NotFound(format!("terminal {terminal_id} has not reported")))
    }

    /// All snapshots, sorted by terminal id
    pub fn list(&self) -> Vec<StatusSnapshot> {
        let mut all: Vec<StatusSnapshot> = self
            .snapshots
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.terminal_id.cmp(&b.terminal_id));
        all
    }

    /// Terminals that reported within `window` of `now`
    pub fn online_count(&self, now: DateTime<Utc>, window: Duration) -> usize {
        self.snapshots
            .iter()
            .filter(|entry| now - entry.value().received_at < window)
            .count()
    }

    /// Drop snapshots received `max_idle` or longer before `now`
    pub fn evict_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        let before = self.snapshots.len();
        self.snapshots
            .retain(|_, snapshot| now - snapshot.received_at < max_idle);
        before.saturating_sub(self.snapshots.len())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
