use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::{TerminalId, TradeEvent};

/// Bounded log of trade events, oldest evicted first.
///
/// The lock is synchronous so a record can happen inside the status store's
/// per-terminal critical section; it is never held across an await.
#[derive(Debug, Clone)]
pub struct TradeLog {
    events: Arc<Mutex<VecDeque<TradeEvent>>>,
    max_retained: usize,
}

impl TradeLog {
    pub fn new(max_retained: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_retained,
        }
    }

    fn events(&self) -> MutexGuard<'_, VecDeque<TradeEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, event: TradeEvent) {
        let mut events = self.events();
        events.push_back(event);
        while events.len() > self.max_retained {
            events.pop_front();
        }
    }

    /// Most recent `limit` events, optionally for one terminal, oldest first
    pub fn recent(&self, terminal_id: Option<&TerminalId>, limit: usize) -> Vec<TradeEvent> {
        let events = self.events();
        let mut recent: Vec<TradeEvent> = events
            .iter()
            .rev()
            .filter(|e| terminal_id.map_or(true, |id| &e.terminal_id == id))
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }
}
