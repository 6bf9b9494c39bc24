//! Retained record of the control events a handle accepted.
//!
//! Every event that reached the message queue is appended with a
//! monotonically increasing sequence number. The history is bounded; the
//! oldest entries are trimmed once it exceeds its capacity. A history can be
//! replayed into another handle to reproduce a session against a fresh
//! processor.

use std::collections::VecDeque;

use serde::Serialize;

use super::{ControlHandle, Event};

/// Maximum number of retained history entries before trimming.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Monotonically increasing sequence number.
    pub seq: u64,
    pub event: Event,
}

#[derive(Debug, Clone)]
pub struct EventLog {
    history: VecDeque<LogEntry>,
    next_seq: u64,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: VecDeque::new(),
            next_seq: 0,
            capacity,
        }
    }

    /// Record `event` and return its sequence number.
    pub fn append(&mut self, event: Event) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.history.push_back(LogEntry { seq, event });
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
        seq
    }

    /// Retained entries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &LogEntry> {
        self.history.iter()
    }

    /// Current sequence counter (next entry will get this seq).
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Send every retained event to `handle` in sequence order.
    ///
    /// Returns how many events were sent. Events the target rejects (an
    /// unknown path on a different module) are skipped.
    pub fn replay_into(&self, handle: &mut ControlHandle) -> usize {
        let mut sent = 0;
        for entry in &self.history {
            match handle.send(entry.event.clone()) {
                Ok(()) => sent += 1,
                Err(e) => {
                    log::warn!(target: "saavy_host::control", "replay skipped seq {}: {}", entry.seq, e)
                }
            }
        }
        sent
    }

    /// History as a JSON array, for debugging and bug reports.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.history)
    }
}
