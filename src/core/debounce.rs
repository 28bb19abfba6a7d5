//! Per-key debounce arena and interaction-depth gate.
//!
//! Nothing here owns a timer. Due times are computed from the caller's clock and the
//! owner drains due entries from its event loop, so two queues never share state.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Pending<T> {
    due_at: u64,
    seq: u64,
    payload: T,
}

/// Coalesces writes per logical key.
///
/// Scheduling a key that is already pending replaces its payload and restarts its
/// window. Distinct keys never delay each other.
#[derive(Debug, Clone)]
pub struct DebounceQueue<T> {
    window_ms: u64,
    next_seq: u64,
    pending: BTreeMap<String, Pending<T>>,
}

impl<T> DebounceQueue<T> {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            next_seq: 0,
            pending: BTreeMap::new(),
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn schedule(&mut self, key: impl Into<String>, payload: T, now_ms: u64) {
        self.schedule_at(key, payload, now_ms.saturating_add(self.window_ms));
    }

    pub fn schedule_at(&mut self, key: impl Into<String>, payload: T, due_at: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(key.into(), Pending { due_at, seq, payload });
    }

    pub fn cancel(&mut self, key: &str) -> Option<T> {
        self.pending.remove(key).map(|entry| entry.payload)
    }

    pub fn take(&mut self, key: &str) -> Option<T> {
        self.cancel(key)
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.pending.values().map(|entry| entry.due_at).min()
    }

    /// Remove and return every entry due at `now_ms`, in scheduling order.
    pub fn take_due(&mut self, now_ms: u64) -> Vec<(String, T)> {
        let due_keys: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.due_at <= now_ms)
            .map(|(key, _)| key.clone())
            .collect();
        self.drain_keys(due_keys)
    }

    /// Remove and return everything, in scheduling order.
    pub fn take_all(&mut self) -> Vec<(String, T)> {
        let keys: Vec<String> = self.pending.keys().cloned().collect();
        self.drain_keys(keys)
    }

    fn drain_keys(&mut self, keys: Vec<String>) -> Vec<(String, T)> {
        let mut out: Vec<(u64, String, T)> = keys
            .into_iter()
            .filter_map(|key| self.pending.remove(&key).map(|entry| (entry.seq, key, entry.payload)))
            .collect();
        out.sort_by_key(|(seq, _, _)| *seq);
        out.into_iter().map(|(_, key, payload)| (key, payload)).collect()
    }
}

/// Counts nested high-frequency interactions (e.g. link dragging).
///
/// While the depth is above zero, saves of that category are held back. When the
/// depth returns to zero the caller schedules one settle flush.
#[derive(Debug, Clone, Default)]
pub struct InteractionGate {
    depth: u32,
}

impl InteractionGate {
    pub fn enter(&mut self) -> u32 {
        self.depth += 1;
        self.depth
    }

    /// Returns true when this call brought the depth back to zero.
    pub fn exit(&mut self) -> bool {
        if self.depth == 0 {
            return false;
        }
        self.depth -= 1;
        self.depth == 0
    }

    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}
