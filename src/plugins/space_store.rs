//! Durable storage of one graph per Space.
//!
//! The local slot store is the source of truth and is written synchronously. An
//! optional remote mirror receives a debounced copy of every mirrored slot, keyed by
//! its logical remote key, so rapid edits to one Space coalesce into one remote write
//! and writes to different Spaces never wait on each other.
//!
//! Nothing here surfaces a corrupt payload or a remote failure to the caller. Corrupt
//! graphs are reset to an empty snapshot on read; remote errors are logged and dropped.

use crate::core::db::LocalSlots;
use crate::core::debounce::{DebounceQueue, InteractionGate};
use crate::core::error::SpaceError;
use crate::core::model::{DEFAULT_SPACE_NAME, Node, NodeType, SpaceData, SpaceKind};
use crate::core::remote::RemoteMirror;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time::{Clock, SystemClock};
use crate::plugins::playground::PLAYGROUND_SPACE_ID;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_REMOTE_DEBOUNCE_MS: u64 = 400;
pub const DEFAULT_INTERACTION_SETTLE_MS: u64 = 150;

/// Role stamped on a core node that lost its core status during migration.
pub const LEGACY_CORE_ROLE: &str = "legacy-core";

pub struct SpaceStore {
    local: LocalSlots,
    remote: Option<Box<dyn RemoteMirror>>,
    clock: Arc<dyn Clock>,
    remote_queue: DebounceQueue<JsonValue>,
    settle_queue: DebounceQueue<SpaceData>,
    held: BTreeMap<String, SpaceData>,
    gate: InteractionGate,
}

impl SpaceStore {
    pub fn new(local: LocalSlots, clock: Arc<dyn Clock>) -> Self {
        Self {
            local,
            remote: None,
            clock,
            remote_queue: DebounceQueue::new(DEFAULT_REMOTE_DEBOUNCE_MS),
            settle_queue: DebounceQueue::new(DEFAULT_INTERACTION_SETTLE_MS),
            held: BTreeMap::new(),
            gate: InteractionGate::default(),
        }
    }

    pub fn open(store: &Store) -> Result<Self, SpaceError> {
        Ok(Self::new(LocalSlots::open(store)?, Arc::new(SystemClock)))
    }

    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self, SpaceError> {
        Ok(Self::new(LocalSlots::in_memory()?, clock))
    }

    pub fn with_remote(mut self, remote: Box<dyn RemoteMirror>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_timings(mut self, remote_debounce_ms: u64, interaction_settle_ms: u64) -> Self {
        self.remote_queue = DebounceQueue::new(remote_debounce_ms);
        self.settle_queue = DebounceQueue::new(interaction_settle_ms);
        self
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn local(&self) -> &LocalSlots {
        &self.local
    }

    // --- Space graphs ---

    /// Read a Space's graph, falling back to an empty snapshot when nothing is stored.
    pub fn read(&mut self, space_id: &str) -> Result<SpaceData, SpaceError> {
        Ok(self
            .read_existing(space_id)?
            .unwrap_or_else(|| SpaceData::empty(space_id)))
    }

    /// Read a Space's graph. `None` when neither the local store nor the remote mirror
    /// holds one.
    ///
    /// A locally absent graph is fetched from the remote once and written back locally.
    /// An unparsable local payload is replaced by an empty snapshot on the spot.
    pub fn read_existing(&mut self, space_id: &str) -> Result<Option<SpaceData>, SpaceError> {
        let slot = schemas::space_slot(space_id);
        if let Some(raw) = self.local.get(&slot)? {
            return match serde_json::from_str::<SpaceData>(&raw) {
                Ok(data) => Ok(Some(data)),
                Err(err) => {
                    let corruption = SpaceError::StorageCorruption {
                        slot: slot.clone(),
                        reason: err.to_string(),
                    };
                    warn!(space_id, error = %corruption, "resetting corrupt space payload");
                    let empty = SpaceData::empty(space_id);
                    self.write_local(&slot, &empty)?;
                    Ok(Some(empty))
                }
            };
        }

        let key = schemas::space_remote_key(space_id);
        let Some(value) = self.remote_get(&key) else {
            return Ok(None);
        };
        match serde_json::from_value::<SpaceData>(value) {
            Ok(data) => {
                debug!(space_id, "adopted space data from remote mirror");
                self.write_local(&slot, &data)?;
                Ok(Some(data))
            }
            Err(err) => {
                warn!(space_id, error = %err, "ignoring unparsable remote space payload");
                Ok(None)
            }
        }
    }

    /// Persist a complete snapshot locally, then schedule its remote mirror write.
    ///
    /// Supersedes any snapshot of the same Space still held back by an interaction.
    pub fn write(&mut self, space_id: &str, data: &SpaceData) -> Result<(), SpaceError> {
        self.held.remove(space_id);
        self.settle_queue.cancel(space_id);
        self.write_slot(&schemas::space_slot(space_id), data)
    }

    /// Save triggered by a high-frequency interaction. Held back while any interaction
    /// is in progress; written directly otherwise.
    pub fn write_during_interaction(&mut self, space_id: &str, data: &SpaceData) -> Result<(), SpaceError> {
        if self.gate.is_active() {
            self.held.insert(space_id.to_string(), data.clone());
            return Ok(());
        }
        self.write(space_id, data)
    }

    pub fn begin_interaction(&mut self) -> u32 {
        self.gate.enter()
    }

    /// Leave one interaction level. When the last one ends, every held snapshot is
    /// scheduled for a single flush after the settle window.
    pub fn end_interaction(&mut self) {
        if !self.gate.exit() {
            return;
        }
        let now = self.now_ms();
        for (space_id, data) in std::mem::take(&mut self.held) {
            self.settle_queue.schedule(space_id, data, now);
        }
    }

    pub fn interaction_depth(&self) -> u32 {
        self.gate.depth()
    }

    /// Delete a Space's graph locally and on the remote mirror.
    pub fn remove(&mut self, space_id: &str) -> Result<(), SpaceError> {
        self.held.remove(space_id);
        self.settle_queue.cancel(space_id);
        let key = schemas::space_remote_key(space_id);
        self.remote_queue.cancel(&key);
        self.local.remove(&schemas::space_slot(space_id))?;
        self.remote_clear(&key);
        Ok(())
    }

    // --- Other mirrored records (index, active id, share links, entitlements) ---

    /// Read a JSON record. An unparsable record reads as `None`.
    pub fn read_record<T: DeserializeOwned>(&self, slot: &str) -> Result<Option<T>, SpaceError> {
        let Some(raw) = self.local.get(slot)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(slot, error = %err, "ignoring unparsable record");
                Ok(None)
            }
        }
    }

    pub fn write_record<T: Serialize>(&mut self, slot: &str, value: &T) -> Result<(), SpaceError> {
        self.write_slot(slot, value)
    }

    pub fn remove_record(&mut self, slot: &str) -> Result<(), SpaceError> {
        self.local.remove(slot)?;
        if let Some(key) = schemas::remote_key_for_slot(slot) {
            self.remote_queue.cancel(&key);
            self.remote_clear(&key);
        }
        Ok(())
    }

    // --- Timers ---

    /// Run every flush whose window has elapsed. Returns the number of writes performed.
    pub fn pump(&mut self) -> Result<usize, SpaceError> {
        let now = self.now_ms();
        let mut performed = 0;
        for (space_id, data) in self.settle_queue.take_due(now) {
            self.write_slot(&schemas::space_slot(&space_id), &data)?;
            performed += 1;
        }
        for (key, payload) in self.remote_queue.take_due(now) {
            self.remote_set(&key, &payload);
            performed += 1;
        }
        Ok(performed)
    }

    /// Write out everything still pending for one Space, skipping the windows.
    pub fn flush_space(&mut self, space_id: &str) -> Result<(), SpaceError> {
        let data = self
            .held
            .remove(space_id)
            .or_else(|| self.settle_queue.take(space_id));
        if let Some(data) = data {
            self.write_slot(&schemas::space_slot(space_id), &data)?;
        }
        let key = schemas::space_remote_key(space_id);
        if let Some(payload) = self.remote_queue.take(&key) {
            self.remote_set(&key, &payload);
        }
        Ok(())
    }

    /// Write out everything pending. Call on shutdown.
    pub fn flush_all(&mut self) -> Result<(), SpaceError> {
        let held = std::mem::take(&mut self.held);
        for (space_id, data) in held.into_iter().chain(self.settle_queue.take_all()) {
            self.write_slot(&schemas::space_slot(&space_id), &data)?;
        }
        for (key, payload) in self.remote_queue.take_all() {
            self.remote_set(&key, &payload);
        }
        Ok(())
    }

    pub fn pending_remote_writes(&self) -> usize {
        self.remote_queue.len()
    }

    pub fn pending_local_flushes(&self) -> usize {
        self.held.len() + self.settle_queue.len()
    }

    pub fn next_due(&self) -> Option<u64> {
        match (self.remote_queue.next_due(), self.settle_queue.next_due()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // --- Startup hydration ---

    /// Pull the index, active id, share links and every indexed graph from the remote
    /// mirror. Only runs when the local store holds nothing at all, so a remote copy can
    /// never clobber local edits. Returns true when anything was adopted.
    pub fn hydrate_from_remote(&mut self) -> Result<bool, SpaceError> {
        if self.remote.is_none() || !self.local.is_empty()? {
            return Ok(false);
        }

        let mut adopted = false;
        let mut space_ids = Vec::new();
        let records = [
            (schemas::REMOTE_SPACES_INDEX, schemas::SLOT_SPACES_INDEX),
            (schemas::REMOTE_ACTIVE_SPACE, schemas::SLOT_ACTIVE_SPACE),
            (schemas::REMOTE_SHARE_LINKS, schemas::SLOT_SHARE_LINKS),
        ];
        for (key, slot) in records {
            let Some(value) = self.remote_get(key) else {
                continue;
            };
            if slot == schemas::SLOT_SPACES_INDEX {
                space_ids = indexed_space_ids(&value);
            }
            self.write_local(slot, &value)?;
            adopted = true;
        }

        for space_id in space_ids {
            let key = schemas::space_remote_key(&space_id);
            let Some(value) = self.remote_get(&key) else {
                continue;
            };
            if serde_json::from_value::<SpaceData>(value.clone()).is_err() {
                warn!(space_id = %space_id, "skipping unparsable remote space payload");
                continue;
            }
            self.write_local(&schemas::space_slot(&space_id), &value)?;
            adopted = true;
        }

        if adopted {
            debug!("hydrated empty local store from remote mirror");
        }
        Ok(adopted)
    }

    // --- Internals ---

    fn write_local<T: Serialize + ?Sized>(&self, slot: &str, value: &T) -> Result<(), SpaceError> {
        let body = serde_json::to_string(value)?;
        self.local.set(slot, &body, self.now_ms())
    }

    fn write_slot<T: Serialize + ?Sized>(&mut self, slot: &str, value: &T) -> Result<(), SpaceError> {
        self.write_local(slot, value)?;
        if self.remote.is_some() {
            if let Some(key) = schemas::remote_key_for_slot(slot) {
                let payload = serde_json::to_value(value)?;
                let now = self.now_ms();
                self.remote_queue.schedule(key, payload, now);
            }
        }
        Ok(())
    }

    fn remote_get(&self, key: &str) -> Option<JsonValue> {
        let remote = self.remote.as_ref()?;
        match remote.get(key) {
            Ok(value) => value.filter(|v| !v.is_null()),
            Err(err) => {
                debug!(key, error = %err, "remote get failed");
                None
            }
        }
    }

    fn remote_set(&self, key: &str, payload: &JsonValue) {
        if let Some(remote) = &self.remote {
            if let Err(err) = remote.set(key, payload) {
                debug!(key, error = %err, "remote set failed");
            }
        }
    }

    fn remote_clear(&self, key: &str) {
        if let Some(remote) = &self.remote {
            if let Err(err) = remote.clear(key) {
                debug!(key, error = %err, "remote clear failed");
            }
        }
    }
}

fn indexed_space_ids(index: &JsonValue) -> Vec<String> {
    index
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("id").and_then(JsonValue::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Bring a graph to exactly one core node whose id is `expected_core_id`.
///
/// - a non-core node already carrying the expected id is promoted;
/// - otherwise the first legacy core is renamed and every edge endpoint follows it;
/// - any further core node is demoted to a plain node tagged `legacy-core`;
/// - a graph with nodes but no core at all gets a fresh core.
///
/// Returns the migrated graph and whether anything changed. Applying it to its own
/// output changes nothing.
pub fn migrate_core_node(
    space_id: &str,
    mut data: SpaceData,
    expected_core_id: &str,
    space_name: &str,
    now_ms: u64,
) -> (SpaceData, bool) {
    if data.nodes.is_empty() {
        return (data, false);
    }
    let mut changed = false;

    let keeper = match data.nodes.iter().position(|node| node.id == expected_core_id) {
        Some(idx) => {
            if !data.nodes[idx].is_core() {
                data.nodes[idx].node_type = NodeType::Core;
                changed = true;
            }
            Some(idx)
        }
        None => data.nodes.iter().position(Node::is_core),
    };

    match keeper {
        Some(idx) if data.nodes[idx].id != expected_core_id => {
            let old_id = std::mem::replace(&mut data.nodes[idx].id, expected_core_id.to_string());
            for edge in data.edges.iter_mut() {
                if edge.source == old_id {
                    edge.source = expected_core_id.to_string();
                }
                if edge.target == old_id {
                    edge.target = expected_core_id.to_string();
                }
            }
            debug!(space_id, old_id = %old_id, new_id = expected_core_id, "renamed legacy core node");
            changed = true;
        }
        Some(_) => {}
        None => {
            let label = if space_name.trim().is_empty() {
                DEFAULT_SPACE_NAME
            } else {
                space_name
            };
            let mut core = Node::new(expected_core_id, NodeType::Core, 0.0, 0.0).with_label(label);
            core.meta.space_id = Some(space_id.to_string());
            core.created_at = Some(now_ms);
            core.updated_at = Some(now_ms);
            data.nodes.insert(0, core);
            debug!(space_id, core_id = expected_core_id, "synthesized missing core node");
            changed = true;
        }
    }

    for node in data.nodes.iter_mut() {
        if node.is_core() && node.id != expected_core_id {
            node.node_type = NodeType::Node;
            node.meta.role = Some(LEGACY_CORE_ROLE.to_string());
            node.updated_at = Some(now_ms);
            changed = true;
        }
    }

    (data, changed)
}

/// Reset a graph that evidently belongs somewhere else.
///
/// Two cases count as contamination: the payload names a different Space in its
/// `spaceId`, or a non-playground Space holds playground seed nodes. Returns the graph
/// to use and whether it was reset.
pub fn guard_against_foreign_seed_data(space_id: &str, data: SpaceData, kind: SpaceKind) -> (SpaceData, bool) {
    let foreign_owner = data
        .space_id
        .as_deref()
        .is_some_and(|owner| !owner.is_empty() && owner != space_id);
    let seeded = kind != SpaceKind::Playground
        && data
            .nodes
            .iter()
            .any(|node| node.id.starts_with(PLAYGROUND_SPACE_ID));

    if foreign_owner || seeded {
        warn!(
            space_id,
            foreign_owner, seeded, "resetting contaminated space payload"
        );
        return (SpaceData::empty(space_id), true);
    }
    (data, false)
}
