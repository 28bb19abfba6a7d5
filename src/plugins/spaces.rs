//! Space registry: the catalog of every Space's metadata and its lifecycle.
//!
//! A Space moves `active -> trashed -> restored | purged`, or straight to gone via a
//! hard delete. The registry owns the one [`SpaceStore`], the active Space id and the
//! active Space's in-memory graph, and it is the only writer of the index slot.

use crate::core::config::SpaceConfig;
use crate::core::error::SpaceError;
use crate::core::events::{EventSink, SpaceEvent};
use crate::core::hierarchy::{SubspaceLod, compute_scope_visibility_sets};
use crate::core::migration;
use crate::core::model::{ARCHECORE_ID, DEFAULT_SPACE_NAME, SpaceData, SpaceKind, SpaceMeta, core_id_for};
use crate::core::remote::DirMirror;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time::{self, DAY_MS};
use crate::plugins::entitlements::EntitlementGate;
use crate::plugins::playground::{self, PLAYGROUND_SPACE_ID};
use crate::plugins::space_store::{SpaceStore, guard_against_foreign_seed_data, migrate_core_node};
use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

pub const DEFAULT_TRASH_RETENTION_MS: u64 = 30 * DAY_MS;

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Reuse this id. Creating an id that already exists returns it unchanged.
    pub id: Option<String>,
    pub kind: SpaceKind,
}

/// The graph of the currently open Space, as last handed to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSpace {
    pub space_id: String,
    pub data: SpaceData,
    pub dirty: bool,
}

pub struct SpaceRegistry {
    store: SpaceStore,
    spaces: BTreeMap<String, SpaceMeta>,
    active: Option<String>,
    live: Option<LiveSpace>,
    sinks: Vec<Box<dyn EventSink>>,
    retention_ms: u64,
}

impl SpaceRegistry {
    /// Wrap a store and read its index. Runs no migration, hydration or purge.
    pub fn new(store: SpaceStore) -> Result<Self, SpaceError> {
        let mut registry = Self {
            store,
            spaces: BTreeMap::new(),
            active: None,
            live: None,
            sinks: Vec::new(),
            retention_ms: DEFAULT_TRASH_RETENTION_MS,
        };
        registry.load_index()?;
        Ok(registry)
    }

    pub fn with_retention_ms(mut self, retention_ms: u64) -> Self {
        self.retention_ms = retention_ms;
        self
    }

    /// Startup sequence: hydrate an empty local store from the remote mirror, migrate,
    /// read the index, purge expired trash and restore the active Space id.
    pub fn open(mut store: SpaceStore, config: &SpaceConfig) -> Result<Self, SpaceError> {
        if store.hydrate_from_remote()? {
            info!("local store hydrated from remote mirror");
        }
        let now = store.now_ms();
        migration::check_and_migrate(store.local(), now)?;

        let mut registry = Self::new(store)?.with_retention_ms(config.trash.retention_ms());
        let purged = registry.purge_expired_trash()?;
        if !purged.is_empty() {
            info!(count = purged.len(), "purged expired trash");
        }
        Ok(registry)
    }

    /// Open the registry of an on-disk store, wiring the configured remote mirror.
    pub fn open_store(store: &Store, config: &SpaceConfig) -> Result<Self, SpaceError> {
        let mut space_store = SpaceStore::open(store)?.with_timings(
            config.store.remote_debounce_ms,
            config.store.interaction_settle_ms,
        );
        if let Some(dir) = &config.remote.mirror_dir {
            debug!(dir = %dir.display(), "using directory remote mirror");
            space_store = space_store.with_remote(Box::new(DirMirror::new(dir)));
        }
        Self::open(space_store, config)
    }

    pub fn subscribe(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn now_ms(&self) -> u64 {
        self.store.now_ms()
    }

    pub fn store(&self) -> &SpaceStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SpaceStore {
        &mut self.store
    }

    // --- Queries ---

    /// Non-trashed Spaces, most recently accessed first.
    pub fn list(&self) -> Vec<&SpaceMeta> {
        self.list_with(false, true)
    }

    pub fn list_with(&self, include_trashed: bool, include_playground: bool) -> Vec<&SpaceMeta> {
        let mut out: Vec<&SpaceMeta> = self
            .spaces
            .values()
            .filter(|meta| include_trashed || !meta.trashed)
            .filter(|meta| include_playground || meta.kind != SpaceKind::Playground)
            .collect();
        out.sort_by(|a, b| {
            b.last_accessed_at
                .cmp(&a.last_accessed_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    pub fn trashed(&self) -> Vec<&SpaceMeta> {
        let mut out: Vec<&SpaceMeta> = self.spaces.values().filter(|meta| meta.trashed).collect();
        out.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
        out
    }

    pub fn get_meta(&self, id: &str) -> Option<&SpaceMeta> {
        self.spaces.get(id)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Spaces that count against the space quota: live user Spaces.
    pub fn user_space_count(&self) -> u64 {
        self.spaces
            .values()
            .filter(|meta| !meta.trashed && meta.kind == SpaceKind::User)
            .count() as u64
    }

    // --- Lifecycle ---

    /// Create a Space and initialize its empty graph. Idempotent on an existing id.
    pub fn create(&mut self, name: &str, parent_id: Option<&str>, options: CreateOptions) -> Result<String, SpaceError> {
        if let Some(id) = &options.id {
            if self.spaces.contains_key(id) {
                return Ok(id.clone());
            }
        }
        let id = options.id.clone().unwrap_or_else(time::new_id);
        let name = match options.kind {
            SpaceKind::Playground => normalized_name(name),
            SpaceKind::User => self.unique_name(name, None),
        };
        let now = self.now_ms();
        let meta = SpaceMeta {
            id: id.clone(),
            name: name.clone(),
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            core_node_id: Some(core_id_for(&id)),
            grid_snap_enabled: false,
            parent_space_id: Some(parent_id.unwrap_or(ARCHECORE_ID).to_string()),
            kind: options.kind,
            favorite: false,
            trashed: false,
            deleted_at: None,
        };

        self.spaces.insert(id.clone(), meta);
        self.save_index()?;
        if let Err(err) = self.store.write(&id, &SpaceData::empty(&id)) {
            self.spaces.remove(&id);
            self.save_index()?;
            return Err(err);
        }

        info!(space_id = %id, name = %name, "space created");
        self.emit(SpaceEvent::Created {
            space_id: id.clone(),
            name,
            kind: options.kind,
        });
        Ok(id)
    }

    /// [`Self::create`] behind the entitlement gate. Quota errors surface unchanged.
    pub fn create_space_gated(
        &mut self,
        gate: &dyn EntitlementGate,
        name: &str,
        parent_id: Option<&str>,
        options: CreateOptions,
    ) -> Result<String, SpaceError> {
        let existing = options.id.as_ref().is_some_and(|id| self.spaces.contains_key(id));
        if !existing && options.kind == SpaceKind::User {
            gate.ensure_can_create_space(self.user_space_count())?;
        }
        self.create(name, parent_id, options)
    }

    /// Copy a graph into a brand-new Space. Never idempotent.
    pub fn fork(&mut self, data: &SpaceData, base_name: &str) -> Result<String, SpaceError> {
        let id = time::new_id();
        let name = self.unique_name(base_name, None);
        let now = self.now_ms();
        let parent = data.space_id.clone().unwrap_or_else(|| ARCHECORE_ID.to_string());

        let mut copy = data.clone();
        copy.space_id = Some(id.clone());
        for node in copy.nodes.iter_mut() {
            node.meta.space_id = Some(id.clone());
        }
        rekey_seed_nodes(&mut copy);
        let core_id = core_id_for(&id);
        let (copy, _) = migrate_core_node(&id, copy, &core_id, &name, now);

        let meta = SpaceMeta {
            id: id.clone(),
            name: name.clone(),
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            core_node_id: Some(core_id),
            grid_snap_enabled: false,
            parent_space_id: Some(parent),
            kind: SpaceKind::User,
            favorite: false,
            trashed: false,
            deleted_at: None,
        };
        self.spaces.insert(id.clone(), meta);
        self.save_index()?;

        if let Err(err) = self.store.write(&id, &copy) {
            warn!(space_id = %id, error = %err, "fork failed, rolling back");
            self.hard_delete(&id)?;
            return Err(err);
        }

        info!(space_id = %id, name = %name, "space forked");
        self.emit(SpaceEvent::Created {
            space_id: id.clone(),
            name,
            kind: SpaceKind::User,
        });
        Ok(id)
    }

    /// Rename a Space. Returns the final, disambiguated name, or `None` if the Space
    /// does not exist.
    pub fn rename(&mut self, id: &str, name: &str) -> Result<Option<String>, SpaceError> {
        if !self.spaces.contains_key(id) {
            return Ok(None);
        }
        let final_name = self.unique_name(name, Some(id));
        let now = self.now_ms();
        if let Some(meta) = self.spaces.get_mut(id) {
            meta.name = final_name.clone();
            meta.updated_at = now;
        }
        self.save_index()?;
        self.emit(SpaceEvent::Renamed {
            space_id: id.to_string(),
            name: final_name.clone(),
        });
        Ok(Some(final_name))
    }

    pub fn set_favorite(&mut self, id: &str, favorite: bool) -> Result<bool, SpaceError> {
        self.update_meta(id, |meta| meta.favorite = favorite)
    }

    pub fn set_grid_snap(&mut self, id: &str, enabled: bool) -> Result<bool, SpaceError> {
        self.update_meta(id, |meta| meta.grid_snap_enabled = enabled)
    }

    /// Set a Space's kind if it differs. Returns true when it changed.
    pub fn ensure_kind(&mut self, id: &str, kind: SpaceKind) -> Result<bool, SpaceError> {
        if self.spaces.get(id).is_none_or(|meta| meta.kind == kind) {
            return Ok(false);
        }
        self.update_meta(id, |meta| meta.kind = kind)
    }

    /// Move a Space to the trash. The playground cannot be trashed. If the Space is the
    /// active one, the most recently accessed remaining Space becomes active.
    pub fn soft_delete(&mut self, id: &str) -> Result<bool, SpaceError> {
        if is_protected(id) {
            warn!(space_id = id, "refusing to trash the playground space");
            return Ok(false);
        }
        let now = self.now_ms();
        match self.spaces.get_mut(id) {
            Some(meta) if !meta.trashed => {
                meta.trashed = true;
                meta.deleted_at = Some(now);
                meta.updated_at = now;
            }
            _ => return Ok(false),
        }
        self.save_index()?;

        if self.active.as_deref() == Some(id) {
            self.redirect_active_from(id)?;
        }
        self.emit(SpaceEvent::Deleted {
            space_id: id.to_string(),
            deleted_at: Some(now),
        });
        Ok(true)
    }

    pub fn restore(&mut self, id: &str) -> Result<bool, SpaceError> {
        let now = self.now_ms();
        match self.spaces.get_mut(id) {
            Some(meta) if meta.trashed => {
                meta.trashed = false;
                meta.deleted_at = None;
                meta.updated_at = now;
            }
            _ => return Ok(false),
        }
        let name = self.spaces.get(id).map(|meta| meta.name.clone()).unwrap_or_default();
        let unique = self.unique_name(&name, Some(id));
        if unique != name {
            if let Some(meta) = self.spaces.get_mut(id) {
                meta.name = unique;
            }
        }
        self.save_index()?;
        self.emit(SpaceEvent::Restored { space_id: id.to_string() });
        Ok(true)
    }

    /// Remove a Space's metadata and its graph, locally and remotely.
    pub fn hard_delete(&mut self, id: &str) -> Result<bool, SpaceError> {
        if is_protected(id) {
            warn!(space_id = id, "refusing to delete the playground space");
            return Ok(false);
        }
        if self.spaces.remove(id).is_none() {
            return Ok(false);
        }
        self.save_index()?;
        self.store.remove(id)?;

        if self.active.as_deref() == Some(id) {
            self.active = None;
            self.live = None;
            self.store.remove_record(schemas::SLOT_ACTIVE_SPACE)?;
        }
        info!(space_id = id, "space hard-deleted");
        self.emit(SpaceEvent::Deleted {
            space_id: id.to_string(),
            deleted_at: None,
        });
        Ok(true)
    }

    /// Hard-delete every trashed Space deleted more than the retention window ago.
    pub fn purge_expired_trash(&mut self) -> Result<Vec<String>, SpaceError> {
        let now = self.now_ms();
        let expired: Vec<String> = self
            .spaces
            .values()
            .filter(|meta| meta.trashed)
            .filter(|meta| {
                meta.deleted_at
                    .is_some_and(|deleted_at| now.saturating_sub(deleted_at) > self.retention_ms)
            })
            .map(|meta| meta.id.clone())
            .collect();

        let mut purged = Vec::new();
        for id in expired {
            if self.hard_delete(&id)? {
                purged.push(id);
            }
        }
        Ok(purged)
    }

    // --- Loading and the live graph ---

    /// Switch the active Space. Pending writes of the current Space are flushed first.
    /// Returns `None` when the Space does not exist or is in the trash.
    pub fn load(&mut self, id: &str) -> Result<Option<SpaceData>, SpaceError> {
        let Some(meta) = self.spaces.get(id).cloned() else {
            return Ok(None);
        };
        if meta.trashed {
            debug!(space_id = id, "refusing to open a trashed space");
            return Ok(None);
        }

        if let Some(current) = self.active.clone() {
            if self.live.as_ref().is_some_and(|live| live.dirty) {
                self.save_current()?;
            }
            self.store.flush_space(&current)?;
        }

        let stored = self.store.read(id)?;
        let (guarded, reset) = guard_against_foreign_seed_data(id, stored, meta.kind);
        let now = self.now_ms();
        let (mut data, migrated) = migrate_core_node(id, guarded, &meta.core_id(), &meta.name, now);
        if data.space_id.is_none() {
            data.space_id = Some(id.to_string());
        }
        if reset || migrated {
            self.store.write(id, &data)?;
        }

        self.active = Some(id.to_string());
        self.store
            .write_record(schemas::SLOT_ACTIVE_SPACE, &id.to_string())?;
        if let Some(meta) = self.spaces.get_mut(id) {
            meta.last_accessed_at = now;
            if meta.core_node_id.is_none() {
                meta.core_node_id = Some(core_id_for(id));
            }
        }
        self.save_index()?;

        self.live = Some(LiveSpace {
            space_id: id.to_string(),
            data: data.clone(),
            dirty: false,
        });
        self.emit(SpaceEvent::Changed { space_id: id.to_string() });
        Ok(Some(data))
    }

    pub fn live(&self) -> Option<&LiveSpace> {
        self.live.as_ref()
    }

    /// Replace the live graph wholesale (e.g. after an import). No-op without an
    /// open Space.
    pub fn replace_live(&mut self, data: SpaceData) -> bool {
        match self.live.as_mut() {
            Some(live) => {
                live.data = data;
                live.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn update_live<F>(&mut self, edit: F) -> bool
    where
        F: FnOnce(&mut SpaceData),
    {
        match self.live.as_mut() {
            Some(live) => {
                edit(&mut live.data);
                live.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Persist the live graph of the open Space.
    pub fn save_current(&mut self) -> Result<bool, SpaceError> {
        let Some(live) = self.live.as_mut() else {
            return Ok(false);
        };
        let id = live.space_id.clone();
        live.data.space_id = Some(id.clone());
        live.dirty = false;
        let data = live.data.clone();

        self.store.write(&id, &data)?;
        let now = self.now_ms();
        if let Some(meta) = self.spaces.get_mut(&id) {
            meta.updated_at = now;
        }
        self.save_index()?;
        Ok(true)
    }

    /// Persist the live graph through interaction suppression: held while an
    /// interaction is in progress, flushed once after the last one ends.
    pub fn save_current_during_interaction(&mut self) -> Result<bool, SpaceError> {
        let Some(live) = self.live.as_mut() else {
            return Ok(false);
        };
        let id = live.space_id.clone();
        live.data.space_id = Some(id.clone());
        live.dirty = false;
        let data = live.data.clone();
        self.store.write_during_interaction(&id, &data)?;
        Ok(true)
    }

    pub fn begin_interaction(&mut self) -> u32 {
        self.store.begin_interaction()
    }

    pub fn end_interaction(&mut self) {
        self.store.end_interaction()
    }

    /// Run due timers. See [`SpaceStore::pump`].
    pub fn pump(&mut self) -> Result<usize, SpaceError> {
        self.store.pump()
    }

    /// Save the live graph if it has unsaved edits, then flush every pending write.
    pub fn flush_all(&mut self) -> Result<(), SpaceError> {
        if self.live.as_ref().is_some_and(|live| live.dirty) {
            self.save_current()?;
        }
        self.store.flush_all()
    }

    /// Latest graph of a Space: the live copy when it is open, storage otherwise.
    pub fn snapshot(&mut self, id: &str) -> Result<Option<SpaceData>, SpaceError> {
        if let Some(live) = self.live.as_ref().filter(|live| live.space_id == id) {
            return Ok(Some(live.data.clone()));
        }
        if !self.spaces.contains_key(id) {
            return Ok(None);
        }
        self.store.read_existing(id)
    }

    /// Flush the live graph if `id` is the open Space. Used before reading a Space
    /// for a copy so the copy reflects in-memory edits.
    pub fn flush_if_live(&mut self, id: &str) -> Result<(), SpaceError> {
        if self.live.as_ref().is_some_and(|live| live.space_id == id) {
            self.save_current()?;
            self.store.flush_space(id)?;
        }
        Ok(())
    }

    /// Delete clusters (and their subtrees) from a Space, recursing only from
    /// top-level picks. Returns the removed node ids.
    pub fn delete_clusters(&mut self, id: &str, cluster_ids: &[String]) -> Result<Vec<String>, SpaceError> {
        if self.live.as_ref().is_some_and(|live| live.space_id == id) {
            let mut removed = Vec::new();
            self.update_live(|data| removed = data.remove_clusters(cluster_ids));
            self.save_current()?;
            return Ok(removed);
        }
        let Some(mut data) = self.snapshot(id)? else {
            return Ok(Vec::new());
        };
        let removed = data.remove_clusters(cluster_ids);
        if !removed.is_empty() {
            self.store.write(id, &data)?;
        }
        Ok(removed)
    }

    pub fn ensure_onboarding_spaces(&mut self) -> Result<bool, SpaceError> {
        playground::ensure_onboarding_spaces(self)
    }

    // --- Internals ---

    fn load_index(&mut self) -> Result<(), SpaceError> {
        let entries: Vec<JsonValue> = self
            .store
            .read_record(schemas::SLOT_SPACES_INDEX)?
            .unwrap_or_default();
        self.spaces.clear();
        for entry in entries {
            match serde_json::from_value::<SpaceMeta>(entry) {
                Ok(meta) => {
                    self.spaces.insert(meta.id.clone(), meta);
                }
                Err(err) => warn!(error = %err, "skipping malformed space index entry"),
            }
        }

        let active: Option<String> = self.store.read_record(schemas::SLOT_ACTIVE_SPACE)?;
        self.active = active.filter(|id| self.spaces.get(id).is_some_and(|meta| !meta.trashed));
        Ok(())
    }

    fn save_index(&mut self) -> Result<(), SpaceError> {
        let list: Vec<&SpaceMeta> = self.spaces.values().collect();
        let payload = serde_json::to_value(&list)?;
        self.store.write_record(schemas::SLOT_SPACES_INDEX, &payload)
    }

    fn update_meta<F>(&mut self, id: &str, edit: F) -> Result<bool, SpaceError>
    where
        F: FnOnce(&mut SpaceMeta),
    {
        let now = self.now_ms();
        let Some(meta) = self.spaces.get_mut(id) else {
            return Ok(false);
        };
        edit(meta);
        meta.updated_at = now;
        self.save_index()?;
        Ok(true)
    }

    fn redirect_active_from(&mut self, id: &str) -> Result<(), SpaceError> {
        if self.live.as_ref().is_some_and(|live| live.space_id == id && live.dirty) {
            self.save_current()?;
        }
        self.store.flush_space(id)?;
        self.live = None;
        self.active = None;

        let next = self
            .list()
            .into_iter()
            .find(|meta| meta.id != id)
            .map(|meta| meta.id.clone());
        match next {
            Some(next_id) => {
                debug!(from = id, to = %next_id, "redirecting active space");
                self.load(&next_id)?;
            }
            None => self.store.remove_record(schemas::SLOT_ACTIVE_SPACE)?,
        }
        Ok(())
    }

    /// Case-insensitive disambiguation against live Spaces: `base`, `base 1`, `base 2`...
    fn unique_name(&self, base: &str, exclude_id: Option<&str>) -> String {
        let base = normalized_name(base);
        let taken: HashSet<String> = self
            .spaces
            .values()
            .filter(|meta| !meta.trashed && Some(meta.id.as_str()) != exclude_id)
            .map(|meta| meta.name.to_lowercase())
            .collect();

        let mut candidate = base.clone();
        let mut counter = 1;
        while taken.contains(&candidate.to_lowercase()) {
            candidate = format!("{} {}", base, counter);
            counter += 1;
        }
        candidate
    }

    fn emit(&self, event: SpaceEvent) {
        for sink in &self.sinks {
            if let Err(err) = sink.emit(&event) {
                warn!(event = event.name(), error = %err, "event sink failed");
            }
        }
    }
}

fn normalized_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_SPACE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn is_protected(id: &str) -> bool {
    id == PLAYGROUND_SPACE_ID
}

// --- CLI ---

#[derive(Parser, Debug)]
#[clap(name = "space", about = "Create, list and manage Spaces.")]
pub struct SpacesCli {
    #[clap(subcommand)]
    pub command: SpaceCommand,
}

#[derive(Subcommand, Debug)]
pub enum SpaceCommand {
    /// Create a new Space.
    Create {
        #[clap(long, default_value = DEFAULT_SPACE_NAME)]
        name: String,
        /// Parent Space id
        #[clap(long)]
        parent: Option<String>,
        /// Explicit id (idempotent create)
        #[clap(long)]
        id: Option<String>,
    },
    /// List Spaces, most recently accessed first.
    List {
        /// Include trashed Spaces
        #[clap(long)]
        trashed: bool,
        /// Hide the playground Space
        #[clap(long)]
        no_playground: bool,
    },
    /// Rename a Space.
    Rename {
        #[clap(long)]
        id: String,
        #[clap(long)]
        name: String,
    },
    /// Copy a Space into a new one.
    Fork {
        #[clap(long)]
        id: String,
        /// Name of the copy (defaults to the source name)
        #[clap(long)]
        name: Option<String>,
    },
    /// Mark or unmark a Space as favorite.
    Favorite {
        #[clap(long)]
        id: String,
        #[clap(long)]
        off: bool,
    },
    /// Move a Space to the trash, or delete it for good with --hard.
    Delete {
        #[clap(long)]
        id: String,
        #[clap(long)]
        hard: bool,
    },
    /// Restore a Space from the trash.
    Restore {
        #[clap(long)]
        id: String,
    },
    /// Hard-delete trashed Spaces past the retention window.
    Purge,
    /// Make a Space active and print its graph.
    Open {
        #[clap(long)]
        id: String,
    },
    /// Print a Space's stored graph.
    Show {
        #[clap(long)]
        id: String,
    },
    /// Print focus/ghost sets below a scope node.
    Visibility {
        #[clap(long)]
        id: String,
        #[clap(long)]
        scope: String,
        /// Interactive hierarchy levels (1-3)
        #[clap(long, default_value_t = 2)]
        lod: u8,
    },
    /// Delete clusters and their subtrees from a Space.
    DeleteCluster {
        #[clap(long)]
        id: String,
        #[clap(long = "cluster", required = true)]
        clusters: Vec<String>,
    },
}

/// Give tutorial nodes fresh ids so a copied playground graph is not mistaken for seed
/// contamination in a user Space. Edges and cluster references follow the new ids.
fn rekey_seed_nodes(data: &mut SpaceData) {
    let renames: HashMap<String, String> = data
        .nodes
        .iter()
        .filter(|node| !node.is_core() && node.id.starts_with(PLAYGROUND_SPACE_ID))
        .map(|node| (node.id.clone(), time::new_id()))
        .collect();
    if renames.is_empty() {
        return;
    }

    for node in data.nodes.iter_mut() {
        if let Some(new_id) = renames.get(&node.id) {
            node.id = new_id.clone();
        }
        if let Some(new_parent) = node.meta.parent_cluster_id.as_ref().and_then(|p| renames.get(p)) {
            node.meta.parent_cluster_id = Some(new_parent.clone());
        }
    }
    for edge in data.edges.iter_mut() {
        if let Some(new_source) = renames.get(&edge.source) {
            edge.source = new_source.clone();
        }
        if let Some(new_target) = renames.get(&edge.target) {
            edge.target = new_target.clone();
        }
    }
    debug!(renamed = renames.len(), "rekeyed tutorial nodes in fork");
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), SpaceError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn run_spaces_cli(
    registry: &mut SpaceRegistry,
    gate: &dyn EntitlementGate,
    cli: SpacesCli,
) -> Result<(), SpaceError> {
    match cli.command {
        SpaceCommand::Create { name, parent, id } => {
            let space_id = registry.create_space_gated(
                gate,
                &name,
                parent.as_deref(),
                CreateOptions {
                    id,
                    kind: SpaceKind::User,
                },
            )?;
            print_json(&registry.get_meta(&space_id))?;
        }
        SpaceCommand::List {
            trashed,
            no_playground,
        } => {
            print_json(&registry.list_with(trashed, !no_playground))?;
        }
        SpaceCommand::Rename { id, name } => {
            let final_name = registry
                .rename(&id, &name)?
                .ok_or_else(|| SpaceError::NotFound(format!("space '{}'", id)))?;
            print_json(&serde_json::json!({ "id": id, "name": final_name }))?;
        }
        SpaceCommand::Fork { id, name } => {
            let data = registry
                .snapshot(&id)?
                .ok_or_else(|| SpaceError::NotFound(format!("space '{}'", id)))?;
            let base = name
                .or_else(|| registry.get_meta(&id).map(|meta| meta.name.clone()))
                .unwrap_or_else(|| DEFAULT_SPACE_NAME.to_string());
            gate.ensure_can_create_space(registry.user_space_count())?;
            let fork_id = registry.fork(&data, &base)?;
            print_json(&registry.get_meta(&fork_id))?;
        }
        SpaceCommand::Favorite { id, off } => {
            let changed = registry.set_favorite(&id, !off)?;
            print_json(&serde_json::json!({ "id": id, "favorite": !off, "changed": changed }))?;
        }
        SpaceCommand::Delete { id, hard } => {
            let changed = if hard {
                registry.hard_delete(&id)?
            } else {
                registry.soft_delete(&id)?
            };
            print_json(&serde_json::json!({ "id": id, "hard": hard, "deleted": changed }))?;
        }
        SpaceCommand::Restore { id } => {
            let restored = registry.restore(&id)?;
            print_json(&serde_json::json!({ "id": id, "restored": restored }))?;
        }
        SpaceCommand::Purge => {
            let purged = registry.purge_expired_trash()?;
            print_json(&serde_json::json!({ "purged": purged }))?;
        }
        SpaceCommand::Open { id } => {
            let data = registry
                .load(&id)?
                .ok_or_else(|| SpaceError::NotFound(format!("space '{}' (missing or trashed)", id)))?;
            print_json(&data)?;
        }
        SpaceCommand::Show { id } => {
            let data = registry
                .snapshot(&id)?
                .ok_or_else(|| SpaceError::NotFound(format!("space '{}'", id)))?;
            print_json(&data)?;
        }
        SpaceCommand::Visibility { id, scope, lod } => {
            let lod = SubspaceLod::from_level(lod)
                .ok_or_else(|| SpaceError::Validation(format!("lod must be 1, 2 or 3 (got {})", lod)))?;
            let data = registry
                .snapshot(&id)?
                .ok_or_else(|| SpaceError::NotFound(format!("space '{}'", id)))?;
            let sets = compute_scope_visibility_sets(&scope, &data.nodes, &data.edges, lod);
            print_json(&serde_json::json!({
                "scope": scope,
                "focus": sets.focus_ids,
                "ghost": sets.ghost_ids,
            }))?;
        }
        SpaceCommand::DeleteCluster { id, clusters } => {
            let removed = registry.delete_clusters(&id, &clusters)?;
            print_json(&serde_json::json!({ "id": id, "removed": removed }))?;
        }
    }
    registry.flush_all()
}
