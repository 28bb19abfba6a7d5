//! Versioned migrations for the local slot store.
//!
//! The store records the schema version it was last migrated to in
//! `sf_schema_version`. On open, every migration whose target version is newer than
//! the recorded one runs in order, then the marker is bumped. Migrations must be
//! idempotent: a crash between a migration and the marker write reruns it.

use crate::core::db::LocalSlots;
use crate::core::error::SpaceError;
use crate::core::model::{SpaceKind, core_id_for};
use crate::core::schemas;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use tracing::{debug, info};

/// Version of the local slot layout written by this build.
pub const SCHEMA_VERSION: &str = "0.3.0";

pub struct Migration {
    /// Version this migration targets (e.g., "0.2.0")
    pub target_version: &'static str,
    pub description: &'static str,
    pub up: fn(&LocalSlots, u64) -> Result<(), SpaceError>,
}

/// All migrations in chronological order.
pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            target_version: "0.2.0",
            description: "Rewrite legacy 'sandbox' space kind to 'playground'",
            up: migrate_sandbox_kind,
        },
        Migration {
            target_version: "0.3.0",
            description: "Stamp deterministic coreNodeId on index entries",
            up: migrate_stamp_core_node_id,
        },
    ]
}

pub fn stored_version(slots: &LocalSlots) -> Result<Option<String>, SpaceError> {
    Ok(slots
        .get(schemas::SLOT_SCHEMA_VERSION)?
        .and_then(|raw| serde_json::from_str::<String>(&raw).ok().or(Some(raw)))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

/// Run pending migrations. Returns the number applied.
pub fn check_and_migrate(slots: &LocalSlots, now_ms: u64) -> Result<usize, SpaceError> {
    let stored = stored_version(slots)?;
    if stored.as_deref() == Some(SCHEMA_VERSION) {
        return Ok(0);
    }
    let from = stored.unwrap_or_default();

    let mut applied = 0;
    for migration in all_migrations() {
        if should_run_migration(&from, migration.target_version) {
            info!(
                target_version = migration.target_version,
                "migration: {}", migration.description
            );
            (migration.up)(slots, now_ms)?;
            applied += 1;
        }
    }

    write_version(slots, now_ms)?;
    if applied > 0 {
        info!(applied, from = %from, to = SCHEMA_VERSION, "local store migrated");
    }
    Ok(applied)
}

/// An unversioned store predates the marker, so every migration applies to it.
fn should_run_migration(from: &str, target: &str) -> bool {
    from.is_empty() || compare_versions(from, target) == Ordering::Less
}

pub fn write_version(slots: &LocalSlots, now_ms: u64) -> Result<(), SpaceError> {
    let body = serde_json::to_string(SCHEMA_VERSION)?;
    slots.set(schemas::SLOT_SCHEMA_VERSION, &body, now_ms)
}

/// Numeric dotted-version comparison; non-numeric parts compare as zero.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> { v.split('.').map(|p| p.trim().parse().unwrap_or(0)).collect() };
    let (left, right) = (parse(a), parse(b));
    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Index entries are edited as raw JSON so fields written by newer clients survive.
fn rewrite_index<F>(slots: &LocalSlots, now_ms: u64, mut edit: F) -> Result<(), SpaceError>
where
    F: FnMut(&mut serde_json::Map<String, JsonValue>) -> bool,
{
    let Some(raw) = slots.get(schemas::SLOT_SPACES_INDEX)? else {
        return Ok(());
    };
    let Ok(JsonValue::Array(mut entries)) = serde_json::from_str::<JsonValue>(&raw) else {
        debug!("spaces index unparsable; leaving it for load-time recovery");
        return Ok(());
    };

    let mut changed = false;
    for entry in entries.iter_mut() {
        if let JsonValue::Object(map) = entry {
            changed |= edit(map);
        }
    }
    if changed {
        let body = serde_json::to_string(&entries)?;
        slots.set(schemas::SLOT_SPACES_INDEX, &body, now_ms)?;
    }
    Ok(())
}

fn migrate_sandbox_kind(slots: &LocalSlots, now_ms: u64) -> Result<(), SpaceError> {
    let playground = serde_json::to_value(SpaceKind::Playground)?;
    rewrite_index(slots, now_ms, |entry| {
        if entry.get("kind").and_then(JsonValue::as_str) == Some("sandbox") {
            entry.insert("kind".to_string(), playground.clone());
            true
        } else {
            false
        }
    })
}

fn migrate_stamp_core_node_id(slots: &LocalSlots, now_ms: u64) -> Result<(), SpaceError> {
    rewrite_index(slots, now_ms, |entry| {
        let has_core = entry
            .get("coreNodeId")
            .and_then(JsonValue::as_str)
            .is_some_and(|id| !id.is_empty());
        if has_core {
            return false;
        }
        let Some(id) = entry.get("id").and_then(JsonValue::as_str).map(str::to_string) else {
            return false;
        };
        entry.insert("coreNodeId".to_string(), JsonValue::String(core_id_for(&id)));
        true
    })
}
