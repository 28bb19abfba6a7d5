//! Centralized storage layout for Spacekeep.
//!
//! All local state lives in one SQLite database of named slots. Slot names match the
//! legacy browser store byte-for-byte so an exported key/value dump can be imported
//! without translation.

pub const STORE_DIR_NAME: &str = ".spacekeep";
pub const SLOTS_DB_NAME: &str = "spaces.db";
pub const AUDIT_LOG_NAME: &str = "broker.events.jsonl";
pub const CONFIG_FILE_NAME: &str = "spacekeep.toml";

pub const SLOTS_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS slots (
        key TEXT PRIMARY KEY,
        payload TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
";

// --- Local slot names ---
pub const SLOT_SPACES_INDEX: &str = "sf_spaces_index";
pub const SLOT_ACTIVE_SPACE: &str = "sf_active_space";
pub const SLOT_SPACE_PREFIX: &str = "sf_space_";
pub const SLOT_SHARE_LINKS: &str = "sf_share_links.v0.5";
pub const SLOT_ENTITLEMENTS: &str = "sf_entitlements.v0.5";
pub const SLOT_SCHEMA_VERSION: &str = "sf_schema_version";

pub fn space_slot(space_id: &str) -> String {
    format!("{}{}", SLOT_SPACE_PREFIX, space_id)
}

// --- Remote logical keys ---
pub const REMOTE_SPACES_INDEX: &str = "spaces-index";
pub const REMOTE_ACTIVE_SPACE: &str = "active-space";
pub const REMOTE_SPACE_DATA_PREFIX: &str = "space-data:";
pub const REMOTE_SHARE_LINKS: &str = "share-links";

pub fn space_remote_key(space_id: &str) -> String {
    format!("{}{}", REMOTE_SPACE_DATA_PREFIX, space_id)
}

/// Maps a local slot to the remote key that mirrors it, if the slot is mirrored at all.
pub fn remote_key_for_slot(slot: &str) -> Option<String> {
    match slot {
        SLOT_SPACES_INDEX => Some(REMOTE_SPACES_INDEX.to_string()),
        SLOT_ACTIVE_SPACE => Some(REMOTE_ACTIVE_SPACE.to_string()),
        SLOT_SHARE_LINKS => Some(REMOTE_SHARE_LINKS.to_string()),
        _ => slot.strip_prefix(SLOT_SPACE_PREFIX).map(space_remote_key),
    }
}
