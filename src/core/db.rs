use crate::core::broker::DbBroker;
use crate::core::error::SpaceError;
use crate::core::schemas;
use crate::core::store::Store;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

pub fn db_connect(db_path: &Path) -> Result<Connection, SpaceError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    Ok(conn)
}

const ACTOR: &str = "spacekeep";

/// Synchronous key/value slot store. This is the local source of truth.
///
/// Each `set` persists one complete payload, so a reader never observes a partially
/// written slot.
pub struct LocalSlots {
    broker: DbBroker,
}

impl LocalSlots {
    pub fn open(store: &Store) -> Result<Self, SpaceError> {
        let slots = Self {
            broker: DbBroker::open(store)?,
        };
        slots.initialize()?;
        Ok(slots)
    }

    pub fn in_memory() -> Result<Self, SpaceError> {
        let slots = Self {
            broker: DbBroker::in_memory()?,
        };
        slots.initialize()?;
        Ok(slots)
    }

    fn initialize(&self) -> Result<(), SpaceError> {
        self.broker.with_conn(ACTOR, "slots.init", "*", |conn| {
            conn.execute(schemas::SLOTS_DB_SCHEMA, [])?;
            Ok(())
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, SpaceError> {
        self.broker.read(|conn| {
            let payload = conn
                .query_row(
                    "SELECT payload FROM slots WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(payload)
        })
    }

    pub fn set(&self, key: &str, payload: &str, now_ms: u64) -> Result<(), SpaceError> {
        self.broker.with_conn(ACTOR, "slots.set", key, |conn| {
            conn.execute(
                "INSERT INTO slots(key, payload, updated_at) VALUES(?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
                params![key, payload, now_ms as i64],
            )?;
            Ok(())
        })
    }

    pub fn remove(&self, key: &str) -> Result<bool, SpaceError> {
        self.broker.with_conn(ACTOR, "slots.remove", key, |conn| {
            let changed = conn.execute("DELETE FROM slots WHERE key = ?1", params![key])?;
            Ok(changed > 0)
        })
    }

    /// True when the store holds no slot at all (fresh install).
    pub fn is_empty(&self) -> Result<bool, SpaceError> {
        self.broker.read(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM slots", [], |row| row.get(0))?;
            Ok(count == 0)
        })
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, SpaceError> {
        self.broker.read(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM slots WHERE substr(key, 1, ?2) = ?1 ORDER BY key")?;
            let rows = stmt.query_map(params![prefix, prefix.chars().count() as i64], |row| {
                row.get::<_, String>(0)
            })?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r?);
            }
            Ok(out)
        })
    }
}
