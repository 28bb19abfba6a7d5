use crate::core::error::SpaceError;
use crate::core::store::Store;
use crate::core::time;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

/// The DB Broker is the thin waist for local state access.
///
/// It owns the one connection to the slot database. Every mutation is routed through
/// [`DbBroker::with_conn`] and appended to the audit log, reads go through
/// [`DbBroker::read`] and are not audited.
pub struct DbBroker {
    conn: Connection,
    audit_log_path: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub slot: String,
    pub status: String,
}

impl DbBroker {
    pub fn open(store: &Store) -> Result<Self, SpaceError> {
        if store.is_ephemeral() {
            return Self::in_memory();
        }
        std::fs::create_dir_all(&store.root)?;
        let conn = crate::core::db::db_connect(&store.db_path())?;
        Ok(Self {
            conn,
            audit_log_path: Some(store.audit_log_path()),
        })
    }

    pub fn in_memory() -> Result<Self, SpaceError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            audit_log_path: None,
        })
    }

    /// Execute a mutating closure against the slot database and record the outcome.
    pub fn with_conn<F, R>(&self, actor: &str, op_name: &str, slot: &str, f: F) -> Result<R, SpaceError>
    where
        F: FnOnce(&Connection) -> Result<R, SpaceError>,
    {
        let result = f(&self.conn);
        let status = if result.is_ok() { "success" } else { "error" };
        // The mutation has already landed; a lost audit line must not undo it upstream.
        if let Err(err) = self.log_event(actor, op_name, slot, status) {
            warn!(op = op_name, slot, error = %err, "failed to append broker audit event");
        }
        result
    }

    /// Execute a read-only closure. Reads are not audited.
    pub fn read<F, R>(&self, f: F) -> Result<R, SpaceError>
    where
        F: FnOnce(&Connection) -> Result<R, SpaceError>,
    {
        f(&self.conn)
    }

    fn log_event(&self, actor: &str, op: &str, slot: &str, status: &str) -> Result<(), SpaceError> {
        let Some(path) = &self.audit_log_path else {
            return Ok(());
        };

        let ev = BrokerEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            actor: actor.to_string(),
            op: op.to_string(),
            slot: slot.to_string(),
            status: status.to_string(),
        };

        let mut f = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(f, "{}", serde_json::to_string(&ev)?)?;
        Ok(())
    }
}

/// Read the audit log of a persistent store. Malformed lines are skipped.
pub fn read_audit_log(store: &Store) -> Result<Vec<BrokerEvent>, SpaceError> {
    let path = store.audit_log_path();
    if store.is_ephemeral() || !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str::<BrokerEvent>(line).ok())
        .collect())
}
