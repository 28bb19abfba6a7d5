//! Store handle for Spacekeep's local state.
//!
//! A store is the directory that holds the slot database, the broker audit log and
//! the config file. Tests and embedded hosts can use an ephemeral store instead, which
//! keeps the slot database in memory and writes nothing to disk.

use crate::core::error::SpaceError;
use crate::core::schemas;
use std::path::{Path, PathBuf};

/// Store type discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    /// On-disk store at `<project>/.spacekeep/`
    Persistent,
    /// In-memory slot database, no audit log
    Ephemeral,
}

/// Store handle representing one Spacekeep state directory.
#[derive(Debug, Clone)]
pub struct Store {
    /// Store type (Persistent or Ephemeral)
    pub kind: StoreKind,
    /// Absolute path to the store root directory (unused for ephemeral stores)
    pub root: PathBuf,
}

impl Store {
    pub fn persistent(root: impl Into<PathBuf>) -> Self {
        Self {
            kind: StoreKind::Persistent,
            root: root.into(),
        }
    }

    pub fn ephemeral() -> Self {
        Self {
            kind: StoreKind::Ephemeral,
            root: PathBuf::new(),
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.kind == StoreKind::Ephemeral
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(schemas::SLOTS_DB_NAME)
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.root.join(schemas::AUDIT_LOG_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(schemas::CONFIG_FILE_NAME)
    }
}

/// Walk up from `start_dir` until a directory containing `.spacekeep` is found.
pub fn find_project_root(start_dir: &Path) -> Result<PathBuf, SpaceError> {
    let mut current_dir = PathBuf::from(start_dir);
    loop {
        if current_dir.join(schemas::STORE_DIR_NAME).exists() {
            return Ok(current_dir);
        }
        if !current_dir.pop() {
            return Err(SpaceError::NotFound(
                "'.spacekeep' directory not found in current or parent directories. Run `spacekeep init` first.".to_string(),
            ));
        }
    }
}
