//! Space lifecycle notifications.
//!
//! The registry emits these after each committed change. Sinks are optional and a
//! failing sink never rolls back the change that produced the event.

use crate::core::error::SpaceError;
use crate::core::model::SpaceKind;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum SpaceEvent {
    #[serde(rename = "space-created")]
    Created {
        space_id: String,
        name: String,
        kind: SpaceKind,
    },
    #[serde(rename = "space-renamed")]
    Renamed { space_id: String, name: String },
    #[serde(rename = "space-deleted")]
    Deleted {
        space_id: String,
        /// `None` for a hard delete.
        deleted_at: Option<u64>,
    },
    #[serde(rename = "space-restored")]
    Restored { space_id: String },
    #[serde(rename = "space-changed")]
    Changed { space_id: String },
}

impl SpaceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "space-created",
            Self::Renamed { .. } => "space-renamed",
            Self::Deleted { .. } => "space-deleted",
            Self::Restored { .. } => "space-restored",
            Self::Changed { .. } => "space-changed",
        }
    }

    pub fn space_id(&self) -> &str {
        match self {
            Self::Created { space_id, .. }
            | Self::Renamed { space_id, .. }
            | Self::Deleted { space_id, .. }
            | Self::Restored { space_id }
            | Self::Changed { space_id } => space_id,
        }
    }
}

pub trait EventSink {
    fn emit(&self, event: &SpaceEvent) -> Result<(), SpaceError>;
}

/// Keeps every event in memory. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SpaceEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SpaceEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(SpaceEvent::name).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &SpaceEvent) -> Result<(), SpaceError> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}

/// Appends one JSON line per event.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EventSink for JsonlSink {
    fn emit(&self, event: &SpaceEvent) -> Result<(), SpaceError> {
        let mut f = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(f, "{}", serde_json::to_string(event)?)?;
        Ok(())
    }
}
