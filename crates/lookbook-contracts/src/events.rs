use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::generation::Framing;

/// One step of a batch run. The variant name becomes the line's `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        reference: String,
        items: usize,
        framing: Framing,
    },
    ItemStarted {
        body_type: String,
        skin_color: String,
    },
    ArtifactCreated {
        body_type: String,
        skin_color: String,
        image_path: String,
        bytes: usize,
    },
    ItemFailed {
        body_type: String,
        skin_color: String,
        error: String,
    },
    RunFinished {
        succeeded: usize,
        failed: usize,
    },
}

/// A line of `events.jsonl` as written and read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub run_id: String,
    pub ts: String,
    #[serde(flatten)]
    pub event: RunEvent,
}

/// Append-only writer for a batch run's `events.jsonl`. Clones share one
/// file lock, so lines never interleave.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    path: PathBuf,
    run_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                run_id: run_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn run_id(&self) -> &str {
        &self.shared.run_id
    }

    /// Stamps `event` with the run id and current time and appends it.
    pub fn emit(&self, event: RunEvent) -> anyhow::Result<EventRecord> {
        let record = EventRecord {
            run_id: self.shared.run_id.clone(),
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            event,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        if let Some(parent) = self.shared.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let _guard = self
            .shared
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.shared.path)?
            .write_all(line.as_bytes())?;
        Ok(record)
    }
}
