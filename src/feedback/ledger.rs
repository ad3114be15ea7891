//! Append-only feedback ledger
//!
//! One JSON document per line. Appends go through a mutex so concurrent
//! submissions never interleave partial lines.

use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

use super::FeedbackEvent;
use crate::error::{MlError, Result};

#[derive(Debug)]
pub struct FeedbackLedger {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl FeedbackLedger {
    /// Open the ledger at `path`, creating its parent directory
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| MlError::storage(parent, e))?;
        }
        debug!("Feedback ledger at {}", path.display());
        Ok(Self {
            path,
            append_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event, stamping it with the local time if it has none.
    /// Returns the stored event.
    pub fn append(&self, event: &FeedbackEvent) -> Result<FeedbackEvent> {
        let mut stored = event.clone();
        if stored.timestamp.is_none() {
            stored.timestamp = Some(Local::now().naive_local());
        }

        let mut line = serde_json::to_string(&stored)?;
        line.push('\n');

        let _guard = self.append_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MlError::storage(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| MlError::storage(&self.path, e))?;

        info!(
            "Feedback recorded: {} (ml recommendation: {}, score {})",
            stored.feedback_type, stored.fue_recomendacion_ml, stored.feedback_score
        );
        Ok(stored)
    }

    /// Every well-formed event in file order. Malformed lines are skipped.
    pub fn read_all(&self) -> Result<Vec<FeedbackEvent>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MlError::storage(&self.path, e)),
        };

        let mut events = Vec::new();
        for (number, line) in BufReader::new(file).split(b'\n').enumerate() {
            let line = line.map_err(|e| MlError::storage(&self.path, e))?;
            if is_blank(&line) {
                continue;
            }
            match serde_json::from_slice::<FeedbackEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(
                    "Skipping malformed feedback line {} in {}: {}",
                    number + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(events)
    }

    /// Number of lines in the ledger, well-formed or not
    pub fn count(&self) -> Result<usize> {
        match fs::read(&self.path) {
            Ok(content) => Ok(content.split(|&b| b == b'\n').filter(|l| !is_blank(l)).count()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(MlError::storage(&self.path, e)),
        }
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}
