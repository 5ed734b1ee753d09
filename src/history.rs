//! Append-only edit history with undo-to-point truncation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::module::ModuleFlags;

/// One applied operation: which module, with which parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub op: String,
    pub params: Value,
}

/// Ordered history of applied operations.
///
/// Entries past the end cursor are kept until the next edit overwrites
/// them, so undo-to-point followed by redo-to-point works without
/// re-recording.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
    end: usize,
}

impl History {
    pub fn from_entries(entries: Vec<HistoryEntry>) -> Self {
        let end = entries.len();
        Self { entries, end }
    }

    /// Record a new edit. Anything undone past the cursor is discarded
    /// first; history is append-only during editing.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.truncate(self.end);
        self.entries.push(entry);
        self.end = self.entries.len();
    }

    /// Move the end cursor to `point`, keeping later entries for redo.
    pub fn set_point(&mut self, point: usize) {
        self.end = point.min(self.entries.len());
    }

    /// The applied portion of the history, in application order.
    pub fn active(&self) -> &[HistoryEntry] {
        &self.entries[..self.end]
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }
}

/// Persistence seam for history and per-module flags; the backing format
/// and storage are owned by the host.
pub trait HistoryStore {
    /// Load the persisted history for an image, oldest first.
    ///
    /// # Errors
    /// Returns [`Error::History`] when the persisted data cannot be read.
    fn load_history(&self, image_id: &str) -> Result<Vec<HistoryEntry>, Error>;

    /// Persist the applied history for an image, replacing what was there.
    fn save_history(&mut self, image_id: &str, entries: &[HistoryEntry]);

    fn load_module_flags(&self, op: &str) -> Option<ModuleFlags>;

    fn save_module_flags(&mut self, op: &str, flags: ModuleFlags);
}

/// In-memory store, for the demo driver and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    histories: HashMap<String, Vec<HistoryEntry>>,
    flags: HashMap<String, ModuleFlags>,
}

impl HistoryStore for MemoryStore {
    fn load_history(&self, image_id: &str) -> Result<Vec<HistoryEntry>, Error> {
        Ok(self.histories.get(image_id).cloned().unwrap_or_default())
    }

    fn save_history(&mut self, image_id: &str, entries: &[HistoryEntry]) {
        self.histories.insert(image_id.to_owned(), entries.to_vec());
    }

    fn load_module_flags(&self, op: &str) -> Option<ModuleFlags> {
        self.flags.get(op).copied()
    }

    fn save_module_flags(&mut self, op: &str, flags: ModuleFlags) {
        self.flags.insert(op.to_owned(), flags);
    }
}
