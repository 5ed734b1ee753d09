//! Develop-session state: pipeline buffers, zoom, modules, history.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::history::{History, HistoryEntry};
use crate::module::EditModule;
use crate::pipeline::buffer::PipelineBuffer;
use crate::zoom::ZoomState;

/// The image a session develops; selection itself is the host's business.
#[derive(Debug, Clone)]
pub struct ImageRef {
    /// Stable identifier keying persisted history.
    pub id: String,
    pub path: PathBuf,
}

impl ImageRef {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

/// Everything the darkroom owns while one image is being developed.
///
/// Buffers are shared with the executor's worker threads through `Arc`;
/// all other fields belong to the UI thread exclusively.
pub struct Session {
    pub image: ImageRef,
    pub zoom: ZoomState,
    pub main: Arc<PipelineBuffer>,
    pub preview: Arc<PipelineBuffer>,
    pub modules: Vec<Box<dyn EditModule>>,
    pub history: History,
    /// Index of the module receiving input, if any. A plain index keeps
    /// this a non-owning association.
    active: Option<usize>,
    /// Monotonic input version; every edit or invalidation bumps it.
    version: u64,
}

impl Session {
    pub fn new(image: ImageRef, modules: Vec<Box<dyn EditModule>>) -> Self {
        Self {
            image,
            zoom: ZoomState::fit(),
            main: Arc::new(PipelineBuffer::new("main")),
            preview: Arc::new(PipelineBuffer::new("preview")),
            modules,
            history: History::default(),
            active: None,
            version: 0,
        }
    }

    /// Current input version.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// A view change invalidated the full-resolution output only.
    pub fn invalidate(&mut self) {
        let v = self.bump_version();
        self.main.mark_dirty(v);
    }

    /// An edit invalidated both pipes.
    pub fn invalidate_all(&mut self) {
        let v = self.bump_version();
        self.main.mark_dirty(v);
        self.preview.mark_dirty(v);
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    /// Make a module the input target, or clear the association.
    pub fn set_active(&mut self, index: Option<usize>) {
        if let Some(i) = index {
            assert!(i < self.modules.len(), "active module index out of range");
        }
        self.active = index;
    }

    pub fn active_module(&mut self) -> Option<&mut Box<dyn EditModule>> {
        let idx = self.active?;
        self.modules.get_mut(idx)
    }

    /// Record the active parameters of `module_index` as a new history
    /// entry and invalidate both pipes.
    pub fn commit_edit(&mut self, module_index: usize) {
        let module = &self.modules[module_index];
        let entry = HistoryEntry {
            op: module.op().to_owned(),
            params: module.params(),
        };
        debug!(op = %entry.op, "recording history entry");
        self.history.push(entry);
        self.invalidate_all();
    }

    /// Re-apply the active history onto the module list, oldest first.
    /// Replay order is deterministic: history order.
    pub fn replay_history(&mut self) {
        for i in 0..self.history.active().len() {
            let (op, params) = {
                let e = &self.history.active()[i];
                (e.op.clone(), e.params.clone())
            };
            if let Some(module) = self.modules.iter_mut().find(|m| m.op() == op) {
                module.apply_params(&params);
            } else {
                debug!(op = %op, "history entry for an unmounted module, skipping");
            }
        }
    }

    /// Undo (or redo) to a history point and re-apply.
    pub fn undo_to_point(&mut self, point: usize) {
        self.history.set_point(point);
        self.replay_history();
        self.invalidate_all();
    }
}
