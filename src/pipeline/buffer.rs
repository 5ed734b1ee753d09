//! Double-buffered pipeline output with timestamped publishes.
//!
//! One `PipelineBuffer` exists per processing pipe (main and preview). The
//! UI thread reads through scoped guards; executor worker threads replace
//! the contents through [`PipelineBuffer::publish`]. The critical section
//! covers only the buffer swap, so UI-side blocking stays bounded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::trace;

/// Lock-free snapshot of a buffer's freshness, used for frame planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStatus {
    pub dirty: bool,
    /// Input version the current contents were rendered from.
    pub timestamp: u64,
}

#[derive(Debug, Default)]
struct BackBuffer {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    timestamp: u64,
}

/// A double-buffered, lockable RGBA8 surface owned by a processing pipeline.
#[derive(Debug)]
pub struct PipelineBuffer {
    label: &'static str,
    back: Mutex<BackBuffer>,
    dirty: AtomicBool,
    /// Input version of the most recent invalidation; a publish may only
    /// clear `dirty` if it is at least this fresh.
    invalidated_at: AtomicU64,
    /// Mirror of the locked timestamp so planning never takes the lock.
    timestamp: AtomicU64,
}

/// Scoped read access to a buffer's contents; released on drop.
pub struct ReadGuard<'a> {
    inner: MutexGuard<'a, BackBuffer>,
}

impl ReadGuard<'_> {
    pub fn pixels(&self) -> &[u8] {
        &self.inner.pixels
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.inner.width as usize * 4
    }

    pub fn timestamp(&self) -> u64 {
        self.inner.timestamp
    }

    /// True until the first publish lands.
    pub fn is_empty(&self) -> bool {
        self.inner.width == 0 || self.inner.height == 0
    }
}

impl PipelineBuffer {
    /// A new buffer starts empty and dirty: nothing has been processed for
    /// it yet, so the coordinator schedules the first render.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            back: Mutex::new(BackBuffer::default()),
            dirty: AtomicBool::new(true),
            invalidated_at: AtomicU64::new(0),
            timestamp: AtomicU64::new(0),
        }
    }

    /// Blocking scoped read. The writer side only holds the lock for the
    /// buffer swap, so this is acceptable on the UI thread.
    pub fn read(&self) -> ReadGuard<'_> {
        ReadGuard {
            inner: self.back.lock().expect("pipeline buffer poisoned"),
        }
    }

    /// Non-blocking read; `None` while a publish is in flight. The render
    /// path uses this and skips the frame on contention.
    pub fn try_read(&self) -> Option<ReadGuard<'_>> {
        match self.back.try_lock() {
            Ok(inner) => Some(ReadGuard { inner }),
            Err(std::sync::TryLockError::WouldBlock) => None,
            Err(std::sync::TryLockError::Poisoned(_)) => {
                panic!("pipeline buffer poisoned")
            }
        }
    }

    /// Flag the cached output as stale for input version `version`.
    /// Idempotent; newer versions supersede older ones.
    pub fn mark_dirty(&self, version: u64) {
        self.invalidated_at.fetch_max(version, Ordering::SeqCst);
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Atomically install a rendered result for input version `version`.
    ///
    /// A result older than the buffer's current contents is discarded — an
    /// expected outcome under rapid edits, not an error. Returns whether the
    /// contents were replaced. `dirty` clears only when no newer
    /// invalidation happened since `version`, so a mid-flight edit is never
    /// lost.
    pub fn publish(&self, pixels: Vec<u8>, width: u32, height: u32, version: u64) -> bool {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);
        let mut back = self.back.lock().expect("pipeline buffer poisoned");
        if version < back.timestamp {
            trace!(
                buffer = self.label,
                version,
                current = back.timestamp,
                "discarding stale pipeline result",
            );
            return false;
        }
        back.pixels = pixels;
        back.width = width;
        back.height = height;
        back.timestamp = version;
        self.timestamp.store(version, Ordering::SeqCst);
        if version >= self.invalidated_at.load(Ordering::SeqCst) {
            self.dirty.store(false, Ordering::SeqCst);
        }
        true
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp.load(Ordering::SeqCst)
    }

    /// Snapshot for frame planning; does not touch the pixel lock.
    pub fn status(&self) -> BufferStatus {
        BufferStatus {
            dirty: self.is_dirty(),
            timestamp: self.timestamp(),
        }
    }
}
