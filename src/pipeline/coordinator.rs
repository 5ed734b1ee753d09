//! Per-frame decision between the main and preview pipelines.
//!
//! The main pipe is authoritative but slow; the preview pipe is cheap and
//! substitutes while edits are in flight. Timestamps — not dirty flags
//! alone — break the race where an edit lands on the preview pipe before
//! the main pipe catches up.

use crate::pipeline::buffer::BufferStatus;

/// Which buffer the compositor should read this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    Main,
    Preview,
}

/// Outcome of one render request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePlan {
    /// Trigger full-resolution reprocessing.
    pub process_full: bool,
    /// Trigger low-resolution reprocessing.
    pub process_preview: bool,
    /// Buffer to display; `None` retains the previous composited frame.
    /// That is a normal transient state, not a fault.
    pub display: Option<FrameSource>,
}

/// Evaluate the transition rule for one render request.
pub fn plan_frame(main: BufferStatus, preview: BufferStatus) -> FramePlan {
    let process_full = main.dirty || main.timestamp < preview.timestamp;
    let process_preview = preview.dirty;

    let display = if !main.dirty && main.timestamp >= preview.timestamp {
        Some(FrameSource::Main)
    } else if !preview.dirty {
        Some(FrameSource::Preview)
    } else {
        None
    };

    FramePlan {
        process_full,
        process_preview,
        display,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(dirty: bool, timestamp: u64) -> BufferStatus {
        BufferStatus { dirty, timestamp }
    }

    #[test]
    fn preview_wins_while_main_lags() {
        // main ts 5, preview ts 7, main clean: preview is fresher
        let plan = plan_frame(status(false, 5), status(false, 7));
        assert_eq!(plan.display, Some(FrameSource::Preview));
        assert!(plan.process_full, "main must catch up");
        assert!(!plan.process_preview);
    }

    #[test]
    fn main_wins_when_fresh() {
        let plan = plan_frame(status(false, 7), status(false, 5));
        assert_eq!(plan.display, Some(FrameSource::Main));
        assert!(!plan.process_full);
    }

    #[test]
    fn equal_timestamps_prefer_main() {
        let plan = plan_frame(status(false, 4), status(false, 4));
        assert_eq!(plan.display, Some(FrameSource::Main));
    }

    #[test]
    fn dirty_main_falls_back_to_preview() {
        let plan = plan_frame(status(true, 7), status(false, 7));
        assert_eq!(plan.display, Some(FrameSource::Preview));
        assert!(plan.process_full);
    }

    #[test]
    fn nothing_ready_retains_last_frame() {
        let plan = plan_frame(status(true, 0), status(true, 0));
        assert_eq!(plan.display, None);
        assert!(plan.process_full);
        assert!(plan.process_preview);
    }
}
