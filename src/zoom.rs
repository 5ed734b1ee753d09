//! Pure viewport math for the darkroom view.
//!
//! All functions operate in working-area coordinates: the window is clamped
//! to a maximum working size and centered first (see [`working_area`]), so
//! oversized windows contribute padding only. Pan is center-relative and
//! normalized: `(0, 0)` means the image center sits at the viewport center,
//! and the clamp keeps the visible box inside `[0, 1]²` of the image.

use tracing::warn;

/// Logical zoom mode of the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomMode {
    /// Whole image visible, letterboxed.
    Fit,
    /// Shorter image side fills the viewport.
    Fill,
    /// One image pixel per display pixel (two when closeup).
    OneToOne,
    /// Free scale set by scroll zoom.
    Free,
}

/// Zoom/pan state owned by the session and mutated only on the UI thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomState {
    pub mode: ZoomMode,
    /// Stored scale, meaningful in [`ZoomMode::Free`].
    pub scale: f32,
    /// Center-relative normalized pan.
    pub pan_x: f32,
    pub pan_y: f32,
    /// Pixel-peeping loupe: doubles the effective 1:1 magnification.
    pub closeup: bool,
}

impl ZoomState {
    /// The state every session starts from: Fit, centered.
    pub fn fit() -> Self {
        Self {
            mode: ZoomMode::Fit,
            scale: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
            closeup: false,
        }
    }

    /// Extra magnification applied on top of 1:1 while pixel-peeping.
    pub fn closeup_factor(&self) -> f32 {
        if self.closeup { 2.0 } else { 1.0 }
    }
}

impl Default for ZoomState {
    fn default() -> Self {
        Self::fit()
    }
}

/// Working-area and processed-image dimensions a transform is computed for.
#[derive(Debug, Clone, Copy)]
pub struct ViewGeometry {
    pub view_w: f32,
    pub view_h: f32,
    pub image_w: f32,
    pub image_h: f32,
}

impl ViewGeometry {
    pub fn new(view: (u32, u32), image: (u32, u32)) -> Self {
        Self {
            view_w: view.0.max(1) as f32,
            view_h: view.1.max(1) as f32,
            image_w: image.0 as f32,
            image_h: image.1 as f32,
        }
    }

    fn degenerate(&self) -> bool {
        self.image_w < 1.0 || self.image_h < 1.0
    }

    /// Scale at which the whole image fits the working area.
    ///
    /// Zero or unknown image dimensions fall back to 1.0 so downstream math
    /// stays finite; the condition is logged, not surfaced.
    pub fn fit_scale(&self) -> f32 {
        if self.degenerate() {
            warn!(
                image_w = self.image_w,
                image_h = self.image_h,
                "degenerate image dimensions, falling back to unit scale",
            );
            return 1.0;
        }
        (self.view_w / self.image_w).min(self.view_h / self.image_h)
    }

    fn fill_scale(&self) -> f32 {
        if self.degenerate() {
            return 1.0;
        }
        (self.view_w / self.image_w).max(self.view_h / self.image_h)
    }
}

/// Effective display scale for a zoom mode.
///
/// Never returns zero or a negative value: degenerate image dimensions fall
/// back to the Fit behavior of [`ViewGeometry::fit_scale`].
pub fn zoom_scale(geom: &ViewGeometry, mode: ZoomMode, closeup_factor: f32, stored_scale: f32) -> f32 {
    let scale = match mode {
        ZoomMode::Fit => geom.fit_scale(),
        ZoomMode::Fill => geom.fill_scale(),
        ZoomMode::OneToOne => closeup_factor,
        ZoomMode::Free => stored_scale,
    };
    if scale > 0.0 { scale } else { geom.fit_scale() }
}

/// Effective display scale for the given state, closeup included.
pub fn effective_scale(geom: &ViewGeometry, zoom: &ZoomState) -> f32 {
    zoom_scale(geom, zoom.mode, zoom.closeup_factor(), zoom.scale)
}

/// Clamped pan and the visible fraction of the image at the current scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanBounds {
    pub pan_x: f32,
    pub pan_y: f32,
    /// Fraction of the image width visible in the working area, capped at 1.
    pub box_w: f32,
    pub box_h: f32,
}

/// Clamp pan so the visible box stays within the image.
///
/// When an axis of the visible box covers the whole image (scale at or below
/// fit on that axis) pan is forced to zero there.
pub fn clamp_pan(geom: &ViewGeometry, zoom: &ZoomState) -> PanBounds {
    clamp_pan_at(geom, zoom, zoom.closeup_factor())
}

/// [`clamp_pan`] at an explicit closeup factor, independent of the state's
/// own flag. The compositor uses this to compare loupe and base bounds.
pub fn clamp_pan_at(geom: &ViewGeometry, zoom: &ZoomState, closeup_factor: f32) -> PanBounds {
    let scale = zoom_scale(geom, zoom.mode, closeup_factor, zoom.scale);
    let image_w = geom.image_w.max(1.0);
    let image_h = geom.image_h.max(1.0);
    let box_w = (geom.view_w / (image_w * scale)).min(1.0);
    let box_h = (geom.view_h / (image_h * scale)).min(1.0);

    let clamp_axis = |pan: f32, frac: f32| -> f32 {
        if frac >= 1.0 {
            0.0
        } else {
            pan.clamp(frac * 0.5 - 0.5, 0.5 - frac * 0.5)
        }
    };

    PanBounds {
        pan_x: clamp_axis(zoom.pan_x, box_w),
        pan_y: clamp_axis(zoom.pan_y, box_h),
        box_w,
        box_h,
    }
}

/// Inverse-map a working-area pixel to normalized image coordinates.
///
/// Returns coordinates in image space where `(0, 0)` is the top-left and
/// `(1, 1)` the bottom-right corner; values outside that range mean the
/// pointer sits over padding. Used identically for color-picker box
/// placement and for pan-drag anchoring.
pub fn pointer_to_normalized(px: f32, py: f32, geom: &ViewGeometry, zoom: &ZoomState) -> (f32, f32) {
    let scale = effective_scale(geom, zoom);
    let nx = 0.5 + zoom.pan_x + (px - 0.5 * geom.view_w) / (scale * geom.image_w.max(1.0));
    let ny = 0.5 + zoom.pan_y + (py - 0.5 * geom.view_h) / (scale * geom.image_h.max(1.0));
    (nx, ny)
}

/// The centered region of the window the view actually works in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkingArea {
    pub width: u32,
    pub height: u32,
    /// Padding between the raw window origin and the working-area origin.
    pub off_x: f32,
    pub off_y: f32,
}

impl WorkingArea {
    /// Translate raw window coordinates into working-area coordinates.
    pub fn to_local(&self, x: f64, y: f64) -> (f32, f32) {
        (x as f32 - self.off_x, y as f32 - self.off_y)
    }
}

/// Clamp a window to the maximum working size and center the working area.
pub fn working_area(raw_w: u32, raw_h: u32, max_size: u32) -> WorkingArea {
    let width = raw_w.min(max_size).max(1);
    let height = raw_h.min(max_size).max(1);
    WorkingArea {
        width,
        height,
        off_x: raw_w.saturating_sub(width) as f32 * 0.5,
        off_y: raw_h.saturating_sub(height) as f32 * 0.5,
    }
}
