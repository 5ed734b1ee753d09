//! Software compositing of a pipeline buffer into a display surface.
//!
//! The selected buffer is copied into a viewport-sized RGBA8 surface with
//! nearest-neighbor sampling. Main-pipe output arrives pre-scaled for the
//! working area and is centered; preview-pipe output is a low-resolution
//! rendition of the whole image and goes through the zoom/pan transform.

use crate::pipeline::buffer::ReadGuard;
use crate::zoom::{self, ViewGeometry, WorkingArea, ZoomState};

/// A composited frame, RGBA8, sized to the raw viewport.
#[derive(Debug, Clone)]
pub struct FrameSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl FrameSurface {
    pub fn new(width: u32, height: u32) -> Self {
        assert!(width > 0 && height > 0, "frame surface dimensions must be positive");
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn fill(&mut self, rgb: [u8; 3]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px[0] = rgb[0];
            px[1] = rgb[1];
            px[2] = rgb[2];
            px[3] = 0xff;
        }
    }

    pub fn put(&mut self, x: i64, y: i64, rgba: [u8; 4]) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels[idx..idx + 4].copy_from_slice(&rgba);
    }

    pub fn get(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }

    /// One-pixel rectangle outline, clipped to the surface.
    pub fn stroke_rect(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, rgb: [u8; 3]) {
        let (x0, x1) = (x0.min(x1) as i64, x0.max(x1) as i64);
        let (y0, y1) = (y0.min(y1) as i64, y0.max(y1) as i64);
        let rgba = [rgb[0], rgb[1], rgb[2], 0xff];
        for x in x0..=x1 {
            self.put(x, y0, rgba);
            self.put(x, y1, rgba);
        }
        for y in y0..=y1 {
            self.put(x0, y, rgba);
            self.put(x1, y, rgba);
        }
    }
}

fn sample(buf: &ReadGuard<'_>, bx: f32, by: f32) -> Option<[u8; 4]> {
    if bx < 0.0 || by < 0.0 {
        return None;
    }
    let (x, y) = (bx as u32, by as u32);
    if x >= buf.width() || y >= buf.height() {
        return None;
    }
    let idx = y as usize * buf.stride() + x as usize * 4;
    let px = buf.pixels();
    Some([px[idx], px[idx + 1], px[idx + 2], px[idx + 3]])
}

/// Composite the main buffer: centered in the working area, with the
/// closeup loupe magnification applied about the clamped pan target.
///
/// The loupe sub-offset is the delta between where the buffer is centered
/// (pan clamped without closeup) and where the loupe should center (pan
/// clamped with closeup), expressed in buffer pixels.
pub fn composite_main(
    frame: &mut FrameSurface,
    buf: &ReadGuard<'_>,
    area: &WorkingArea,
    geom: &ViewGeometry,
    zoom: &ZoomState,
) {
    let (wd, ht) = (buf.width() as f32, buf.height() as f32);
    let (ww, wh) = (area.width as f32, area.height as f32);
    let mag = zoom.closeup_factor();

    let (loupe_dx, loupe_dy) = if zoom.closeup {
        let base = zoom::clamp_pan_at(geom, zoom, 1.0);
        let loupe = zoom::clamp_pan_at(geom, zoom, mag);
        let base_scale = zoom::zoom_scale(geom, zoom.mode, 1.0, zoom.scale);
        (
            (loupe.pan_x - base.pan_x) * geom.image_w * base_scale,
            (loupe.pan_y - base.pan_y) * geom.image_h * base_scale,
        )
    } else {
        (0.0, 0.0)
    };

    for oy in 0..area.height {
        for ox in 0..area.width {
            let bx = (ox as f32 + 0.5 - 0.5 * ww) / mag + 0.5 * wd + loupe_dx;
            let by = (oy as f32 + 0.5 - 0.5 * wh) / mag + 0.5 * ht + loupe_dy;
            if let Some(rgba) = sample(buf, bx, by) {
                frame.put(
                    i64::from(ox) + area.off_x as i64,
                    i64::from(oy) + area.off_y as i64,
                    rgba,
                );
            }
        }
    }

    // thin border around the image extents, as a visual edge against the
    // background gray
    let fx = |bx: f32| area.off_x + 0.5 * ww + mag * (bx - 0.5 * wd - loupe_dx);
    let fy = |by: f32| area.off_y + 0.5 * wh + mag * (by - 0.5 * ht - loupe_dy);
    frame.stroke_rect(fx(0.0), fy(0.0), fx(wd), fy(ht), [77, 77, 77]);
}

/// Composite the preview buffer under the current zoom/pan transform.
pub fn composite_preview(
    frame: &mut FrameSurface,
    buf: &ReadGuard<'_>,
    area: &WorkingArea,
    geom: &ViewGeometry,
    zoom: &ZoomState,
) {
    let (pw, ph) = (buf.width() as f32, buf.height() as f32);
    if pw < 1.0 || ph < 1.0 {
        return;
    }
    let (ww, wh) = (area.width as f32, area.height as f32);
    // display pixels per preview pixel: the preview is a downscaled
    // rendition of the full processed image
    let scale = zoom::effective_scale(geom, zoom) * (geom.image_w.max(1.0) / pw);

    for oy in 0..area.height {
        for ox in 0..area.width {
            let bx = (ox as f32 + 0.5 - 0.5 * ww) / scale + pw * (0.5 + zoom.pan_x);
            let by = (oy as f32 + 0.5 - 0.5 * wh) / scale + ph * (0.5 + zoom.pan_y);
            if let Some(rgba) = sample(buf, bx, by) {
                frame.put(
                    i64::from(ox) + area.off_x as i64,
                    i64::from(oy) + area.off_y as i64,
                    rgba,
                );
            }
        }
    }
}

/// Forward-map a normalized image coordinate to frame coordinates under the
/// current transform. Used to draw the color-picker box overlay.
pub fn image_norm_to_frame(
    nx: f32,
    ny: f32,
    area: &WorkingArea,
    geom: &ViewGeometry,
    zoom: &ZoomState,
) -> (f32, f32) {
    let scale = zoom::effective_scale(geom, zoom);
    (
        area.off_x + 0.5 * area.width as f32 + scale * (nx - 0.5 - zoom.pan_x) * geom.image_w,
        area.off_y + 0.5 * area.height as f32 + scale * (ny - 0.5 - zoom.pan_y) * geom.image_h,
    )
}
