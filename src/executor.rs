//! Processing-pipeline executor: the seam to the per-pixel engine, plus a
//! threaded reference implementation.
//!
//! The coordinator only decides *what* needs processing; the executor does
//! the work on its own threads and calls back into
//! [`PipelineBuffer::publish`]. Requests for a pipe that already has one in
//! flight are coalesced — the latest request wins, there is no backlog.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};
use fast_image_resize as fir;
use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::pipeline::buffer::PipelineBuffer;
use crate::session::ImageRef;
use crate::zoom::{self, ViewGeometry, ZoomState};

/// One reprocessing request: the input version it renders and the view
/// state it renders for.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub version: u64,
    /// Working-area dimensions the output will be composited into.
    pub working: (u32, u32),
    pub zoom: ZoomState,
}

/// External collaborator executing the actual image processing.
pub trait PipelineExecutor {
    /// Bind to an image and the session's buffers. Called at session enter;
    /// a failure here must leave the executor closed.
    ///
    /// # Errors
    /// Returns [`Error::Decode`]/[`Error::Io`] when the image cannot be
    /// read.
    fn open(
        &mut self,
        image: &ImageRef,
        main: Arc<PipelineBuffer>,
        preview: Arc<PipelineBuffer>,
    ) -> Result<(), Error>;

    /// Release workers and buffers. Idempotent.
    fn close(&mut self);

    /// Request a full-resolution render; returns immediately.
    fn process_full(&self, req: ProcessRequest);

    /// Request a low-resolution render; returns immediately.
    fn process_preview(&self, req: ProcessRequest);

    /// Authoritative output dimensions of the current image, once open.
    fn processed_size(&self) -> Option<(u32, u32)>;

    /// Final thumbnail/mip refresh requested at session leave.
    fn regenerate_thumbnail(&self) {}
}

struct OpenPipes {
    size: (u32, u32),
    full_tx: Sender<ProcessRequest>,
    preview_tx: Sender<ProcessRequest>,
    workers: Vec<JoinHandle<()>>,
}

/// Reference executor: one worker thread per pipe over crossbeam channels.
pub struct ThreadedExecutor {
    preview_max_dim: u32,
    open: Option<OpenPipes>,
}

impl ThreadedExecutor {
    pub fn new(preview_max_dim: u32) -> Self {
        Self {
            preview_max_dim,
            open: None,
        }
    }
}

/// Collapse everything already queued into the newest request.
fn latest(rx: &Receiver<ProcessRequest>, first: ProcessRequest) -> ProcessRequest {
    let mut req = first;
    while let Ok(next) = rx.try_recv() {
        req = next;
    }
    req
}

impl PipelineExecutor for ThreadedExecutor {
    fn open(
        &mut self,
        image: &ImageRef,
        main: Arc<PipelineBuffer>,
        preview: Arc<PipelineBuffer>,
    ) -> Result<(), Error> {
        self.close();

        let base = Arc::new(image::open(&image.path)?.to_rgba8());
        let size = base.dimensions();
        info!(image = %image.path.display(), width = size.0, height = size.1, "pipeline opened");

        let (full_tx, full_rx) = unbounded::<ProcessRequest>();
        let (preview_tx, preview_rx) = unbounded::<ProcessRequest>();

        let full_worker = {
            let base = base.clone();
            std::thread::spawn(move || {
                while let Ok(req) = full_rx.recv() {
                    let req = latest(&full_rx, req);
                    let (pixels, w, h) = render_region(&base, req.working, &req.zoom);
                    main.publish(pixels, w, h, req.version);
                }
            })
        };

        let preview_worker = {
            let base = base.clone();
            let max_dim = self.preview_max_dim;
            std::thread::spawn(move || {
                // the low-resolution rendition is input-independent here, so
                // compute it once and re-stamp per request
                let mut cached: Option<(Vec<u8>, u32, u32)> = None;
                while let Ok(req) = preview_rx.recv() {
                    let req = latest(&preview_rx, req);
                    if cached.is_none() {
                        match downscale_rgba(&base, max_dim) {
                            Ok(small) => cached = Some(small),
                            Err(err) => {
                                warn!(error = %err, "preview downscale failed");
                                continue;
                            }
                        }
                    }
                    if let Some((pixels, w, h)) = cached.as_ref() {
                        preview.publish(pixels.clone(), *w, *h, req.version);
                    }
                }
            })
        };

        self.open = Some(OpenPipes {
            size,
            full_tx,
            preview_tx,
            workers: vec![full_worker, preview_worker],
        });
        Ok(())
    }

    fn close(&mut self) {
        let Some(pipes) = self.open.take() else {
            return;
        };
        // dropping the senders lets each worker drain and exit
        drop(pipes.full_tx);
        drop(pipes.preview_tx);
        for worker in pipes.workers {
            if worker.join().is_err() {
                warn!("pipeline worker panicked during shutdown");
            }
        }
        debug!("pipeline closed");
    }

    fn process_full(&self, req: ProcessRequest) {
        if let Some(pipes) = self.open.as_ref() {
            let _ = pipes.full_tx.send(req);
        }
    }

    fn process_preview(&self, req: ProcessRequest) {
        if let Some(pipes) = self.open.as_ref() {
            let _ = pipes.preview_tx.send(req);
        }
    }

    fn processed_size(&self) -> Option<(u32, u32)> {
        self.open.as_ref().map(|p| p.size)
    }

    fn regenerate_thumbnail(&self) {
        // mip storage is owned by the host's cache; nothing to refresh here
        debug!("thumbnail regeneration requested");
    }
}

impl Drop for ThreadedExecutor {
    fn drop(&mut self) {
        self.close();
    }
}

/// Render the visible region of `base` at the zoom state's base scale
/// (closeup magnification is applied later by the compositor).
fn render_region(base: &RgbaImage, working: (u32, u32), zoom: &ZoomState) -> (Vec<u8>, u32, u32) {
    let (bw, bh) = base.dimensions();
    let geom = ViewGeometry::new(working, (bw, bh));
    let scale = zoom::zoom_scale(&geom, zoom.mode, 1.0, zoom.scale);
    let bounds = zoom::clamp_pan_at(&geom, zoom, 1.0);

    let out_w = (working.0.min((bw as f32 * scale).ceil() as u32)).max(1);
    let out_h = (working.1.min((bh as f32 * scale).ceil() as u32)).max(1);

    // image-space origin of the rendered window
    let x0 = (0.5 + bounds.pan_x) * bw as f32 - out_w as f32 / (2.0 * scale);
    let y0 = (0.5 + bounds.pan_y) * bh as f32 - out_h as f32 / (2.0 * scale);

    let mut pixels = vec![0u8; out_w as usize * out_h as usize * 4];
    for oy in 0..out_h {
        let sy = (y0 + (oy as f32 + 0.5) / scale).clamp(0.0, bh as f32 - 1.0) as u32;
        for ox in 0..out_w {
            let sx = (x0 + (ox as f32 + 0.5) / scale).clamp(0.0, bw as f32 - 1.0) as u32;
            let src = base.get_pixel(sx, sy).0;
            let idx = (oy as usize * out_w as usize + ox as usize) * 4;
            pixels[idx..idx + 4].copy_from_slice(&src);
        }
    }
    (pixels, out_w, out_h)
}

fn downscale_rgba(base: &RgbaImage, max_dim: u32) -> anyhow::Result<(Vec<u8>, u32, u32)> {
    let (bw, bh) = base.dimensions();
    let longest = bw.max(bh).max(1);
    if longest <= max_dim {
        return Ok((base.as_raw().clone(), bw, bh));
    }
    let ratio = max_dim as f32 / longest as f32;
    let (tw, th) = (
        ((bw as f32 * ratio).round() as u32).max(1),
        ((bh as f32 * ratio).round() as u32).max(1),
    );

    let src_view = fir::images::ImageRef::new(bw, bh, base.as_raw(), fir::PixelType::U8x4)
        .map_err(|e| anyhow::anyhow!("failed to create preview source view: {e}"))?;
    let mut dst_image = fir::images::Image::new(tw, th, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .map_err(|e| anyhow::anyhow!("preview resize failed: {e}"))?;
    Ok((dst_image.into_vec(), tw, th))
}
