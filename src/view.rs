//! The darkroom view: frame planning, input routing, session lifecycle.
//!
//! One instance lives on the UI thread. Input handlers follow a fixed
//! precedence: color-pick drag, active-module delegation, then viewport
//! navigation. Every mutating path re-clamps pan/scale through the zoom
//! math before publishing the new state and requests a redraw.

use tracing::{info, warn};

use crate::config::ViewConfig;
use crate::error::Error;
use crate::executor::{PipelineExecutor, ProcessRequest};
use crate::history::{History, HistoryStore};
use crate::module::{EditModule, KeyCode, MouseButton};
use crate::pipeline::composite::{self, FrameSurface};
use crate::pipeline::coordinator::{FrameSource, plan_frame};
use crate::session::{ImageRef, Session};
use crate::zoom::{
    PanBounds, ViewGeometry, WorkingArea, ZoomMode, clamp_pan, effective_scale,
    pointer_to_normalized, working_area,
};

/// Axis a border-scroll event nudges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAxis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Default)]
struct InputState {
    primary_down: bool,
    /// Working-area position of the primary press; anchors picker drags.
    press_x: f32,
    press_y: f32,
    /// Most recent drag position; pan deltas are taken against this.
    last_x: f32,
    last_y: f32,
}

/// The darkroom view exposed to the hosting framework.
pub struct DarkroomView {
    cfg: ViewConfig,
    executor: Box<dyn PipelineExecutor>,
    store: Box<dyn HistoryStore>,
    session: Option<Session>,
    viewport: (u32, u32),
    input: InputState,
    /// Last composited frame, retained across frames with nothing new.
    frame: Option<FrameSurface>,
    needs_redraw: bool,
}

impl DarkroomView {
    pub fn new(
        cfg: ViewConfig,
        executor: Box<dyn PipelineExecutor>,
        store: Box<dyn HistoryStore>,
    ) -> Self {
        Self {
            cfg,
            executor,
            store,
            session: None,
            viewport: (1, 1),
            input: InputState::default(),
            frame: None,
            needs_redraw: false,
        }
    }

    /// Working area and transform geometry for the current image, if a
    /// session is open.
    fn view_context(&self) -> Option<(WorkingArea, ViewGeometry)> {
        self.session.as_ref()?;
        let size = self.executor.processed_size()?;
        let area = working_area(self.viewport.0, self.viewport.1, self.cfg.max_working_size);
        Some((area, ViewGeometry::new((area.width, area.height), size)))
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Clamped pan and visible-box fractions, e.g. for host scrollbars.
    pub fn visible_box(&self) -> Option<PanBounds> {
        let (_, geom) = self.view_context()?;
        let zoom = self.session.as_ref()?.zoom;
        Some(clamp_pan(&geom, &zoom))
    }

    /// Whether a redraw was requested since the last call.
    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.needs_redraw)
    }

    // ------------------------------------------------------------------
    // session lifecycle

    /// Enter a develop session for `image` with the host's module list.
    ///
    /// # Errors
    /// Fails when the image is missing or unreadable, or persisted history
    /// cannot be loaded; no partial session state is left behind.
    pub fn on_session_enter(
        &mut self,
        image: ImageRef,
        modules: Vec<Box<dyn EditModule>>,
    ) -> Result<(), Error> {
        self.on_session_leave();

        if !image.path.is_file() {
            return Err(Error::MissingImage(image.path.clone()));
        }

        let mut session = Session::new(image, modules);
        self.executor
            .open(&session.image, session.main.clone(), session.preview.clone())?;

        let entries = match self.store.load_history(&session.image.id) {
            Ok(entries) => entries,
            Err(err) => {
                self.executor.close();
                return Err(err);
            }
        };

        for module in &mut session.modules {
            if let Some(flags) = self.store.load_module_flags(module.op()) {
                module.set_flags(flags);
            }
        }

        session.history = History::from_entries(entries);
        session.replay_history();

        // force the first render through the cheap pipe
        session.invalidate_all();

        info!(
            image = %session.image.id,
            modules = session.modules.len(),
            history = session.history.active().len(),
            "session entered",
        );
        self.session = Some(session);
        self.input = InputState::default();
        self.needs_redraw = true;
        Ok(())
    }

    /// Leave the current session, committing pending edits. Safe to call
    /// with no session open and after a partially failed enter.
    pub fn on_session_leave(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        self.store
            .save_history(&session.image.id, session.history.active());
        for module in &session.modules {
            self.store.save_module_flags(module.op(), module.flags());
        }

        self.executor.regenerate_thumbnail();
        self.executor.close();

        self.frame = None;
        self.input = InputState::default();
        info!(image = %session.image.id, "session left");
        // session drops here, releasing modules and buffers
    }

    // ------------------------------------------------------------------
    // rendering

    pub fn on_resize(&mut self, width: u32, height: u32) {
        let new = (width.max(1), height.max(1));
        if new == self.viewport {
            return;
        }
        self.viewport = new;
        if let Some(session) = self.session.as_mut() {
            // the main pipe renders at working size and must follow it
            session.invalidate();
        }
        self.needs_redraw = true;
    }

    /// Produce the frame for this tick.
    ///
    /// Triggers any needed reprocessing, composites whichever buffer the
    /// coordinator selects, and returns the current frame. When nothing is
    /// displayable yet (or a publish holds a buffer lock) the previous
    /// frame is returned unchanged; that is a normal transient state.
    pub fn render(
        &mut self,
        viewport_w: u32,
        viewport_h: u32,
        pointer_x: f64,
        pointer_y: f64,
    ) -> Option<&FrameSurface> {
        self.viewport = (viewport_w.max(1), viewport_h.max(1));
        let Some((area, geom)) = self.view_context() else {
            return self.frame.as_ref();
        };
        let session = self.session.as_mut()?;

        let plan = plan_frame(session.main.status(), session.preview.status());
        let request = ProcessRequest {
            version: session.version(),
            working: (area.width, area.height),
            zoom: session.zoom,
        };
        if plan.process_full {
            self.executor.process_full(request.clone());
        }
        if plan.process_preview {
            self.executor.process_preview(request);
        }

        let zoom = session.zoom;
        let composed = match plan.display {
            Some(FrameSource::Main) => session
                .main
                .try_read()
                .filter(|g| !g.is_empty())
                .map(|guard| {
                    let mut frame = FrameSurface::new(viewport_w.max(1), viewport_h.max(1));
                    frame.fill(self.cfg.background);
                    composite::composite_main(&mut frame, &guard, &area, &geom, &zoom);
                    frame
                }),
            Some(FrameSource::Preview) => session
                .preview
                .try_read()
                .filter(|g| !g.is_empty())
                .map(|guard| {
                    let mut frame = FrameSurface::new(viewport_w.max(1), viewport_h.max(1));
                    frame.fill(self.cfg.background);
                    composite::composite_preview(&mut frame, &guard, &area, &geom, &zoom);
                    frame
                }),
            None => None,
        };

        if let Some(mut frame) = composed {
            let (lx, ly) = area.to_local(pointer_x, pointer_y);
            if let Some(module) = session.active_module() {
                if module.color_picker_requested() {
                    let rect = module.picker_box();
                    let (x0, y0) = composite::image_norm_to_frame(rect[0], rect[1], &area, &geom, &zoom);
                    let (x1, y1) = composite::image_norm_to_frame(rect[2], rect[3], &area, &geom, &zoom);
                    frame.stroke_rect(x0, y0, x1, y1, [51, 51, 51]);
                    frame.stroke_rect(x0 + 1.0, y0 + 1.0, x1 + 1.0, y1 + 1.0, [204, 204, 204]);
                } else {
                    module.on_post_render(&mut frame, lx, ly);
                }
            }
            self.frame = Some(frame);
        }

        self.frame.as_ref()
    }

    // ------------------------------------------------------------------
    // input routing

    pub fn on_pointer_move(&mut self, x: f64, y: f64) -> bool {
        let Some((area, geom)) = self.view_context() else {
            return false;
        };
        let (x, y) = area.to_local(x, y);
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let zoom = session.zoom;

        // a module-requested color box wins over everything else
        if self.input.primary_down
            && let Some(module) = session.active_module()
            && module.color_picker_requested()
        {
            let (nx, ny) = pointer_to_normalized(x, y, &geom, &zoom);
            let (ax, ay) =
                pointer_to_normalized(self.input.press_x, self.input.press_y, &geom, &zoom);
            module.set_picker_box([
                ax.min(nx).max(0.0),
                ay.min(ny).max(0.0),
                ax.max(nx).min(1.0),
                ay.max(ny).min(1.0),
            ]);
            session.invalidate_all();
            self.needs_redraw = true;
            return true;
        }

        if let Some(module) = session.active_module()
            && module.on_pointer_move(x, y)
        {
            return true;
        }

        if self.input.primary_down {
            let scale = effective_scale(&geom, &session.zoom);
            session.zoom.pan_x -= (x - self.input.last_x) / (scale * geom.image_w);
            session.zoom.pan_y -= (y - self.input.last_y) / (scale * geom.image_h);
            let bounds = clamp_pan(&geom, &session.zoom);
            session.zoom.pan_x = bounds.pan_x;
            session.zoom.pan_y = bounds.pan_y;
            self.input.last_x = x;
            self.input.last_y = y;
            session.invalidate();
            self.needs_redraw = true;
            return true;
        }

        false
    }

    pub fn on_button_down(&mut self, x: f64, y: f64, button: MouseButton) -> bool {
        let Some((area, geom)) = self.view_context() else {
            return false;
        };
        let (x, y) = area.to_local(x, y);
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let zoom = session.zoom;

        if button == MouseButton::Primary
            && let Some(module) = session.active_module()
            && module.color_picker_requested()
        {
            let (nx, ny) = pointer_to_normalized(x, y, &geom, &zoom);
            module.set_picker_box([nx, ny, nx, ny]);
            self.input.primary_down = true;
            self.input.press_x = x;
            self.input.press_y = y;
            self.input.last_x = x;
            self.input.last_y = y;
            self.needs_redraw = true;
            return true;
        }

        if let Some(module) = session.active_module()
            && module.on_button_down(x, y, button)
        {
            return true;
        }

        match button {
            MouseButton::Primary => {
                self.input.primary_down = true;
                self.input.press_x = x;
                self.input.press_y = y;
                self.input.last_x = x;
                self.input.last_y = y;
                true
            }
            MouseButton::Middle => {
                // cycle 1:1 → 2:1 closeup → Fit, recentered on the click
                let scale = effective_scale(&geom, &session.zoom);
                session.zoom.pan_x += (x - 0.5 * area.width as f32) / (scale * geom.image_w);
                session.zoom.pan_y += (y - 0.5 * area.height as f32) / (scale * geom.image_h);
                if session.zoom.mode == ZoomMode::OneToOne {
                    if session.zoom.closeup {
                        session.zoom.mode = ZoomMode::Fit;
                        session.zoom.pan_x = 0.0;
                        session.zoom.pan_y = 0.0;
                        session.zoom.closeup = false;
                    } else {
                        session.zoom.closeup = true;
                    }
                } else {
                    session.zoom.mode = ZoomMode::OneToOne;
                }
                let bounds = clamp_pan(&geom, &session.zoom);
                session.zoom.pan_x = bounds.pan_x;
                session.zoom.pan_y = bounds.pan_y;
                session.invalidate();
                self.needs_redraw = true;
                true
            }
            _ => false,
        }
    }

    pub fn on_button_up(&mut self, x: f64, y: f64, button: MouseButton) -> bool {
        let Some((area, _geom)) = self.view_context() else {
            return false;
        };
        let (x, y) = area.to_local(x, y);
        if button == MouseButton::Primary {
            self.input.primary_down = false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if let Some(module) = session.active_module() {
            module.on_button_up(x, y, button);
        }
        true
    }

    /// Free-form zoom keeping the image point under the cursor stationary.
    pub fn on_scroll(&mut self, x: f64, y: f64, up: bool) -> bool {
        let Some((area, geom)) = self.view_context() else {
            return false;
        };
        let (x, y) = area.to_local(x, y);
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        let min_scale = geom.fit_scale();
        let mut scale = effective_scale(&geom, &session.zoom);
        let off_x = x - 0.5 * area.width as f32;
        let off_y = y - 0.5 * area.height as f32;
        session.zoom.pan_x += off_x / (geom.image_w * scale);
        session.zoom.pan_y += off_y / (geom.image_h * scale);
        session.zoom.mode = ZoomMode::Free;
        session.zoom.closeup = false;

        // a fit scale above 1 would make this step non-positive and invert
        // the wheel; keep a usable floor
        let step = (self.cfg.zoom_step_fraction * (1.0 - min_scale)).max(0.02);
        scale += if up { step } else { -step };
        scale = scale.max(min_scale);
        session.zoom.scale = scale;
        if scale > 1.0 - self.cfg.one_to_one_snap {
            session.zoom.mode = ZoomMode::OneToOne;
        }
        if scale < min_scale + self.cfg.fit_snap {
            session.zoom.mode = ZoomMode::Fit;
        }
        session.zoom.pan_x -= off_x / (geom.image_w * scale);
        session.zoom.pan_y -= off_y / (geom.image_h * scale);

        let bounds = clamp_pan(&geom, &session.zoom);
        session.zoom.pan_x = bounds.pan_x;
        session.zoom.pan_y = bounds.pan_y;
        session.invalidate();
        self.needs_redraw = true;
        true
    }

    /// Nudge pan by a fixed normalized increment along one axis.
    pub fn on_border_scroll(&mut self, axis: ScrollAxis, up: bool) -> bool {
        let Some((_area, geom)) = self.view_context() else {
            return false;
        };
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let step = if up {
            -self.cfg.border_scroll_step
        } else {
            self.cfg.border_scroll_step
        };
        match axis {
            ScrollAxis::Horizontal => session.zoom.pan_x += step,
            ScrollAxis::Vertical => session.zoom.pan_y += step,
        }
        let bounds = clamp_pan(&geom, &session.zoom);
        session.zoom.pan_x = bounds.pan_x;
        session.zoom.pan_y = bounds.pan_y;
        session.invalidate();
        self.needs_redraw = true;
        true
    }

    pub fn on_key(&mut self, key: KeyCode) -> bool {
        let Some((_area, geom)) = self.view_context() else {
            return false;
        };
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        if let Some(module) = session.active_module()
            && module.on_key(key)
        {
            return true;
        }

        match key {
            KeyCode::Key1 => {
                if session.zoom.mode == ZoomMode::OneToOne {
                    session.zoom.closeup = !session.zoom.closeup;
                }
                session.zoom.mode = ZoomMode::OneToOne;
            }
            KeyCode::Key2 => {
                session.zoom.mode = ZoomMode::Fill;
                session.zoom.closeup = false;
            }
            KeyCode::Key3 => {
                session.zoom.mode = ZoomMode::Fit;
                session.zoom.pan_x = 0.0;
                session.zoom.pan_y = 0.0;
                session.zoom.closeup = false;
            }
            KeyCode::Other(_) => return false,
        }

        let bounds = clamp_pan(&geom, &session.zoom);
        session.zoom.pan_x = bounds.pan_x;
        session.zoom.pan_y = bounds.pan_y;
        session.invalidate();
        self.needs_redraw = true;
        true
    }
}

impl Drop for DarkroomView {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("view dropped with a live session; leaving it now");
            self.on_session_leave();
        }
    }
}
