//! Input routing through the darkroom view: precedence, zoom gestures,
//! and the dirty flags each path raises.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rust_darkroom::config::ViewConfig;
use rust_darkroom::error::Error;
use rust_darkroom::executor::{PipelineExecutor, ProcessRequest};
use rust_darkroom::history::MemoryStore;
use rust_darkroom::module::{EditModule, KeyCode, MouseButton};
use rust_darkroom::pipeline::buffer::PipelineBuffer;
use rust_darkroom::session::ImageRef;
use rust_darkroom::view::{DarkroomView, ScrollAxis};
use rust_darkroom::zoom::{ViewGeometry, ZoomMode, pointer_to_normalized};
use serde_json::{Value, json};
use tempfile::TempDir;

/// Executor that renders synchronously inside the request call: a white
/// frame for the main pipe, a red 8x8 rendition for the preview pipe.
struct SyncExecutor {
    size: (u32, u32),
    main: Option<Arc<PipelineBuffer>>,
    preview: Option<Arc<PipelineBuffer>>,
    full_enabled: Arc<AtomicBool>,
    full_requests: Arc<Mutex<Vec<ProcessRequest>>>,
}

impl SyncExecutor {
    fn new(size: (u32, u32)) -> Self {
        Self {
            size,
            main: None,
            preview: None,
            full_enabled: Arc::new(AtomicBool::new(true)),
            full_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl PipelineExecutor for SyncExecutor {
    fn open(
        &mut self,
        _image: &ImageRef,
        main: Arc<PipelineBuffer>,
        preview: Arc<PipelineBuffer>,
    ) -> Result<(), Error> {
        self.main = Some(main);
        self.preview = Some(preview);
        Ok(())
    }

    fn close(&mut self) {
        self.main = None;
        self.preview = None;
    }

    fn process_full(&self, req: ProcessRequest) {
        self.full_requests.lock().unwrap().push(req.clone());
        if !self.full_enabled.load(Ordering::SeqCst) {
            return;
        }
        if let Some(main) = self.main.as_ref() {
            let (w, h) = req.working;
            main.publish(vec![0xff; (w * h * 4) as usize], w, h, req.version);
        }
    }

    fn process_preview(&self, req: ProcessRequest) {
        if let Some(preview) = self.preview.as_ref() {
            let mut px = Vec::with_capacity(8 * 8 * 4);
            for _ in 0..64 {
                px.extend_from_slice(&[0xff, 0x00, 0x00, 0xff]);
            }
            preview.publish(px, 8, 8, req.version);
        }
    }

    fn processed_size(&self) -> Option<(u32, u32)> {
        self.main.is_some().then_some(self.size)
    }
}

#[derive(Default)]
struct ModuleLog {
    moves: usize,
    buttons: usize,
    keys: usize,
}

struct TestModule {
    handle_moves: bool,
    handle_keys: bool,
    picker: bool,
    picker_box: [f32; 4],
    log: Arc<Mutex<ModuleLog>>,
}

impl TestModule {
    fn passive(log: Arc<Mutex<ModuleLog>>) -> Self {
        Self {
            handle_moves: false,
            handle_keys: false,
            picker: false,
            picker_box: [0.0; 4],
            log,
        }
    }
}

impl EditModule for TestModule {
    fn op(&self) -> &'static str {
        "test"
    }

    fn params(&self) -> Value {
        json!({})
    }

    fn apply_params(&mut self, _params: &Value) {}

    fn color_picker_requested(&self) -> bool {
        self.picker
    }

    fn picker_box(&self) -> [f32; 4] {
        self.picker_box
    }

    fn set_picker_box(&mut self, rect: [f32; 4]) {
        self.picker_box = rect;
    }

    fn on_pointer_move(&mut self, _x: f32, _y: f32) -> bool {
        self.log.lock().unwrap().moves += 1;
        self.handle_moves
    }

    fn on_button_down(&mut self, _x: f32, _y: f32, _button: MouseButton) -> bool {
        self.log.lock().unwrap().buttons += 1;
        false
    }

    fn on_key(&mut self, _key: KeyCode) -> bool {
        self.log.lock().unwrap().keys += 1;
        self.handle_keys
    }
}

/// A view over a fake 4000x3000 image in a 1280x800 viewport.
fn view_with(modules: Vec<Box<dyn EditModule>>) -> (DarkroomView, TempDir, Arc<Mutex<Vec<ProcessRequest>>>) {
    let tmp = TempDir::new().unwrap();
    let img_path = tmp.path().join("photo.png");
    fs::write(&img_path, b"not actually decoded by the mock").unwrap();

    let executor = SyncExecutor::new((4000, 3000));
    let requests = executor.full_requests.clone();
    let mut view = DarkroomView::new(
        ViewConfig::default(),
        Box::new(executor),
        Box::new(MemoryStore::default()),
    );
    view.on_session_enter(ImageRef::new("img", &img_path), modules)
        .unwrap();
    view.on_resize(1280, 800);
    (view, tmp, requests)
}

fn geom() -> ViewGeometry {
    ViewGeometry::new((1280, 800), (4000, 3000))
}

fn mark_both_clean(view: &mut DarkroomView) {
    let session = view.session_mut().unwrap();
    let v = session.version();
    session.main.publish(vec![0; 4], 1, 1, v);
    session.preview.publish(vec![0; 4], 1, 1, v);
}

#[test]
fn pan_drag_moves_and_clamps_and_dirties_main_only() {
    let (mut view, _tmp, _) = view_with(Vec::new());
    {
        let session = view.session_mut().unwrap();
        session.zoom.mode = ZoomMode::OneToOne;
    }
    mark_both_clean(&mut view);

    assert!(view.on_button_down(640.0, 400.0, MouseButton::Primary));
    assert!(view.on_pointer_move(600.0, 420.0));

    let session = view.session().unwrap();
    // delta (-40, +20) at scale 1: pan moves by +40/4000, -20/3000
    assert!((session.zoom.pan_x - 0.01).abs() < 1e-6);
    assert!((session.zoom.pan_y + 20.0 / 3000.0).abs() < 1e-6);
    assert!(session.main.is_dirty(), "pan marks the main pipe");
    assert!(!session.preview.is_dirty(), "pan does not touch the preview pipe");
}

#[test]
fn pan_without_button_is_ignored() {
    let (mut view, _tmp, _) = view_with(Vec::new());
    assert!(!view.on_pointer_move(600.0, 420.0));
    let zoom = view.session().unwrap().zoom;
    assert_eq!((zoom.pan_x, zoom.pan_y), (0.0, 0.0));
}

#[test]
fn module_delegation_stops_pan() {
    let log = Arc::new(Mutex::new(ModuleLog::default()));
    let module = TestModule {
        handle_moves: true,
        ..TestModule::passive(log.clone())
    };
    let (mut view, _tmp, _) = view_with(vec![Box::new(module)]);
    view.session_mut().unwrap().set_active(Some(0));

    view.on_button_down(640.0, 400.0, MouseButton::Primary);
    assert!(view.on_pointer_move(700.0, 420.0));
    assert_eq!(log.lock().unwrap().moves, 1);
    let zoom = view.session().unwrap().zoom;
    assert_eq!((zoom.pan_x, zoom.pan_y), (0.0, 0.0), "handled event must not pan");
}

#[test]
fn unhandled_module_move_falls_through_to_pan() {
    let log = Arc::new(Mutex::new(ModuleLog::default()));
    let module = TestModule::passive(log.clone());
    let (mut view, _tmp, _) = view_with(vec![Box::new(module)]);
    {
        let session = view.session_mut().unwrap();
        session.set_active(Some(0));
        session.zoom.mode = ZoomMode::OneToOne;
    }

    view.on_button_down(640.0, 400.0, MouseButton::Primary);
    assert!(view.on_pointer_move(600.0, 400.0));
    assert_eq!(log.lock().unwrap().moves, 1);
    assert!(view.session().unwrap().zoom.pan_x > 0.0);
}

#[test]
fn color_pick_drag_wins_over_delegation_and_pan() {
    let log = Arc::new(Mutex::new(ModuleLog::default()));
    let module = TestModule {
        handle_moves: true,
        picker: true,
        ..TestModule::passive(log.clone())
    };
    let (mut view, _tmp, _) = view_with(vec![Box::new(module)]);
    {
        let session = view.session_mut().unwrap();
        session.set_active(Some(0));
        session.zoom.mode = ZoomMode::OneToOne;
    }
    mark_both_clean(&mut view);

    assert!(view.on_button_down(640.0, 400.0, MouseButton::Primary));
    assert!(view.on_pointer_move(740.0, 480.0));

    // the drag never reached the module hook or the pan path
    assert_eq!(log.lock().unwrap().moves, 0);
    let session = view.session().unwrap();
    assert_eq!((session.zoom.pan_x, session.zoom.pan_y), (0.0, 0.0));
    assert!(session.preview.is_dirty(), "picker drag reprocesses the preview");

    // box spans the dragged region in normalized image coordinates
    let g = geom();
    let zoom = session.zoom;
    let (ax, ay) = pointer_to_normalized(640.0, 400.0, &g, &zoom);
    let (bx, by) = pointer_to_normalized(740.0, 480.0, &g, &zoom);
    let rect = view
        .session_mut()
        .unwrap()
        .active_module()
        .unwrap()
        .picker_box();
    assert!((rect[0] - ax).abs() < 1e-5);
    assert!((rect[1] - ay).abs() < 1e-5);
    assert!((rect[2] - bx).abs() < 1e-5);
    assert!((rect[3] - by).abs() < 1e-5);
}

#[test]
fn middle_click_cycles_one_to_one_closeup_fit() {
    let (mut view, _tmp, _) = view_with(Vec::new());

    assert!(view.on_button_down(640.0, 400.0, MouseButton::Middle));
    let zoom = view.session().unwrap().zoom;
    assert_eq!(zoom.mode, ZoomMode::OneToOne);
    assert!(!zoom.closeup);

    assert!(view.on_button_down(640.0, 400.0, MouseButton::Middle));
    let zoom = view.session().unwrap().zoom;
    assert_eq!(zoom.mode, ZoomMode::OneToOne);
    assert!(zoom.closeup);

    assert!(view.on_button_down(640.0, 400.0, MouseButton::Middle));
    let zoom = view.session().unwrap().zoom;
    assert_eq!(zoom.mode, ZoomMode::Fit);
    assert!(!zoom.closeup);
    assert_eq!((zoom.pan_x, zoom.pan_y), (0.0, 0.0));
}

#[test]
fn middle_click_recenters_on_the_click_point() {
    let (mut view, _tmp, _) = view_with(Vec::new());
    // click off-center from Fit: the clicked image point should move toward
    // the viewport center at 1:1
    let g = geom();
    let before = view.session().unwrap().zoom;
    let (nx, ny) = pointer_to_normalized(900.0, 500.0, &g, &before);
    view.on_button_down(900.0, 500.0, MouseButton::Middle);
    let after = view.session().unwrap().zoom;
    assert_eq!(after.mode, ZoomMode::OneToOne);
    // pan now points at the clicked image location (clamp permitting)
    assert!((after.pan_x - (nx - 0.5)).abs() < 0.01);
    assert!((after.pan_y - (ny - 0.5)).abs() < 0.01);
}

#[test]
fn scroll_zoom_keeps_cursor_point_stationary() {
    let (mut view, _tmp, _) = view_with(Vec::new());
    {
        let session = view.session_mut().unwrap();
        session.zoom.mode = ZoomMode::Free;
        session.zoom.scale = 0.6;
    }
    let g = geom();
    let before = view.session().unwrap().zoom;
    let (nx0, ny0) = pointer_to_normalized(900.0, 300.0, &g, &before);

    assert!(view.on_scroll(900.0, 300.0, true));

    let after = view.session().unwrap().zoom;
    assert_eq!(after.mode, ZoomMode::Free);
    assert!(after.scale > 0.6);
    let (nx1, ny1) = pointer_to_normalized(900.0, 300.0, &g, &after);
    assert!((nx0 - nx1).abs() < 1e-4, "{nx0} vs {nx1}");
    assert!((ny0 - ny1).abs() < 1e-4, "{ny0} vs {ny1}");
}

#[test]
fn scroll_snaps_to_one_to_one_and_fit() {
    let (mut view, _tmp, _) = view_with(Vec::new());
    {
        let session = view.session_mut().unwrap();
        session.zoom.mode = ZoomMode::Free;
        session.zoom.scale = 0.95;
    }
    // fit scale = min(1280/4000, 800/3000) = 0.2667; step = 0.1*(1-fit) ≈ 0.073
    view.on_scroll(640.0, 400.0, true);
    assert_eq!(view.session().unwrap().zoom.mode, ZoomMode::OneToOne);

    {
        let session = view.session_mut().unwrap();
        session.zoom.mode = ZoomMode::Free;
        session.zoom.scale = 0.3;
    }
    view.on_scroll(640.0, 400.0, false);
    let zoom = view.session().unwrap().zoom;
    assert_eq!(zoom.mode, ZoomMode::Fit);
    assert_eq!((zoom.pan_x, zoom.pan_y), (0.0, 0.0), "fit re-clamps pan to center");
}

#[test]
fn border_scroll_nudges_one_axis() {
    let (mut view, _tmp, _) = view_with(Vec::new());
    {
        let session = view.session_mut().unwrap();
        session.zoom.mode = ZoomMode::OneToOne;
    }
    assert!(view.on_border_scroll(ScrollAxis::Horizontal, true));
    let zoom = view.session().unwrap().zoom;
    assert!((zoom.pan_x + 0.02).abs() < 1e-6);
    assert_eq!(zoom.pan_y, 0.0);

    assert!(view.on_border_scroll(ScrollAxis::Vertical, false));
    let zoom = view.session().unwrap().zoom;
    assert!((zoom.pan_y - 0.02).abs() < 1e-6);
}

#[test]
fn fixed_key_bindings_drive_zoom_modes() {
    let (mut view, _tmp, _) = view_with(Vec::new());

    assert!(view.on_key(KeyCode::Key1));
    assert_eq!(view.session().unwrap().zoom.mode, ZoomMode::OneToOne);
    assert!(view.on_key(KeyCode::Key1));
    assert!(view.session().unwrap().zoom.closeup, "second press enters closeup");

    assert!(view.on_key(KeyCode::Key2));
    let zoom = view.session().unwrap().zoom;
    assert_eq!(zoom.mode, ZoomMode::Fill);
    assert!(!zoom.closeup);

    assert!(view.on_key(KeyCode::Key3));
    let zoom = view.session().unwrap().zoom;
    assert_eq!(zoom.mode, ZoomMode::Fit);
    assert_eq!((zoom.pan_x, zoom.pan_y), (0.0, 0.0));

    assert!(!view.on_key(KeyCode::Other(42)));
}

#[test]
fn module_key_handling_preempts_bindings() {
    let log = Arc::new(Mutex::new(ModuleLog::default()));
    let module = TestModule {
        handle_keys: true,
        ..TestModule::passive(log.clone())
    };
    let (mut view, _tmp, _) = view_with(vec![Box::new(module)]);
    view.session_mut().unwrap().set_active(Some(0));

    assert!(view.on_key(KeyCode::Key1));
    assert_eq!(log.lock().unwrap().keys, 1);
    // the binding never ran: still at the session default
    assert_eq!(view.session().unwrap().zoom.mode, ZoomMode::Fit);
}

#[test]
fn render_prefers_main_when_equally_fresh() {
    let (mut view, _tmp, requests) = view_with(Vec::new());

    // first tick: nothing ready yet, both pipes triggered synchronously,
    // no frame to retain
    assert!(view.render(1280, 800, 0.0, 0.0).is_none());
    assert!(!requests.lock().unwrap().is_empty());

    // second tick: both published at the same version, main wins
    let frame = view.render(1280, 800, 0.0, 0.0).expect("frame after publish");
    assert_eq!(frame.get(640, 400), [0xff, 0xff, 0xff, 0xff], "main pipe output is white");
    assert_eq!((frame.width(), frame.height()), (1280, 800));
}

#[test]
fn render_shows_preview_while_main_is_stale() {
    let tmp = TempDir::new().unwrap();
    let img_path = tmp.path().join("photo.png");
    fs::write(&img_path, b"mock").unwrap();

    let executor = SyncExecutor::new((4000, 3000));
    let full_enabled = executor.full_enabled.clone();
    let mut view = DarkroomView::new(
        ViewConfig::default(),
        Box::new(executor),
        Box::new(MemoryStore::default()),
    );
    view.on_session_enter(ImageRef::new("img", &img_path), Vec::new())
        .unwrap();
    view.on_resize(1280, 800);

    full_enabled.store(false, Ordering::SeqCst);
    // preview publishes, main never does
    view.render(1280, 800, 0.0, 0.0);
    let frame = view.render(1280, 800, 0.0, 0.0).expect("preview frame");
    assert_eq!(frame.get(640, 400), [0xff, 0x00, 0x00, 0xff], "preview output is red");

    // once the full pipe catches up it takes over
    full_enabled.store(true, Ordering::SeqCst);
    view.render(1280, 800, 0.0, 0.0);
    let frame = view.render(1280, 800, 0.0, 0.0).expect("main frame");
    assert_eq!(frame.get(640, 400), [0xff, 0xff, 0xff, 0xff]);
}

#[test]
fn resize_requests_a_full_reprocess() {
    let (mut view, _tmp, _) = view_with(Vec::new());
    mark_both_clean(&mut view);
    view.on_resize(1000, 700);
    let session = view.session().unwrap();
    assert!(session.main.is_dirty());
    assert!(view.visible_box().is_some());
}
