//! Headless driver for the darkroom view.
//!
//! Stands in for the GUI host: enters a session on the given image, replays
//! a scripted interaction (resize, scroll zoom, pan drag), waits for the
//! pipes to publish, and writes the composited frame to a PNG.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt};

use rust_darkroom::config;
use rust_darkroom::executor::ThreadedExecutor;
use rust_darkroom::history::MemoryStore;
use rust_darkroom::module::MouseButton;
use rust_darkroom::session::ImageRef;
use rust_darkroom::view::DarkroomView;

#[derive(Debug, Parser)]
#[command(name = "rust-darkroom", about = "Headless darkroom view driver")]
struct Cli {
    /// Image to develop
    image: PathBuf,

    /// Path to YAML config file (defaults are used when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Where to write the composited frame
    #[arg(short, long, value_name = "FILE", default_value = "darkroom-frame.png")]
    output: PathBuf,

    /// Viewport size as WIDTHxHEIGHT
    #[arg(long, value_name = "WxH", default_value = "1280x800")]
    viewport: String,

    /// Number of scroll-zoom steps to apply at the viewport center
    #[arg(long, default_value_t = 3)]
    zoom_steps: u32,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("rust_darkroom={level}").parse().expect("valid directive"));
    fmt().with_env_filter(filter).with_target(true).init();
}

fn parse_viewport(raw: &str) -> Result<(u32, u32)> {
    let Some((w, h)) = raw.split_once('x') else {
        bail!("viewport must be WIDTHxHEIGHT, got {raw}");
    };
    Ok((w.parse().context("viewport width")?, h.parse().context("viewport height")?))
}

/// Render until the view produces a frame from fresh pipeline output.
fn settle(view: &mut DarkroomView, viewport: (u32, u32)) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let (cx, cy) = (f64::from(viewport.0) / 2.0, f64::from(viewport.1) / 2.0);
    loop {
        let fresh = view
            .session()
            .is_some_and(|s| !s.main.is_dirty() || !s.preview.is_dirty());
        if view.render(viewport.0, viewport.1, cx, cy).is_some() && fresh {
            return Ok(());
        }
        if Instant::now() > deadline {
            bail!("pipelines did not publish within the deadline");
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_or_default(cli.config.as_deref())?;
    let viewport = parse_viewport(&cli.viewport)?;

    let executor = ThreadedExecutor::new(cfg.preview_max_dim);
    let mut view = DarkroomView::new(cfg, Box::new(executor), Box::new(MemoryStore::default()));

    let image = ImageRef::new(cli.image.display().to_string(), cli.image.clone());
    view.on_session_enter(image, Vec::new())
        .context("entering darkroom session")?;
    view.on_resize(viewport.0, viewport.1);
    settle(&mut view, viewport)?;

    // scripted interaction: zoom toward the center, then drag a short pan
    let (cx, cy) = (f64::from(viewport.0) / 2.0, f64::from(viewport.1) / 2.0);
    for _ in 0..cli.zoom_steps {
        view.on_scroll(cx, cy, true);
    }
    view.on_button_down(cx, cy, MouseButton::Primary);
    view.on_pointer_move(cx + 120.0, cy + 40.0);
    view.on_button_up(cx + 120.0, cy + 40.0, MouseButton::Primary);
    if let Some(zoom) = view.session().map(|s| s.zoom) {
        info!(
            mode = ?zoom.mode,
            scale = zoom.scale,
            pan_x = zoom.pan_x,
            pan_y = zoom.pan_y,
            "state after interaction",
        );
    }
    settle(&mut view, viewport)?;

    let frame = view
        .render(viewport.0, viewport.1, cx, cy)
        .context("no composited frame")?;
    let img = image::RgbaImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
        .context("assembling output image")?;
    img.save(&cli.output)
        .with_context(|| format!("writing {}", cli.output.display()))?;
    info!(output = %cli.output.display(), "frame written");

    view.on_session_leave();
    Ok(())
}
