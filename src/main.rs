//! ar-demo
//!
//! Drives a tracking session against the simulated engine:
//! initialize, start, render a few frames, pause, resume, stop.
//!
//! Usage:
//!   ar-demo                         # defaults, back camera, 5 frames
//!   ar-demo --front --frames 20     # mirrored front camera
//!   ar-demo --fail dataset_load     # inject an engine failure
//!   ar-demo --json                  # one JSON frame report per line

use anyhow::{bail, Context, Result};
use ar_session::engine::{EngineOp, SimulatedEngine};
use ar_session::render::{LogBackend, ModelRenderer, RenderLoop};
use ar_session::session::LogReporter;
use ar_session::{
    CameraFacing, Matrix44, PoseSample, SessionConfig, SessionController, SessionState,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "ar-demo")]
#[command(version)]
#[command(about = "Run a simulated AR tracking session", long_about = None)]
struct Cli {
    /// Path to a session config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frames to render while running
    #[arg(short, long, default_value_t = 5)]
    frames: u32,

    /// Use the front-facing camera
    #[arg(long)]
    front: bool,

    /// Render for a stereo viewer
    #[arg(long)]
    stereo: bool,

    /// Make one engine operation fail (e.g. tracker_init, dataset_load, camera_start)
    #[arg(long, value_name = "OP")]
    fail: Option<String>,

    /// Print frame reports as JSON lines
    #[arg(long)]
    json: bool,

    /// Log filter, overrides RUST_LOG
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ar_session=info")),
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(filter)
        .init();

    let mut config = SessionConfig::load(cli.config.clone())?;
    if cli.front {
        config.camera_facing = CameraFacing::Front;
    }
    if cli.stereo {
        config.stereo_viewer = true;
    }

    let mut engine = SimulatedEngine::new().with_trackables(vec![PoseSample::new(
        0,
        "stones",
        Matrix44::from_row_major([
            1.0, 0.0, 0.0, 10.0, //
            0.0, 1.0, 0.0, 20.0, //
            0.0, 0.0, 1.0, 500.0, //
            0.0, 0.0, 0.0, 1.0,
        ]),
    )]);
    if let Some(name) = &cli.fail {
        engine = engine.fail_on(name.parse::<EngineOp>()?);
    }

    let facing = config.camera_facing;
    let controller = SessionController::new(Arc::new(engine), config, Arc::new(LogReporter))?;
    info!(session = %controller.id(), "Starting demo session");

    controller.initialize().await?;
    let state = controller
        .wait_for_state(|s| !s.is_initializing())
        .await;
    if state != SessionState::Ready {
        let _ = controller.stop().await;
        bail!("Session did not become ready: {}", state);
    }

    if let Err(e) = controller.start(facing).await {
        let _ = controller.stop().await;
        return Err(e).context("Failed to start camera");
    }

    let mut render_loop = RenderLoop::new(&controller, ModelRenderer::new(LogBackend::new()));
    render_frames(&mut render_loop, cli.frames, cli.json).await?;

    controller.pause().await?;
    let report = render_loop.render_frame();
    info!(state = %report.state, fell_back = report.fell_back, "Rendered while paused");

    controller.resume().await?;
    let state = controller
        .wait_for_state(|s| *s == SessionState::Running || s.is_failed())
        .await;
    if state == SessionState::Running {
        render_frames(&mut render_loop, 1, cli.json).await?;
    } else {
        warn!(state = %state, "Session did not resume");
    }

    let stopped = controller.stop().await;
    let backend = render_loop.into_renderer().into_backend();
    info!(
        frames = backend.frames(),
        draws = backend.draws(),
        engine_frames = controller.frames_processed(),
        "Demo finished"
    );
    stopped.context("Teardown reported a failure")?;
    Ok(())
}

async fn render_frames<R>(render_loop: &mut RenderLoop<R>, frames: u32, json: bool) -> Result<()>
where
    R: ar_session::FrameRenderer,
{
    for _ in 0..frames {
        let report = render_loop.render_frame();
        if json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            let c = &report.camera;
            info!(
                frame = report.frame,
                trackables = report.trackables,
                last = report.last_trackable.as_deref().unwrap_or("-"),
                position = ?(c.position.x, c.position.y, c.position.z),
                fov_deg = c.fov.to_degrees(),
                "Frame"
            );
        }
        tokio::time::sleep(Duration::from_millis(16)).await;
    }
    Ok(())
}
