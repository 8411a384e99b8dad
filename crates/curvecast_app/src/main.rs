// SPDX-License-Identifier: MIT OR Apache-2.0
//! CurveCast - headless timeline telemetry player.
//!
//! Loads a keyframe timeline and a telemetry configuration, then runs the
//! owning control loop: ticking the playback clock, publishing playhead
//! snapshots for the governor thread, and applying inbound sync positions.

use clap::Parser;
use curvecast_telemetry::{ServiceError, SharedPlayhead, TelemetryConfig, TelemetryService};
use curvecast_timeline::{
    Handle, InterpolationKind, Keyframe, PlaybackClock, PlaybackStatus, Timeline, Track,
};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Owning-loop tick cadence; the telemetry rate is governed independently
const TICK: Duration = Duration::from_millis(16);

#[derive(Debug, Parser)]
#[command(
    name = "curvecast",
    about = "Stream keyframe timeline telemetry over UDP"
)]
struct Args {
    /// Timeline JSON file; a built-in demo timeline is used when omitted
    #[arg(long)]
    timeline: Option<PathBuf>,

    /// Telemetry configuration RON file; defaults enable telemetry to
    /// 127.0.0.1:9000 at 60 Hz
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many seconds of wall time
    #[arg(long)]
    duration: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse timeline {path}: {source}")]
    Timeline {
        path: String,
        source: serde_json::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Config {
        path: String,
        source: ron::error::SpannedError,
    },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

fn main() {
    let args = Args::parse();

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("curvecast_app=info".parse().unwrap())
        .add_directive("curvecast_telemetry=info".parse().unwrap())
        .add_directive("curvecast_timeline=info".parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("CurveCast v{}", env!("CARGO_PKG_VERSION"));

    if let Err(err) = run(&args) {
        error!("curvecast failed: {err}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), AppError> {
    let timeline = match &args.timeline {
        Some(path) => load_timeline(path)?,
        None => {
            info!("no timeline given, playing the built-in demo");
            demo_timeline()
        }
    };
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => TelemetryConfig {
            enabled: true,
            ..TelemetryConfig::default()
        },
    };

    let duration = timeline.duration();
    let mut clock = PlaybackClock::new(duration);
    clock.set_looping(config.loop_enabled);

    let shared_timeline = Arc::new(RwLock::new(timeline));
    let playhead = Arc::new(SharedPlayhead::new());
    let mut service =
        TelemetryService::start(config, Arc::clone(&shared_timeline), Arc::clone(&playhead))?;

    clock.play();
    playhead.store(clock.snapshot());
    info!("playing {duration:.3} s timeline (loop: {})", clock.looping());

    let started = Instant::now();
    let mut last = started;
    loop {
        std::thread::sleep(TICK);
        let now = Instant::now();

        // At most one pending sync value; earlier ones are already superseded.
        if let Some(position) = service.sync_position() {
            clock.seek(position);
        }

        clock.tick(now - last);
        last = now;
        playhead.store(clock.snapshot());

        if clock.status() == PlaybackStatus::Stopped {
            info!("playback finished");
            break;
        }
        if let Some(limit) = args.duration {
            if started.elapsed().as_secs_f64() >= limit {
                info!("wall-clock limit reached");
                break;
            }
        }
    }

    info!(
        "frames sent: {}, send errors: {}",
        service.frames_sent(),
        service.send_errors()
    );
    service.shutdown();
    Ok(())
}

fn load_timeline(path: &Path) -> Result<Timeline, AppError> {
    let text = std::fs::read_to_string(path).map_err(|source| AppError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| AppError::Timeline {
        path: path.display().to_string(),
        source,
    })
}

fn load_config(path: &Path) -> Result<TelemetryConfig, AppError> {
    let text = std::fs::read_to_string(path).map_err(|source| AppError::Read {
        path: path.display().to_string(),
        source,
    })?;
    ron::from_str(&text).map_err(|source| AppError::Config {
        path: path.display().to_string(),
        source,
    })
}

/// A small two-track timeline for running without a project file
fn demo_timeline() -> Timeline {
    let mut timeline = Timeline::new();
    timeline.set_duration(5.0);

    let mut fov = Track::new("camera.fov", InterpolationKind::Cubic);
    fov.add_keyframe(Keyframe::new(0.0, 60.0));
    fov.add_keyframe(Keyframe::new(2.0, 75.0));
    fov.add_keyframe(Keyframe::new(4.0, 55.0));
    fov.add_keyframe(Keyframe::new(5.0, 60.0));
    timeline.add_track(fov);

    let mut lift = Track::new("rig.lift", InterpolationKind::Bezier);
    lift.add_keyframe(
        Keyframe::new(0.0, 0.0).with_handles(Handle::new(-0.3, 0.0), Handle::new(0.3, 0.4)),
    );
    lift.add_keyframe(
        Keyframe::new(5.0, 1.5).with_handles(Handle::new(-0.3, -0.4), Handle::new(0.3, 0.0)),
    );
    timeline.add_track(lift);

    timeline
}
