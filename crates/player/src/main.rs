//! A headless command-line player: decodes a video file on a background
//! thread, paces a render tick at the stream's frame rate, and optionally
//! saves presented frames as PNGs.

mod args;
mod host;
mod snapshot;

use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use media::FfmpegSource;
use pipeline::{BackpressurePolicy, HostRuntime, Session, SessionConfig, TickOutcome};

use args::Args;
use host::SignalHost;
use snapshot::SnapshotRenderer;

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::default();

    let host = match SignalHost::register() {
        Ok(host) => host,
        Err(err) => {
            log::error!("Failed to register stop signal handlers: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut renderer = SnapshotRenderer::new(args.snapshot_dir, args.snapshot_every);
    let mut session = Session::new(SessionConfig {
        slot_count: args.slots,
        policy: if args.drop_oldest {
            BackpressurePolicy::DropOldest
        } else {
            BackpressurePolicy::Block
        },
    });

    if let Err(err) = session.initialize::<FfmpegSource>(&args.path, &mut renderer) {
        log::error!("Failed to start playback of {}: {err}", args.path.display());
        return ExitCode::FAILURE;
    }

    // `stream_info` is always available once `initialize` succeeds.
    let frame_interval = session
        .stream_info()
        .map(|info| Duration::from_secs_f64(1.0 / info.frame_rate))
        .unwrap_or(Duration::from_millis(16));

    let exit = loop {
        let tick_started = Instant::now();

        if host.is_shutting_down() {
            log::info!("Stop signal received.");
            break ExitCode::SUCCESS;
        }

        match session.render_tick(&mut renderer) {
            TickOutcome::NewFrame | TickOutcome::NoNewFrame => {}
            TickOutcome::Finished => break ExitCode::SUCCESS,
            TickOutcome::Failed => break ExitCode::FAILURE,
        }

        // Sleep out the rest of the frame interval. Pacing by wall clock
        // (not by frame count) means a slow tick eats into its own interval
        // instead of delaying every later frame.
        thread::sleep(frame_interval.saturating_sub(tick_started.elapsed()));
    };

    session.stop();
    log::info!("Presented {} frames.", renderer.frames_presented());
    exit
}
