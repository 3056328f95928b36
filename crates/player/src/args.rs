//! Contains [Args], which are parsed command-line flags.

use std::path::PathBuf;

use clap::Parser;

/// Parsed command line arguments.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(about = "Plays a video file headlessly, optionally saving frames as PNGs.")]
pub struct Args {
    /// The video file to play.
    pub path: PathBuf,

    /// How many frame slots the pipeline buffers between the decode thread
    /// and the render step.
    #[arg(long, default_value_t = pipeline::ring::DEFAULT_SLOT_COUNT)]
    pub slots: usize,

    /// When the decode thread gets ahead of rendering, drop the oldest
    /// undisplayed frame instead of pausing decode.
    #[arg(long)]
    pub drop_oldest: bool,

    /// Save presented frames as PNGs into this directory (created if it
    /// doesn't exist).
    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,

    /// With `--snapshot-dir`, save only every K-th presented frame.
    #[arg(long, value_name = "K", default_value_t = 1,
        value_parser = clap::value_parser!(u64).range(1..))]
    pub snapshot_every: u64,
}

impl Default for Args {
    fn default() -> Self {
        Self::parse()
    }
}
