//! The FFmpeg-backed decode collaborator: opens almost any container/codec
//! FFmpeg knows and feeds RGBA frames into the pipeline.

mod convert;
mod source;

use std::error::Error;
use std::fmt::{self, Display, Formatter};

#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicBool, Ordering};

use ctor::ctor;
use ffmpeg_next as ffmpeg;

pub use convert::RgbaConverter;
pub use source::{FfmpegDecoder, FfmpegSource};

/// Something an FFmpeg-backed source/decoder can get wrong.
#[derive(thiserror::Error, Debug)]
pub enum MediaError {
    #[error("The file has no video stream.")]
    NoVideoStream,
    #[error(
        "The video stream shouldn't have dimensions with a 0-length side \
        ({0}x{1} has no area)."
    )]
    ZeroLengthSide(u32, u32),
    #[error("The video stream has no frame rate.")]
    NoFrameRate,
    #[error("Failed to create a frame scaler.")]
    ScalerCreateFailure(#[source] ffmpeg::Error),
    #[error("Failed to scale (reformat) a frame.")]
    ScaleFailure(#[source] ffmpeg::Error),
    #[error(
        "The destination buffer is too small for one frame \
        ({actual} bytes, need at least {expected})."
    )]
    DestinationTooSmall { expected: usize, actual: usize },
    #[error(
        "The source frame's plane is too small for its dimensions \
        ({actual} bytes, need at least {expected})."
    )]
    SourceTooSmall { expected: usize, actual: usize },
}

/// An FFmpeg error paired with which call produced it, for setup errors
/// where "something failed" isn't actionable on its own.
#[derive(Debug)]
pub(crate) struct FfmpegCallError {
    pub call: &'static str,
    pub source: ffmpeg::Error,
}

impl Display for FfmpegCallError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "FFmpeg's {} failed.", self.call)
    }
}

impl Error for FfmpegCallError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Initializes FFmpeg. This happens when the [crate] is loaded.
///
/// You should never actually call this function.
#[ctor]
fn ffmpeg_init() {
    #[cfg(debug_assertions)]
    {
        static ALREADY_INIT: AtomicBool = AtomicBool::new(false);
        assert!(
            !ALREADY_INIT.swap(true, Ordering::SeqCst),
            "Tried to initialize FFmpeg twice."
        );
    }

    ffmpeg::init().expect("FFmpeg shouldn't fail to initialize.");
}
