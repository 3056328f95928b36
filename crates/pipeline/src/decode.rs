//! The collaborator contracts the pipeline is built against: the decode side
//! ([MediaSource]/[StreamDecoder]), the display side ([Renderer]), and the
//! host process ([HostRuntime]), plus the error taxonomy they share.
//!
//! The pipeline owns no container parsing, codec work, or windowing of its
//! own; implementations of these traits do (see the `media` crate for the
//! FFmpeg-backed decode side).

use std::error::Error;
use std::path::Path;

use thiserror::Error;

use crate::dims::Dimensions;

/// A few facts about an opened video stream, fixed once the decoder exists.
///
/// # Contract
///
/// [StreamDecoder::info] must return the same value every call. Every frame
/// the decoder produces must have [StreamInfo::dimensions]; a stream whose
/// dimensions change mid-session must surface
/// [StreamError::DimensionsChanged] instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub dimensions: Dimensions,
    /// Average frames per second, used by the caller to pace its tick loop.
    pub frame_rate: f64,
}

/// A container handle whose stream table has been read, the first of the two
/// decode-side setup stages (the second opens the codec).
pub trait MediaSource: Sized {
    type Decoder: StreamDecoder;

    /// Open the media source at `path` and read its stream table.
    fn open(path: &Path) -> Result<Self, SetupError>;

    /// Select the video stream and open a matching decoder, consuming the
    /// source handle (the decoder keeps it alive for packet reads).
    fn open_video_decoder(self) -> Result<Self::Decoder, SetupError>;
}

/// The decode collaborator: compressed packets in, display-format pixels
/// out. Closing is [Drop].
///
/// Runs entirely on the producer thread, hence `Send`.
pub trait StreamDecoder: Send + 'static {
    /// One compressed unit as read from the container.
    type Packet;
    /// One decoded frame, not yet in the display pixel format.
    type RawFrame;

    fn info(&self) -> StreamInfo;

    /// Read the next compressed packet of the video stream. [None] means the
    /// stream ended normally; an error here is always fatal (I/O, not a bad
    /// packet).
    fn read_packet(&mut self) -> Result<Option<Self::Packet>, StreamError>;

    /// Decode one packet into zero or more raw frames.
    ///
    /// A [soft](StreamError::is_soft) error means this packet was corrupt
    /// and should be skipped; playback continues.
    fn decode(&mut self, packet: &Self::Packet) -> Result<Vec<Self::RawFrame>, StreamError>;

    /// Color-convert `frame` straight into `dest` (a slot's pixel buffer in
    /// the display format, rows `stride_bytes` apart). No intermediate
    /// per-frame allocation.
    fn convert_into(
        &mut self,
        frame: &Self::RawFrame,
        dest: &mut [u8],
        stride_bytes: usize,
    ) -> Result<(), StreamError>;
}

/// The presentation collaborator. Surface destruction is [Drop].
pub trait Renderer {
    type Surface;

    /// Create a surface sized to the stream's dimensions.
    fn create_surface(&mut self, dimensions: Dimensions) -> Result<Self::Surface, SetupError>;

    /// Present one complete frame. Called from the consumer's tick only;
    /// must not block on decode progress (it can't: the pixels are already
    /// here).
    fn present(
        &mut self,
        surface: &mut Self::Surface,
        pixels: &[u8],
        dimensions: Dimensions,
        stride_bytes: usize,
    );
}

/// The host-process collaborator that drives the tick loop and decides when
/// playback should end.
pub trait HostRuntime {
    /// Whether the process is currently the foreground application.
    fn is_foreground(&self) -> bool {
        true
    }

    /// Whether the host has asked the process to shut down. Once true, the
    /// caller should call `Session::stop` and exit its loop.
    fn is_shutting_down(&self) -> bool;
}

/// A boxed source error from a collaborator implementation.
pub type SourceError = Box<dyn Error + Send + Sync>;

/// A stage of session setup failed. Always fatal: the session never reaches
/// `Running` and everything acquired by earlier stages is released before
/// this surfaces.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Failed to open the media source.")]
    OpenSource(#[source] SourceError),
    #[error("Failed to open a decoder for the video stream.")]
    OpenCodec(#[source] SourceError),
    #[error("The frame ring needs at least {min} slots but {requested} were requested.")]
    TooFewSlots { requested: usize, min: usize },
    #[error("Failed to create the display surface.")]
    CreateSurface(#[source] SourceError),
    #[error("The session was already initialized.")]
    AlreadyInitialized,
}

/// Something went wrong on the decode path after setup.
///
/// [BadPacket](Self::BadPacket) and [BadFrame](Self::BadFrame) are soft: the
/// producer logs, skips the packet/frame, and playback continues. Everything
/// else ends the stream and fails the session.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("A packet failed to decode.")]
    BadPacket(#[source] SourceError),
    #[error("A decoded frame couldn't be converted to the display format.")]
    BadFrame(#[source] SourceError),
    #[error("Failed to read from the media source.")]
    Io(#[source] SourceError),
    #[error("The decoder lost sync with the stream.")]
    CodecDesync(#[source] SourceError),
    #[error("The stream's dimensions changed mid-session (expected {expected} but got {actual}).")]
    DimensionsChanged {
        expected: Dimensions,
        actual: Dimensions,
    },
}

impl StreamError {
    /// Whether the producer can recover by skipping the offending packet or
    /// frame. Soft errors never cross the producer/consumer boundary.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::BadPacket(_) | Self::BadFrame(_))
    }
}
