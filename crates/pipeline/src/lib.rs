//! The frame pipeline: moves decoded video frames from a background decode
//! thread to a caller-driven render step without tearing, without unbounded
//! memory growth, and without losing frames except by explicit policy.
//!
//! The moving parts, leaves first:
//!
//! - [ring]: a fixed-capacity ring of reusable pixel slots with independent
//!   write/read cursors and per-slot state tags.
//! - [DecodeProducer]: the background loop that fills slots from a
//!   [StreamDecoder].
//! - [RenderConsumer]: the non-blocking per-tick step that hands published
//!   frames to a [Renderer].
//! - [Session]: the state machine that sequences setup, owns everything,
//!   and guarantees the decode thread is joined before anything it touches
//!   is freed.
//!
//! The producer and consumer never call into each other; the ring is the
//! only thing they share.

pub mod ring;

mod consumer;
mod decode;
mod dims;
mod producer;
mod session;

pub use consumer::RenderConsumer;
pub use decode::{
    HostRuntime, MediaSource, Renderer, SetupError, SourceError, StreamDecoder, StreamError,
    StreamInfo,
};
pub use dims::{BYTES_PER_PIXEL, Dimensions};
pub use producer::{DecodeProducer, ProducerExit, run_decode_loop};
pub use ring::{BackpressurePolicy, FrameReader, FrameWriter, ReadSlot, WriteSlot};
pub use session::{Session, SessionConfig, SessionState, TickOutcome};
