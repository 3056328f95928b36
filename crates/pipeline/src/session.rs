//! Contains [Session], the state machine that sequences multi-stage setup,
//! owns the frame ring and the decode thread, and guarantees ordered
//! teardown on success, partial failure, or explicit stop.

use std::path::Path;

use crate::consumer::RenderConsumer;
use crate::decode::{MediaSource, Renderer, SetupError, StreamDecoder, StreamInfo};
use crate::producer::{DecodeProducer, ProducerExit};
use crate::ring::{self, BackpressurePolicy, MIN_SLOT_COUNT};

/// Where a [Session] is in its life.
///
/// Setup walks forward through the acquisition states; `Stopped` and
/// `Failed` are terminal (nothing is valid afterward except dropping the
/// session).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    /// Opening the media source and reading its stream table.
    OpeningSource,
    /// Source open; opening a decoder for the selected video stream.
    CodecReady,
    /// Decoder open; the frame ring's slots are allocated.
    BuffersReady,
    /// Display surface created at the stream's dimensions.
    DisplayReady,
    /// The decode thread is running and the consumer may read.
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Knobs for a session. The defaults are four slots and never dropping a
/// frame.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub slot_count: usize,
    pub policy: BackpressurePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            slot_count: ring::DEFAULT_SLOT_COUNT,
            policy: BackpressurePolicy::default(),
        }
    }
}

/// What one render tick amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new frame was handed to the renderer.
    NewFrame,
    /// Nothing new to show yet; keep presenting the previous image.
    NoNewFrame,
    /// The stream ended and every published frame has been shown. The
    /// caller should call [Session::stop].
    Finished,
    /// The producer failed fatally. The caller should call [Session::stop];
    /// the session is already in [SessionState::Failed].
    Failed,
}

/// A playback session: exclusive owner of the frame ring, the display
/// surface, and the decode thread's join handle.
///
/// The renderer itself stays with the caller and is lent to
/// [Self::render_tick]; the session owns only the surface it created.
pub struct Session<R: Renderer> {
    state: SessionState,
    config: SessionConfig,
    info: Option<StreamInfo>,
    consumer: Option<RenderConsumer>,
    surface: Option<R::Surface>,
    producer: Option<DecodeProducer>,
    producer_exit: Option<ProducerExit>,
}

impl<R: Renderer> Session<R> {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            state: SessionState::Uninitialized,
            config,
            info: None,
            consumer: None,
            surface: None,
            producer: None,
            producer_exit: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Facts about the opened stream. [None] until setup reaches
    /// [SessionState::CodecReady].
    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.info
    }

    /// Run every setup stage in order: open the source, open the decoder,
    /// allocate the ring's slots at the stream's dimensions, create the
    /// display surface, start the decode thread.
    ///
    /// If a stage fails, everything acquired by the stages before it is
    /// released (in reverse order, by drop) and the session settles in
    /// [SessionState::Failed] with the stage's [SetupError].
    pub fn initialize<M>(&mut self, path: &Path, renderer: &mut R) -> Result<(), SetupError>
    where
        M: MediaSource,
    {
        if self.state != SessionState::Uninitialized {
            return Err(SetupError::AlreadyInitialized);
        }

        self.state = SessionState::OpeningSource;
        let source = match M::open(path) {
            Ok(source) => source,
            Err(err) => return Err(self.fail_setup(err)),
        };

        let decoder = match source.open_video_decoder() {
            Ok(decoder) => decoder,
            Err(err) => return Err(self.fail_setup(err)),
        };
        self.state = SessionState::CodecReady;

        let info = decoder.info();
        self.info = Some(info);

        let Some((writer, reader)) =
            ring::with_slot_count(info.dimensions, self.config.slot_count, self.config.policy)
        else {
            // `decoder` (and the source inside it) drop here, in reverse
            // acquisition order.
            return Err(self.fail_setup(SetupError::TooFewSlots {
                requested: self.config.slot_count,
                min: MIN_SLOT_COUNT,
            }));
        };
        self.state = SessionState::BuffersReady;

        let surface = match renderer.create_surface(info.dimensions) {
            Ok(surface) => surface,
            Err(err) => return Err(self.fail_setup(err)),
        };
        self.state = SessionState::DisplayReady;

        self.producer = Some(DecodeProducer::spawn(decoder, writer));
        self.consumer = Some(RenderConsumer::new(reader));
        self.surface = Some(surface);
        self.state = SessionState::Running;

        log::info!(
            "Session running: {} @ {:.2} fps, {} slots.",
            info.dimensions,
            info.frame_rate,
            self.config.slot_count,
        );
        Ok(())
    }

    /// Present the next published frame, if there is one. Cheap and
    /// non-blocking; meant to be called once per host tick.
    pub fn render_tick(&mut self, renderer: &mut R) -> TickOutcome {
        match self.state {
            SessionState::Running => {}
            SessionState::Failed => return TickOutcome::Failed,
            _ => return TickOutcome::Finished,
        }

        // Reap the decode thread if it already ended so a fatal exit
        // surfaces here instead of at stop().
        if self.producer.as_ref().is_some_and(DecodeProducer::is_finished)
            && let Some(producer) = self.producer.take()
        {
            let exit = producer.join();
            if matches!(exit, ProducerExit::Fatal(_) | ProducerExit::Panicked) {
                log::error!("The decode thread ended a session fatally: {exit:?}");
                self.producer_exit = Some(exit);
                self.state = SessionState::Failed;
                return TickOutcome::Failed;
            }
            self.producer_exit = Some(exit);
        }

        let (Some(consumer), Some(surface)) = (self.consumer.as_mut(), self.surface.as_mut())
        else {
            return TickOutcome::Finished;
        };

        if consumer.tick(renderer, surface) {
            TickOutcome::NewFrame
        } else if matches!(self.producer_exit, Some(ProducerExit::EndOfStream)) {
            // The stream is over and the ring is drained.
            TickOutcome::Finished
        } else {
            TickOutcome::NoNewFrame
        }
    }

    /// Tear the session down: shut the ring down, wait for the decode
    /// thread to exit, then release the surface and the ring in reverse
    /// acquisition order.
    ///
    /// Idempotent and valid from any state, including before [
    /// Self::initialize] succeeded; only what was actually acquired is
    /// released. The decode thread is always joined before anything it
    /// might still touch is freed.
    pub fn stop(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }
        let was_failed = self.state == SessionState::Failed;
        self.state = SessionState::Stopping;

        if let Some(consumer) = &self.consumer {
            consumer.reader().shutdown();
        }

        // Joining first is the load-bearing ordering: after this, nothing
        // can touch the ring or the decoder from another thread.
        if let Some(producer) = self.producer.take() {
            let exit = producer.join();
            log::info!("Decode thread joined: {exit:?}");
            self.producer_exit.get_or_insert(exit);
        }

        // Display resources, then the ring (the reverse of acquisition; the
        // decoder already dropped inside the decode thread).
        drop(self.surface.take());
        drop(self.consumer.take());

        let fatal_exit = matches!(
            self.producer_exit,
            Some(ProducerExit::Fatal(_) | ProducerExit::Panicked)
        );
        self.state = if was_failed || fatal_exit {
            SessionState::Failed
        } else {
            SessionState::Stopped
        };
        log::info!("Session stopped ({:?}).", self.state);
    }

    /// Why the decode thread exited, once it has.
    pub fn producer_exit(&self) -> Option<&ProducerExit> {
        self.producer_exit.as_ref()
    }

    fn fail_setup(&mut self, err: SetupError) -> SetupError {
        log::error!("Session setup failed at {:?}: {err}", self.state);
        self.state = SessionState::Failed;
        err
    }
}

/// Dropping a session that was never stopped must still join the decode
/// thread before the ring goes away.
impl<R: Renderer> Drop for Session<R> {
    fn drop(&mut self) {
        self.stop();
    }
}
