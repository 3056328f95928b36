//! Contains [DecodeProducer], the background loop that pulls compressed
//! packets from a [StreamDecoder], decodes and color-converts them, and
//! publishes the results into the frame ring.
//!
//! The producer and the render consumer never call into each other; the ring
//! is the only thing they share.

use std::thread::{self, JoinHandle};

use crate::decode::{StreamDecoder, StreamError};
use crate::ring::FrameWriter;

/// Why the decode loop ended.
#[derive(Debug)]
pub enum ProducerExit {
    /// The source ran out of packets. Normal termination, not a failure.
    EndOfStream,
    /// The ring was shut down underneath the loop (session stop).
    ShutDown,
    /// An unrecoverable stream error. The session should settle in `Failed`.
    Fatal(StreamError),
    /// The producer thread panicked.
    Panicked,
}

/// A handle to the running decode thread. The thread owns the decoder and
/// the ring's write side; both are torn down inside the thread before
/// [Self::join] returns, which is what makes joining-before-freeing safe for
/// everything else the session holds.
#[derive(Debug)]
pub struct DecodeProducer {
    worker: JoinHandle<ProducerExit>,
}

impl DecodeProducer {
    /// Start the decode loop on its own thread.
    pub fn spawn<D: StreamDecoder>(decoder: D, writer: FrameWriter) -> Self {
        Self {
            worker: thread::Builder::new()
                .name("decode-producer".into())
                .spawn(move || run_decode_loop(decoder, writer))
                .expect(SPAWN_MSG),
        }
    }

    /// Whether the decode loop has already returned (joining won't block).
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the decode loop to end and report why it did.
    ///
    /// This blocks until the thread exits; call `shutdown()` on the ring
    /// first if the loop should stop early.
    pub fn join(self) -> ProducerExit {
        self.worker.join().unwrap_or(ProducerExit::Panicked)
    }
}

/// The loop itself, separated from thread plumbing so tests can drive it
/// synchronously.
pub fn run_decode_loop<D: StreamDecoder>(mut decoder: D, writer: FrameWriter) -> ProducerExit {
    let mut published = 0u64;

    loop {
        let packet = match decoder.read_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                log::info!("End of stream after {published} published frames.");
                return ProducerExit::EndOfStream;
            }
            Err(err) => {
                log::error!("Reading a packet failed: {err}");
                return ProducerExit::Fatal(err);
            }
        };

        // A single packet may decode to zero frames (codec latency) or
        // several.
        let frames = match decoder.decode(&packet) {
            Ok(frames) => frames,
            Err(err) if err.is_soft() => {
                log::warn!("Skipping a packet that failed to decode: {err}");
                continue;
            }
            Err(err) => {
                log::error!("Decoding failed fatally: {err}");
                return ProducerExit::Fatal(err);
            }
        };

        for frame in &frames {
            let Some(mut slot) = writer.acquire_write_slot() else {
                log::info!("Ring shut down; decode loop exiting.");
                return ProducerExit::ShutDown;
            };

            let stride_bytes = slot.stride_bytes();
            match decoder.convert_into(frame, slot.pixels_mut(), stride_bytes) {
                Ok(()) => {
                    published = slot.publish();
                }
                Err(err) if err.is_soft() => {
                    // Dropping the slot unpublished aborts the write.
                    log::warn!("Skipping a frame that failed to convert: {err}");
                }
                Err(err) => {
                    log::error!("Conversion failed fatally: {err}");
                    return ProducerExit::Fatal(err);
                }
            }
        }
    }
}

const SPAWN_MSG: &str = "Spawning the decode thread shouldn't fail.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::StreamInfo;
    use crate::dims::Dimensions;
    use crate::ring::{self, BackpressurePolicy};

    /// What one scripted packet does when it reaches each decode step.
    enum Step {
        /// Decodes to this many frames, each filling the slot with the byte.
        Frames(Vec<u8>),
        /// `decode` reports a corrupt packet.
        CorruptPacket,
        /// `read_packet` itself fails (I/O), which is always fatal.
        ReadError,
        /// `decode` reports a fatal codec error.
        Desync,
        /// `convert_into` reports a corrupt frame.
        CorruptFrame,
    }

    struct ScriptedDecoder {
        script: Vec<Step>,
        cursor: usize,
        info: StreamInfo,
    }

    impl ScriptedDecoder {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script,
                cursor: 0,
                info: StreamInfo {
                    dimensions: Dimensions::new(4, 2).unwrap(),
                    frame_rate: 30.0,
                },
            }
        }
    }

    fn opaque(msg: &str) -> crate::decode::SourceError {
        msg.to_string().into()
    }

    impl StreamDecoder for ScriptedDecoder {
        type Packet = usize;
        type RawFrame = u8;

        fn info(&self) -> StreamInfo {
            self.info
        }

        fn read_packet(&mut self) -> Result<Option<usize>, StreamError> {
            if self.cursor == self.script.len() {
                return Ok(None);
            }
            if matches!(self.script[self.cursor], Step::ReadError) {
                return Err(StreamError::Io(opaque("scripted")));
            }
            let index = self.cursor;
            self.cursor += 1;
            Ok(Some(index))
        }

        fn decode(&mut self, packet: &usize) -> Result<Vec<u8>, StreamError> {
            match &self.script[*packet] {
                Step::Frames(fills) => Ok(fills.clone()),
                Step::CorruptPacket => Err(StreamError::BadPacket(opaque("scripted"))),
                Step::ReadError => unreachable!("Never handed out by read_packet."),
                Step::Desync => Err(StreamError::CodecDesync(opaque("scripted"))),
                Step::CorruptFrame => Ok(vec![0]),
            }
        }

        fn convert_into(
            &mut self,
            frame: &u8,
            dest: &mut [u8],
            _stride_bytes: usize,
        ) -> Result<(), StreamError> {
            // `cursor` was advanced by `read_packet`, so `cursor - 1` is the
            // packet currently being worked on.
            if matches!(
                self.script.get(self.cursor.wrapping_sub(1)),
                Some(Step::CorruptFrame)
            ) {
                return Err(StreamError::BadFrame(opaque("scripted")));
            }
            dest.fill(*frame);
            Ok(())
        }
    }

    fn frames(fills: &[u8]) -> Step {
        Step::Frames(fills.to_vec())
    }

    #[test]
    fn ten_clean_packets_publish_sequences_one_through_ten() {
        let decoder = ScriptedDecoder::new((1..=10).map(|i| frames(&[i])).collect());
        let (writer, reader) = ring::with_slot_count(
            Dimensions::new(4, 2).unwrap(),
            4,
            BackpressurePolicy::Block,
        )
        .unwrap();

        let producer = DecodeProducer::spawn(decoder, writer);

        // Tick like a caller: one read per iteration, extra ticks after the
        // stream is exhausted must report nothing new.
        let mut seen = Vec::new();
        loop {
            if let Some(slot) = reader.acquire_read_slot() {
                seen.push(slot.sequence());
            } else {
                std::thread::yield_now();
            }
            if seen.len() == 10 && producer.is_finished() {
                break;
            }
        }

        assert!(matches!(producer.join(), ProducerExit::EndOfStream));
        assert_eq!(seen, (1..=10).collect::<Vec<_>>());
        assert!(reader.acquire_read_slot().is_none());
    }

    #[test]
    fn a_corrupt_packet_is_skipped_not_fatal() {
        let mut script: Vec<Step> = (1..=5).map(|i| frames(&[i])).collect();
        script.push(Step::CorruptPacket);
        script.extend((6..=9).map(|i| frames(&[i])));

        let decoder = ScriptedDecoder::new(script);
        let (writer, reader) = ring::with_slot_count(
            Dimensions::new(4, 2).unwrap(),
            4,
            BackpressurePolicy::Block,
        )
        .unwrap();

        let producer = DecodeProducer::spawn(decoder, writer);

        let mut sequences = Vec::new();
        while sequences.len() < 9 {
            if let Some(slot) = reader.acquire_read_slot() {
                sequences.push(slot.sequence());
            } else {
                std::thread::yield_now();
            }
        }

        // Exactly nine frames from ten packets, still a clean ending.
        assert!(matches!(producer.join(), ProducerExit::EndOfStream));
        assert_eq!(sequences, (1..=9).collect::<Vec<_>>());
    }

    #[test]
    fn a_packet_may_yield_zero_or_many_frames() {
        let decoder = ScriptedDecoder::new(vec![
            frames(&[]),
            frames(&[1, 2, 3]),
            frames(&[]),
            frames(&[4]),
        ]);
        let (writer, reader) = ring::with_slot_count(
            Dimensions::new(4, 2).unwrap(),
            8,
            BackpressurePolicy::Block,
        )
        .unwrap();

        let exit = run_decode_loop(decoder, writer);
        assert!(matches!(exit, ProducerExit::EndOfStream));

        for expected_fill in 1..=4u8 {
            let slot = reader.acquire_read_slot().unwrap();
            assert!(slot.pixels().iter().all(|&b| b == expected_fill));
        }
        assert!(reader.acquire_read_slot().is_none());
    }

    #[test]
    fn a_frame_that_fails_conversion_is_skipped() {
        let decoder =
            ScriptedDecoder::new(vec![frames(&[1]), Step::CorruptFrame, frames(&[2])]);
        let (writer, reader) = ring::with_slot_count(
            Dimensions::new(4, 2).unwrap(),
            4,
            BackpressurePolicy::Block,
        )
        .unwrap();

        let exit = run_decode_loop(decoder, writer);
        assert!(matches!(exit, ProducerExit::EndOfStream));

        // The aborted write spent no sequence number, so the survivors are
        // still gap-free.
        assert_eq!(reader.acquire_read_slot().unwrap().sequence(), 1);
        assert_eq!(reader.acquire_read_slot().unwrap().sequence(), 2);
        assert!(reader.acquire_read_slot().is_none());
    }

    #[test]
    fn a_failed_packet_read_is_fatal() {
        let decoder = ScriptedDecoder::new(vec![frames(&[1]), Step::ReadError]);
        let (writer, reader) = ring::with_slot_count(
            Dimensions::new(4, 2).unwrap(),
            4,
            BackpressurePolicy::Block,
        )
        .unwrap();

        let exit = run_decode_loop(decoder, writer);
        assert!(matches!(exit, ProducerExit::Fatal(StreamError::Io(_))));

        // Only the frame before the failure was published.
        assert_eq!(reader.acquire_read_slot().unwrap().sequence(), 1);
        assert!(reader.acquire_read_slot().is_none());
    }

    #[test]
    fn tail_frames_of_the_final_packet_are_published() {
        // A decoder can hold frames back until it's told the stream is over
        // and then release several at once; all of them must come through
        // before the clean exit.
        let decoder = ScriptedDecoder::new(vec![frames(&[1]), frames(&[]), frames(&[2, 3])]);
        let (writer, reader) = ring::with_slot_count(
            Dimensions::new(4, 2).unwrap(),
            4,
            BackpressurePolicy::Block,
        )
        .unwrap();

        let exit = run_decode_loop(decoder, writer);
        assert!(matches!(exit, ProducerExit::EndOfStream));

        for expected_fill in 1..=3u8 {
            let slot = reader.acquire_read_slot().unwrap();
            assert!(slot.pixels().iter().all(|&b| b == expected_fill));
        }
        assert!(reader.acquire_read_slot().is_none());
    }

    #[test]
    fn a_fatal_decode_error_ends_the_loop() {
        let decoder = ScriptedDecoder::new(vec![frames(&[1]), Step::Desync, frames(&[2])]);
        let (writer, reader) = ring::with_slot_count(
            Dimensions::new(4, 2).unwrap(),
            4,
            BackpressurePolicy::Block,
        )
        .unwrap();

        let exit = run_decode_loop(decoder, writer);
        assert!(matches!(
            exit,
            ProducerExit::Fatal(StreamError::CodecDesync(_))
        ));

        // Only the frame before the failure was published.
        assert_eq!(reader.acquire_read_slot().unwrap().sequence(), 1);
        assert!(reader.acquire_read_slot().is_none());
    }

    #[test]
    fn shutdown_during_a_blocked_write_exits_the_loop() {
        // More frames than the ring can hold and no consumer: the loop must
        // block, then exit promptly once the reader shuts the ring down.
        let decoder = ScriptedDecoder::new((1..=50).map(|i| frames(&[i])).collect());
        let (writer, reader) = ring::with_slot_count(
            Dimensions::new(4, 2).unwrap(),
            2,
            BackpressurePolicy::Block,
        )
        .unwrap();

        let producer = DecodeProducer::spawn(decoder, writer);

        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!producer.is_finished());

        reader.shutdown();
        assert!(matches!(producer.join(), ProducerExit::ShutDown));
    }
}
