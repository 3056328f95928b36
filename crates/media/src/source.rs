//! Contains [FfmpegSource] and [FfmpegDecoder], the FFmpeg-backed
//! implementation of the pipeline's decode-side collaborator traits.

use std::path::Path;

use ffmpeg::Error as FFmpegError;
use ffmpeg::Packet as FFmpegPacket;
use ffmpeg::codec::Context as FFmpegCodecContext;
use ffmpeg::codec::decoder::Video as FFmpegVideoDecoder;
use ffmpeg::format::context::Input as FFmpegInputFormatContext;
use ffmpeg::frame::Video as FFmpegVideoFrame;
use ffmpeg::media::Type as FFmpegMediaType;
use ffmpeg_next as ffmpeg;

use pipeline::{Dimensions, MediaSource, SetupError, StreamDecoder, StreamError, StreamInfo};

use crate::convert::RgbaConverter;
use crate::{FfmpegCallError, MediaError};

/// An opened container whose stream table has been read. At this point
/// FFmpeg knows the kind of container (e.g. MP4, MKV) and its metadata, but
/// hasn't decoded anything yet.
pub struct FfmpegSource {
    input_context: FFmpegInputFormatContext,
}

impl MediaSource for FfmpegSource {
    type Decoder = FfmpegDecoder;

    fn open(path: &Path) -> Result<Self, SetupError> {
        let input_context = ffmpeg::format::input(path).map_err(|err| {
            SetupError::OpenSource(Box::new(FfmpegCallError {
                call: "avformat_open_input",
                source: err,
            }))
        })?;

        Ok(Self { input_context })
    }

    fn open_video_decoder(self) -> Result<FfmpegDecoder, SetupError> {
        let input_context = self.input_context;

        // Containers can have multiple video streams; let FFmpeg pick the
        // one it thinks is best. Packets from every other stream get
        // ignored by index later.
        let (stream_index, frame_rate, parameters) = {
            let video_stream = input_context
                .streams()
                .best(FFmpegMediaType::Video)
                .ok_or_else(|| SetupError::OpenCodec(Box::new(MediaError::NoVideoStream)))?;

            let frame_rate: f64 = video_stream.avg_frame_rate().into();

            (video_stream.index(), frame_rate, video_stream.parameters())
        };

        let Some(frame_rate) = declared_frame_rate(frame_rate) else {
            return Err(SetupError::OpenCodec(Box::new(MediaError::NoFrameRate)));
        };

        // The codec context gathers what's needed for decoding this stream
        // (bitrate, resolution, pixel format); the decoder is the object
        // that actually turns packets into frames.
        let decoder_context = FFmpegCodecContext::from_parameters(parameters).map_err(|err| {
            SetupError::OpenCodec(Box::new(FfmpegCallError {
                call: "avcodec_parameters_to_context",
                source: err,
            }))
        })?;
        let decoder = decoder_context.decoder().video().map_err(|err| {
            SetupError::OpenCodec(Box::new(FfmpegCallError {
                call: "avcodec_open2",
                source: err,
            }))
        })?;

        let dimensions = Dimensions::new(decoder.width(), decoder.height()).ok_or_else(|| {
            SetupError::OpenCodec(Box::new(MediaError::ZeroLengthSide(
                decoder.width(),
                decoder.height(),
            )))
        })?;

        // If the stream decodes to something other than RGBA (it almost
        // always does), frames get run through a scaler on their way into a
        // slot.
        let converter = RgbaConverter::new(decoder.format(), dimensions)
            .map_err(|err| SetupError::OpenCodec(Box::new(err)))?;

        log::info!(
            "Opened video stream {stream_index}: {dimensions} @ {frame_rate:.2} fps, \
            decoding from {:?}.",
            decoder.format(),
        );

        Ok(FfmpegDecoder {
            input_context,
            decoder,
            converter,
            stream_index,
            flushed: false,
            info: StreamInfo {
                dimensions,
                frame_rate,
            },
        })
    }
}

/// A stream that doesn't declare a frame rate (raw/elementary streams) has
/// an `avg_frame_rate` of 0/0, which converts to NaN.
fn declared_frame_rate(rate: f64) -> Option<f64> {
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// The decode collaborator over FFmpeg. Owns the container handle, the
/// codec, and the RGBA converter; everything is released by [Drop] inside
/// the decode thread.
///
/// A packet of [None] is the end-of-stream marker: [Self::read_packet]
/// yields it exactly once when the container runs out, and decoding it
/// flushes the codec's buffered tail frames (see
/// `FFmpegVideoDecoder::send_eof`).
pub struct FfmpegDecoder {
    input_context: FFmpegInputFormatContext,
    decoder: FFmpegVideoDecoder,
    converter: RgbaConverter,
    stream_index: usize,
    /// Whether the end-of-stream marker has already been handed out.
    flushed: bool,
    info: StreamInfo,
}

impl StreamDecoder for FfmpegDecoder {
    type Packet = Option<FFmpegPacket>;
    type RawFrame = FFmpegVideoFrame;

    fn info(&self) -> StreamInfo {
        self.info
    }

    fn read_packet(&mut self) -> Result<Option<Option<FFmpegPacket>>, StreamError> {
        if self.flushed {
            return Ok(None);
        }

        let mut packet = FFmpegPacket::empty();
        loop {
            match packet.read(&mut self.input_context) {
                Ok(()) if packet.stream() == self.stream_index => {
                    return Ok(Some(Some(packet)));
                }
                // Another stream's packet (audio, subtitles); skip it.
                Ok(()) => {}
                Err(FFmpegError::Eof) => {
                    // No packets left: hand out the marker so the codec
                    // still gets told no more are coming.
                    self.flushed = true;
                    return Ok(Some(None));
                }
                Err(err) => return Err(StreamError::Io(Box::new(err))),
            }
        }
    }

    fn decode(
        &mut self,
        packet: &Option<FFmpegPacket>,
    ) -> Result<Vec<FFmpegVideoFrame>, StreamError> {
        let accepted = match packet {
            Some(packet) => self.decoder.send_packet(packet),
            None => self.decoder.send_eof(),
        };

        // A refused packet is a corrupt packet, not a dead stream: soft.
        if let Err(err) = accepted {
            return Err(StreamError::BadPacket(Box::new(err)));
        }

        // One packet can complete zero frames (codec latency) or several.
        let mut frames = Vec::new();
        let mut frame = FFmpegVideoFrame::empty();
        while self.decoder.receive_frame(&mut frame).is_ok() {
            let actual = Dimensions::new(frame.width(), frame.height());
            if actual != Some(self.info.dimensions) {
                return Err(StreamError::DimensionsChanged {
                    expected: self.info.dimensions,
                    actual: actual.unwrap_or(self.info.dimensions),
                });
            }

            frames.push(std::mem::replace(&mut frame, FFmpegVideoFrame::empty()));
        }

        Ok(frames)
    }

    fn convert_into(
        &mut self,
        frame: &FFmpegVideoFrame,
        dest: &mut [u8],
        stride_bytes: usize,
    ) -> Result<(), StreamError> {
        self.converter
            .convert_into(frame, dest, stride_bytes)
            .map_err(|err| StreamError::BadFrame(Box::new(err)))
    }
}
