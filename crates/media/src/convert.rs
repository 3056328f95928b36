//! Contains [RgbaConverter], which normalizes decoded frames to RGBA and
//! writes them straight into a slot's pixel buffer.

use ffmpeg::format::Pixel as FFmpegPixelFormat;
use ffmpeg::frame::Video as FFmpegVideoFrame;
use ffmpeg::software::scaling::Context as FFmpegScalingContext;
use ffmpeg::software::scaling::flag::Flags as FFmpegScalingFlags;
use ffmpeg_next as ffmpeg;

use pipeline::{BYTES_PER_PIXEL, Dimensions};

use crate::MediaError;

/// Converts decoded frames of one fixed format/size to RGBA.
///
/// For streams that already decode to RGBA there is no scaler and the frame
/// is copied directly. For everything else, one intermediate RGBA frame is
/// allocated up front and reused for every conversion, so steady-state
/// playback allocates nothing per frame.
pub struct RgbaConverter {
    scaler: Option<(FFmpegScalingContext, FFmpegVideoFrame)>,
    dimensions: Dimensions,
}

impl RgbaConverter {
    /// Create a converter from `format` at `dimensions` to RGBA at the same
    /// size.
    pub fn new(
        format: FFmpegPixelFormat,
        dimensions: Dimensions,
    ) -> Result<Self, MediaError> {
        let scaler = if format == FFmpegPixelFormat::RGBA {
            None
        } else {
            let scaler = FFmpegScalingContext::get(
                // Src. format:
                format,
                dimensions.width(),
                dimensions.height(),
                // Dest. format:
                FFmpegPixelFormat::RGBA,
                dimensions.width(),
                dimensions.height(),
                FFmpegScalingFlags::BILINEAR,
            )
            .map_err(MediaError::ScalerCreateFailure)?;

            let intermediate = FFmpegVideoFrame::new(
                FFmpegPixelFormat::RGBA,
                dimensions.width(),
                dimensions.height(),
            );

            Some((scaler, intermediate))
        };

        Ok(Self { scaler, dimensions })
    }

    /// Write `frame` into `dest` as RGBA rows `dest_stride` bytes apart.
    ///
    /// `frame` must have the converter's source format and dimensions.
    pub fn convert_into(
        &mut self,
        frame: &FFmpegVideoFrame,
        dest: &mut [u8],
        dest_stride: usize,
    ) -> Result<(), MediaError> {
        match &mut self.scaler {
            Some((scaler, intermediate)) => {
                scaler
                    .run(frame, intermediate)
                    .map_err(MediaError::ScaleFailure)?;
                copy_rows(
                    intermediate.data(0),
                    intermediate.stride(0),
                    dest,
                    dest_stride,
                    self.dimensions,
                )
            }
            None => copy_rows(frame.data(0), frame.stride(0), dest, dest_stride, self.dimensions),
        }
    }
}

/// SAFETY: The [ffmpeg::software::scaling::Context] type which we're storing
/// here *is* safe to send between threads; the bindings just don't mark it
/// [Send] (see https://github.com/zmwangx/rust-ffmpeg/issues/252). Nothing
/// aliases the underlying SwsContext but this struct.
unsafe impl Send for RgbaConverter {}

/// Copy `dimensions.height()` rows of RGBA pixels from `src` to `dest`,
/// where the two sides may pad their rows differently.
///
/// FFmpeg aligns its row strides for SIMD, so a frame's stride is often
/// wider than `width * 4`; only the leading `width * 4` bytes of each row
/// are image data.
pub(crate) fn copy_rows(
    src: &[u8],
    src_stride: usize,
    dest: &mut [u8],
    dest_stride: usize,
    dimensions: Dimensions,
) -> Result<(), MediaError> {
    let row_bytes = dimensions.width() as usize * BYTES_PER_PIXEL;
    let rows = dimensions.height() as usize;

    let src_needed = src_stride * (rows - 1) + row_bytes;
    if src.len() < src_needed {
        return Err(MediaError::SourceTooSmall {
            expected: src_needed,
            actual: src.len(),
        });
    }

    let dest_needed = dest_stride * (rows - 1) + row_bytes;
    if dest.len() < dest_needed {
        return Err(MediaError::DestinationTooSmall {
            expected: dest_needed,
            actual: dest.len(),
        });
    }

    for row in 0..rows {
        let src_start = row * src_stride;
        let dest_start = row * dest_stride;
        dest[dest_start..dest_start + row_bytes]
            .copy_from_slice(&src[src_start..src_start + row_bytes]);
    }

    Ok(())
}
