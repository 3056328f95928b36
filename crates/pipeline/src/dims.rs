//! Declares the [Dimensions] type, the fixed width/height of every frame in
//! a session.

use std::fmt::{self, Display, Formatter};
use std::num::NonZeroU32;

/// Bytes per pixel of the display format (RGBA8).
pub const BYTES_PER_PIXEL: usize = 4;

/// A width and a height, both guaranteed to be non-zero.
///
/// Frame dimensions are fixed for the lifetime of a session. A stream whose
/// dimensions change mid-playback is a fatal condition, not something a
/// session adapts to.
///
/// # Example
///
/// [From<(u32, u32)>] is implemented for [Dimensions]. If either side is
/// `0`, the thread will panic. [Into::into] should really only be used if
/// you're providing the side lengths as literals (e.g. `(1920, 1080).into()`).
///
/// ```
/// use pipeline::Dimensions;
///
/// let d: Dimensions = (1920, 1080).into();
/// assert_eq!(d.width(), 1920);
/// assert_eq!(d.height(), 1080);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    width: NonZeroU32,
    height: NonZeroU32,
}

impl Dimensions {
    /// Construct from a width and a height.
    ///
    /// This function will return [None] if the width or height are 0. Also
    /// see [Self::from_non_zero].
    pub const fn new(width: u32, height: u32) -> Option<Self> {
        let Some(width) = NonZeroU32::new(width) else {
            return None;
        };
        let Some(height) = NonZeroU32::new(height) else {
            return None;
        };

        Some(Self::from_non_zero(width, height))
    }

    /// Construct from a non-zero width and height.
    ///
    /// Unlike [Self::new], this function will always succeed (since
    /// [NonZeroU32] ensures the sides are both non-zero at compile time).
    pub const fn from_non_zero(width: NonZeroU32, height: NonZeroU32) -> Self {
        Self { width, height }
    }

    pub const fn width(&self) -> u32 {
        self.width.get()
    }

    pub const fn height(&self) -> u32 {
        self.height.get()
    }

    /// The row stride, in bytes, of a tightly packed RGBA8 frame with this
    /// width.
    pub const fn stride_bytes(&self) -> usize {
        self.width.get() as usize * BYTES_PER_PIXEL
    }

    /// The total size, in bytes, of one RGBA8 frame at these dimensions with
    /// the given row stride.
    ///
    /// `stride_bytes` must be at least [Self::stride_bytes] (rows may be
    /// padded, never truncated).
    pub const fn frame_bytes(&self, stride_bytes: usize) -> usize {
        stride_bytes * self.height.get() as usize
    }
}

impl From<(u32, u32)> for Dimensions {
    /// If either side length is `0`, this will panic.
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height).expect("Neither side length should be 0.")
    }
}

impl Display for Dimensions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sides_are_rejected() {
        assert!(Dimensions::new(0, 1080).is_none());
        assert!(Dimensions::new(1920, 0).is_none());
        assert!(Dimensions::new(0, 0).is_none());
        assert!(Dimensions::new(1920, 1080).is_some());
    }

    #[test]
    fn stride_and_frame_bytes() {
        let d = Dimensions::new(640, 480).unwrap();
        assert_eq!(d.stride_bytes(), 640 * 4);
        assert_eq!(d.frame_bytes(d.stride_bytes()), 640 * 4 * 480);

        // Padded rows grow the frame, they never shrink it.
        assert_eq!(d.frame_bytes(d.stride_bytes() + 64), (640 * 4 + 64) * 480);
    }
}
