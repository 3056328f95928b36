//! Contains [RenderConsumer], the caller-driven step that hands published
//! frames to the [Renderer] collaborator.

use crate::decode::Renderer;
use crate::ring::FrameReader;

/// The consume side of the pipeline. Invoked once per caller tick; never
/// blocks and never does decode or conversion work itself, so a slow decode
/// shows a stale frame instead of stalling the display.
#[derive(Debug)]
pub struct RenderConsumer {
    reader: FrameReader,
}

impl RenderConsumer {
    pub fn new(reader: FrameReader) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &FrameReader {
        &self.reader
    }

    /// Present the next published frame, if there is one.
    ///
    /// Returns whether a new frame was handed to the renderer. `false` is
    /// the steady-state "nothing new yet" answer, not a failure; the caller
    /// should keep showing the previously presented image.
    pub fn tick<R: Renderer>(&mut self, renderer: &mut R, surface: &mut R::Surface) -> bool {
        let Some(slot) = self.reader.acquire_read_slot() else {
            return false;
        };

        renderer.present(surface, slot.pixels(), slot.dimensions(), slot.stride_bytes());
        slot.release();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::SetupError;
    use crate::dims::Dimensions;
    use crate::ring::{self, BackpressurePolicy};

    /// Records every frame it's asked to present.
    struct RecordingRenderer {
        presented: Vec<(u8, usize)>,
    }

    struct NullSurface;

    impl Renderer for RecordingRenderer {
        type Surface = NullSurface;

        fn create_surface(&mut self, _: Dimensions) -> Result<NullSurface, SetupError> {
            Ok(NullSurface)
        }

        fn present(
            &mut self,
            _: &mut NullSurface,
            pixels: &[u8],
            _: Dimensions,
            stride_bytes: usize,
        ) {
            self.presented.push((pixels[0], stride_bytes));
        }
    }

    #[test]
    fn tick_presents_in_order_and_reports_idle_ticks() {
        let dims = Dimensions::new(4, 2).unwrap();
        let (writer, reader) =
            ring::with_slot_count(dims, 4, BackpressurePolicy::Block).unwrap();

        let mut renderer = RecordingRenderer {
            presented: Vec::new(),
        };
        let mut surface = renderer.create_surface(dims).unwrap();
        let mut consumer = RenderConsumer::new(reader);

        // Nothing published yet: a tick is a cheap no-op.
        assert!(!consumer.tick(&mut renderer, &mut surface));

        for fill in [10u8, 20, 30] {
            let mut slot = writer.acquire_write_slot().unwrap();
            slot.pixels_mut().fill(fill);
            slot.publish();
        }

        assert!(consumer.tick(&mut renderer, &mut surface));
        assert!(consumer.tick(&mut renderer, &mut surface));
        assert!(consumer.tick(&mut renderer, &mut surface));
        assert!(!consumer.tick(&mut renderer, &mut surface));

        assert_eq!(
            renderer.presented,
            vec![(10, dims.stride_bytes()), (20, dims.stride_bytes()), (30, dims.stride_bytes())]
        );
    }
}
