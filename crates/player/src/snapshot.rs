//! Contains [SnapshotRenderer], a headless [Renderer] that counts presented
//! frames and can write every K-th one to disk as a PNG.

use std::fs;
use std::path::PathBuf;

use image::RgbaImage;

use pipeline::{BYTES_PER_PIXEL, Dimensions, Renderer, SetupError};

/// A renderer with no window: "presenting" packs the frame into the canvas
/// and, when snapshots are enabled, periodically saves it.
pub struct SnapshotRenderer {
    snapshots: Option<Snapshots>,
    frames_presented: u64,
}

struct Snapshots {
    dir: PathBuf,
    every: u64,
}

/// The stand-in for a display surface: a tightly-packed RGBA copy of the
/// most recently presented frame.
pub struct Canvas {
    dimensions: Dimensions,
    packed: Vec<u8>,
}

impl SnapshotRenderer {
    /// `every` is ignored unless `dir` is given.
    pub fn new(dir: Option<PathBuf>, every: u64) -> Self {
        Self {
            snapshots: dir.map(|dir| Snapshots { dir, every }),
            frames_presented: 0,
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

impl Renderer for SnapshotRenderer {
    type Surface = Canvas;

    fn create_surface(&mut self, dimensions: Dimensions) -> Result<Canvas, SetupError> {
        if let Some(snapshots) = &self.snapshots {
            fs::create_dir_all(&snapshots.dir)
                .map_err(|err| SetupError::CreateSurface(Box::new(err)))?;
        }

        Ok(Canvas {
            dimensions,
            packed: vec![0; dimensions.frame_bytes(dimensions.stride_bytes())],
        })
    }

    fn present(
        &mut self,
        canvas: &mut Canvas,
        pixels: &[u8],
        dimensions: Dimensions,
        stride_bytes: usize,
    ) {
        // Pack the (possibly padded) rows down to `width * 4` so the canvas
        // is directly encodable.
        let row_bytes = dimensions.width() as usize * BYTES_PER_PIXEL;
        for row in 0..dimensions.height() as usize {
            canvas.packed[row * row_bytes..(row + 1) * row_bytes]
                .copy_from_slice(&pixels[row * stride_bytes..row * stride_bytes + row_bytes]);
        }

        self.frames_presented += 1;

        if let Some(snapshots) = &self.snapshots
            && self.frames_presented % snapshots.every == 0
        {
            let path = snapshots
                .dir
                .join(format!("frame-{:06}.png", self.frames_presented));

            // A failed save shouldn't end playback.
            match RgbaImage::from_raw(
                canvas.dimensions.width(),
                canvas.dimensions.height(),
                canvas.packed.clone(),
            ) {
                Some(img) => {
                    if let Err(err) = img.save(&path) {
                        log::warn!("Failed to save {}: {err}", path.display());
                    }
                }
                None => log::warn!("Couldn't build an image from the presented frame."),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presenting_packs_padded_rows_and_counts() {
        let mut renderer = SnapshotRenderer::new(None, 1);
        let dims = Dimensions::new(1, 2).unwrap();
        let mut canvas = renderer.create_surface(dims).unwrap();

        // Rows of 4 image bytes padded to a stride of 6.
        let pixels = [1, 2, 3, 4, 0xEE, 0xEE, 5, 6, 7, 8, 0xEE, 0xEE];
        renderer.present(&mut canvas, &pixels, dims, 6);

        assert_eq!(canvas.packed, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(renderer.frames_presented(), 1);

        renderer.present(&mut canvas, &pixels, dims, 6);
        assert_eq!(renderer.frames_presented(), 2);
    }
}
