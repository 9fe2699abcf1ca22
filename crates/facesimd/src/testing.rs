//! Test doubles shared by the engine and HTTP tests.

use facesim_core::{BoundingBox, Embedding, ExtractorError, FaceExtractor};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Scene encoded in the top-left pixel: red = face count, green/blue =
/// embedding direction. `calls` counts every model invocation.
#[derive(Default, Clone)]
pub struct PixelScripted {
    pub calls: Arc<AtomicUsize>,
}

impl FaceExtractor for PixelScripted {
    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ExtractorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let count = image.get_pixel(0, 0).0[0] as usize;
        Ok((0..count)
            .map(|i| BoundingBox {
                x: i as f32 * 8.0,
                y: 0.0,
                width: 8.0,
                height: 8.0,
                confidence: 0.9,
                landmarks: None,
            })
            .collect())
    }

    fn embed(&mut self, image: &RgbImage, _: &BoundingBox) -> Result<Embedding, ExtractorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let [_, g, b] = image.get_pixel(0, 0).0;
        Ok(Embedding::new(vec![g as f32, b as f32]))
    }
}

/// PNG bytes of a scene for [`PixelScripted`].
pub fn png(faces: u8, g: u8, b: u8) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    RgbImage::from_pixel(16, 16, Rgb([faces, g, b]))
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn write_png(dir: &Path, name: &str, bytes: Vec<u8>) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
