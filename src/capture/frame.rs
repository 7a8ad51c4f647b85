//! Frame data structures for captured camera content

use image::{imageops, RgbaImage};

/// A captured frame from the camera feed
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the stream, starting at 0
    pub seq: u64,
    /// Capture time in clock milliseconds
    pub captured_at_ms: u64,
    /// RGBA pixel data
    pub image: RgbaImage,
    /// Focus score; higher is sharper
    pub sharpness: f64,
}

impl Frame {
    /// Create a frame and measure its sharpness
    pub fn new(seq: u64, captured_at_ms: u64, image: RgbaImage) -> Self {
        let sharpness = measure_sharpness(&image);
        Self {
            seq,
            captured_at_ms,
            image,
            sharpness,
        }
    }

    /// Override the measured sharpness
    pub fn with_sharpness(mut self, sharpness: f64) -> Self {
        self.sharpness = sharpness;
        self
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Variance of the Laplacian over the grayscale image.
///
/// In-focus text has strong edges and scores high; motion blur flattens the
/// Laplacian response towards zero. Images smaller than 3x3 score 0.
pub fn measure_sharpness(image: &RgbaImage) -> f64 {
    let (w, h) = image.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let gray = imageops::grayscale(image);
    let laplacian = imageproc::filter::laplacian_filter(&gray);

    let n = f64::from(w) * f64::from(h);
    let (sum, sum_sq) = laplacian.pixels().fold((0.0f64, 0.0f64), |(s, sq), p| {
        let v = f64::from(p.0[0]);
        (s + v, sq + v * v)
    });
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}
