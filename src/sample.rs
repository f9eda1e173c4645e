//! Pixel sampling from RGBA source buffers

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// How a fractional source coordinate is turned into a pixel value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sampling {
    /// Round to the closest source pixel
    Nearest,
    /// Blend the four surrounding source pixels
    #[default]
    Bilinear,
}

impl Sampling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sampling::Nearest => "nearest",
            Sampling::Bilinear => "bilinear",
        }
    }
}

/// Round-off below zero that still counts as the first row/column
const EDGE_EPSILON: f64 = 1e-9;

/// Whether `(x, y)` lies inside `[0, width) x [0, height)`
#[inline]
pub fn in_bounds(width: u32, height: u32, x: f64, y: f64) -> bool {
    x >= -EDGE_EPSILON && x < width as f64 && y >= -EDGE_EPSILON && y < height as f64
}

/// Sample `src` at `(x, y)`, or `None` when the coordinate is outside the image
#[inline]
pub fn sample(src: &RgbaImage, x: f64, y: f64, mode: Sampling) -> Option<[u8; 4]> {
    let (width, height) = src.dimensions();
    if !in_bounds(width, height, x, y) {
        return None;
    }
    let (last_x, last_y) = (width - 1, height - 1);

    // float-to-int casts saturate, so the -EDGE_EPSILON margin lands on 0
    match mode {
        Sampling::Nearest => {
            let px = (x.round() as u32).min(last_x);
            let py = (y.round() as u32).min(last_y);
            Some(src.get_pixel(px, py).0)
        }
        Sampling::Bilinear => {
            let (x0, y0) = (x.floor() as u32, y.floor() as u32);
            let (x1, y1) = ((x0 + 1).min(last_x), (y0 + 1).min(last_y));
            let fx = (x - x0 as f64).clamp(0.0, 1.0);
            let fy = (y - y0 as f64).clamp(0.0, 1.0);

            let taps = [
                (src.get_pixel(x0, y0), (1.0 - fx) * (1.0 - fy)),
                (src.get_pixel(x1, y0), fx * (1.0 - fy)),
                (src.get_pixel(x0, y1), (1.0 - fx) * fy),
                (src.get_pixel(x1, y1), fx * fy),
            ];

            let mut out = [0u8; 4];
            for (c, value) in out.iter_mut().enumerate() {
                let v: f64 = taps.iter().map(|(p, w)| p[c] as f64 * w).sum();
                *value = v.round().clamp(0.0, 255.0) as u8;
            }
            Some(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient() -> RgbaImage {
        RgbaImage::from_fn(2, 2, |x, y| Rgba([(x * 100) as u8, (y * 200) as u8, 7, 255]))
    }

    #[test]
    fn test_out_of_bounds_is_none() {
        let img = gradient();
        assert!(sample(&img, -0.1, 0.0, Sampling::Nearest).is_none());
        assert!(sample(&img, 0.0, 2.0, Sampling::Bilinear).is_none());
        assert!(sample(&img, 2.0, 0.0, Sampling::Bilinear).is_none());
        assert!(sample(&img, f64::NAN, 0.0, Sampling::Nearest).is_none());
    }

    #[test]
    fn test_nearest_rounds() {
        let img = gradient();
        assert_eq!(
            sample(&img, 0.6, 0.2, Sampling::Nearest),
            Some([100, 0, 7, 255])
        );
        // rounding past the last column stays on the edge
        assert_eq!(
            sample(&img, 1.9, 1.9, Sampling::Nearest),
            Some([100, 200, 7, 255])
        );
    }

    #[test]
    fn test_round_off_below_zero_hits_first_pixel() {
        let img = gradient();
        for mode in [Sampling::Nearest, Sampling::Bilinear] {
            assert_eq!(sample(&img, -1e-10, -1e-10, mode), Some([0, 0, 7, 255]));
        }
        assert!(sample(&img, -1e-6, 0.0, Sampling::Bilinear).is_none());
    }

    #[test]
    fn test_bilinear_midpoint() {
        let img = gradient();
        assert_eq!(
            sample(&img, 0.5, 0.5, Sampling::Bilinear),
            Some([50, 100, 7, 255])
        );
        assert_eq!(
            sample(&img, 1.0, 0.0, Sampling::Bilinear),
            Some([100, 0, 7, 255])
        );
    }
}
