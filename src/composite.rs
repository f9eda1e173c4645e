//! Weighted compositing of resampled buffers
//!
//! Two compositing laws are provided:
//!
//! - [`CompositeMode::Analytic`] (default): `out = sum(weight_k * buffer_k)` for
//!   every channel, alpha included.
//! - [`CompositeMode::SequentialOver`]: each buffer is drawn in turn with
//!   "source-over" at an opacity equal to its weight, blending with whatever
//!   has been accumulated so far. This reproduces a canvas that draws the
//!   images one after another with a global alpha; it only agrees with the
//!   analytic law for special inputs.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::{MorphError, Result};
use crate::weights::WeightVector;

const CHANNELS: usize = 4;

/// Compositing law used to merge the warped sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompositeMode {
    /// Per-pixel weighted sum
    #[default]
    Analytic,
    /// Successive source-over draws at per-image opacity
    SequentialOver,
}

impl CompositeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompositeMode::Analytic => "analytic",
            CompositeMode::SequentialOver => "sequential-over",
        }
    }
}

/// Blend `buffers` into `out` with one weight per buffer.
///
/// All buffers and `out` must share the same dimensions.
pub fn composite(
    buffers: &[&RgbaImage],
    weights: &WeightVector,
    mode: CompositeMode,
    out: &mut RgbaImage,
) -> Result<()> {
    if buffers.is_empty() {
        return Err(MorphError::EmptyInput("buffers"));
    }
    if buffers.len() != weights.len() {
        return Err(MorphError::StructuralMismatch(format!(
            "{} buffers but {} weights",
            buffers.len(),
            weights.len()
        )));
    }

    let expected = out.dimensions();
    for b in buffers {
        if b.dimensions() != expected {
            return Err(MorphError::SizeMismatch {
                expected,
                actual: b.dimensions(),
            });
        }
    }

    let out_data: &mut [u8] = &mut **out;
    match mode {
        CompositeMode::Analytic => composite_analytic(buffers, weights, out_data),
        CompositeMode::SequentialOver => composite_sequential(buffers, weights, out_data),
    }

    Ok(())
}

fn composite_analytic(buffers: &[&RgbaImage], weights: &WeightVector, out: &mut [u8]) {
    for (i, value) in out.iter_mut().enumerate() {
        let sum: f64 = buffers
            .iter()
            .zip(weights.iter())
            .map(|(b, w)| w * b.as_raw()[i] as f64)
            .sum();
        *value = sum.round().clamp(0.0, 255.0) as u8;
    }
}

fn composite_sequential(buffers: &[&RgbaImage], weights: &WeightVector, out: &mut [u8]) {
    for (i, pixel) in out.chunks_exact_mut(CHANNELS).enumerate() {
        let offset = i * CHANNELS;
        // start from a cleared canvas
        let mut color = [0.0f64; 3];
        let mut alpha = 0.0f64;

        for (b, w) in buffers.iter().zip(weights.iter()) {
            let src = &b.as_raw()[offset..offset + CHANNELS];
            let src_alpha = w * src[3] as f64 / 255.0;
            if src_alpha <= 0.0 {
                continue;
            }

            let out_alpha = src_alpha + alpha * (1.0 - src_alpha);
            for (c, dst) in color.iter_mut().enumerate() {
                *dst = (src[c] as f64 * src_alpha + *dst * alpha * (1.0 - src_alpha)) / out_alpha;
            }
            alpha = out_alpha;
        }

        for c in 0..3 {
            pixel[c] = color[c].round().clamp(0.0, 255.0) as u8;
        }
        pixel[3] = (alpha * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}
