//! Inverse rendering of warped images
//!
//! The renderer walks the destination grid, asks the warp field where each
//! destination pixel comes from, and copies the sampled source pixel over.
//! Destination pixels whose source falls outside the source image are left
//! untouched.
//!
//! With `stride > 1` only every `stride`-th pixel is evaluated and the
//! corresponding `stride x stride` source block is copied, trading accuracy
//! for fewer warp evaluations.

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Add;
use tracing::debug;

use crate::error::{MorphError, Result};
use crate::geometry::{ControlTemplate, CorrespondenceSet, FeatureLine, Point};
use crate::sample::{in_bounds, sample, Sampling};
use crate::warp::{FeatureLineWarp, WarpParams};

const CHANNELS: usize = 4;

/// Grid and sampling options for one render pass
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RenderOptions {
    /// Evaluate the warp every `stride` pixels (1 = full resolution)
    #[serde(default = "default_stride")]
    pub stride: u32,
    #[serde(default)]
    pub sampling: Sampling,
    /// Shard block-rows across the rayon pool
    #[serde(default)]
    pub parallel: bool,
}

fn default_stride() -> u32 {
    1
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            stride: default_stride(),
            sampling: Sampling::default(),
            parallel: false,
        }
    }
}

impl RenderOptions {
    pub fn validate(&self) -> Result<()> {
        if self.stride == 0 {
            return Err(MorphError::invalid_parameter("stride", "must be >= 1"));
        }
        Ok(())
    }
}

/// Counts of grid samples that were written or skipped as out of bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub written: u64,
    pub skipped: u64,
}

impl Add for RenderStats {
    type Output = RenderStats;

    fn add(self, rhs: RenderStats) -> RenderStats {
        RenderStats {
            written: self.written + rhs.written,
            skipped: self.skipped + rhs.skipped,
        }
    }
}

/// Warp `src` into `dst` through `warp`.
///
/// `dst` is caller-owned; only pixels with an in-bounds source are written.
/// The pass runs on a copy of `dst` that replaces it only when every grid
/// sample succeeded, so on error `dst` is left exactly as it was.
pub fn render_warped(
    src: &RgbaImage,
    dst: &mut RgbaImage,
    warp: &FeatureLineWarp,
    options: &RenderOptions,
) -> Result<RenderStats> {
    options.validate()?;

    let (width, height) = dst.dimensions();
    if width == 0 || height == 0 {
        return Ok(RenderStats::default());
    }

    let stride = options.stride as usize;
    let block_bytes = width as usize * CHANNELS * stride;
    let mut scratch = dst.clone();
    let buf: &mut [u8] = &mut scratch;

    let render_block = |(block, chunk): (usize, &mut [u8])| {
        render_block_row(src, warp, options, chunk, (block * stride) as u32, width)
    };

    let stats = if options.parallel {
        buf.par_chunks_mut(block_bytes)
            .enumerate()
            .map(render_block)
            .try_reduce(RenderStats::default, |a, b| Ok(a + b))?
    } else {
        buf.chunks_mut(block_bytes)
            .enumerate()
            .map(render_block)
            .try_fold(RenderStats::default(), |acc, s| s.map(|s| acc + s))?
    };
    *dst = scratch;

    debug!(
        "Rendered {}x{} (stride {}, {}): {} written, {} out of bounds",
        width,
        height,
        options.stride,
        options.sampling.as_str(),
        stats.written,
        stats.skipped
    );

    Ok(stats)
}

/// Render one band of `stride` destination rows starting at `y0`
fn render_block_row(
    src: &RgbaImage,
    warp: &FeatureLineWarp,
    options: &RenderOptions,
    chunk: &mut [u8],
    y0: u32,
    width: u32,
) -> Result<RenderStats> {
    let (src_w, src_h) = src.dimensions();
    let row_bytes = width as usize * CHANNELS;
    let rows = chunk.len() / row_bytes;
    let stride = options.stride;
    let mut stats = RenderStats::default();

    for x0 in (0..width).step_by(stride as usize) {
        let from = warp.source_point(Point::new(x0 as f64, y0 as f64))?;

        if !in_bounds(src_w, src_h, from.x, from.y) {
            stats.skipped += 1;
            continue;
        }

        let cols = stride.min(width - x0);
        for dy in 0..rows {
            for dx in 0..cols {
                let sx = from.x + dx as f64;
                let sy = from.y + dy as f64;
                if let Some(pixel) = sample(src, sx, sy, options.sampling) {
                    let offset = dy * row_bytes + (x0 + dx) as usize * CHANNELS;
                    chunk[offset..offset + CHANNELS].copy_from_slice(&pixel);
                }
            }
        }
        stats.written += 1;
    }

    Ok(stats)
}

/// Resample every source toward one destination geometry.
///
/// Each source is paired with the template marked over it; the output buffers
/// are `width x height`, transparent wherever the warp left pixels unwritten.
pub fn render_sources(
    sources: &[(&RgbaImage, &ControlTemplate)],
    dest: &ControlTemplate,
    params: WarpParams,
    options: &RenderOptions,
    width: u32,
    height: u32,
) -> Result<Vec<RgbaImage>> {
    if sources.is_empty() {
        return Err(MorphError::EmptyInput("sources"));
    }

    sources
        .iter()
        .map(|(image, template)| {
            let lines = CorrespondenceSet::from_templates(dest, template)?;
            let warp = FeatureLineWarp::new(&lines, params)?;
            let mut out = RgbaImage::new(width, height);
            render_warped(image, &mut out, &warp, options)?;
            Ok(out)
        })
        .collect()
}

/// Draw feature lines on top of a rendered buffer
pub fn draw_feature_lines<I>(dst: &mut RgbaImage, lines: I, color: Rgba<u8>)
where
    I: IntoIterator<Item = FeatureLine>,
{
    for line in lines {
        draw_line_segment_mut(
            dst,
            (line.p.x as f32, line.p.y as f32),
            (line.q.x as f32, line.q.y as f32),
            color,
        );
    }
}
