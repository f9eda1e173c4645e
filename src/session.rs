//! Morphing session: anchors, their triangulation and the render pipeline
//!
//! A session is built once from the reference images and their templates and
//! is immutable afterwards. Rendering a query is a pure function of the
//! session and the query: the same inputs always produce the same buffer.

use image::RgbaImage;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::composite::{composite, CompositeMode};
use crate::embedding::{build_anchors, Anchor, EmbeddingConfig};
use crate::error::{MorphError, Result};
use crate::geometry::{ControlTemplate, Point};
use crate::interpolate::interpolate_templates;
use crate::render::{render_sources, RenderOptions};
use crate::triangulation::Triangulation;
use crate::warp::WarpParams;
use crate::weights::WeightVector;

/// Anchor layout of the three-image demo: a triangle with the cursor inside
pub const DEMO_TRIANGLE: [Point; 3] = [
    Point::new(25.0, 25.0),
    Point::new(225.0, 25.0),
    Point::new(125.0, 225.0),
];

/// Parameters shared by every render of a session
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderSettings {
    pub warp: WarpParams,
    pub render: RenderOptions,
    pub composite: CompositeMode,
}

/// What a render selected, for the caller to display or highlight
#[derive(Debug, Clone, Serialize)]
pub struct FrameInfo {
    /// Anchor indices that took part in the blend
    pub anchors: Vec<usize>,
    /// Weight of each of those anchors
    pub weights: WeightVector,
    /// Index of the containing simplex, for embedding queries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simplex: Option<usize>,
}

/// Anchors plus the triangulation over their coordinates
#[derive(Debug, Clone)]
pub struct MorphSession {
    anchors: Vec<Anchor>,
    triangulation: Triangulation,
    settings: RenderSettings,
    width: u32,
    height: u32,
}

impl MorphSession {
    /// Session over anchors whose coordinates were chosen by the caller
    pub fn new(anchors: Vec<Anchor>, settings: RenderSettings) -> Result<Self> {
        let coords: Vec<Point> = anchors.iter().map(|a| a.coord).collect();
        let triangulation = Triangulation::delaunay(&coords)?;
        Self::with_triangulation(anchors, triangulation, settings)
    }

    /// Session whose anchor coordinates come from the embedding projector
    pub fn from_embedding(
        sources: Vec<(Arc<RgbaImage>, ControlTemplate)>,
        embedding: &EmbeddingConfig,
        settings: RenderSettings,
    ) -> Result<Self> {
        let (anchors, triangulation) = build_anchors(sources, embedding)?;
        Self::with_triangulation(anchors, triangulation, settings)
    }

    pub fn with_triangulation(
        anchors: Vec<Anchor>,
        triangulation: Triangulation,
        settings: RenderSettings,
    ) -> Result<Self> {
        settings.warp.validate()?;
        settings.render.validate()?;

        let first = anchors.first().ok_or(MorphError::EmptyInput("anchors"))?;
        let (width, height) = first.image.dimensions();
        for anchor in &anchors[1..] {
            first.template.check_topology(&anchor.template)?;
        }
        if triangulation.points().len() != anchors.len() {
            return Err(MorphError::StructuralMismatch(format!(
                "triangulation has {} points for {} anchors",
                triangulation.points().len(),
                anchors.len()
            )));
        }

        info!(
            "Morph session: {} anchors, {} simplices, output {}x{}",
            anchors.len(),
            triangulation.simplices().len(),
            width,
            height
        );

        Ok(Self {
            anchors,
            triangulation,
            settings,
            width,
            height,
        })
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    pub fn triangulation(&self) -> &Triangulation {
        &self.triangulation
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Output dimensions (those of the first anchor image)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Locate `query` in the anchor triangulation and return the blend it implies
    pub fn weights_at(&self, query: Point) -> Result<FrameInfo> {
        let hit = self.triangulation.find_simplex(query)?;
        Ok(FrameInfo {
            anchors: hit.vertices.to_vec(),
            weights: WeightVector::from_barycentric(hit.weights)?,
            simplex: Some(hit.simplex),
        })
    }

    /// Render the morph at an embedding-space `query` into `out`.
    ///
    /// Queries outside the anchor hull fail with [`MorphError::OutOfHull`];
    /// clamping (e.g. to [`Triangulation::nearest_vertex`]) is up to the caller.
    pub fn render(&self, query: Point, out: &mut RgbaImage) -> Result<FrameInfo> {
        let info = self.weights_at(query)?;
        self.render_blend(&info.anchors, &info.weights, out)?;
        debug!(
            "Rendered query ({:.1}, {:.1}) with anchors {:?} weights {:?}",
            query.x,
            query.y,
            info.anchors,
            info.weights.as_slice()
        );
        Ok(info)
    }

    /// Blend the given anchors with explicit weights into `out`.
    ///
    /// Geometry is interpolated first, then every anchor image is warped to
    /// the interpolated geometry and the warped buffers are composited.
    pub fn render_blend(
        &self,
        indices: &[usize],
        weights: &WeightVector,
        out: &mut RgbaImage,
    ) -> Result<()> {
        if out.dimensions() != (self.width, self.height) {
            return Err(MorphError::SizeMismatch {
                expected: (self.width, self.height),
                actual: out.dimensions(),
            });
        }

        let selected = indices
            .iter()
            .map(|&i| {
                self.anchors.get(i).ok_or_else(|| {
                    MorphError::StructuralMismatch(format!(
                        "anchor {} out of range ({} anchors)",
                        i,
                        self.anchors.len()
                    ))
                })
            })
            .collect::<Result<Vec<&Anchor>>>()?;

        let templates: Vec<&ControlTemplate> = selected.iter().map(|a| &a.template).collect();
        let geometry = interpolate_templates(&templates, weights)?;

        let sources: Vec<(&RgbaImage, &ControlTemplate)> = selected
            .iter()
            .map(|a| (a.image.as_ref(), &a.template))
            .collect();
        let warped = render_sources(
            &sources,
            &geometry,
            self.settings.warp,
            &self.settings.render,
            self.width,
            self.height,
        )?;

        let buffers: Vec<&RgbaImage> = warped.iter().collect();
        composite(&buffers, weights, self.settings.composite, out)
    }
}
