//! 2D embedding of control templates (PCA over point coordinates)
//!
//! Each template is flattened into one row `[x0, y0, x1, y1, ...]`; the rows
//! form an `M x 2K` matrix whose two leading singular directions give each
//! template a coordinate in the plane. Templates that look alike land close
//! together, which is what the triangulation needs.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use image::RgbaImage;

use crate::error::{MorphError, Result};
use crate::geometry::{ControlTemplate, Point};
use crate::triangulation::Triangulation;

/// Options for the embedding projector
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Subtract the mean template before the decomposition
    #[serde(default = "default_center")]
    pub center: bool,
}

fn default_center() -> bool {
    true
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            center: default_center(),
        }
    }
}

/// A reference image placed in the embedding plane
#[derive(Debug, Clone)]
pub struct Anchor {
    pub coord: Point,
    pub template: ControlTemplate,
    pub image: Arc<RgbaImage>,
}

/// Project each template to 2D.
///
/// All templates must share one topology. The coordinates are the principal
/// component scores `U * S` of the two largest singular values; missing
/// components (fewer than two templates or points) are zero.
pub fn project(templates: &[&ControlTemplate], config: &EmbeddingConfig) -> Result<Vec<Point>> {
    let first = *templates
        .first()
        .ok_or(MorphError::EmptyInput("templates"))?;
    for t in &templates[1..] {
        first.check_topology(t)?;
    }

    let rows = templates.len();
    let cols = first.point_count() * 2;
    if cols == 0 {
        return Err(MorphError::EmptyInput("template points"));
    }

    let data: Vec<f64> = templates
        .iter()
        .flat_map(|t| t.points().flat_map(|p| [p.x, p.y]))
        .collect();
    let mut matrix = DMatrix::from_row_slice(rows, cols, &data);

    if config.center {
        for mut column in matrix.column_iter_mut() {
            let mean = column.mean();
            column.add_scalar_mut(-mean);
        }
    }

    let svd = matrix.svd(true, false);
    let u = svd.u.ok_or_else(|| {
        MorphError::DegenerateGeometry("singular value decomposition did not converge".into())
    })?;

    // order components by decreasing singular value
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| {
        svd.singular_values[b]
            .partial_cmp(&svd.singular_values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let score = |row: usize, component: usize| -> f64 {
        order
            .get(component)
            .map(|&k| u[(row, k)] * svd.singular_values[k])
            .unwrap_or(0.0)
    };

    let coords: Vec<Point> = (0..rows)
        .map(|r| Point::new(score(r, 0), score(r, 1)))
        .collect();

    debug!(
        "Projected {} templates ({} coordinates each) to 2D",
        rows, cols
    );

    Ok(coords)
}

/// Build one anchor per (image, template) pair and triangulate their coordinates
pub fn build_anchors(
    sources: Vec<(Arc<RgbaImage>, ControlTemplate)>,
    config: &EmbeddingConfig,
) -> Result<(Vec<Anchor>, Triangulation)> {
    let coords = {
        let templates: Vec<&ControlTemplate> = sources.iter().map(|(_, t)| t).collect();
        project(&templates, config)?
    };

    let triangulation = Triangulation::delaunay(&coords)?;

    let anchors = sources
        .into_iter()
        .zip(coords)
        .map(|((image, template), coord)| Anchor {
            coord,
            template,
            image,
        })
        .collect();

    Ok((anchors, triangulation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FeaturePath;
    use approx::assert_relative_eq;

    fn mouth(id: &str, open: f64, smile: f64) -> ControlTemplate {
        ControlTemplate::new(
            id,
            vec![FeaturePath::closed(vec![
                Point::new(126.0 - smile, 398.0 - smile),
                Point::new(200.0, 400.0 - open),
                Point::new(276.0 + smile, 398.0 - smile),
                Point::new(200.0, 400.0 + open),
            ])],
        )
    }

    #[test]
    fn test_centered_projection_is_zero_mean() {
        let a = mouth("a", 0.0, 0.0);
        let b = mouth("b", 40.0, 0.0);
        let c = mouth("c", 0.0, 30.0);
        let d = mouth("d", 40.0, 30.0);

        let coords = project(&[&a, &b, &c, &d], &EmbeddingConfig::default()).unwrap();
        assert_eq!(coords.len(), 4);
        let mean_x: f64 = coords.iter().map(|p| p.x).sum::<f64>() / 4.0;
        let mean_y: f64 = coords.iter().map(|p| p.y).sum::<f64>() / 4.0;
        assert_relative_eq!(mean_x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(mean_y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_projection_preserves_distances_in_plane() {
        // variation lives in a 2D subspace, so PCA keeps pairwise distances
        let a = mouth("a", 0.0, 0.0);
        let b = mouth("b", 40.0, 0.0);
        let c = mouth("c", 0.0, 30.0);

        let coords = project(&[&a, &b, &c], &EmbeddingConfig::default()).unwrap();
        let flat = |t: &ControlTemplate| -> Vec<f64> {
            t.points().flat_map(|p| [p.x, p.y]).collect()
        };
        let dist = |x: &[f64], y: &[f64]| -> f64 {
            x.iter()
                .zip(y)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt()
        };

        assert_relative_eq!(
            coords[0].distance(coords[1]),
            dist(&flat(&a), &flat(&b)),
            epsilon = 1e-6
        );
        assert_relative_eq!(
            coords[1].distance(coords[2]),
            dist(&flat(&b), &flat(&c)),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_mismatched_templates_rejected() {
        let a = mouth("a", 0.0, 0.0);
        let mut b = mouth("b", 1.0, 0.0);
        b.paths[0].closed = false;
        assert!(matches!(
            project(&[&a, &b], &EmbeddingConfig::default()),
            Err(MorphError::StructuralMismatch(_))
        ));
    }

    #[test]
    fn test_build_anchors_triangulates() {
        let image = Arc::new(RgbaImage::new(4, 4));
        let sources = vec![
            (image.clone(), mouth("a", 0.0, 0.0)),
            (image.clone(), mouth("b", 40.0, 0.0)),
            (image.clone(), mouth("c", 0.0, 30.0)),
            (image, mouth("d", 40.0, 30.0)),
        ];

        let (anchors, triangulation) =
            build_anchors(sources, &EmbeddingConfig::default()).unwrap();
        assert_eq!(anchors.len(), 4);
        assert_eq!(triangulation.simplices().len(), 2);
        assert_eq!(anchors[2].template.image_id, "c");

        // every anchor resolves to itself
        for (i, anchor) in anchors.iter().enumerate() {
            let hit = triangulation.find_simplex(anchor.coord).unwrap();
            assert!(hit.vertices.contains(&i));
        }
    }
}
