//! Weighted merge of control templates

use crate::error::{MorphError, Result};
use crate::geometry::{ControlTemplate, FeaturePath, Point};
use crate::weights::WeightVector;

/// Image id given to interpolated templates
pub const INTERPOLATED_ID: &str = "interpolated";

/// Combine structurally identical templates point by point.
///
/// Every output point is `sum(weight_k * point_k)` over the templates at the
/// same path and point index. Templates whose topology differs from the first
/// are rejected; nothing is resampled or reindexed.
pub fn interpolate_templates(
    templates: &[&ControlTemplate],
    weights: &WeightVector,
) -> Result<ControlTemplate> {
    let first = *templates
        .first()
        .ok_or(MorphError::EmptyInput("templates"))?;

    if templates.len() != weights.len() {
        return Err(MorphError::StructuralMismatch(format!(
            "{} templates but {} weights",
            templates.len(),
            weights.len()
        )));
    }
    for t in &templates[1..] {
        first.check_topology(t)?;
    }

    let paths = first
        .paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let points = (0..path.points.len())
                .map(|j| {
                    templates
                        .iter()
                        .zip(weights.iter())
                        .fold(Point::default(), |acc, (t, w)| {
                            acc + t.paths[i].points[j] * w
                        })
                })
                .collect();
            FeaturePath {
                points,
                closed: path.closed,
            }
        })
        .collect();

    Ok(ControlTemplate::new(INTERPOLATED_ID, paths))
}
