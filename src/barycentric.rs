//! Barycentric weights of a point relative to a reference triangle

use crate::error::{MorphError, Result};
use crate::geometry::Point;

/// Determinants below this fraction of the product of two edge lengths are collinear
pub const COLLINEAR_EPSILON: f64 = 1e-12;

/// Solve `q = w1*t1 + w2*t2 + w3*t3` with `w1 + w2 + w3 = 1`.
///
/// Weights outside `[0, 1]` mean `q` lies outside the triangle. Collinear
/// triangles have no solution and yield [`MorphError::DegenerateGeometry`].
pub fn barycentric(triangle: &[Point; 3], q: Point) -> Result<[f64; 3]> {
    let [t1, t2, t3] = *triangle;

    let det = (t2.y - t3.y) * (t1.x - t3.x) + (t3.x - t2.x) * (t1.y - t3.y);
    // relative to the edge lengths, so tiny and huge triangles are judged alike
    let scale = (t1 - t3).norm() * (t2 - t3).norm();
    if !(det.abs() > COLLINEAR_EPSILON * scale) {
        return Err(MorphError::DegenerateGeometry(format!(
            "triangle ({}, {}), ({}, {}), ({}, {}) is collinear",
            t1.x, t1.y, t2.x, t2.y, t3.x, t3.y
        )));
    }

    let w1 = ((t2.y - t3.y) * (q.x - t3.x) + (t3.x - t2.x) * (q.y - t3.y)) / det;
    let w2 = ((t3.y - t1.y) * (q.x - t3.x) + (t1.x - t3.x) * (q.y - t3.y)) / det;

    Ok([w1, w2, 1.0 - w1 - w2])
}

/// Strict containment: every weight in the open interval `(0, 1)`
pub fn strictly_inside(weights: &[f64; 3]) -> bool {
    weights.iter().all(|&w| w > 0.0 && w < 1.0)
}

/// Containment that also accepts the boundary, up to `tolerance`
pub fn inside_or_on_boundary(weights: &[f64; 3], tolerance: f64) -> bool {
    weights
        .iter()
        .all(|&w| w >= -tolerance && w <= 1.0 + tolerance)
}

/// Whether `q` lies strictly inside `triangle`
pub fn contains(triangle: &[Point; 3], q: Point) -> Result<bool> {
    barycentric(triangle, q).map(|w| strictly_inside(&w))
}
