//! Delaunay triangulation of anchor coordinates and simplex lookup
//!
//! The triangulation is built once per anchor set with the Bowyer-Watson
//! incremental algorithm. Instead of a finite bounding triangle, the outside
//! of the hull is covered by triangles through a vertex at infinity, so thin
//! or tiny anchor layouts triangulate the same way as well-spread ones. Each
//! query then walks the simplices and keeps the first one whose barycentric
//! weights put the query on or inside it.

use std::collections::HashSet;

use crate::barycentric::{barycentric, inside_or_on_boundary};
use crate::error::{MorphError, Result};
use crate::geometry::Point;
use crate::weights::NEGATIVE_TOLERANCE;

/// A simplex that contains a query, with the query's weights at its vertices
#[derive(Debug, Clone, PartialEq)]
pub struct SimplexHit {
    /// Index of the simplex in [`Triangulation::simplices`]
    pub simplex: usize,
    /// Anchor indices of the three corners
    pub vertices: [usize; 3],
    /// Barycentric weights, in the same order as `vertices`
    pub weights: [f64; 3],
}

/// Triangles over a point set, tiling its convex hull
#[derive(Debug, Clone)]
pub struct Triangulation {
    points: Vec<Point>,
    simplices: Vec<[usize; 3]>,
}

impl Triangulation {
    /// Compute the Delaunay triangulation of `points`
    pub fn delaunay(points: &[Point]) -> Result<Self> {
        let n = points.len();
        if n < 3 {
            return Err(MorphError::DegenerateGeometry(format!(
                "need at least 3 anchors to triangulate, got {}",
                n
            )));
        }
        if let Some(p) = points.iter().find(|p| !p.is_finite()) {
            return Err(MorphError::DegenerateGeometry(format!(
                "anchor ({}, {}) is not finite",
                p.x, p.y
            )));
        }
        for i in 0..n {
            for j in (i + 1)..n {
                if points[i] == points[j] {
                    return Err(MorphError::DegenerateGeometry(format!(
                        "anchors {} and {} share the coordinate ({}, {})",
                        i, j, points[i].x, points[i].y
                    )));
                }
            }
        }

        let [i0, i1, i2] = initial_triangle(points).ok_or_else(|| {
            MorphError::DegenerateGeometry("all anchors are collinear".to_string())
        })?;

        // Hull edges are closed off by triangles through GHOST, so no finite
        // bounding triangle can swallow a thin anchor layout.
        let mut triangles: Vec<[usize; 3]> =
            vec![[i0, i1, i2], [i1, i0, GHOST], [i2, i1, GHOST], [i0, i2, GHOST]];

        for (i, &p) in points.iter().enumerate() {
            if i == i0 || i == i1 || i == i2 {
                continue;
            }

            let (bad, good): (Vec<[usize; 3]>, Vec<[usize; 3]>) = triangles
                .into_iter()
                .partition(|tri| in_circumcircle(points, tri, p));
            if bad.is_empty() {
                return Err(MorphError::DegenerateGeometry(format!(
                    "anchor {} at ({}, {}) could not be inserted",
                    i, p.x, p.y
                )));
            }

            // Boundary of the cavity: directed edges whose reverse is not in it
            let cavity: HashSet<(usize, usize)> =
                bad.iter().flat_map(|tri| directed_edges(tri)).collect();

            triangles = good;
            for tri in &bad {
                for (a, b) in directed_edges(tri) {
                    if !cavity.contains(&(b, a)) {
                        triangles.push(ghost_last([a, b, i]));
                    }
                }
            }
        }

        let simplices: Vec<[usize; 3]> = triangles
            .into_iter()
            .filter(|tri| tri[2] != GHOST)
            .collect();

        if simplices.is_empty() {
            return Err(MorphError::DegenerateGeometry(
                "triangulation produced no triangles (anchors may be collinear)".to_string(),
            ));
        }

        Ok(Self {
            points: points.to_vec(),
            simplices,
        })
    }

    /// Use caller-provided simplices as-is
    pub fn from_simplices(points: Vec<Point>, simplices: Vec<[usize; 3]>) -> Result<Self> {
        if simplices.is_empty() {
            return Err(MorphError::EmptyInput("simplices"));
        }
        for tri in &simplices {
            if tri.iter().any(|&v| v >= points.len()) {
                return Err(MorphError::StructuralMismatch(format!(
                    "simplex {:?} references a missing anchor",
                    tri
                )));
            }
            barycentric(&[points[tri[0]], points[tri[1]], points[tri[2]]], points[tri[0]])?;
        }
        Ok(Self { points, simplices })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn simplices(&self) -> &[[usize; 3]] {
        &self.simplices
    }

    /// Corner coordinates of simplex `index`
    pub fn corners(&self, index: usize) -> [Point; 3] {
        let tri = self.simplices[index];
        [self.points[tri[0]], self.points[tri[1]], self.points[tri[2]]]
    }

    /// Find the simplex containing `q`.
    ///
    /// Points on a shared edge or vertex resolve to the first simplex in order.
    /// Queries outside the hull fail with [`MorphError::OutOfHull`].
    pub fn find_simplex(&self, q: Point) -> Result<SimplexHit> {
        for (index, &vertices) in self.simplices.iter().enumerate() {
            let weights = match barycentric(&self.corners(index), q) {
                Ok(w) => w,
                Err(_) => continue,
            };
            if inside_or_on_boundary(&weights, NEGATIVE_TOLERANCE) {
                return Ok(SimplexHit {
                    simplex: index,
                    vertices,
                    weights,
                });
            }
        }

        Err(MorphError::OutOfHull { x: q.x, y: q.y })
    }

    /// Index of the anchor closest to `q`, for callers that clamp
    pub fn nearest_vertex(&self, q: Point) -> usize {
        self.points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.distance(q)))
            .fold((0, f64::INFINITY), |best, cur| {
                if cur.1 < best.1 {
                    cur
                } else {
                    best
                }
            })
            .0
    }
}

/// Vertex at infinity shared by the triangles outside the hull
const GHOST: usize = usize::MAX;

/// Orientation results below this fraction of |b - a| * |p - a| count as collinear
const ORIENT_EPSILON: f64 = 1e-12;

/// Twice the signed area of (a, b, p): positive when p is left of a -> b
fn orientation(a: Point, b: Point, p: Point) -> f64 {
    let (ab, ap) = (b - a, p - a);
    let o = ab.x * ap.y - ab.y * ap.x;
    if o.abs() <= ORIENT_EPSILON * ab.norm() * ap.norm() {
        0.0
    } else {
        o
    }
}

/// First three non-collinear anchors, in counter-clockwise order
fn initial_triangle(points: &[Point]) -> Option<[usize; 3]> {
    let (a, b) = (points[0], points[1]);
    let k = (2..points.len()).find(|&k| orientation(a, b, points[k]) != 0.0)?;
    if orientation(a, b, points[k]) > 0.0 {
        Some([0, 1, k])
    } else {
        Some([0, k, 1])
    }
}

fn directed_edges(tri: &[usize; 3]) -> [(usize, usize); 3] {
    [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])]
}

/// Rotate a new triangle so GHOST, if present, is the last corner
fn ghost_last(tri: [usize; 3]) -> [usize; 3] {
    match tri {
        [GHOST, b, c] => [b, c, GHOST],
        [a, GHOST, c] => [c, a, GHOST],
        _ => tri,
    }
}

/// Whether `p` breaks the Delaunay condition of `tri`.
///
/// Real triangles are counter-clockwise and use the in-circle determinant.
/// A ghost triangle `[a, b, GHOST]` stands for the open half-plane left of
/// `a -> b` plus the open segment `ab`.
fn in_circumcircle(points: &[Point], tri: &[usize; 3], p: Point) -> bool {
    if tri[2] == GHOST {
        let (a, b) = (points[tri[0]], points[tri[1]]);
        let side = orientation(a, b, p);
        if side != 0.0 {
            return side > 0.0;
        }
        let t = (p - a).dot(b - a);
        return t > 0.0 && t < (b - a).dot(b - a);
    }

    let (a, b, c) = (points[tri[0]] - p, points[tri[1]] - p, points[tri[2]] - p);
    let det = a.dot(a) * (b.x * c.y - c.x * b.y) + b.dot(b) * (c.x * a.y - a.x * c.y)
        + c.dot(c) * (a.x * b.y - b.x * a.y);
    det > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ]
    }

    #[test]
    fn test_square_has_two_triangles() {
        let tri = Triangulation::delaunay(&square()).unwrap();
        assert_eq!(tri.simplices().len(), 2);
    }

    #[test]
    fn test_single_triangle() {
        let pts = vec![
            Point::new(25.0, 25.0),
            Point::new(225.0, 25.0),
            Point::new(125.0, 225.0),
        ];
        let tri = Triangulation::delaunay(&pts).unwrap();
        assert_eq!(tri.simplices().len(), 1);

        let hit = tri.find_simplex(Point::new(125.0, 100.0)).unwrap();
        assert!(hit.weights.iter().all(|&w| w > 0.0 && w < 1.0));
    }

    #[test]
    fn test_lookup_at_anchor_has_unit_weight() {
        let tri = Triangulation::delaunay(&square()).unwrap();
        for (i, &p) in square().iter().enumerate() {
            let hit = tri.find_simplex(p).unwrap();
            let k = hit.vertices.iter().position(|&v| v == i).unwrap();
            assert_relative_eq!(hit.weights[k], 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_simplices_tile_hull() {
        let tri = Triangulation::delaunay(&square()).unwrap();
        // interior points are covered by exactly one simplex
        for &(x, y) in &[(1.0, 2.0), (7.5, 3.0), (4.0, 9.0), (9.0, 8.5)] {
            let q = Point::new(x, y);
            let covering = (0..tri.simplices().len())
                .filter(|&i| {
                    let w = barycentric(&tri.corners(i), q).unwrap();
                    w.iter().all(|&w| w > 0.0)
                })
                .count();
            assert_eq!(covering, 1, "point ({}, {})", x, y);
        }
    }

    #[test]
    fn test_out_of_hull() {
        let tri = Triangulation::delaunay(&square()).unwrap();
        assert_eq!(
            tri.find_simplex(Point::new(-1.0, 5.0)).unwrap_err(),
            MorphError::OutOfHull { x: -1.0, y: 5.0 }
        );
        assert_eq!(tri.nearest_vertex(Point::new(-1.0, 9.0)), 3);
    }

    fn resolves_everywhere(tri: &Triangulation, queries: &[Point]) {
        for &q in queries {
            assert!(
                tri.find_simplex(q).is_ok(),
                "({}, {}) did not resolve",
                q.x,
                q.y
            );
        }
    }

    fn covered_area(tri: &Triangulation) -> f64 {
        (0..tri.simplices().len())
            .map(|i| {
                let [a, b, c] = tri.corners(i);
                let doubled = orientation(a, b, c);
                assert!(doubled > 0.0, "simplex {} is not counter-clockwise", i);
                doubled / 2.0
            })
            .sum()
    }

    #[test]
    fn test_sliver_triangle() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(50.0, 1.0),
        ];
        let tri = Triangulation::delaunay(&pts).unwrap();
        assert_eq!(tri.simplices().len(), 1);

        let hit = tri.find_simplex(Point::new(50.0, 0.5)).unwrap();
        let weight_of = |v: usize| hit.weights[hit.vertices.iter().position(|&k| k == v).unwrap()];
        assert_relative_eq!(weight_of(0), 0.25, epsilon = 1e-9);
        assert_relative_eq!(weight_of(1), 0.25, epsilon = 1e-9);
        assert_relative_eq!(weight_of(2), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_thin_rectangle_tiles_hull() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 1.0),
            Point::new(0.0, 1.0),
            Point::new(25.0, 0.5),
            Point::new(50.0, 0.3),
            Point::new(75.0, 0.6),
        ];
        let tri = Triangulation::delaunay(&pts).unwrap();
        assert_relative_eq!(covered_area(&tri), 100.0, epsilon = 1e-9);

        let queries: Vec<Point> = (0..=20)
            .flat_map(|i| {
                [0.0, 0.05, 0.5, 0.95, 1.0]
                    .into_iter()
                    .map(move |y| Point::new(i as f64 * 5.0, y))
            })
            .collect();
        resolves_everywhere(&tri, &queries);
        resolves_everywhere(&tri, &pts);
    }

    #[test]
    fn test_flat_arc_in_convex_position() {
        // every anchor sits on the hull of a very flat arc
        let pts: Vec<Point> = (0..=10)
            .map(|i| {
                let x = i as f64 * 10.0;
                Point::new(x, x * (100.0 - x) / 10_000.0)
            })
            .collect();
        let tri = Triangulation::delaunay(&pts).unwrap();
        assert_eq!(tri.simplices().len(), pts.len() - 2);

        let chords: Vec<Point> = (0..pts.len())
            .flat_map(|i| (i + 1..pts.len()).map(move |j| (i, j)))
            .map(|(i, j)| Point::new((pts[i].x + pts[j].x) / 2.0, (pts[i].y + pts[j].y) / 2.0))
            .collect();
        resolves_everywhere(&tri, &chords);

        for (i, &p) in pts.iter().enumerate() {
            let hit = tri.find_simplex(p).unwrap();
            let k = hit.vertices.iter().position(|&v| v == i).unwrap();
            assert_relative_eq!(hit.weights[k], 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_tiny_coordinates() {
        let scale = 1e-6;
        let pts: Vec<Point> = [(0.0, 0.0), (100.0, 0.0), (50.0, 1.0), (40.0, 0.5)]
            .iter()
            .map(|&(x, y)| Point::new(x * scale, y * scale))
            .collect();
        let tri = Triangulation::delaunay(&pts).unwrap();
        assert_eq!(tri.simplices().len(), 3);
        assert_relative_eq!(covered_area(&tri), 50.0 * scale * scale, max_relative = 1e-9);
        resolves_everywhere(&tri, &[Point::new(50.0 * scale, 0.2 * scale)]);
    }

    #[test]
    fn test_collinear_and_duplicate_rejected() {
        let line = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
        ];
        assert!(matches!(
            Triangulation::delaunay(&line),
            Err(MorphError::DegenerateGeometry(_))
        ));

        let dup = vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 0.0),
            Point::new(2.0, 1.0),
        ];
        assert!(Triangulation::delaunay(&dup).is_err());
    }

    #[test]
    fn test_from_simplices_validates_indices() {
        assert!(Triangulation::from_simplices(square(), vec![[0, 1, 4]]).is_err());
        let tri = Triangulation::from_simplices(square(), vec![[0, 1, 2], [0, 2, 3]]).unwrap();
        assert_eq!(tri.find_simplex(Point::new(2.0, 8.0)).unwrap().simplex, 1);
    }
}
