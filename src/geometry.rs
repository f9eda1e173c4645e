//! Feature geometry: points, feature lines, control templates and correspondences
//!
//! A [`ControlTemplate`] is the set of feature paths drawn over one image.
//! Two templates with the same topology can be paired segment by segment into
//! a [`CorrespondenceSet`], which drives the warp field.

use serde::Serialize;
use std::ops::{Add, Mul, Sub};

use crate::error::{MorphError, Result};

/// A 2D point in pixel coordinates
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn dot(self, other: Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Clockwise perpendicular, `(y, -x)`
    #[inline]
    pub fn perpendicular(self) -> Point {
        Point::new(self.y, -self.x)
    }

    #[inline]
    pub fn norm(self) -> f64 {
        self.x.hypot(self.y)
    }

    #[inline]
    pub fn distance(self, other: Point) -> f64 {
        (self - other).norm()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point::new(x, y)
    }
}

impl Add for Point {
    type Output = Point;

    #[inline]
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    #[inline]
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    #[inline]
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

/// A directed line segment from `p` to `q`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureLine {
    pub p: Point,
    pub q: Point,
}

impl FeatureLine {
    pub fn new(p: Point, q: Point) -> Self {
        Self { p, q }
    }

    /// Vector from `p` to `q`
    #[inline]
    pub fn direction(&self) -> Point {
        self.q - self.p
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.direction().norm()
    }
}

/// An ordered point sequence, drawn either as an open polyline or a closed shape
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePath {
    pub points: Vec<Point>,
    pub closed: bool,
}

impl FeaturePath {
    pub fn open(points: Vec<Point>) -> Self {
        Self {
            points,
            closed: false,
        }
    }

    pub fn closed(points: Vec<Point>) -> Self {
        Self {
            points,
            closed: true,
        }
    }

    /// Consecutive segments of the path, plus the closing segment for closed paths
    pub fn segments(&self) -> impl Iterator<Item = FeatureLine> + '_ {
        let n = self.points.len();
        let count = match n {
            0 | 1 => 0,
            _ if self.closed => n,
            _ => n - 1,
        };
        (0..count).map(move |i| FeatureLine::new(self.points[i], self.points[(i + 1) % n]))
    }
}

/// Feature paths marked over one image
#[derive(Debug, Clone, PartialEq)]
pub struct ControlTemplate {
    /// Identifier of the image these paths belong to
    pub image_id: String,
    pub paths: Vec<FeaturePath>,
}

impl ControlTemplate {
    pub fn new(image_id: impl Into<String>, paths: Vec<FeaturePath>) -> Self {
        Self {
            image_id: image_id.into(),
            paths,
        }
    }

    /// Total number of points across all paths
    pub fn point_count(&self) -> usize {
        self.paths.iter().map(|p| p.points.len()).sum()
    }

    /// All points in path order
    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.paths.iter().flat_map(|p| p.points.iter())
    }

    /// Check that `other` has the same path count, point counts and open/closed flags
    pub fn check_topology(&self, other: &ControlTemplate) -> Result<()> {
        if self.paths.len() != other.paths.len() {
            return Err(MorphError::StructuralMismatch(format!(
                "template `{}` has {} paths, `{}` has {}",
                self.image_id,
                self.paths.len(),
                other.image_id,
                other.paths.len()
            )));
        }

        for (i, (a, b)) in self.paths.iter().zip(&other.paths).enumerate() {
            if a.points.len() != b.points.len() {
                return Err(MorphError::StructuralMismatch(format!(
                    "path {} has {} points in `{}` but {} in `{}`",
                    i,
                    a.points.len(),
                    self.image_id,
                    b.points.len(),
                    other.image_id
                )));
            }
            if a.closed != b.closed {
                return Err(MorphError::StructuralMismatch(format!(
                    "path {} is {} in `{}` but {} in `{}`",
                    i,
                    if a.closed { "closed" } else { "open" },
                    self.image_id,
                    if b.closed { "closed" } else { "open" },
                    other.image_id
                )));
            }
        }

        Ok(())
    }

    /// Return a copy whose topology matches `reference`.
    ///
    /// Extra paths and points are dropped; missing ones are copied from the
    /// reference at their reference position. The open/closed flag follows the
    /// reference.
    pub fn conform_to(&self, reference: &ControlTemplate) -> ControlTemplate {
        let paths = reference
            .paths
            .iter()
            .enumerate()
            .map(|(i, ref_path)| match self.paths.get(i) {
                Some(ours) => {
                    let mut points: Vec<Point> = ours
                        .points
                        .iter()
                        .take(ref_path.points.len())
                        .copied()
                        .collect();
                    points.extend(ref_path.points.iter().skip(points.len()).copied());
                    FeaturePath {
                        points,
                        closed: ref_path.closed,
                    }
                }
                None => ref_path.clone(),
            })
            .collect();

        ControlTemplate {
            image_id: self.image_id.clone(),
            paths,
        }
    }
}

/// One destination line paired with the source line it samples from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub dest: FeatureLine,
    pub src: FeatureLine,
}

/// Ordered (destination, source) line pairs driving one warp
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceSet {
    pairs: Vec<Correspondence>,
}

impl CorrespondenceSet {
    /// Build a set from explicit pairs, rejecting zero-length lines
    pub fn new(pairs: Vec<Correspondence>) -> Result<Self> {
        for (i, pair) in pairs.iter().enumerate() {
            if !(pair.dest.length() > 0.0) {
                return Err(MorphError::DegenerateGeometry(format!(
                    "destination line {} has zero length",
                    i
                )));
            }
            if !(pair.src.length() > 0.0) {
                return Err(MorphError::DegenerateGeometry(format!(
                    "source line {} has zero length",
                    i
                )));
            }
        }
        Ok(Self { pairs })
    }

    /// Pair the segments of a destination template with those of a source template
    pub fn from_templates(dest: &ControlTemplate, src: &ControlTemplate) -> Result<Self> {
        dest.check_topology(src)?;

        let pairs = dest
            .paths
            .iter()
            .zip(&src.paths)
            .flat_map(|(d, s)| {
                d.segments()
                    .zip(s.segments())
                    .map(|(dest, src)| Correspondence { dest, src })
            })
            .collect();

        Self::new(pairs)
    }

    /// Single-line identity set, handy for plain cross-dissolves
    pub fn identity(line: FeatureLine) -> Result<Self> {
        Self::new(vec![Correspondence {
            dest: line,
            src: line,
        }])
    }

    pub fn pairs(&self) -> &[Correspondence] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Destination lines, in order
    pub fn dest_lines(&self) -> impl Iterator<Item = FeatureLine> + '_ {
        self.pairs.iter().map(|c| c.dest)
    }
}
