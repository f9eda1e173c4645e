//! Feature-line warp field (Beier-Neely)
//!
//! Every destination pixel is expressed relative to each destination feature
//! line as a pair `(u, v)`: `u` runs along the line (0 at `P`, 1 at `Q`) and `v`
//! is the signed perpendicular distance. The same `(u, v)` is then replayed
//! against the matching source line, and the per-line source candidates are
//! averaged with weights that favour long, nearby lines.

use serde::{Deserialize, Serialize};

use crate::error::{MorphError, Result};
use crate::geometry::{CorrespondenceSet, Point};

/// Shape parameters of the multi-line weighting
///
/// `weight = (length^p / (a + |v|))^b`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WarpParams {
    /// Line length influence (0 = all lines equal)
    #[serde(default = "default_p")]
    pub p: f64,
    /// Stabilizer, must be strictly positive
    #[serde(default = "default_a")]
    pub a: f64,
    /// Falloff sharpness with distance
    #[serde(default = "default_b")]
    pub b: f64,
}

fn default_p() -> f64 {
    0.5
}

fn default_a() -> f64 {
    1.0
}

fn default_b() -> f64 {
    2.0
}

impl Default for WarpParams {
    fn default() -> Self {
        Self {
            p: default_p(),
            a: default_a(),
            b: default_b(),
        }
    }
}

impl WarpParams {
    pub fn new(p: f64, a: f64, b: f64) -> Result<Self> {
        let params = Self { p, a, b };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.a.is_finite() || self.a <= 0.0 {
            return Err(MorphError::invalid_parameter(
                "a",
                format!("must be finite and > 0, got {}", self.a),
            ));
        }
        if !self.p.is_finite() {
            return Err(MorphError::invalid_parameter("p", "must be finite"));
        }
        if !self.b.is_finite() {
            return Err(MorphError::invalid_parameter("b", "must be finite"));
        }
        Ok(())
    }
}

/// Per-line values that do not depend on the destination pixel
#[derive(Debug, Clone, Copy)]
struct LineTerm {
    dest_p: Point,
    dest_dir: Point,
    dest_len: f64,
    /// `dest_len^p`, hoisted out of the pixel loop
    length_factor: f64,
    src_p: Point,
    src_dir: Point,
    src_len: f64,
}

/// A warp field ready to be evaluated at arbitrary destination points
#[derive(Debug, Clone)]
pub struct FeatureLineWarp {
    terms: Vec<LineTerm>,
    params: WarpParams,
}

impl FeatureLineWarp {
    /// Validate the parameters and precompute the per-line terms
    pub fn new(lines: &CorrespondenceSet, params: WarpParams) -> Result<Self> {
        params.validate()?;
        if lines.is_empty() {
            return Err(MorphError::EmptyInput("correspondence set"));
        }

        let terms = lines
            .pairs()
            .iter()
            .map(|c| {
                let dest_dir = c.dest.direction();
                let dest_len = dest_dir.norm();
                let src_dir = c.src.direction();
                LineTerm {
                    dest_p: c.dest.p,
                    dest_dir,
                    dest_len,
                    length_factor: dest_len.powf(params.p),
                    src_p: c.src.p,
                    src_dir,
                    src_len: src_dir.norm(),
                }
            })
            .collect();

        Ok(Self { terms, params })
    }

    pub fn params(&self) -> WarpParams {
        self.params
    }

    /// Map a destination point to the source coordinate it samples from
    pub fn source_point(&self, dest: Point) -> Result<Point> {
        let mut sum = Point::default();
        let mut weight_sum = 0.0;

        for t in &self.terms {
            let pd = dest - t.dest_p;
            let u = pd.dot(t.dest_dir) / (t.dest_len * t.dest_len);
            let v = pd.dot(t.dest_dir.perpendicular()) / t.dest_len;

            let source = t.src_p + t.src_dir * u + t.src_dir.perpendicular() * (v / t.src_len);
            let displacement = source - dest;

            let weight = (t.length_factor / (self.params.a + v.abs())).powf(self.params.b);

            sum = sum + displacement * weight;
            weight_sum += weight;
        }

        if !(weight_sum > 0.0) || !weight_sum.is_finite() {
            return Err(MorphError::ZeroTotalWeight {
                x: dest.x,
                y: dest.y,
            });
        }

        Ok(Point::new(
            dest.x + sum.x / weight_sum,
            dest.y + sum.y / weight_sum,
        ))
    }
}

/// One-shot evaluation of the warp field at `dest`
pub fn warp_point(lines: &CorrespondenceSet, dest: Point, params: WarpParams) -> Result<Point> {
    FeatureLineWarp::new(lines, params)?.source_point(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Correspondence, FeatureLine};
    use approx::assert_relative_eq;

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> FeatureLine {
        FeatureLine::new(Point::new(x0, y0), Point::new(x1, y1))
    }

    #[test]
    fn test_identity_line_maps_grid_to_itself() {
        let set = CorrespondenceSet::identity(line(3.0, 4.0, 12.0, 9.0)).unwrap();
        let warp = FeatureLineWarp::new(&set, WarpParams::default()).unwrap();

        for y in 0..16 {
            for x in 0..16 {
                let d = Point::new(x as f64, y as f64);
                let s = warp.source_point(d).unwrap();
                assert_relative_eq!(s.x, d.x, epsilon = 1e-9);
                assert_relative_eq!(s.y, d.y, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_translated_line_translates_points() {
        let set = CorrespondenceSet::new(vec![Correspondence {
            dest: line(0.0, 0.0, 10.0, 0.0),
            src: line(5.0, 2.0, 15.0, 2.0),
        }])
        .unwrap();

        let s = warp_point(&set, Point::new(3.0, 7.0), WarpParams::default()).unwrap();
        assert_relative_eq!(s.x, 8.0, epsilon = 1e-9);
        assert_relative_eq!(s.y, 9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rotated_line_rotates_offsets() {
        // dest along +x, source along +y: a quarter turn
        let set = CorrespondenceSet::new(vec![Correspondence {
            dest: line(0.0, 0.0, 10.0, 0.0),
            src: line(0.0, 0.0, 0.0, 10.0),
        }])
        .unwrap();

        let s = warp_point(&set, Point::new(5.0, 0.0), WarpParams::default()).unwrap();
        assert_relative_eq!(s.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(s.y, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_point_on_line_is_finite() {
        let set = CorrespondenceSet::new(vec![
            Correspondence {
                dest: line(0.0, 0.0, 10.0, 0.0),
                src: line(1.0, 1.0, 11.0, 1.0),
            },
            Correspondence {
                dest: line(0.0, 5.0, 0.0, 15.0),
                src: line(0.0, 5.0, 0.0, 15.0),
            },
        ])
        .unwrap();

        let params = WarpParams::new(0.0, 0.001, 2.0).unwrap();
        let s = warp_point(&set, Point::new(4.0, 0.0), params).unwrap();
        assert!(s.is_finite());
    }

    #[test]
    fn test_nonpositive_a_rejected() {
        assert!(matches!(
            WarpParams::new(0.5, 0.0, 2.0),
            Err(MorphError::InvalidParameter { name: "a", .. })
        ));
        assert!(WarpParams::new(0.5, -1.0, 2.0).is_err());
        assert!(WarpParams::new(0.5, f64::NAN, 2.0).is_err());

        let set = CorrespondenceSet::identity(line(0.0, 0.0, 1.0, 0.0)).unwrap();
        let bad = WarpParams {
            p: 0.5,
            a: 0.0,
            b: 2.0,
        };
        assert!(warp_point(&set, Point::new(0.5, 0.0), bad).is_err());
    }

    #[test]
    fn test_empty_set_rejected() {
        let set = CorrespondenceSet::new(Vec::new()).unwrap();
        assert_eq!(
            FeatureLineWarp::new(&set, WarpParams::default()).unwrap_err(),
            MorphError::EmptyInput("correspondence set")
        );
    }

    #[test]
    fn test_underflowing_weights_reported() {
        // every weight underflows to zero far away from the only line
        let set = CorrespondenceSet::identity(line(0.0, 0.0, 1.0, 0.0)).unwrap();
        let params = WarpParams::new(0.0, 1.0, 400.0).unwrap();
        assert!(matches!(
            warp_point(&set, Point::new(0.0, 1e6), params),
            Err(MorphError::ZeroTotalWeight { .. })
        ));
    }

    #[test]
    fn test_closer_line_dominates() {
        let set = CorrespondenceSet::new(vec![
            Correspondence {
                dest: line(0.0, 0.0, 10.0, 0.0),
                src: line(0.0, 0.0, 10.0, 0.0),
            },
            Correspondence {
                dest: line(0.0, 100.0, 10.0, 100.0),
                src: line(50.0, 100.0, 60.0, 100.0),
            },
        ])
        .unwrap();

        let s = warp_point(&set, Point::new(5.0, 1.0), WarpParams::default()).unwrap();
        // nearly identity: the far line barely contributes
        assert!((s.x - 5.0).abs() < 1.0);
    }
}
