//! Polymorph - feature-line morphing among N images
//!
//! Reference images are annotated with feature paths (control templates).
//! A destination geometry is interpolated from the templates of the blended
//! images, each image is warped onto that geometry with the Beier-Neely
//! multi-line field, and the warped buffers are composited with the same
//! weights. Anchors live in a 2D plane (chosen by hand or by a PCA
//! embedding); a query point picks its blend from the Delaunay simplex that
//! contains it.

pub mod barycentric;
pub mod composite;
pub mod config;
pub mod embedding;
pub mod error;
pub mod geometry;
pub mod interpolate;
pub mod render;
pub mod sample;
pub mod scheduler;
pub mod session;
pub mod triangulation;
pub mod warp;
pub mod weights;

pub use composite::{composite, CompositeMode};
pub use config::Config;
pub use embedding::{Anchor, EmbeddingConfig};
pub use error::{MorphError, Result};
pub use geometry::{
    ControlTemplate, Correspondence, CorrespondenceSet, FeatureLine, FeaturePath, Point,
};
pub use interpolate::interpolate_templates;
pub use render::{render_warped, RenderOptions, RenderStats};
pub use sample::Sampling;
pub use scheduler::{RenderScheduler, SchedulerStats};
pub use session::{FrameInfo, MorphSession, RenderSettings};
pub use triangulation::{SimplexHit, Triangulation};
pub use warp::{warp_point, FeatureLineWarp, WarpParams};
pub use weights::WeightVector;
