//! Polymorph - feature-line morphing from the command line
//!
//! `warp` moves one image from one set of feature paths to another, `blend`
//! mixes N annotated images with explicit weights, and `morph` places the
//! images in a plane and renders the blend picked by a query point.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use image::{DynamicImage, Rgba, RgbaImage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use polymorph::embedding::Anchor;
use polymorph::render::{draw_feature_lines, render_sources};
use polymorph::session::DEMO_TRIANGLE;
use polymorph::{
    composite, interpolate_templates, render_warped, CompositeMode, Config, ControlTemplate,
    CorrespondenceSet, FeatureLineWarp, FeaturePath, FrameInfo, MorphError, MorphSession, Point,
    RenderScheduler, Sampling, WeightVector,
};

/// Polymorph - Beier-Neely warping and blending among N images
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file path
    #[arg(short, long, default_value = "polymorph.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Warp one image so that its `--src` paths move onto the `--dst` paths
    Warp {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Feature paths over the input, e.g. "10,10 90,10 90,90 z; 20,50 80,50"
        #[arg(long)]
        src: String,

        /// Destination feature paths, same topology as `--src`
        #[arg(long)]
        dst: String,

        #[command(flatten)]
        render: RenderOverrides,

        /// Draw the destination lines over the result
        #[arg(long)]
        show_lines: bool,
    },

    /// Blend annotated images with explicit weights
    Blend {
        #[command(flatten)]
        sources: SourceArgs,

        /// One weight per image, summing to 1
        #[arg(short, long = "weight", required = true)]
        weights: Vec<f64>,

        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        render: RenderOverrides,
    },

    /// Render the blend picked by a query point in the anchor plane
    Morph {
        #[command(flatten)]
        sources: SourceArgs,

        /// Query position "x,y"; repeat to replay a cursor trail
        #[arg(short, long = "query", value_parser = parse_point, required = true)]
        queries: Vec<Point>,

        #[arg(long, value_enum, default_value_t = Layout::Triangle)]
        layout: Layout,

        /// Fall back to the nearest anchor when the query is outside the hull
        #[arg(long)]
        clamp: bool,

        #[arg(short, long)]
        output: PathBuf,

        /// Print the selected anchors and weights as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        render: RenderOverrides,
    },
}

#[derive(clap::Args, Debug)]
struct SourceArgs {
    /// Source image; repeat once per image
    #[arg(short, long = "image", required = true)]
    images: Vec<PathBuf>,

    /// Feature paths over the matching image; repeat once per image
    #[arg(short, long = "template", required = true)]
    templates: Vec<String>,

    /// Reshape every template to the topology of the first one
    #[arg(long)]
    conform: bool,
}

#[derive(clap::Args, Debug)]
struct RenderOverrides {
    /// Evaluate the warp every N pixels
    #[arg(long)]
    stride: Option<u32>,

    #[arg(long, value_parser = parse_sampling)]
    sampling: Option<Sampling>,

    #[arg(long, value_parser = parse_composite_mode)]
    mode: Option<CompositeMode>,

    /// Render rows on the rayon pool
    #[arg(long)]
    parallel: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    /// Three images at the corners of the demo triangle
    Triangle,
    /// Anchor positions from a PCA of the templates
    Embedding,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("Polymorph v{}", env!("CARGO_PKG_VERSION"));

    // Load or create configuration
    let config = Config::load_or_create(&args.config)?;

    match args.command {
        Command::Warp {
            input,
            output,
            src,
            dst,
            render,
            show_lines,
        } => run_warp(&render.apply(config), &input, &output, &src, &dst, show_lines),
        Command::Blend {
            sources,
            weights,
            output,
            render,
        } => run_blend(&render.apply(config), &sources, weights, &output),
        Command::Morph {
            sources,
            queries,
            layout,
            clamp,
            output,
            json,
            render,
        } => run_morph(
            &render.apply(config),
            &sources,
            &queries,
            layout,
            clamp,
            &output,
            json,
        ),
    }
}

impl RenderOverrides {
    /// Command-line values take precedence over the configuration file
    fn apply(&self, mut config: Config) -> Config {
        if let Some(stride) = self.stride {
            config.render.stride = stride;
        }
        if let Some(sampling) = self.sampling {
            config.render.sampling = sampling;
        }
        if let Some(mode) = self.mode {
            config.composite.mode = mode;
        }
        if self.parallel {
            config.render.parallel = true;
        }
        config
    }
}

fn run_warp(
    config: &Config,
    input: &Path,
    output: &Path,
    src: &str,
    dst: &str,
    show_lines: bool,
) -> Result<()> {
    config.validate()?;

    let image = load_image(input)?;
    let src = ControlTemplate::new(image_id(input), parse_paths(src)?);
    let dst = ControlTemplate::new("destination", parse_paths(dst)?);

    let lines = CorrespondenceSet::from_templates(&dst, &src)?;
    let warp = FeatureLineWarp::new(&lines, config.warp)?;

    let (width, height) = image.dimensions();
    let mut out = RgbaImage::new(width, height);
    let stats = render_warped(&image, &mut out, &warp, &config.render)?;
    info!(
        "Warped {:?} with {} line pairs ({} samples written, {} out of bounds)",
        input,
        lines.len(),
        stats.written,
        stats.skipped
    );

    if show_lines {
        draw_feature_lines(&mut out, lines.dest_lines(), Rgba([255, 0, 0, 255]));
    }

    save_image(&out, output)
}

fn run_blend(config: &Config, sources: &SourceArgs, weights: Vec<f64>, output: &Path) -> Result<()> {
    config.validate()?;

    let loaded = sources.load()?;
    let weights = WeightVector::new(weights)?;

    let templates: Vec<&ControlTemplate> = loaded.iter().map(|(_, t)| t).collect();
    let geometry = interpolate_templates(&templates, &weights)?;

    let (width, height) = loaded
        .first()
        .map(|(image, _)| image.dimensions())
        .context("No images to blend")?;
    let pairs: Vec<(&RgbaImage, &ControlTemplate)> =
        loaded.iter().map(|(image, t)| (image.as_ref(), t)).collect();
    let warped = render_sources(
        &pairs,
        &geometry,
        config.warp,
        &config.render,
        width,
        height,
    )?;

    let buffers: Vec<&RgbaImage> = warped.iter().collect();
    let mut out = RgbaImage::new(width, height);
    composite(&buffers, &weights, config.composite.mode, &mut out)?;
    info!(
        "Blended {} images ({})",
        buffers.len(),
        config.composite.mode.as_str()
    );

    save_image(&out, output)
}

/// One finished morph render
struct Frame {
    image: RgbaImage,
    info: FrameInfo,
    query: Point,
}

#[derive(Serialize)]
struct FrameReport<'a> {
    query: [f64; 2],
    clamped: bool,
    #[serde(flatten)]
    info: &'a FrameInfo,
}

fn run_morph(
    config: &Config,
    sources: &SourceArgs,
    queries: &[Point],
    layout: Layout,
    clamp: bool,
    output: &Path,
    json: bool,
) -> Result<()> {
    let settings = config.render_settings();
    let loaded = sources.load()?;

    let session = match layout {
        Layout::Triangle => {
            if loaded.len() != DEMO_TRIANGLE.len() {
                bail!(
                    "triangle layout needs exactly {} images, got {}",
                    DEMO_TRIANGLE.len(),
                    loaded.len()
                );
            }
            let anchors = loaded
                .into_iter()
                .zip(DEMO_TRIANGLE)
                .map(|((image, template), coord)| Anchor {
                    coord,
                    template,
                    image,
                })
                .collect();
            MorphSession::new(anchors, settings)?
        }
        Layout::Embedding => MorphSession::from_embedding(loaded, &config.embedding, settings)?,
    };
    for (i, anchor) in session.anchors().iter().enumerate() {
        debug!(
            "Anchor {} ({}) at ({:.2}, {:.2})",
            i, anchor.template.image_id, anchor.coord.x, anchor.coord.y
        );
    }

    let session = Arc::new(session);
    let worker_session = session.clone();
    let scheduler = RenderScheduler::spawn(move |query: Point| {
        render_query(&worker_session, query, clamp)
    });

    // Replay the trail the way an interactive host would: positions that
    // arrive while a render is running collapse into the latest one.
    for &query in queries {
        scheduler.request(query);
    }
    scheduler.wait_idle();

    let stats = scheduler.stats();
    debug!(
        "Scheduler: {} requested, {} coalesced, {} rendered",
        stats.requested, stats.coalesced, stats.completed
    );

    let latest = scheduler
        .latest()
        .context("render scheduler finished without a frame")?;
    let (frame, clamped) = match &*latest {
        Ok(frame) => frame,
        Err(e) => bail!("{}", e),
    };

    if json {
        let report = FrameReport {
            query: [frame.query.x, frame.query.y],
            clamped: *clamped,
            info: &frame.info,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    save_image(&frame.image, output)
}

/// Render one query, optionally clamping it to the nearest anchor
fn render_query(
    session: &MorphSession,
    query: Point,
    clamp: bool,
) -> polymorph::Result<(Frame, bool)> {
    let (width, height) = session.dimensions();
    let mut image = RgbaImage::new(width, height);

    match session.render(query, &mut image) {
        Ok(info) => Ok((Frame { image, info, query }, false)),
        Err(MorphError::OutOfHull { .. }) if clamp => {
            let nearest = session.triangulation().nearest_vertex(query);
            warn!(
                "Query ({:.1}, {:.1}) is outside the anchor hull, clamping to anchor {}",
                query.x, query.y, nearest
            );
            let info = FrameInfo {
                anchors: vec![nearest],
                weights: WeightVector::unit(1, 0)?,
                simplex: None,
            };
            session.render_blend(&info.anchors, &info.weights, &mut image)?;
            Ok((Frame { image, info, query }, true))
        }
        Err(e) => Err(e),
    }
}

impl SourceArgs {
    /// Load every image with its template
    fn load(&self) -> Result<Vec<(Arc<RgbaImage>, ControlTemplate)>> {
        if self.images.len() != self.templates.len() {
            bail!(
                "{} images but {} templates; pass one --template per --image",
                self.images.len(),
                self.templates.len()
            );
        }

        let mut loaded = Vec::with_capacity(self.images.len());
        for (path, paths) in self.images.iter().zip(&self.templates) {
            let template = ControlTemplate::new(image_id(path), parse_paths(paths)?);
            loaded.push((Arc::new(load_image(path)?), template));
        }

        if self.conform {
            if let Some((_, reference)) = loaded.first() {
                let reference = reference.clone();
                for (_, template) in loaded.iter_mut().skip(1) {
                    *template = template.conform_to(&reference);
                }
            }
        }

        Ok(loaded)
    }
}

/// Parse feature paths.
///
/// Paths are separated by `;`, points by whitespace, and each point is
/// written `x,y`. A trailing `z` closes the path.
fn parse_paths(s: &str) -> Result<Vec<FeaturePath>> {
    let mut paths = Vec::new();

    for chunk in s.split(';').map(str::trim).filter(|c| !c.is_empty()) {
        let mut tokens: Vec<&str> = chunk.split_whitespace().collect();
        let closed = matches!(tokens.last(), Some(&"z") | Some(&"Z"));
        if closed {
            tokens.pop();
        }

        let points = tokens
            .iter()
            .map(|t| parse_point(t).map_err(anyhow::Error::msg))
            .collect::<Result<Vec<Point>>>()
            .with_context(|| format!("Invalid feature path {:?}", chunk))?;
        if points.len() < 2 {
            bail!("Feature path {:?} needs at least 2 points", chunk);
        }

        paths.push(FeaturePath { points, closed });
    }

    if paths.is_empty() {
        bail!("No feature paths in {:?}", s);
    }
    Ok(paths)
}

fn parse_point(s: &str) -> std::result::Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got {:?}", s))?;
    let x: f64 = x.trim().parse().map_err(|_| format!("bad x in {:?}", s))?;
    let y: f64 = y.trim().parse().map_err(|_| format!("bad y in {:?}", s))?;
    let p = Point::new(x, y);
    if !p.is_finite() {
        return Err(format!("point {:?} is not finite", s));
    }
    Ok(p)
}

fn parse_sampling(s: &str) -> std::result::Result<Sampling, String> {
    match s {
        "nearest" => Ok(Sampling::Nearest),
        "bilinear" => Ok(Sampling::Bilinear),
        _ => Err(format!("unknown sampling {:?} (nearest, bilinear)", s)),
    }
}

fn parse_composite_mode(s: &str) -> std::result::Result<CompositeMode, String> {
    match s {
        "analytic" => Ok(CompositeMode::Analytic),
        "sequential-over" | "sequential_over" => Ok(CompositeMode::SequentialOver),
        _ => Err(format!(
            "unknown composite mode {:?} (analytic, sequential-over)",
            s
        )),
    }
}

fn image_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn load_image(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path).with_context(|| format!("Failed to open image {:?}", path))?;
    Ok(image.to_rgba8())
}

fn save_image(image: &RgbaImage, path: &Path) -> Result<()> {
    let is_jpeg = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false);

    // JPEG has no alpha channel
    let result = if is_jpeg {
        DynamicImage::ImageRgba8(image.clone()).to_rgb8().save(path)
    } else {
        image.save(path)
    };
    result.with_context(|| format!("Failed to write image {:?}", path))?;

    info!("Wrote {:?}", path);
    Ok(())
}
