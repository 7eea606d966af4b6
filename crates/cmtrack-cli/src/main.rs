//! cmtrack CLI: track one object through a directory of frames.

use clap::{Args, Parser, Subcommand};
use cmtrack::{BoundingBox, ConsensusTracker, FrameReport, TrackerConfig};
use std::path::{Path, PathBuf};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "cmtrack")]
#[command(about = "Consensus-based keypoint tracking of a single object through an image sequence")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track the object selected in the first frame through all frames.
    Track(CliTrackArgs),

    /// Print the default tracker configuration as JSON.
    DefaultConfig,
}

#[derive(Debug, Clone, Args)]
struct CliTrackArgs {
    /// Directory of frames (png/jpg), processed in file-name order.
    #[arg(long)]
    frames: PathBuf,

    /// Initial bounding box in the first frame: x,y,width,height.
    #[arg(long)]
    bbox: String,

    /// Tracker configuration (JSON); missing fields take defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to write per-frame results (JSON). Printed to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Directory to write frames with the tracked quadrilateral drawn.
    #[arg(long)]
    overlay_dir: Option<PathBuf>,

    /// Override the clustering cut distance / local match radius (px).
    #[arg(long)]
    thr_outlier: Option<f32>,

    /// Override the minimum match confidence in [0, 1].
    #[arg(long)]
    thr_conf: Option<f32>,

    /// Override the best/second-best distance ratio gate.
    #[arg(long)]
    match_ratio: Option<f32>,

    /// Override the forward-backward flow error gate (px).
    #[arg(long)]
    thr_fb: Option<f32>,

    /// Disable matching around the flow-based prior.
    #[arg(long)]
    no_local_matching: bool,

    /// Keep the scale fixed at 1.
    #[arg(long)]
    no_scale: bool,

    /// Keep the rotation fixed at 0.
    #[arg(long)]
    no_rotation: bool,
}

impl CliTrackArgs {
    fn parse_bbox(&self) -> CliResult<BoundingBox> {
        let values: Vec<f32> = self
            .bbox
            .split(',')
            .map(|s| s.trim().parse::<f32>())
            .collect::<Result<_, _>>()
            .map_err(|e| -> CliError { format!("Invalid --bbox '{}': {}", self.bbox, e).into() })?;
        match values[..] {
            [x, y, w, h] => Ok(BoundingBox::new(x, y, w, h)),
            _ => Err(format!("--bbox expects x,y,width,height, got '{}'", self.bbox).into()),
        }
    }

    fn build_config(&self) -> CliResult<TrackerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| -> CliError {
                    format!("Failed to read config {}: {}", path.display(), e).into()
                })?;
                serde_json::from_str(&text)?
            }
            None => TrackerConfig::default(),
        };

        if let Some(v) = self.thr_outlier {
            config.consensus.thr_outlier = v;
        }
        if let Some(v) = self.thr_conf {
            config.matching.thr_conf = v;
        }
        if let Some(v) = self.match_ratio {
            config.matching.match_ratio = v;
        }
        if let Some(v) = self.thr_fb {
            config.flow.thr_fb = v;
        }
        if self.no_local_matching {
            config.matching.local_matching = false;
        }
        if self.no_scale {
            config.consensus.estimate_scale = false;
        }
        if self.no_rotation {
            config.consensus.estimate_rotation = false;
        }
        Ok(config)
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Track(args) => run_track(&args),
        Commands::DefaultConfig => run_default_config(),
    }
}

// ── default-config ─────────────────────────────────────────────────────

fn run_default_config() -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(&TrackerConfig::default())?);
    Ok(())
}

// ── track ──────────────────────────────────────────────────────────────

fn list_frames(dir: &Path) -> CliResult<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
            .unwrap_or(false);
        if is_image {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

fn overlay_path(dir: &Path, frame: &Path) -> PathBuf {
    let stem = frame
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string());
    dir.join(format!("{stem}.png"))
}

fn run_track(args: &CliTrackArgs) -> CliResult<()> {
    let region = args.parse_bbox()?;
    let config = args.build_config()?;
    let mut tracker = ConsensusTracker::new(config)?;

    let frames = list_frames(&args.frames)?;
    let Some((first, rest)) = frames.split_first() else {
        return Err(format!("No png/jpg frames in {}", args.frames.display()).into());
    };
    tracing::info!("Found {} frames in {}", frames.len(), args.frames.display());

    if let Some(dir) = &args.overlay_dir {
        std::fs::create_dir_all(dir)?;
    }

    let img = image::open(first).map_err(|e| -> CliError {
        format!("Failed to open frame {}: {}", first.display(), e).into()
    })?;
    let n = tracker.initialize_region(&img.to_luma8(), region)?;
    tracing::info!("Initialized on {} with {} keypoints", first.display(), n);
    if let Some(dir) = &args.overlay_dir {
        let mut canvas = img.to_rgba8();
        if let Some(quad) = tracker.quadrilateral() {
            cmtrack::draw_overlay(&mut canvas, &quad, tracker.active_keypoints());
        }
        canvas.save(overlay_path(dir, first))?;
    }

    let mut entries = Vec::with_capacity(rest.len());
    let mut n_result = 0usize;
    for path in rest {
        let img = image::open(path).map_err(|e| -> CliError {
            format!("Failed to open frame {}: {}", path.display(), e).into()
        })?;
        let gray = img.to_luma8();
        let report: FrameReport = match &args.overlay_dir {
            Some(dir) => {
                let mut canvas = img.to_rgba8();
                let report = tracker.process_frame_with_overlay(&gray, &mut canvas);
                canvas.save(overlay_path(dir, path))?;
                report
            }
            None => tracker.process_frame(&gray),
        };
        if report.has_result {
            n_result += 1;
        }
        entries.push(serde_json::json!({
            "file": path.display().to_string(),
            "report": report,
        }));
    }
    tracing::info!("Tracked {}/{} frames with a result", n_result, rest.len());

    let output = serde_json::json!({
        "initial_frame": first.display().to_string(),
        "initial_box": region,
        "initial_keypoints": n,
        "frames": entries,
    });
    let json = serde_json::to_string_pretty(&output)?;
    match &args.out {
        Some(out) => {
            std::fs::write(out, &json)?;
            tracing::info!("Results written to {}", out.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
