//! curl_replay - count reps in a recorded session
//!
//! Input is either a JSON-lines file with one detection per line (`null` for
//! a frame without a person, a landmark object keyed by landmark name, or a
//! flat `[x, y, z, visibility, ...]` array) or a comma-separated list of elbow
//! angles.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde_json::Value;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use curl_counter::ui::{ReplayProgress, UiMode};
use curl_counter::{
    landmarks_for_angle, Arm, CurlThresholds, PoseDetection, PoseLandmarks, Session, SessionConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON-lines detections, one frame per line.
    #[arg(long, conflicts_with = "angles")]
    input: Option<PathBuf>,
    /// Elbow angles in degrees, e.g. "170,90,20". Use "none" for a frame without a person.
    #[arg(long)]
    angles: Option<String>,
    /// Tracked arm.
    #[arg(long, default_value = "left")]
    arm: String,
    /// Angle above which the arm counts as extended.
    #[arg(long)]
    down_above: Option<f64>,
    /// Angle below which the arm counts as flexed.
    #[arg(long)]
    up_below: Option<f64>,
    /// Minimum arm landmark visibility; lower frames are skipped.
    #[arg(long, default_value_t = 0.0)]
    min_visibility: f32,
    /// Output mode: auto, plain or pretty.
    #[arg(long, default_value = "auto")]
    ui: String,
    /// Print the final stats as JSON on stdout.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let arm: Arm = args.arm.parse()?;
    let detections = match (&args.input, &args.angles) {
        (Some(path), _) => read_detections(path)?,
        (None, Some(angles)) => detections_from_angles(angles, arm)?,
        (None, None) => return Err(anyhow!("one of --input or --angles is required")),
    };

    let defaults = CurlThresholds::default();
    let config = SessionConfig {
        arm,
        thresholds: CurlThresholds::new(
            args.down_above.unwrap_or(defaults.down_above),
            args.up_below.unwrap_or(defaults.up_below),
        )?,
        min_visibility: args.min_visibility,
    };
    let mut session = Session::new(config)?;

    let is_tty = std::io::stderr().is_terminal();
    let progress = ReplayProgress::new(
        UiMode::from_flag(Some(&args.ui)),
        is_tty,
        detections.len() as u64,
    );
    for detection in &detections {
        let report = session.process(detection);
        progress.frame(&report);
    }
    let stats = session.stats();
    progress.finish(&stats);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("reps={} stage={}", stats.count, stats.stage);
    }
    Ok(())
}

fn read_detections(path: &Path) -> Result<Vec<PoseDetection>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            parse_detection(line).with_context(|| format!("{}:{}", path.display(), idx + 1))
        })
        .collect()
}

fn parse_detection(line: &str) -> Result<PoseDetection> {
    let value: Value = serde_json::from_str(line)?;
    match value {
        Value::Null => Ok(PoseDetection::NotDetected),
        Value::Array(items) => {
            let flat = items
                .iter()
                .map(|v| {
                    v.as_f64()
                        .map(|f| f as f32)
                        .ok_or_else(|| anyhow!("flat landmark arrays must hold numbers"))
                })
                .collect::<Result<Vec<f32>>>()?;
            Ok(PoseDetection::Detected(PoseLandmarks::from_flat(&flat)?))
        }
        Value::Object(_) => {
            let landmarks: PoseLandmarks = serde_json::from_value(value)?;
            Ok(PoseDetection::Detected(landmarks))
        }
        other => Err(anyhow!("unsupported detection: {}", other)),
    }
}

fn detections_from_angles(list: &str, arm: Arm) -> Result<Vec<PoseDetection>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry {
            "none" | "-" => Ok(PoseDetection::NotDetected),
            _ => {
                let angle: f64 = entry
                    .parse()
                    .map_err(|_| anyhow!("invalid angle {:?}", entry))?;
                if !(0.0..=180.0).contains(&angle) {
                    return Err(anyhow!("angle {} outside [0, 180]", angle));
                }
                Ok(PoseDetection::Detected(landmarks_for_angle(arm, angle)))
            }
        })
        .collect()
}
