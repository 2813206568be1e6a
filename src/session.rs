//! Per-session frame processing.
//!
//! A session owns exactly one [`RepState`] and applies detections to it in
//! capture order. Nothing here blocks; frame acquisition and rendering happen
//! in the caller's loop.

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::angle::{measure_angle, Point2D};
use crate::counter::{CurlThresholds, RepEvent, RepState, Stage};
use crate::pose::{Arm, BodyLandmark, PoseDetection};

/// Tunables for one counting session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    pub arm: Arm,
    pub thresholds: CurlThresholds,
    /// Frames whose tracked joints report a visibility below this are skipped.
    /// Zero disables the gate.
    pub min_visibility: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            arm: Arm::Left,
            thresholds: CurlThresholds::default(),
            min_visibility: 0.0,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        if !(0.0..=1.0).contains(&self.min_visibility) {
            return Err(anyhow!(
                "min_visibility must be within [0, 1] (got {})",
                self.min_visibility
            ));
        }
        Ok(())
    }
}

/// Values published after every frame for overlay rendering and status.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FrameReport {
    pub stage: Stage,
    pub count: u32,
    pub angle: Option<f64>,
    /// Elbow position in normalized image coordinates.
    pub elbow: Option<Point2D>,
    /// True when this frame completed a rep.
    pub rep_completed: bool,
}

/// Why a frame did not reach the counter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SkipReason {
    NoDetection,
    MissingLandmark(BodyLandmark),
    LowVisibility(f32),
    DegenerateGeometry,
}

struct ArmSample {
    angle: f64,
    elbow: Point2D,
}

fn sample_arm(
    detection: &PoseDetection,
    config: &SessionConfig,
) -> std::result::Result<ArmSample, SkipReason> {
    let landmarks = detection.landmarks().ok_or(SkipReason::NoDetection)?;
    let arm = landmarks
        .arm(config.arm)
        .map_err(SkipReason::MissingLandmark)?;
    if config.min_visibility > 0.0 {
        if let Some(visibility) = arm.min_visibility() {
            if visibility < config.min_visibility {
                return Err(SkipReason::LowVisibility(visibility));
            }
        }
    }
    let elbow = arm.elbow.point();
    let angle = measure_angle(arm.shoulder.point(), elbow, arm.wrist.point())
        .ok_or(SkipReason::DegenerateGeometry)?;
    Ok(ArmSample { angle, elbow })
}

/// Result of applying one detection to a state.
struct Step {
    angle: Option<f64>,
    elbow: Option<Point2D>,
    rep: Option<RepEvent>,
    skipped: Option<SkipReason>,
}

fn step(state: &mut RepState, detection: &PoseDetection, config: &SessionConfig) -> Step {
    match sample_arm(detection, config) {
        Ok(sample) => Step {
            angle: Some(sample.angle),
            elbow: Some(sample.elbow),
            rep: state.apply(sample.angle, &config.thresholds),
            skipped: None,
        },
        Err(reason) => Step {
            angle: None,
            elbow: None,
            rep: None,
            skipped: Some(reason),
        },
    }
}

/// Fresh state for a new capture session.
pub fn start_session() -> RepState {
    RepState::new()
}

/// Apply one frame's detection with the default configuration (left arm,
/// 160°/30° thresholds).
///
/// Frames without a usable measurement (no detection, missing joint or
/// degenerate geometry) return the state unchanged and no angle.
pub fn process_frame(state: RepState, detection: &PoseDetection) -> (RepState, Option<f64>) {
    process_frame_with(state, detection, &SessionConfig::default())
}

/// [`process_frame`] with an explicit configuration.
pub fn process_frame_with(
    mut state: RepState,
    detection: &PoseDetection,
    config: &SessionConfig,
) -> (RepState, Option<f64>) {
    let angle = step(&mut state, detection, config).angle;
    (state, angle)
}

/// Counters describing a session so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub stage: Stage,
    pub count: u32,
    pub frames_processed: u64,
    pub frames_skipped: u64,
}

/// Single-owner session: state plus configuration and frame counters.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    state: RepState,
    frames_processed: u64,
    frames_skipped: u64,
    last_skip: Option<SkipReason>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: start_session(),
            frames_processed: 0,
            frames_skipped: 0,
            last_skip: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> RepState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            stage: self.state.stage(),
            count: self.state.count(),
            frames_processed: self.frames_processed,
            frames_skipped: self.frames_skipped,
        }
    }

    /// Reason the most recent frame was skipped, if it was.
    pub fn last_skip(&self) -> Option<SkipReason> {
        self.last_skip
    }

    pub fn process(&mut self, detection: &PoseDetection) -> FrameReport {
        self.frames_processed += 1;
        let step = step(&mut self.state, detection, &self.config);

        if let Some(reason) = step.skipped {
            self.frames_skipped += 1;
            log::debug!("frame {} skipped: {:?}", self.frames_processed, reason);
        }
        if let Some(rep) = step.rep {
            log::info!("rep #{} (angle {:.1})", rep.count, rep.angle);
        }
        self.last_skip = step.skipped;

        FrameReport {
            stage: self.state.stage(),
            count: self.state.count(),
            angle: step.angle,
            elbow: step.elbow,
            rep_completed: step.rep.is_some(),
        }
    }
}
