use anyhow::{anyhow, Result};
use rand::Rng;

use crate::detect::backend::PoseBackend;
use crate::frame::Frame;
use crate::pose::{Arm, BodyLandmark, Landmark, PoseDetection, PoseLandmarks};

const UPPER_ARM_LEN: f64 = 0.18;
const FOREARM_LEN: f64 = 0.16;
const SHOULDER_Y: f64 = 0.32;
const JOINT_VISIBILITY: f32 = 0.98;

/// Backend that replays a fixed sequence of elbow angles.
///
/// Each entry yields landmarks for a person whose tracked arm bends to that
/// angle; `None` entries yield [`PoseDetection::NotDetected`]. Frame pixels are
/// ignored. Used by the `stub://` pipeline and by tests.
pub struct ScriptedBackend {
    script: Vec<Option<f64>>,
    cursor: usize,
    arm: Arm,
    jitter: f32,
    looping: bool,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Option<f64>>) -> Result<Self> {
        if let Some(bad) = script
            .iter()
            .flatten()
            .find(|angle| !(0.0..=180.0).contains(*angle))
        {
            return Err(anyhow!("scripted angle {} outside [0, 180]", bad));
        }
        Ok(Self {
            script,
            cursor: 0,
            arm: Arm::Left,
            jitter: 0.0,
            looping: false,
        })
    }

    /// Continuous curls, looping forever.
    pub fn curl_cycle() -> Self {
        Self {
            script: curl_cycle_script(),
            cursor: 0,
            arm: Arm::Left,
            jitter: 0.0,
            looping: true,
        }
    }

    pub fn with_arm(mut self, arm: Arm) -> Self {
        self.arm = arm;
        self
    }

    /// Uniform noise (normalized units) added to every synthesized coordinate.
    pub fn with_jitter(mut self, jitter: f32) -> Self {
        self.jitter = jitter.max(0.0);
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// True once a non-looping script has been fully replayed.
    pub fn is_exhausted(&self) -> bool {
        !self.looping && self.cursor >= self.script.len()
    }

    fn next_entry(&mut self) -> Option<f64> {
        if self.script.is_empty() {
            return None;
        }
        if self.cursor >= self.script.len() {
            if !self.looping {
                return None;
            }
            self.cursor = 0;
        }
        let entry = self.script[self.cursor];
        self.cursor += 1;
        entry
    }

    fn jittered(&self, mut pose: PoseLandmarks) -> PoseLandmarks {
        if self.jitter <= 0.0 {
            return pose;
        }
        let mut rng = rand::thread_rng();
        let kinds: Vec<BodyLandmark> = pose.iter().map(|(kind, _)| kind).collect();
        for kind in kinds {
            if let Some(lm) = pose.get(kind).copied() {
                let moved = Landmark {
                    x: lm.x + rng.gen_range(-self.jitter..=self.jitter),
                    y: lm.y + rng.gen_range(-self.jitter..=self.jitter),
                    ..lm
                };
                pose.insert(kind, moved);
            }
        }
        pose
    }
}

impl PoseBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<PoseDetection> {
        match self.next_entry() {
            Some(angle) => {
                let pose = landmarks_for_angle(self.arm, angle);
                Ok(PoseDetection::Detected(self.jittered(pose)))
            }
            None => Ok(PoseDetection::NotDetected),
        }
    }
}

/// One curl every 34 frames: extend to 175°, flex to 15°, back again.
pub fn curl_cycle_script() -> Vec<Option<f64>> {
    let lowering = (0..=16).map(|i| Some(15.0 + i as f64 * 10.0));
    let raising = (1..16).rev().map(|i| Some(15.0 + i as f64 * 10.0));
    let mut script: Vec<Option<f64>> = lowering.chain(raising).collect();
    script.insert(0, Some(175.0));
    script.push(Some(15.0));
    script
}

/// Synthesize a standing pose whose `arm` bends to `angle` degrees at the elbow.
///
/// The upper arm hangs straight down from the shoulder; the forearm swings
/// forward and up as the angle closes.
pub fn landmarks_for_angle(arm: Arm, angle: f64) -> PoseLandmarks {
    // The person's left side appears on the right of an unmirrored image.
    let (side, shoulder_x) = match arm {
        Arm::Left => (1.0, 0.62),
        Arm::Right => (-1.0, 0.38),
    };
    let [shoulder_kind, elbow_kind, wrist_kind] = arm.joints();
    let other_shoulder = match arm {
        Arm::Left => BodyLandmark::RightShoulder,
        Arm::Right => BodyLandmark::LeftShoulder,
    };

    let elbow_x = shoulder_x;
    let elbow_y = SHOULDER_Y + UPPER_ARM_LEN;
    // Upper arm points up from the elbow (-90° in image space); rotate by the
    // joint angle to get the forearm direction.
    let forearm_dir = (-90.0 + angle).to_radians();
    let wrist_x = elbow_x + side * FOREARM_LEN * forearm_dir.cos();
    let wrist_y = elbow_y + FOREARM_LEN * forearm_dir.sin();

    let visible =
        |x: f64, y: f64| Landmark::new(x as f32, y as f32).with_visibility(JOINT_VISIBILITY);
    PoseLandmarks::new()
        .with(BodyLandmark::Nose, visible(0.5, SHOULDER_Y - 0.14))
        .with(other_shoulder, visible(1.0 - shoulder_x, SHOULDER_Y))
        .with(shoulder_kind, visible(shoulder_x, SHOULDER_Y))
        .with(elbow_kind, visible(elbow_x, elbow_y))
        .with(wrist_kind, visible(wrist_x, wrist_y))
}
