//! Pose landmark model.
//!
//! Landmark detection itself is external: backends hand the session one
//! [`PoseDetection`] per frame, either a named landmark set or an explicit
//! "nothing found" signal.

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::angle::Point2D;

/// Number of landmarks in a full MediaPipe-style body pose.
pub const POSE_LANDMARK_COUNT: usize = 33;

/// MediaPipe Pose landmark indices (33 total).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BodyLandmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl BodyLandmark {
    pub const ALL: [BodyLandmark; POSE_LANDMARK_COUNT] = [
        BodyLandmark::Nose,
        BodyLandmark::LeftEyeInner,
        BodyLandmark::LeftEye,
        BodyLandmark::LeftEyeOuter,
        BodyLandmark::RightEyeInner,
        BodyLandmark::RightEye,
        BodyLandmark::RightEyeOuter,
        BodyLandmark::LeftEar,
        BodyLandmark::RightEar,
        BodyLandmark::MouthLeft,
        BodyLandmark::MouthRight,
        BodyLandmark::LeftShoulder,
        BodyLandmark::RightShoulder,
        BodyLandmark::LeftElbow,
        BodyLandmark::RightElbow,
        BodyLandmark::LeftWrist,
        BodyLandmark::RightWrist,
        BodyLandmark::LeftPinky,
        BodyLandmark::RightPinky,
        BodyLandmark::LeftIndex,
        BodyLandmark::RightIndex,
        BodyLandmark::LeftThumb,
        BodyLandmark::RightThumb,
        BodyLandmark::LeftHip,
        BodyLandmark::RightHip,
        BodyLandmark::LeftKnee,
        BodyLandmark::RightKnee,
        BodyLandmark::LeftAnkle,
        BodyLandmark::RightAnkle,
        BodyLandmark::LeftHeel,
        BodyLandmark::RightHeel,
        BodyLandmark::LeftFootIndex,
        BodyLandmark::RightFootIndex,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Skeleton edges drawn on annotated frames (upper body).
pub const UPPER_BODY_CONNECTIONS: [(BodyLandmark, BodyLandmark); 9] = [
    (BodyLandmark::LeftShoulder, BodyLandmark::RightShoulder),
    (BodyLandmark::LeftShoulder, BodyLandmark::LeftElbow),
    (BodyLandmark::LeftElbow, BodyLandmark::LeftWrist),
    (BodyLandmark::RightShoulder, BodyLandmark::RightElbow),
    (BodyLandmark::RightElbow, BodyLandmark::RightWrist),
    (BodyLandmark::LeftShoulder, BodyLandmark::LeftHip),
    (BodyLandmark::RightShoulder, BodyLandmark::RightHip),
    (BodyLandmark::LeftHip, BodyLandmark::RightHip),
    (BodyLandmark::Nose, BodyLandmark::LeftShoulder),
];

/// A single detected keypoint in normalized image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// 0-1 normalized, left to right.
    pub x: f32,
    /// 0-1 normalized, top to bottom.
    pub y: f32,
    /// Relative depth, when the detector provides it.
    #[serde(default)]
    pub z: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    pub fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn point(&self) -> Point2D {
        Point2D::new(self.x as f64, self.y as f64)
    }
}

/// Which arm the session tracks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arm {
    #[default]
    Left,
    Right,
}

impl Arm {
    /// Shoulder, elbow and wrist landmarks for this arm.
    pub fn joints(self) -> [BodyLandmark; 3] {
        match self {
            Arm::Left => [
                BodyLandmark::LeftShoulder,
                BodyLandmark::LeftElbow,
                BodyLandmark::LeftWrist,
            ],
            Arm::Right => [
                BodyLandmark::RightShoulder,
                BodyLandmark::RightElbow,
                BodyLandmark::RightWrist,
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Arm::Left => "left",
            Arm::Right => "right",
        }
    }
}

impl FromStr for Arm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Arm::Left),
            "right" => Ok(Arm::Right),
            other => Err(anyhow!("unknown arm '{}' (expected left or right)", other)),
        }
    }
}

/// The three landmarks of one arm, in shoulder/elbow/wrist order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArmLandmarks {
    pub shoulder: Landmark,
    pub elbow: Landmark,
    pub wrist: Landmark,
}

impl ArmLandmarks {
    /// Lowest visibility score among the three joints, if any carries one.
    pub fn min_visibility(&self) -> Option<f32> {
        [self.shoulder, self.elbow, self.wrist]
            .iter()
            .filter_map(|lm| lm.visibility)
            .reduce(f32::min)
    }
}

/// Named landmark set for one detected person.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseLandmarks {
    points: BTreeMap<BodyLandmark, Landmark>,
}

impl PoseLandmarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: BodyLandmark, landmark: Landmark) {
        self.points.insert(kind, landmark);
    }

    pub fn with(mut self, kind: BodyLandmark, landmark: Landmark) -> Self {
        self.insert(kind, landmark);
        self
    }

    pub fn get(&self, kind: BodyLandmark) -> Option<&Landmark> {
        self.points.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BodyLandmark, &Landmark)> {
        self.points.iter().map(|(kind, lm)| (*kind, lm))
    }

    /// Shoulder, elbow and wrist of `arm`, or the first joint that is missing.
    pub fn arm(&self, arm: Arm) -> std::result::Result<ArmLandmarks, BodyLandmark> {
        let [shoulder, elbow, wrist] = arm.joints();
        let lookup = |kind: BodyLandmark| self.get(kind).copied().ok_or(kind);
        Ok(ArmLandmarks {
            shoulder: lookup(shoulder)?,
            elbow: lookup(elbow)?,
            wrist: lookup(wrist)?,
        })
    }

    /// Build from a flat array as emitted by MediaPipe bridges: 33 landmarks
    /// of either `x, y, z` or `x, y, z, visibility`.
    pub fn from_flat(data: &[f32]) -> Result<Self> {
        let stride = match data.len() {
            n if n == POSE_LANDMARK_COUNT * 3 => 3,
            n if n == POSE_LANDMARK_COUNT * 4 => 4,
            n => {
                return Err(anyhow!(
                    "expected {} or {} values for a flat pose, received {}",
                    POSE_LANDMARK_COUNT * 3,
                    POSE_LANDMARK_COUNT * 4,
                    n
                ))
            }
        };
        let mut pose = Self::new();
        for (kind, chunk) in BodyLandmark::ALL.iter().zip(data.chunks_exact(stride)) {
            let mut landmark = Landmark {
                x: chunk[0],
                y: chunk[1],
                z: chunk[2],
                ..Landmark::default()
            };
            if stride == 4 {
                landmark.visibility = Some(chunk[3]);
            }
            pose.insert(*kind, landmark);
        }
        Ok(pose)
    }
}

/// Per-frame output of a pose backend.
#[derive(Clone, Debug, PartialEq)]
pub enum PoseDetection {
    Detected(PoseLandmarks),
    NotDetected,
}

impl PoseDetection {
    pub fn landmarks(&self) -> Option<&PoseLandmarks> {
        match self {
            PoseDetection::Detected(landmarks) => Some(landmarks),
            PoseDetection::NotDetected => None,
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, PoseDetection::Detected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landmark_indices_match_mediapipe_layout() {
        assert_eq!(BodyLandmark::LeftShoulder.index(), 11);
        assert_eq!(BodyLandmark::LeftElbow.index(), 13);
        assert_eq!(BodyLandmark::LeftWrist.index(), 15);
        for (i, kind) in BodyLandmark::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(BodyLandmark::from_index(i), Some(*kind));
        }
        assert_eq!(BodyLandmark::from_index(33), None);
    }

    #[test]
    fn flat_xyz_array_is_parsed() {
        let mut data = vec![0.0f32; 99];
        data[13 * 3] = 0.4;
        data[13 * 3 + 1] = 0.6;
        let pose = PoseLandmarks::from_flat(&data).unwrap();
        assert_eq!(pose.len(), POSE_LANDMARK_COUNT);
        let elbow = pose.get(BodyLandmark::LeftElbow).unwrap();
        assert_eq!((elbow.x, elbow.y), (0.4, 0.6));
        assert_eq!(elbow.visibility, None);
    }

    #[test]
    fn flat_array_with_visibility_is_parsed() {
        let mut data = vec![0.0f32; 132];
        data[15 * 4 + 3] = 0.25;
        let pose = PoseLandmarks::from_flat(&data).unwrap();
        assert_eq!(pose.get(BodyLandmark::LeftWrist).unwrap().visibility, Some(0.25));
    }

    #[test]
    fn flat_array_rejects_bad_length() {
        assert!(PoseLandmarks::from_flat(&[0.0; 98]).is_err());
        assert!(PoseLandmarks::from_flat(&[]).is_err());
    }

    #[test]
    fn arm_reports_first_missing_joint() {
        let pose = PoseLandmarks::new()
            .with(BodyLandmark::LeftShoulder, Landmark::new(0.5, 0.3))
            .with(BodyLandmark::LeftWrist, Landmark::new(0.5, 0.7));
        assert_eq!(pose.arm(Arm::Left), Err(BodyLandmark::LeftElbow));
        assert_eq!(pose.arm(Arm::Right), Err(BodyLandmark::RightShoulder));
    }

    #[test]
    fn min_visibility_ignores_unscored_joints() {
        let arm = ArmLandmarks {
            shoulder: Landmark::new(0.0, 0.0).with_visibility(0.9),
            elbow: Landmark::new(0.0, 0.0),
            wrist: Landmark::new(0.0, 0.0).with_visibility(0.4),
        };
        assert_eq!(arm.min_visibility(), Some(0.4));
    }

    #[test]
    fn landmarks_serialize_by_name() {
        let pose = PoseLandmarks::new().with(BodyLandmark::LeftElbow, Landmark::new(0.5, 0.5));
        let json = serde_json::to_string(&pose).unwrap();
        assert_eq!(json, r#"{"left_elbow":{"x":0.5,"y":0.5,"z":0.0}}"#);
        let parsed: PoseLandmarks = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, pose);
    }

    #[test]
    fn arm_parses_from_str() {
        assert_eq!("Left".parse::<Arm>().unwrap(), Arm::Left);
        assert_eq!(" right ".parse::<Arm>().unwrap(), Arm::Right);
        assert!("both".parse::<Arm>().is_err());
    }
}
