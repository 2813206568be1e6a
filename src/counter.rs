//! Rep counting state machine.
//!
//! A rep is one clean Down → Up traversal of the elbow angle. The band between
//! the two thresholds is a hysteresis zone: angles inside it never change the
//! stage, so jitter near either extreme cannot double count.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DOWN_ABOVE_DEG: f64 = 160.0;
pub const DEFAULT_UP_BELOW_DEG: f64 = 30.0;

/// Qualitative arm position within the rep cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// No threshold crossing observed yet in this session.
    #[default]
    Unknown,
    /// Arm extended.
    Down,
    /// Arm flexed.
    Up,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Unknown => "unknown",
            Stage::Down => "down",
            Stage::Up => "up",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Angle thresholds (degrees) driving stage transitions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurlThresholds {
    /// Angles strictly above this mark the arm as extended.
    pub down_above: f64,
    /// Angles strictly below this complete a rep when the arm was extended.
    pub up_below: f64,
}

impl Default for CurlThresholds {
    fn default() -> Self {
        Self {
            down_above: DEFAULT_DOWN_ABOVE_DEG,
            up_below: DEFAULT_UP_BELOW_DEG,
        }
    }
}

impl CurlThresholds {
    pub fn new(down_above: f64, up_below: f64) -> Result<Self> {
        let thresholds = Self {
            down_above,
            up_below,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.down_above.is_finite() && self.up_below.is_finite()) {
            return Err(anyhow!("curl thresholds must be finite"));
        }
        if self.up_below < 0.0 || self.down_above > 180.0 {
            return Err(anyhow!(
                "curl thresholds must lie within [0, 180] degrees (got up_below={}, down_above={})",
                self.up_below,
                self.down_above
            ));
        }
        if self.up_below >= self.down_above {
            return Err(anyhow!(
                "up_below ({}) must be lower than down_above ({})",
                self.up_below,
                self.down_above
            ));
        }
        Ok(())
    }
}

/// Emitted when a Down → Up transition completes a rep.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RepEvent {
    /// Session count after this rep.
    pub count: u32,
    /// Angle of the frame that completed the rep.
    pub angle: f64,
}

/// Per-session counter state. The only value carried from frame to frame.
///
/// Fields are private: the count can only move through [`RepState::apply`],
/// which never decrements it.
///
/// ```compile_fail
/// let mut state = curl_counter::RepState::new();
/// state.count = 10;
/// ```
///
/// ```compile_fail
/// let state = curl_counter::RepState { stage: curl_counter::Stage::Up, count: 3 };
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RepState {
    stage: Stage,
    count: u32,
}

impl RepState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Feed one angle sample. Returns the rep event if this sample completed one.
    ///
    /// Non-finite angles fail both comparisons and leave the state untouched.
    pub fn apply(&mut self, angle: f64, thresholds: &CurlThresholds) -> Option<RepEvent> {
        if angle > thresholds.down_above {
            self.stage = Stage::Down;
            None
        } else if angle < thresholds.up_below && self.stage == Stage::Down {
            self.stage = Stage::Up;
            self.count = self.count.saturating_add(1);
            Some(RepEvent {
                count: self.count,
                angle,
            })
        } else {
            None
        }
    }
}
