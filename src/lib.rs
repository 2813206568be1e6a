//! Bicep-curl rep counter.
//!
//! Counts curls from a camera stream by measuring the elbow angle of one arm
//! in every frame and feeding it to a small hysteresis state machine.
//!
//! # Architecture
//!
//! Per frame, strictly in capture order:
//!
//! 1. `ingest`: a camera source yields an RGB `Frame`
//! 2. `detect`: a pose backend turns it into a `PoseDetection`
//! 3. `session`: the elbow angle is measured (`angle`) and applied to the
//!    session's `RepState` (`counter`)
//! 4. `render`: the frame is annotated with skeleton, angle and REPS/STAGE,
//!    then JPEG encoded (feature `stream-mjpeg`)
//! 5. `feed` / `api`: the report and encoded frame are published to observers
//!
//! Steps 2-3 are the whole core and need neither a camera nor a network:
//!
//! ```
//! use curl_counter::{landmarks_for_angle, process_frame, start_session, Arm, PoseDetection};
//!
//! let mut state = start_session();
//! for angle in [170.0, 10.0] {
//!     let detection = PoseDetection::Detected(landmarks_for_angle(Arm::Left, angle));
//!     state = process_frame(state, &detection).0;
//! }
//! assert_eq!(state.count(), 1);
//! ```

pub mod angle;
pub mod api;
pub mod config;
pub mod counter;
pub mod detect;
pub mod feed;
pub mod frame;
pub mod ingest;
pub mod pose;
#[cfg(feature = "stream-mjpeg")]
pub mod render;
pub mod session;
pub mod ui;

pub use angle::{compute_angle, measure_angle, Point2D, DEGENERATE_EPSILON};
pub use counter::{CurlThresholds, RepEvent, RepState, Stage};
pub use detect::{
    curl_cycle_script, landmarks_for_angle, BackendRegistry, PoseBackend, ScriptedBackend,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use feed::{FeedSnapshot, LiveFeed};
pub use frame::Frame;
pub use ingest::{CameraConfig, CameraSource, CameraStats};
pub use pose::{Arm, ArmLandmarks, BodyLandmark, Landmark, PoseDetection, PoseLandmarks};
pub use session::{
    process_frame, process_frame_with, start_session, FrameReport, Session, SessionConfig,
    SessionStats, SkipReason,
};
