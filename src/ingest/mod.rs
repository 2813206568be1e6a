//! Frame ingestion sources.
//!
//! - Stub source (`stub://`, synthetic frames for tests and demos)
//! - USB/V4L2 cameras (feature: ingest-v4l2)
//!
//! Sources produce `Frame` instances for the capture loop, one at a time and
//! in capture order. They never store frames to disk.

pub mod camera;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

pub use camera::{CameraConfig, CameraSource, CameraStats};
