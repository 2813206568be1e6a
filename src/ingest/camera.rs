//! Camera frame source.
//!
//! `CameraSource` hands the capture loop one RGB frame at a time:
//! - `stub://<name>` produces synthetic frames (tests, demos, CI)
//! - a device path such as `/dev/video0` captures from V4L2 (feature: ingest-v4l2)
//!
//! Capture is the only blocking step of the pipeline. Sources do not retain
//! frames after handing them off.

use anyhow::Result;

#[cfg(feature = "ingest-v4l2")]
use super::v4l2::DeviceSource;
use crate::frame::Frame;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// `stub://name` or a local device path.
    pub url: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    /// Requested frame width.
    pub width: u32,
    /// Requested frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            target_fps: 15,
            width: 640,
            height: 480,
        }
    }
}

/// Camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceSource),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.url.starts_with("stub://") {
            Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticSource::new(config)),
            })
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                Ok(Self {
                    backend: CameraBackend::Device(DeviceSource::new(config)?),
                })
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                anyhow::bail!(
                    "camera '{}' requires the ingest-v4l2 feature (only stub:// sources are built in)",
                    config.url
                )
            }
        }
    }

    /// Open the camera.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
        }
    }

    /// Block until the next frame is available.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame(),
        }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.is_healthy(),
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats(),
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub url: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticSource {
    config: CameraConfig,
    frame_count: u64,
}

impl SyntheticSource {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("CameraSource: connected to {} (synthetic)", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(
            self.config.width,
            self.config.height,
            self.frame_count,
            pixels,
        )
    }

    /// Slowly drifting dark gradient, so encoded streams visibly update.
    fn generate_pixels(&self) -> Vec<u8> {
        let (width, height) = (self.config.width as u64, self.config.height as u64);
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let shade = ((x + y + self.frame_count) % 64) as u8;
                pixels.extend_from_slice(&[24 + shade, 28 + shade, 40 + shade]);
            }
        }
        pixels
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> CameraConfig {
        CameraConfig {
            url: "stub://test".to_string(),
            target_fps: 10,
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn stub_source_produces_sequenced_frames() -> Result<()> {
        let mut source = CameraSource::new(stub_config())?;
        source.connect()?;

        let first = source.next_frame()?;
        let second = source.next_frame()?;
        assert_eq!((first.width, first.height), (64, 48));
        assert_eq!(first.pixels().len(), 64 * 48 * 3);
        assert_eq!((first.index, second.index), (1, 2));
        assert_ne!(first.pixels(), second.pixels());

        let stats = source.stats();
        assert_eq!(stats.frames_captured, 2);
        assert_eq!(stats.url, "stub://test");
        assert!(source.is_healthy());
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_paths_require_v4l2_feature() {
        let config = CameraConfig {
            url: "/dev/video0".to_string(),
            ..stub_config()
        };
        let err = CameraSource::new(config).err().expect("device source rejected");
        assert!(err.to_string().contains("ingest-v4l2"));
    }
}
