use anyhow::Result;

use crate::frame::Frame;
use crate::pose::PoseDetection;

/// Pose estimation backend.
///
/// Landmark detection is an external capability. A backend looks at one frame
/// and reports either the landmarks of the person in it or
/// [`PoseDetection::NotDetected`]. "Nobody in frame" is a normal answer, not an
/// error; `Err` is reserved for the backend itself failing.
pub trait PoseBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run pose estimation on a frame.
    ///
    /// Implementations must treat the pixels as read-only and must not retain
    /// them beyond this call.
    fn detect(&mut self, frame: &Frame) -> Result<PoseDetection>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
