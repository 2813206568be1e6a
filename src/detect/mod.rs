mod backend;
mod backends;
mod registry;

pub use backend::PoseBackend;
pub use backends::{curl_cycle_script, landmarks_for_angle, ScriptedBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::BackendRegistry;
