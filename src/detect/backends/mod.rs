pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::{curl_cycle_script, landmarks_for_angle, ScriptedBackend};

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
