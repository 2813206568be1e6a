use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::frame::Frame;
use crate::pose::PoseDetection;

use super::backend::PoseBackend;

/// Registry of pose backends keyed by name.
///
/// Backends are owned by the capture loop, so there is no locking here.
pub struct BackendRegistry {
    backends: HashMap<String, Box<dyn PoseBackend>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: PoseBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Box::new(backend));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!(
                "backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            ));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Get backend by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn PoseBackend + 'static)> {
        self.backends.get_mut(name).map(|backend| backend.as_mut())
    }

    /// Get default backend.
    pub fn default_backend(&mut self) -> Option<&mut (dyn PoseBackend + 'static)> {
        let name = self.default_name.clone()?;
        self.get_mut(&name)
    }

    /// List registered backends, sorted by name.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Warm up every registered backend.
    pub fn warm_up_all(&mut self) -> Result<()> {
        for (name, backend) in self.backends.iter_mut() {
            backend
                .warm_up()
                .map_err(|e| anyhow!("backend '{}' warm-up failed: {}", name, e))?;
        }
        Ok(())
    }

    /// Run pose estimation with the default backend.
    pub fn detect(&mut self, frame: &Frame) -> Result<PoseDetection> {
        let backend = self
            .default_backend()
            .ok_or_else(|| anyhow!("no pose backend registered"))?;
        backend.detect(frame)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, bool);

    impl PoseBackend for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn detect(&mut self, _frame: &Frame) -> Result<PoseDetection> {
            if self.1 {
                Ok(PoseDetection::Detected(Default::default()))
            } else {
                Ok(PoseDetection::NotDetected)
            }
        }
    }

    fn frame() -> Frame {
        Frame::filled(2, 2, 1, [0, 0, 0]).unwrap()
    }

    #[test]
    fn first_registered_is_default() {
        let mut registry = BackendRegistry::new();
        registry.register(Fixed("absent", false));
        registry.register(Fixed("present", true));
        assert_eq!(registry.default_name(), Some("absent"));
        assert_eq!(registry.detect(&frame()).unwrap(), PoseDetection::NotDetected);

        registry.set_default("present").unwrap();
        assert!(registry.detect(&frame()).unwrap().is_detected());
    }

    #[test]
    fn unknown_default_is_rejected() {
        let mut registry = BackendRegistry::new();
        registry.register(Fixed("absent", false));
        let err = registry.set_default("tract").unwrap_err();
        assert!(err.to_string().contains("absent"));
    }

    #[test]
    fn empty_registry_cannot_detect() {
        let mut registry = BackendRegistry::new();
        assert!(registry.detect(&frame()).is_err());
        assert!(registry.list().is_empty());
    }
}
