//! Readiness gate
//!
//! The serving layer owns one [`Readiness`] and injects it wherever the
//! "index is provisioned" transition is made or observed. The transition is
//! one-way: once ready, the gate stays ready for the life of the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// One-shot readiness flag plus the artifact version that made it ready
#[derive(Debug, Default)]
pub struct Readiness {
    ready: AtomicBool,
    artifact_version: OnceLock<String>,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip to ready. Returns `false` if the gate was already ready, in which
    /// case the recorded version is left untouched.
    pub fn mark_ready(&self, artifact_version: impl Into<String>) -> bool {
        if self.artifact_version.set(artifact_version.into()).is_err() {
            return false;
        }
        self.ready.store(true, Ordering::Release);
        true
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Version of the artifact that was loaded, once ready
    pub fn artifact_version(&self) -> Option<&str> {
        self.artifact_version.get().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_not_ready() {
        let readiness = Readiness::new();
        assert!(!readiness.is_ready());
        assert_eq!(readiness.artifact_version(), None);
    }

    #[test]
    fn test_single_forward_transition() {
        let readiness = Readiness::new();
        assert!(readiness.mark_ready("42"));
        assert!(readiness.is_ready());

        assert!(!readiness.mark_ready("43"));
        assert!(readiness.is_ready());
        assert_eq!(readiness.artifact_version(), Some("42"));
    }
}
