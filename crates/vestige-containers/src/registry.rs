//! Format-detection registry
//!
//! Container decoders are tried in priority order: each probe gets a
//! chance to claim the input by recognizing its signature, and the first
//! claim wins. A probe declining is a recovered format mismatch, not an
//! error. Raw is registered last as the fallback that claims anything.

use std::path::Path;

use vestige_core::{Error, Medium, Result};

use crate::ewf::{is_ewf_file, EwfMedium};
use crate::raw::{RawConfig, RawMedium};

/// One registered format: a detection probe and a constructor
pub struct FormatProbe {
    /// Short format name, e.g. `"ewf"`
    pub name: &'static str,
    /// Signature check; must not mutate any state
    pub detect: fn(&Path) -> bool,
    /// Open the medium once the probe has claimed it
    pub open: fn(&Path) -> Result<Box<dyn Medium>>,
}

/// Ordered collection of format probes
pub struct FormatRegistry {
    probes: Vec<FormatProbe>,
}

impl FormatRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self { probes: Vec::new() }
    }

    /// The built-in probe order: container formats first, raw fallback last
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(FormatProbe {
            name: "ewf",
            detect: is_ewf_file,
            open: |path| Ok(Box::new(EwfMedium::open(path)?) as Box<dyn Medium>),
        });
        registry.register(FormatProbe {
            name: "raw",
            detect: |path| path.is_file(),
            open: |path| Ok(Box::new(RawMedium::open(path, RawConfig::default())?) as Box<dyn Medium>),
        });
        registry
    }

    /// Append a probe at the lowest priority
    pub fn register(&mut self, probe: FormatProbe) {
        self.probes.push(probe);
    }

    /// Name of the first format that claims `path`, if any
    pub fn detect(&self, path: &Path) -> Option<&'static str> {
        self.probes
            .iter()
            .find(|probe| (probe.detect)(path))
            .map(|probe| probe.name)
    }

    /// Open `path` with the first format that claims it
    pub fn open(&self, path: &Path) -> Result<Box<dyn Medium>> {
        for probe in &self.probes {
            if (probe.detect)(path) {
                return (probe.open)(path);
            }
        }
        Err(Error::unsupported(format!(
            "no registered format claims {}",
            path.display()
        )))
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_raw_fallback_claims_plain_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disk.img");
        std::fs::write(&path, vec![0u8; 512]).unwrap();

        let registry = FormatRegistry::builtin();
        assert_eq!(registry.detect(&path), Some("raw"));

        let medium = registry.open(&path).unwrap();
        assert_eq!(medium.length(), 512);
    }

    #[test]
    fn test_detection_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disk.img");
        std::fs::write(&path, vec![0u8; 512]).unwrap();

        let registry = FormatRegistry::builtin();
        assert_eq!(registry.detect(&path), registry.detect(&path));
    }

    #[test]
    fn test_missing_file_claims_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.img");

        let registry = FormatRegistry::builtin();
        assert_eq!(registry.detect(&path), None);
        assert!(registry.open(&path).is_err());
    }

    #[test]
    fn test_priority_order() {
        let mut registry = FormatRegistry::new();
        registry.register(FormatProbe {
            name: "first",
            detect: |_| true,
            open: |_| Err(Error::unsupported("first")),
        });
        registry.register(FormatProbe {
            name: "second",
            detect: |_| true,
            open: |_| Err(Error::unsupported("second")),
        });

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x");
        std::fs::write(&path, b"x").unwrap();
        assert_eq!(registry.detect(&path), Some("first"));
    }
}
