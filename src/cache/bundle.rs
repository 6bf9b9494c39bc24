//! Portable form of a compiled module.
//!
//! A bundle carries everything needed to rebuild a module without the
//! compiler: the binary, the source it came from and the metadata document.
//! Bundles are plain JSON so callers can store them wherever they like.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Fingerprint;
use crate::module::CompiledModule;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub fingerprint: Fingerprint,
    pub name: String,
    pub binary: Vec<u8>,
    pub source: String,
    pub metadata: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<Box<ArtifactBundle>>,
}

/// Errors that can occur when reading or writing a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleError {
    /// The file could not be read or written
    Io(String),
    /// The document is not a valid bundle
    Format(String),
}

impl std::fmt::Display for BundleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleError::Io(msg) => write!(f, "bundle I/O failed: {}", msg),
            BundleError::Format(msg) => write!(f, "malformed bundle: {}", msg),
        }
    }
}

impl std::error::Error for BundleError {}

impl ArtifactBundle {
    /// Snapshot a module and its effect companion.
    pub fn from_module(module: &CompiledModule) -> Self {
        Self {
            fingerprint: module.fingerprint().clone(),
            name: module.name().to_string(),
            binary: module.binary().to_vec(),
            source: module.source().to_string(),
            metadata: module.metadata_json().to_string(),
            effect: module.effect().map(|e| Box::new(Self::from_module(e))),
        }
    }

    pub fn to_json(&self) -> Result<String, BundleError> {
        serde_json::to_string(self).map_err(|e| BundleError::Format(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, BundleError> {
        serde_json::from_str(json).map_err(|e| BundleError::Format(e.to_string()))
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), BundleError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)
            .map_err(|e| BundleError::Io(format!("{}: {}", path.display(), e)))
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, BundleError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| BundleError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::MemoryMode;

    fn bundle() -> ArtifactBundle {
        ArtifactBundle {
            fingerprint: Fingerprint::compute("process = _;", MemoryMode::External, &[]),
            name: "thru".to_string(),
            binary: vec![0, 97, 115, 109],
            source: "process = _;".to_string(),
            metadata: r#"{"name":"thru","size":4,"inputs":1,"outputs":1,"ui":[]}"#.to_string(),
            effect: None,
        }
    }

    #[test]
    fn json_keeps_every_field() {
        let original = bundle();
        let restored = ArtifactBundle::from_json(&original.to_json().unwrap()).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn reads_back_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thru.json");

        let mut original = bundle();
        original.effect = Some(Box::new(bundle()));
        original.write_to(&path).unwrap();

        assert_eq!(ArtifactBundle::read_from(&path).unwrap(), original);
    }

    #[test]
    fn reports_io_and_format_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ArtifactBundle::read_from(dir.path().join("missing.json")),
            Err(BundleError::Io(_))
        ));
        assert!(matches!(
            ArtifactBundle::from_json("{\"name\": 3}"),
            Err(BundleError::Format(_))
        ));
    }
}
