//! Camera entries and the camera list file.
//!
//! The camera list is an ordered JSON array:
//!
//! ```json
//! [
//!   { "name": "Gate", "url": "rtsp://cam/gate" },
//!   { "name": "Yard", "url": "/dev/video0" }
//! ]
//! ```
//!
//! The upper-case keys `NAME` and `URL` are accepted as well.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One configured camera. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Unique name, used as display title and segment file prefix.
    #[serde(alias = "NAME")]
    pub name: String,

    /// Stream source: a URI (`rtsp://`, `http://`, `file://`), a V4L2
    /// device path, or a local file path.
    #[serde(alias = "URL")]
    pub url: String,
}

impl CameraConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Stable identity of this camera.
    pub fn id(&self) -> CameraId {
        CameraId(self.name.clone())
    }
}

/// Stable camera identifier used to address a camera in the registry.
///
/// Control surfaces hold `CameraId`s as back-references; they never own
/// camera state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(String);

impl CameraId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CameraId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for CameraId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A validated, ordered list of cameras.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CameraList {
    cameras: Vec<CameraConfig>,
}

impl CameraList {
    /// Validate and wrap a list of camera entries.
    pub fn new(cameras: Vec<CameraConfig>) -> Result<Self, ConfigError> {
        validate_cameras(&cameras)?;
        Ok(Self { cameras })
    }

    /// Load and validate a camera list file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    /// Parse and validate camera list JSON. `origin` is only used in errors.
    pub fn parse(content: &str, origin: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let cameras: Vec<CameraConfig> =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse {
                path: origin.as_ref().to_path_buf(),
                source: e,
            })?;
        Self::new(cameras)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CameraConfig> {
        self.cameras.iter()
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// Find a camera by name.
    pub fn get(&self, name: &str) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| c.name == name)
    }

    pub fn into_vec(self) -> Vec<CameraConfig> {
        self.cameras
    }
}

impl<'a> IntoIterator for &'a CameraList {
    type Item = &'a CameraConfig;
    type IntoIter = std::slice::Iter<'a, CameraConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.cameras.iter()
    }
}

fn validate_cameras(cameras: &[CameraConfig]) -> Result<(), ConfigError> {
    if cameras.is_empty() {
        return Err(ConfigError::Empty);
    }

    let mut seen = HashSet::new();
    for (index, camera) in cameras.iter().enumerate() {
        if camera.name.trim().is_empty() {
            return Err(ConfigError::EmptyField {
                index,
                field: "name",
            });
        }
        if camera.url.trim().is_empty() {
            return Err(ConfigError::EmptyField { index, field: "url" });
        }
        validate_name(&camera.name)?;
        if !seen.insert(camera.name.as_str()) {
            return Err(ConfigError::DuplicateName {
                name: camera.name.clone(),
            });
        }
    }
    Ok(())
}

/// Names become file-name prefixes, so they must be a single path component.
fn validate_name(name: &str) -> Result<(), ConfigError> {
    let reason = if name.contains('/') || name.contains('\\') {
        Some("contains a path separator")
    } else if name.contains('\0') {
        Some("contains a NUL byte")
    } else if name == "." || name == ".." {
        Some("is a relative directory name")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ConfigError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Errors that can occur when loading a camera list.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Camera list is empty")]
    Empty,

    #[error("Camera #{index} has an empty {field}")]
    EmptyField { index: usize, field: &'static str },

    #[error("Duplicate camera name: {name}")]
    DuplicateName { name: String },

    #[error("Invalid camera name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
}
