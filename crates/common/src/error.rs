//! Error types shared across camrec crates.

use std::path::PathBuf;

/// Top-level error type for camrec operations.
#[derive(Debug, thiserror::Error)]
pub enum CamrecError {
    #[error("Source open failed for {camera}: {message}")]
    SourceOpen { camera: String, message: String },

    #[error("Frame read failed for {camera}: {message}")]
    FrameRead { camera: String, message: String },

    #[error("Writer open failed for {path}: {message}")]
    WriterOpen { path: PathBuf, message: String },

    #[error("Write failed for {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("Display error for {camera}: {message}")]
    Display { camera: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unknown camera: {name}")]
    UnknownCamera { name: String },

    #[error("Worker error for {camera}: {message}")]
    Worker { camera: String, message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using CamrecError.
pub type CamrecResult<T> = Result<T, CamrecError>;

impl CamrecError {
    pub fn source_open(camera: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SourceOpen {
            camera: camera.into(),
            message: msg.into(),
        }
    }

    pub fn frame_read(camera: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::FrameRead {
            camera: camera.into(),
            message: msg.into(),
        }
    }

    pub fn writer_open(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::WriterOpen {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Write {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn display(camera: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Display {
            camera: camera.into(),
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unknown_camera(name: impl Into<String>) -> Self {
        Self::UnknownCamera { name: name.into() }
    }

    pub fn worker(camera: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Worker {
            camera: camera.into(),
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_camera() {
        let err = CamrecError::source_open("Gate", "could not resolve host");
        assert_eq!(
            err.to_string(),
            "Source open failed for Gate: could not resolve host"
        );

        let err = CamrecError::unknown_camera("Yard");
        assert_eq!(err.to_string(), "Unknown camera: Yard");
    }

    #[test]
    fn test_writer_open_reports_path() {
        let err = CamrecError::writer_open("/tmp/Gate 2024-01-01 10-00-00.avi", "denied");
        assert!(err
            .to_string()
            .contains("/tmp/Gate 2024-01-01 10-00-00.avi"));
    }
}
