//! Fault taxonomy for capture sessions
//!
//! Every variant is fatal to the run that raised it; nothing here is retried.

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Simulator unreachable; raised before any state mutation
    #[error("simulator connection failed: {0}")]
    Connection(String),

    /// Trajectory or object list absent or empty; raised before arming
    #[error("missing input: {0}")]
    MissingInput(String),

    /// An agent's path command failed mid-traversal
    #[error("path execution failed for {vehicle}: {reason}")]
    PathExecution { vehicle: String, reason: String },

    /// Durable log or image write failed
    #[error("write to {} failed: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("simulator call failed: {0}")]
    Simulator(String),

    #[error("pairing failed: {0}")]
    Pairing(String),
}

impl CaptureError {
    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CaptureError::Write { path: path.into(), source }
    }

    /// Short kind label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::Connection(_) => "connection",
            CaptureError::MissingInput(_) => "missing_input",
            CaptureError::PathExecution { .. } => "path_execution",
            CaptureError::Write { .. } => "write",
            CaptureError::Simulator(_) => "simulator",
            CaptureError::Pairing(_) => "pairing",
        }
    }
}

pub type Result<T> = core::result::Result<T, CaptureError>;
