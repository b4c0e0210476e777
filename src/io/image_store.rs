//! Image store - writes captured frames as `{role}_{sequence_index}.{ext}`

use crate::domain::error::{CaptureError, Result};
use crate::domain::types::AgentRole;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub struct ImageStore {
    dir: PathBuf,
    ext: String,
}

impl ImageStore {
    /// Create the store, creating `dir` if needed
    pub fn create(dir: impl Into<PathBuf>, ext: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CaptureError::write(&dir, e))?;
        let ext = ext.into().trim_start_matches('.').to_string();
        Ok(Self { dir, ext })
    }

    pub fn path_for(&self, role: AgentRole, sequence_index: u64) -> PathBuf {
        self.dir.join(format!("{}_{}.{}", role.as_str(), sequence_index, self.ext))
    }

    /// Write one frame and return its path
    pub fn write(&self, role: AgentRole, sequence_index: u64, data: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(role, sequence_index);
        fs::write(&path, data).map_err(|e| CaptureError::write(&path, e))?;
        debug!(path = %path.display(), bytes = data.len(), "image_written");
        Ok(path)
    }
}
