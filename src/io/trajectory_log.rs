//! Trajectory log - durable CSV of sampled positions
//!
//! Format: header `position_x,position_y`, then one `x,y` row per sample.
//! Each row is written by opening the file in append mode, writing the full
//! line, and closing it again, so an interrupted sampler never leaves a
//! partial row behind.

use crate::domain::error::{CaptureError, Result};
use crate::domain::types::{Trajectory, Waypoint};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const TRAJECTORY_HEADER: &str = "position_x,position_y";

/// Append-only trajectory writer
pub struct TrajectoryLog {
    path: PathBuf,
}

impl TrajectoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!(path = %path.display(), "trajectory_log_initialized");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the header unless the file already has content
    pub fn write_header(&self) -> Result<()> {
        let has_content = fs::metadata(&self.path).map(|m| m.len() > 0).unwrap_or(false);
        if has_content {
            debug!(path = %self.path.display(), "trajectory_header_present");
            return Ok(());
        }
        self.append_line(TRAJECTORY_HEADER)
    }

    /// Append one sample row
    pub fn append(&self, waypoint: Waypoint) -> Result<()> {
        self.append_line(&format!("{},{}", waypoint.x, waypoint.y))
    }

    fn append_line(&self, line: &str) -> Result<()> {
        // Create parent directories if they don't exist
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CaptureError::write(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| CaptureError::write(&self.path, e))?;

        // Single write of the full line, then close on drop
        file.write_all(format!("{line}\n").as_bytes()).map_err(|e| CaptureError::write(&self.path, e))?;
        file.sync_data().map_err(|e| CaptureError::write(&self.path, e))?;
        Ok(())
    }
}

/// Load a trajectory for playback
///
/// Missing files, files with only a header, and unparseable rows are all
/// `MissingInput` faults: the session must not start on a bad trajectory.
pub fn load_trajectory(path: impl AsRef<Path>) -> Result<Trajectory> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| CaptureError::MissingInput(format!("trajectory {}: {e}", path.display())))?;

    let mut samples = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line == TRAJECTORY_HEADER {
            continue;
        }
        samples.push(parse_row(line).ok_or_else(|| {
            CaptureError::MissingInput(format!(
                "trajectory {} line {}: malformed row '{line}'",
                path.display(),
                line_no + 1
            ))
        })?);
    }

    let raw = samples.len();
    let trajectory = Trajectory::from_samples(samples)
        .map_err(|_| CaptureError::MissingInput(format!("trajectory {} is empty", path.display())))?;
    info!(path = %path.display(), samples = raw, waypoints = trajectory.len(), "trajectory_loaded");
    Ok(trajectory)
}

fn parse_row(line: &str) -> Option<Waypoint> {
    let (x, y) = line.split_once(',')?;
    Some(Waypoint::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
}
