//! Capture log - ordered record of every written frame
//!
//! Events are written in JSONL format (one JSON object per line), appended
//! and flushed per event. Line order is capture order and drives pairing.

use crate::domain::capture::CaptureEvent;
use crate::domain::error::{CaptureError, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CAPTURE_LOG_FILE: &str = "captures.jsonl";

/// Append-only capture log writer
pub struct CaptureLog {
    file_path: PathBuf,
}

impl CaptureLog {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        info!(file_path = %file_path.display(), "capture_log_initialized");
        Self { file_path }
    }

    /// Capture log inside a session directory
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CAPTURE_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Append events in order
    pub fn append(&self, events: &[CaptureEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for event in events {
            let json = serde_json::to_string(event).map_err(|e| {
                CaptureError::write(&self.file_path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?;
            buf.push_str(&json);
            buf.push('\n');
        }

        self.append_raw(&buf).map_err(|e| CaptureError::write(&self.file_path, e))?;
        debug!(file = %self.file_path.display(), events = events.len(), "capture_log_appended");
        Ok(())
    }

    fn append_raw(&self, data: &str) -> std::io::Result<()> {
        // Create parent directories if they don't exist
        if let Some(parent) = self.file_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.file_path)?;
        file.write_all(data.as_bytes())?;
        file.flush()
    }
}

/// Read a capture log back in log order
pub fn read_capture_log(path: impl AsRef<Path>) -> Result<Vec<CaptureEvent>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| CaptureError::MissingInput(format!("capture log {}: {e}", path.display())))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_no, line)| {
            serde_json::from_str(line).map_err(|e| {
                CaptureError::Pairing(format!("capture log {} line {}: {e}", path.display(), line_no + 1))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{AgentRole, Pose};
    use chrono::Utc;
    use tempfile::tempdir;

    fn event(role: AgentRole, idx: u64) -> CaptureEvent {
        CaptureEvent {
            role,
            vehicle: "Drone2".to_string(),
            sequence_index: idx,
            file_path: PathBuf::from(format!("{}_{}.png", role, idx)),
            pose_at_capture: Pose::new(idx as f64, 0.0, -1.0),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_append_and_read_back_in_order() {
        let dir = tempdir().unwrap();
        let log = CaptureLog::in_dir(dir.path());

        log.append(&[event(AgentRole::Aerial, 0), event(AgentRole::Ground, 0)]).unwrap();
        log.append(&[event(AgentRole::Aerial, 1), event(AgentRole::Ground, 1)]).unwrap();

        let events = read_capture_log(log.path()).unwrap();
        let order: Vec<_> = events.iter().map(|e| (e.role, e.sequence_index)).collect();
        assert_eq!(
            order,
            vec![
                (AgentRole::Aerial, 0),
                (AgentRole::Ground, 0),
                (AgentRole::Aerial, 1),
                (AgentRole::Ground, 1)
            ]
        );
        assert_eq!(events[3].pose_at_capture, Pose::new(1.0, 0.0, -1.0));
    }

    #[test]
    fn test_append_empty_is_noop() {
        let dir = tempdir().unwrap();
        let log = CaptureLog::in_dir(dir.path());
        log.append(&[]).unwrap();
        assert!(!log.path().exists());
    }

    #[test]
    fn test_append_mode_preserves_existing_lines() {
        let dir = tempdir().unwrap();
        let log = CaptureLog::in_dir(dir.path());
        log.append(&[event(AgentRole::Ground, 0)]).unwrap();
        let log = CaptureLog::in_dir(dir.path());
        log.append(&[event(AgentRole::Ground, 1)]).unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_read_malformed_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CAPTURE_LOG_FILE);
        fs::write(&path, "{\"role\":\"aerial\"}\n").unwrap();
        let err = read_capture_log(&path).unwrap_err();
        assert!(matches!(err, CaptureError::Pairing(_)));
    }

    #[test]
    fn test_read_missing_log() {
        let err = read_capture_log("/nonexistent/captures.jsonl").unwrap_err();
        assert!(matches!(err, CaptureError::MissingInput(_)));
    }
}
