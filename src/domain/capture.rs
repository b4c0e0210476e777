//! Capture session state and the events it produces

use crate::domain::types::{AgentRole, Pose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::path::PathBuf;
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_session_id() -> String {
    Uuid::now_v7().to_string()
}

/// One written frame, appended to the capture log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureEvent {
    pub role: AgentRole,
    pub vehicle: String,
    pub sequence_index: u64,
    pub file_path: PathBuf,
    pub pose_at_capture: Pose,
    pub captured_at: DateTime<Utc>,
}

impl CaptureEvent {
    /// File name without directory, used as the identifier in pairing indices
    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_path.display().to_string())
    }
}

/// Per-session gating state
///
/// Owned by the controller driving the session. Counters only move through
/// [`CaptureSession::commit`], which is called once all frames of a tick are
/// durably written.
#[derive(Debug)]
pub struct CaptureSession {
    id: String,
    /// Next sequence index, indexed by [`role_slot`]
    counters: [u64; 2],
    last_recorded_pose: Option<Pose>,
}

#[inline]
fn role_slot(role: AgentRole) -> usize {
    match role {
        AgentRole::Aerial => 0,
        AgentRole::Ground => 1,
    }
}

impl CaptureSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), counters: [0; 2], last_recorded_pose: None }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn last_recorded_pose(&self) -> Option<Pose> {
        self.last_recorded_pose
    }

    /// Number of frames captured so far for `role`
    pub fn captured(&self, role: AgentRole) -> u64 {
        self.counters[role_slot(role)]
    }

    /// Sequence indices the given cameras would receive, without reserving them
    ///
    /// Cameras sharing a role get consecutive indices in the order given.
    pub fn peek_indices(&self, roles: &[AgentRole]) -> SmallVec<[u64; 4]> {
        let mut next = self.counters;
        roles
            .iter()
            .map(|&role| {
                let slot = role_slot(role);
                let idx = next[slot];
                next[slot] += 1;
                idx
            })
            .collect()
    }

    /// Advance counters for one completed tick and remember its pose
    pub fn commit(&mut self, roles: &[AgentRole], pose: Pose) {
        for &role in roles {
            self.counters[role_slot(role)] += 1;
        }
        self.last_recorded_pose = Some(pose);
    }
}
