//! Domain models - core capture types
//!
//! This module contains the canonical data types used throughout the system:
//! - `Waypoint` / `Trajectory` - the recorded ground-truth path
//! - `Pose` - vehicle pose read from the simulator
//! - `AgentSpec` / `AgentRole` - agents taking part in a session
//! - `CaptureSession` / `CaptureEvent` - gating state and its output
//! - `CaptureError` - fault taxonomy

pub mod capture;
pub mod error;
pub mod types;

// Re-export commonly used types at module level
pub use capture::{CaptureEvent, CaptureSession};
pub use error::{CaptureError, Result};
pub use types::{AgentRole, AgentSpec, CameraConfig, CameraPose, Pose, Trajectory, Waypoint};
