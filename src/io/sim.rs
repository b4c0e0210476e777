//! Simulator client interface
//!
//! Everything the capture pipeline needs from the simulator sits behind
//! [`SimClient`]. Connection management, camera placement and vehicle control
//! are the implementor's business; the pipeline only sequences the calls.

use crate::domain::error::Result;
use crate::domain::types::{CameraPose, Pose, Waypoint};
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait SimClient: Send + Sync {
    /// Fails with `CaptureError::Connection` when the simulator is unreachable
    async fn confirm_connection(&self) -> Result<()>;

    async fn vehicle_pose(&self, vehicle: &str) -> Result<Pose>;

    /// Teleport a vehicle, ignoring collisions
    async fn set_vehicle_pose(&self, vehicle: &str, pose: Pose) -> Result<()>;

    async fn set_camera_fov(&self, vehicle: &str, camera: &str, fov_deg: f64) -> Result<()>;

    /// Place a camera; `external` cameras are positioned in world coordinates
    async fn set_camera_pose(&self, camera: &str, pose: CameraPose, external: bool) -> Result<()>;

    /// Request one scene image from a camera
    async fn capture_image(&self, vehicle: &str, camera: &str, external: bool) -> Result<Bytes>;

    /// Remove a static scene object; returns false when no such object exists
    async fn remove_object(&self, name: &str) -> Result<bool>;

    /// Enable API control, arm, and climb to `altitude`
    async fn arm_and_takeoff(&self, vehicle: &str, altitude: f64) -> Result<()>;

    /// Follow `path` at constant `z` and `velocity`; resolves when the vehicle
    /// reaches the final waypoint. Faults surface as `CaptureError::PathExecution`.
    async fn follow_path(&self, vehicle: &str, path: &[Waypoint], z: f64, velocity: f64) -> Result<()>;

    async fn start_recording(&self) -> Result<()>;

    async fn stop_recording(&self) -> Result<()>;

    /// Return vehicles to their initial state
    async fn reset(&self) -> Result<()>;
}
