//! Shared types for paired capture sessions

use crate::domain::error::{CaptureError, Result};
use serde::{Deserialize, Serialize};

/// A single recorded 2D ground-truth position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
}

impl Waypoint {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn distance_to(&self, other: &Waypoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl std::fmt::Display for Waypoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Vehicle pose as reported by the simulator
///
/// Coordinates follow the simulator's NED convention: `z` grows downward, so an
/// altitude of 40 m is `z = -40.0`. `yaw` is in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub yaw: f64,
}

impl Pose {
    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z, yaw: 0.0 }
    }

    #[inline]
    pub fn with_yaw(mut self, yaw: f64) -> Self {
        self.yaw = yaw;
        self
    }

    /// Position-only equality; heading is not part of movement
    #[inline]
    pub fn same_position(&self, other: &Pose) -> bool {
        self.x == other.x && self.y == other.y && self.z == other.z
    }

    #[inline]
    pub fn distance_to(&self, other: &Pose) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    #[inline]
    pub fn waypoint(&self) -> Waypoint {
        Waypoint::new(self.x, self.y)
    }
}

/// Ordered, non-empty sequence of waypoints in traversal order
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    waypoints: Vec<Waypoint>,
}

impl Trajectory {
    /// Build a trajectory from raw samples, collapsing consecutive duplicates
    pub fn from_samples(mut samples: Vec<Waypoint>) -> Result<Self> {
        samples.dedup();
        if samples.is_empty() {
            return Err(CaptureError::MissingInput("trajectory has no waypoints".to_string()));
        }
        Ok(Self { waypoints: samples })
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Total polyline length in meters
    pub fn length(&self) -> f64 {
        self.waypoints.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
    }
}

/// Role an agent plays in a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Aerial,
    Ground,
}

impl AgentRole {
    /// File name prefix for captures of this role
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Aerial => "aerial",
            AgentRole::Ground => "ground",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Camera bound to an agent
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    /// Simulator camera name (e.g. "front_center")
    pub name: String,
    pub fov_deg: f64,
    /// External cameras are positioned in world space rather than on the vehicle
    pub external: bool,
    /// Downward pitch from horizontal, degrees (aerial only)
    pub pitch_deg: f64,
}

/// An agent taking part in a session
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSpec {
    pub vehicle: String,
    pub role: AgentRole,
    /// Flight/drive altitude in meters above the origin plane
    pub altitude: f64,
    pub camera: CameraConfig,
}

impl AgentSpec {
    /// Altitude expressed as a NED z coordinate
    #[inline]
    pub fn z(&self) -> f64 {
        -self.altitude
    }
}

/// Camera placement requested from the simulator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Radians, negative looks down
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

impl CameraPose {
    /// Overhead placement above `anchor`, pitched `-90 + pitch_deg` and yawed to its heading
    pub fn overhead(anchor: &Pose, altitude: f64, pitch_deg: f64) -> Self {
        Self {
            x: anchor.x,
            y: anchor.y,
            z: -altitude,
            pitch: (-90.0 + pitch_deg).to_radians(),
            roll: 0.0,
            yaw: anchor.yaw,
        }
    }
}
