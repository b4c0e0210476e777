//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `sim` - Simulator client trait
//! - `kinematic_sim` - In-process simulator backing the binaries and tests
//! - `trajectory_log` - Durable CSV of sampled positions
//! - `capture_log` - Ordered JSONL record of written frames
//! - `image_store` - Frame files named `{role}_{sequence_index}.{ext}`
//! - `scenery` - Stationary-object list
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod capture_log;
pub mod image_store;
pub mod kinematic_sim;
pub mod prometheus;
pub mod scenery;
pub mod sim;
pub mod trajectory_log;

// Re-export commonly used types
pub use capture_log::{read_capture_log, CaptureLog};
pub use image_store::ImageStore;
pub use kinematic_sim::KinematicSim;
pub use sim::SimClient;
pub use trajectory_log::{load_trajectory, TrajectoryLog};
