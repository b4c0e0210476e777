//! Services - capture pipeline logic
//!
//! This module contains the core pipeline services:
//! - `sampler` - Records a driven vehicle's trajectory
//! - `gate` - Movement gate and per-tick frame capture
//! - `controller` - Concurrent path dispatch with barrier join
//! - `pairing` - Positional aerial/ground pairing index
//! - `session` - End-to-end session orchestration

pub mod controller;
pub mod gate;
pub mod pairing;
pub mod sampler;
pub mod session;

// Re-export commonly used types
pub use controller::{PathController, TraversalOutcome};
pub use gate::{should_capture, CaptureGate, MovementPolicy};
pub use pairing::{ImagePairIndexer, PairingIndex};
pub use sampler::PositionSampler;
pub use session::{SessionReport, SessionRunner};
