//! Infrastructure - configuration and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults, CLI overrides)
//! - `metrics` - Lock-free capture metrics
//! - `logging` - tracing subscriber setup shared by the binaries

pub mod config;
pub mod logging;
pub mod metrics;

// Re-export commonly used types
pub use config::{AerialSelection, CaptureOverrides, Config, TailPolicy};
pub use metrics::Metrics;
