//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Numeric capture parameters can additionally be overridden from the command
//! line through [`CaptureOverrides`].

use crate::domain::types::{AgentRole, AgentSpec, CameraConfig};
use anyhow::{ensure, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// How a short final block is handled when pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TailPolicy {
    /// Short (possibly empty) final block
    #[default]
    Truncate,
    /// Any short block is an error
    Strict,
}

/// Which aerial events take part in pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AerialSelection {
    /// Every aerial event, in log order; for logs holding one aerial frame per R ground frames
    All,
    /// The aerial frame captured on the same tick as the first ground frame of each block
    #[default]
    Strided,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_output_root")]
    pub output_root: String,
    #[serde(default = "default_trajectory_file")]
    pub trajectory_file: String,
    /// Newline-delimited scene objects to remove before the session
    #[serde(default)]
    pub objects_file: Option<String>,
    #[serde(default = "default_image_ext")]
    pub image_ext: String,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            trajectory_file: default_trajectory_file(),
            objects_file: None,
            image_ext: default_image_ext(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

fn default_output_root() -> String {
    "captures".to_string()
}

fn default_trajectory_file() -> String {
    "trajectory.csv".to_string()
}

fn default_image_ext() -> String {
    "png".to_string()
}

fn default_tick_interval_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraversalConfig {
    /// Path-following velocity in m/s
    #[serde(default = "default_velocity")]
    pub velocity: f64,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self { velocity: default_velocity() }
    }
}

fn default_velocity() -> f64 {
    5.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct AerialConfig {
    #[serde(default = "default_aerial_vehicle")]
    pub vehicle: String,
    #[serde(default = "default_aerial_camera")]
    pub camera: String,
    #[serde(default = "default_aerial_fov")]
    pub fov_deg: f64,
    /// Degrees up from straight down (50 means -40 from horizontal)
    #[serde(default = "default_aerial_pitch")]
    pub pitch_deg: f64,
    #[serde(default = "default_aerial_altitude")]
    pub altitude: f64,
}

impl Default for AerialConfig {
    fn default() -> Self {
        Self {
            vehicle: default_aerial_vehicle(),
            camera: default_aerial_camera(),
            fov_deg: default_aerial_fov(),
            pitch_deg: default_aerial_pitch(),
            altitude: default_aerial_altitude(),
        }
    }
}

fn default_aerial_vehicle() -> String {
    "Drone1".to_string()
}

fn default_aerial_camera() -> String {
    "AerialCamera".to_string()
}

fn default_aerial_fov() -> f64 {
    90.0
}

fn default_aerial_pitch() -> f64 {
    50.0
}

fn default_aerial_altitude() -> f64 {
    40.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroundConfig {
    pub vehicle: String,
    #[serde(default = "default_ground_camera")]
    pub camera: String,
    #[serde(default = "default_ground_fov")]
    pub fov_deg: f64,
    #[serde(default = "default_ground_altitude")]
    pub altitude: f64,
}

fn default_ground_camera() -> String {
    "front_center".to_string()
}

fn default_ground_fov() -> f64 {
    120.0
}

fn default_ground_altitude() -> f64 {
    1.0
}

fn default_ground_agents() -> Vec<GroundConfig> {
    vec![GroundConfig {
        vehicle: "Drone2".to_string(),
        camera: default_ground_camera(),
        fov_deg: default_ground_fov(),
        altitude: default_ground_altitude(),
    }]
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GateConfig {
    /// Movement threshold in meters; absent means exact pose comparison
    #[serde(default)]
    pub movement_epsilon: Option<f64>,
    /// Vehicle whose pose drives the gate; defaults to the first ground agent
    #[serde(default)]
    pub vehicle: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_sampler_vehicle")]
    pub vehicle: String,
    #[serde(default = "default_sampler_period_ms")]
    pub period_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { vehicle: default_sampler_vehicle(), period_ms: default_sampler_period_ms() }
    }
}

fn default_sampler_vehicle() -> String {
    "Car1".to_string()
}

fn default_sampler_period_ms() -> u64 {
    800
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairingConfig {
    /// Ground frames per aerial frame
    #[serde(default = "default_ratio")]
    pub ratio: usize,
    #[serde(default)]
    pub tail: TailPolicy,
    #[serde(default)]
    pub aerial_selection: AerialSelection,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self { ratio: default_ratio(), tail: TailPolicy::default(), aerial_selection: AerialSelection::default() }
    }
}

fn default_ratio() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    /// Simulated seconds per wall-clock second
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self { time_scale: default_time_scale() }
    }
}

fn default_time_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default)]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: 0 }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub traversal: TraversalConfig,
    #[serde(default)]
    pub aerial: AerialConfig,
    #[serde(default = "default_ground_agents")]
    pub ground: Vec<GroundConfig>,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub pairing: PairingConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn ensure_fov(field: &str, fov_deg: f64) -> anyhow::Result<()> {
    ensure!(fov_deg > 0.0 && fov_deg < 180.0, "{field} must be in (0, 180), got {fov_deg}");
    Ok(())
}

/// Command line overrides for the numeric capture parameters
#[derive(Debug, Clone, Default)]
pub struct CaptureOverrides {
    pub aerial_pitch_deg: Option<f64>,
    pub ground_fov_deg: Option<f64>,
    pub aerial_fov_deg: Option<f64>,
    pub aerial_altitude: Option<f64>,
    pub ground_altitude: Option<f64>,
    pub velocity: Option<f64>,
    pub ratio: Option<usize>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    config_file: String,
    output_root: String,
    trajectory_file: String,
    objects_file: Option<String>,
    image_ext: String,
    tick_interval_ms: u64,
    velocity: f64,
    aerial: AerialConfig,
    ground: Vec<GroundConfig>,
    movement_epsilon: Option<f64>,
    gate_vehicle: Option<String>,
    sampler_vehicle: String,
    sampler_period_ms: u64,
    ratio: usize,
    tail_policy: TailPolicy,
    aerial_selection: AerialSelection,
    time_scale: f64,
    metrics_interval_secs: u64,
    prometheus_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(
            TomlConfig {
                session: SessionConfig::default(),
                traversal: TraversalConfig::default(),
                aerial: AerialConfig::default(),
                ground: default_ground_agents(),
                gate: GateConfig::default(),
                sampler: SamplerConfig::default(),
                pairing: PairingConfig::default(),
                simulator: SimulatorConfig::default(),
                metrics: MetricsConfig::default(),
            },
            "default".to_string(),
        )
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            config_file,
            output_root: toml_config.session.output_root,
            trajectory_file: toml_config.session.trajectory_file,
            objects_file: toml_config.session.objects_file,
            image_ext: toml_config.session.image_ext,
            tick_interval_ms: toml_config.session.tick_interval_ms,
            velocity: toml_config.traversal.velocity,
            aerial: toml_config.aerial,
            ground: toml_config.ground,
            movement_epsilon: toml_config.gate.movement_epsilon,
            gate_vehicle: toml_config.gate.vehicle,
            sampler_vehicle: toml_config.sampler.vehicle,
            sampler_period_ms: toml_config.sampler.period_ms,
            ratio: toml_config.pairing.ratio,
            tail_policy: toml_config.pairing.tail,
            aerial_selection: toml_config.pairing.aerial_selection,
            time_scale: toml_config.simulator.time_scale,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        // Check for --config argument
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, path.display().to_string());
        config.validate().with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.ratio >= 1, "pairing.ratio must be at least 1");
        ensure!(!self.ground.is_empty(), "at least one [[ground]] agent is required");
        ensure!(self.velocity > 0.0, "traversal.velocity must be positive");
        ensure!(self.tick_interval_ms > 0, "session.tick_interval_ms must be positive");
        ensure!(self.time_scale > 0.0, "simulator.time_scale must be positive");
        ensure!(self.metrics_interval_secs > 0, "metrics.interval_secs must be positive");
        if let Some(eps) = self.movement_epsilon {
            ensure!(eps >= 0.0, "gate.movement_epsilon must not be negative");
        }
        ensure_fov("aerial.fov_deg", self.aerial.fov_deg)?;
        ensure!(self.aerial.altitude >= 0.0, "aerial.altitude must not be negative");
        for ground in &self.ground {
            ensure_fov(&format!("ground.fov_deg ({})", ground.vehicle), ground.fov_deg)?;
            ensure!(ground.altitude >= 0.0, "ground.altitude ({}) must not be negative", ground.vehicle);
        }
        Ok(())
    }

    /// Apply command line overrides; unset values keep the file/default value
    pub fn apply_overrides(&mut self, overrides: &CaptureOverrides) -> anyhow::Result<()> {
        if let Some(pitch) = overrides.aerial_pitch_deg {
            self.aerial.pitch_deg = pitch;
        }
        if let Some(fov) = overrides.aerial_fov_deg {
            self.aerial.fov_deg = fov;
        }
        if let Some(altitude) = overrides.aerial_altitude {
            self.aerial.altitude = altitude;
        }
        for ground in &mut self.ground {
            if let Some(fov) = overrides.ground_fov_deg {
                ground.fov_deg = fov;
            }
            if let Some(altitude) = overrides.ground_altitude {
                ground.altitude = altitude;
            }
        }
        if let Some(velocity) = overrides.velocity {
            self.velocity = velocity;
        }
        if let Some(ratio) = overrides.ratio {
            self.ratio = ratio;
        }
        self.validate()
    }

    /// All session agents, aerial first
    pub fn agents(&self) -> Vec<AgentSpec> {
        let mut agents = Vec::with_capacity(1 + self.ground.len());
        agents.push(AgentSpec {
            vehicle: self.aerial.vehicle.clone(),
            role: AgentRole::Aerial,
            altitude: self.aerial.altitude,
            camera: CameraConfig {
                name: self.aerial.camera.clone(),
                fov_deg: self.aerial.fov_deg,
                external: true,
                pitch_deg: self.aerial.pitch_deg,
            },
        });
        agents.extend(self.ground.iter().map(|g| AgentSpec {
            vehicle: g.vehicle.clone(),
            role: AgentRole::Ground,
            altitude: g.altitude,
            camera: CameraConfig {
                name: g.camera.clone(),
                fov_deg: g.fov_deg,
                external: false,
                pitch_deg: 0.0,
            },
        }));
        agents
    }

    /// Vehicle whose pose drives the movement gate
    pub fn gate_vehicle(&self) -> &str {
        match &self.gate_vehicle {
            Some(vehicle) => vehicle.as_str(),
            None => self.ground.first().map(|g| g.vehicle.as_str()).unwrap_or(&self.aerial.vehicle),
        }
    }

    // Getters for all config fields
    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn output_root(&self) -> &str {
        &self.output_root
    }

    pub fn trajectory_file(&self) -> &str {
        &self.trajectory_file
    }

    pub fn objects_file(&self) -> Option<&str> {
        self.objects_file.as_deref()
    }

    pub fn image_ext(&self) -> &str {
        &self.image_ext
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn aerial_pitch_deg(&self) -> f64 {
        self.aerial.pitch_deg
    }

    pub fn aerial_altitude(&self) -> f64 {
        self.aerial.altitude
    }

    pub fn ground_count(&self) -> usize {
        self.ground.len()
    }

    pub fn movement_epsilon(&self) -> Option<f64> {
        self.movement_epsilon
    }

    pub fn sampler_vehicle(&self) -> &str {
        &self.sampler_vehicle
    }

    pub fn sampler_period(&self) -> Duration {
        Duration::from_millis(self.sampler_period_ms)
    }

    pub fn ratio(&self) -> usize {
        self.ratio
    }

    pub fn tail_policy(&self) -> TailPolicy {
        self.tail_policy
    }

    pub fn aerial_selection(&self) -> AerialSelection {
        self.aerial_selection
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    /// Builder method for tests to redirect session output
    pub fn with_output_root(mut self, root: impl Into<String>) -> Self {
        self.output_root = root.into();
        self
    }

    /// Builder method for tests to point at a trajectory log
    pub fn with_trajectory_file(mut self, path: impl Into<String>) -> Self {
        self.trajectory_file = path.into();
        self
    }

    /// Builder method for tests to set the scenery object list
    pub fn with_objects_file(mut self, path: impl Into<String>) -> Self {
        self.objects_file = Some(path.into());
        self
    }
}
