//! Paired capture - synchronized aerial/ground image collection
//!
//! Replays a recorded trajectory with one aerial and one or more ground
//! agents, capturing a frame from every camera whenever the gating vehicle
//! moves, then writes a pairing index for the session.
//!
//! Module structure:
//! - `domain/` - Core types (Waypoint, Pose, CaptureSession, CaptureError)
//! - `io/` - External interfaces (simulator, trajectory/capture logs, images)
//! - `services/` - Pipeline (sampler, gate, controller, pairing, session)
//! - `infra/` - Infrastructure (Config, Metrics, logging)

use clap::Parser;
use paired_capture::infra::logging::init_logging;
use paired_capture::infra::{CaptureOverrides, Config, Metrics};
use paired_capture::io::KinematicSim;
use paired_capture::services::SessionRunner;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Paired capture - run one aerial/ground capture session
#[derive(Parser, Debug)]
#[command(name = "paired-capture", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Trajectory CSV to replay (overrides session.trajectory_file)
    #[arg(long)]
    trajectory: Option<String>,

    /// Root directory for session output (overrides session.output_root)
    #[arg(long)]
    output_root: Option<String>,

    /// Aerial camera pitch in degrees
    #[arg(long)]
    aerial_pitch: Option<f64>,

    /// Ground camera field of view in degrees
    #[arg(long)]
    ground_fov: Option<f64>,

    /// Aerial camera field of view in degrees
    #[arg(long)]
    aerial_fov: Option<f64>,

    /// Aerial flight altitude in meters
    #[arg(long)]
    aerial_altitude: Option<f64>,

    /// Ground agent altitude in meters
    #[arg(long)]
    ground_altitude: Option<f64>,

    /// Traversal velocity in m/s
    #[arg(long)]
    velocity: Option<f64>,

    /// Ground frames per aerial frame in the pairing index
    #[arg(long)]
    ratio: Option<usize>,
}

impl Args {
    fn overrides(&self) -> CaptureOverrides {
        CaptureOverrides {
            aerial_pitch_deg: self.aerial_pitch,
            ground_fov_deg: self.ground_fov,
            aerial_fov_deg: self.aerial_fov,
            aerial_altitude: self.aerial_altitude,
            ground_altitude: self.ground_altitude,
            velocity: self.velocity,
            ratio: self.ratio,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!(git_hash = env!("GIT_HASH"), "paired-capture starting");

    let args = Args::parse();

    let mut config = Config::load_from_path(&args.config.clone().unwrap_or_else(|| Config::resolve_config_path(&[])));
    if let Some(trajectory) = &args.trajectory {
        config = config.with_trajectory_file(trajectory.clone());
    }
    if let Some(output_root) = &args.output_root {
        config = config.with_output_root(output_root.clone());
    }
    config.apply_overrides(&args.overrides())?;

    info!(
        config_file = %config.config_file(),
        trajectory_file = %config.trajectory_file(),
        output_root = %config.output_root(),
        gate_vehicle = %config.gate_vehicle(),
        ground_agents = config.ground_count(),
        velocity = %config.velocity(),
        aerial_altitude = %config.aerial_altitude(),
        aerial_pitch_deg = %config.aerial_pitch_deg(),
        ratio = %config.ratio(),
        movement_epsilon = ?config.movement_epsilon(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());
    let sim = Arc::new(KinematicSim::from_config(&config));
    let runner = SessionRunner::new(sim, config.clone(), metrics.clone());

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_shutdown = shutdown_rx.clone();
        let session = runner.session_id().to_string();
        tokio::spawn(async move {
            if let Err(e) = paired_capture::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                session,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "prometheus_metrics_server_error");
            }
        });
    }

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let result = runner.run(shutdown_rx).await;
    metrics.report().log();

    match result {
        Ok(report) => {
            if report.interrupted() {
                warn!(session = %report.session_id, output_dir = %report.output_dir.display(), "session_interrupted");
            }
            info!(
                session = %report.session_id,
                output_dir = %report.output_dir.display(),
                pairs_file = %report.pairs_file.display(),
                "paired-capture shutdown complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(kind = e.kind(), error = %e, "session_failed");
            Err(e.into())
        }
    }
}
