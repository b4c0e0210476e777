//! Trajectory Sampler - records a driven vehicle's path to CSV
//!
//! Samples the vehicle's planar position once per period and appends it to
//! the trajectory log until Ctrl+C (or `--samples` rows).
//!
//! Usage:
//!   trajectory-sampler --config config/dev.toml
//!   trajectory-sampler --output runs/trajectory.csv --period-ms 800 --demo-loop 40

use clap::Parser;
use paired_capture::domain::Waypoint;
use paired_capture::infra::logging::init_logging;
use paired_capture::infra::{Config, Metrics};
use paired_capture::io::{KinematicSim, SimClient, TrajectoryLog};
use paired_capture::services::PositionSampler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Trajectory Sampler - record a vehicle trajectory for later replay
#[derive(Parser, Debug)]
#[command(name = "trajectory-sampler", version, about, long_about = None)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Trajectory CSV to append to (defaults to session.trajectory_file)
    #[arg(short, long)]
    output: Option<String>,

    /// Vehicle to sample (defaults to sampler.vehicle)
    #[arg(long)]
    vehicle: Option<String>,

    /// Sampling period in milliseconds (defaults to sampler.period_ms)
    #[arg(long)]
    period_ms: Option<u64>,

    /// Stop after this many rows
    #[arg(short = 'n', long)]
    samples: Option<u64>,

    /// Drive the vehicle around a square of this side length (meters)
    ///
    /// The in-process simulator has no driver; this gives the sampler
    /// something to record.
    #[arg(long)]
    demo_loop: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let args = Args::parse();
    let config = Config::load_from_path(&args.config.clone().unwrap_or_else(|| Config::resolve_config_path(&[])));

    let output = args.output.clone().unwrap_or_else(|| config.trajectory_file().to_string());
    let vehicle = args.vehicle.clone().unwrap_or_else(|| config.sampler_vehicle().to_string());
    let period = args.period_ms.map(Duration::from_millis).unwrap_or_else(|| config.sampler_period());

    info!(
        config_file = %config.config_file(),
        output = %output,
        vehicle = %vehicle,
        period_ms = period.as_millis() as u64,
        samples = ?args.samples,
        "trajectory-sampler starting"
    );

    let sim = Arc::new(KinematicSim::from_config(&config).with_vehicle(vehicle.clone(), Default::default()));
    sim.confirm_connection().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if let Some(side) = args.demo_loop {
        let driver = sim.clone();
        let driven = vehicle.clone();
        let velocity = config.velocity();
        tokio::spawn(async move {
            let square = [
                Waypoint::new(side, 0.0),
                Waypoint::new(side, side),
                Waypoint::new(0.0, side),
                Waypoint::new(0.0, 0.0),
            ];
            if let Err(e) = driver.arm_and_takeoff(&driven, 0.0).await {
                error!(error = %e, "demo_drive_failed");
                return;
            }
            loop {
                if let Err(e) = driver.follow_path(&driven, &square, 0.0, velocity).await {
                    error!(error = %e, "demo_drive_failed");
                    return;
                }
            }
        });
    }

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let metrics = Arc::new(Metrics::new());
    let sampler = PositionSampler::new(sim, vehicle, period, TrajectoryLog::new(&output), metrics.clone())
        .with_limit(args.samples);

    let rows = sampler.run(shutdown_rx).await?;
    info!(rows = rows, samples_total = metrics.samples_total(), output = %output, "trajectory-sampler shutdown complete");
    Ok(())
}
