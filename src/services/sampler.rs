//! Position sampler - records a driven vehicle's planar position to CSV
//!
//! Runs until shutdown (or an optional sample limit). Each row is durably
//! appended before the next period starts, so an interrupt never leaves a
//! partial row behind.

use crate::domain::error::Result;
use crate::infra::metrics::Metrics;
use crate::io::sim::SimClient;
use crate::io::trajectory_log::TrajectoryLog;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

pub struct PositionSampler<S> {
    client: Arc<S>,
    vehicle: String,
    period: Duration,
    log: TrajectoryLog,
    metrics: Arc<Metrics>,
    limit: Option<u64>,
}

impl<S: SimClient> PositionSampler<S> {
    pub fn new(
        client: Arc<S>,
        vehicle: impl Into<String>,
        period: Duration,
        log: TrajectoryLog,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { client, vehicle: vehicle.into(), period, log, metrics, limit: None }
    }

    /// Stop after `limit` rows
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Sample until shutdown, returning the number of rows written this run
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<u64> {
        self.log.write_header()?;
        info!(
            vehicle = %self.vehicle,
            file = %self.log.path().display(),
            period_ms = self.period.as_millis() as u64,
            "sampler_started"
        );

        let mut rows = 0u64;
        let mut signals_open = true;
        loop {
            if *shutdown.borrow() || self.limit.is_some_and(|limit| rows >= limit) {
                break;
            }

            let pose = self.client.vehicle_pose(&self.vehicle).await?;
            self.log.append(pose.waypoint())?;
            rows += 1;
            self.metrics.record_sample();
            debug!(x = pose.x, y = pose.y, rows = rows, "position_sampled");

            tokio::select! {
                _ = tokio::time::sleep(self.period) => {}
                changed = shutdown.changed(), if signals_open => {
                    if changed.is_err() {
                        signals_open = false;
                    }
                }
            }
        }

        info!(vehicle = %self.vehicle, rows = rows, "sampler_stopped");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::CaptureError;
    use crate::domain::types::Pose;
    use crate::io::kinematic_sim::KinematicSim;
    use crate::io::trajectory_log::{load_trajectory, TRAJECTORY_HEADER};
    use std::fs;
    use tempfile::tempdir;

    fn car_at(x: f64, y: f64) -> Arc<KinematicSim> {
        Arc::new(KinematicSim::new(1.0).with_vehicle("Car1", Pose::new(x, y, 0.0)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_leaves_complete_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trajectory.csv");
        let sampler = PositionSampler::new(
            car_at(3.5, -2.0),
            "Car1",
            Duration::from_secs(1),
            TrajectoryLog::new(&path),
            Arc::new(Metrics::new()),
        );
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { sampler.run(rx).await });
        // Rows at t=0, 1, 2
        tokio::time::sleep(Duration::from_millis(2500)).await;
        tx.send(true).unwrap();
        let rows = handle.await.unwrap().unwrap();

        assert_eq!(rows, 3);
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], TRAJECTORY_HEADER);
        assert_eq!(&lines[1..], &["3.5,-2", "3.5,-2", "3.5,-2"]);
        assert!(content.ends_with('\n'));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_limit_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trajectory.csv");
        let sim = car_at(1.0, 1.0);
        let metrics = Arc::new(Metrics::new());
        let sampler =
            PositionSampler::new(sim.clone(), "Car1", Duration::from_millis(800), TrajectoryLog::new(&path), metrics.clone())
                .with_limit(Some(2));
        let (_tx, rx) = watch::channel(false);

        assert_eq!(sampler.run(rx).await.unwrap(), 2);
        assert_eq!(metrics.samples_total(), 2);
        // Stationary vehicle collapses to a single waypoint
        assert_eq!(load_trajectory(&path).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_fault_is_fatal() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for appending
        let sampler = PositionSampler::new(
            car_at(0.0, 0.0),
            "Car1",
            Duration::from_millis(10),
            TrajectoryLog::new(dir.path()),
            Arc::new(Metrics::new()),
        );
        let (_tx, rx) = watch::channel(false);

        let err = sampler.run(rx).await.unwrap_err();
        assert!(matches!(err, CaptureError::Write { .. }));
    }

    #[tokio::test]
    async fn test_unknown_vehicle_is_fatal() {
        let dir = tempdir().unwrap();
        let sampler = PositionSampler::new(
            car_at(0.0, 0.0),
            "Car9",
            Duration::from_millis(10),
            TrajectoryLog::new(dir.path().join("trajectory.csv")),
            Arc::new(Metrics::new()),
        );
        let (_tx, rx) = watch::channel(false);
        assert!(matches!(sampler.run(rx).await.unwrap_err(), CaptureError::Simulator(_)));
    }
}
