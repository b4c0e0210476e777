//! Multi-agent path controller - dispatches one path per agent and joins them
//!
//! Every agent follows the same trajectory concurrently. While paths run the
//! capture gate is evaluated on a fixed tick. Recording stops only after the
//! last agent completes; the first agent fault aborts the rest and is
//! returned to the caller without stopping the recording.
//! [`PathController::recording_open`] tells the caller whether a stop is
//! still owed after a fault.

use crate::domain::capture::CaptureSession;
use crate::domain::error::{CaptureError, Result};
use crate::domain::types::{AgentRole, AgentSpec, Trajectory, Waypoint};
use crate::infra::metrics::Metrics;
use crate::io::sim::SimClient;
use crate::services::gate::CaptureGate;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// How a traversal ended
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalOutcome {
    pub aerial_frames: u64,
    pub ground_frames: u64,
    /// Gate evaluations, including those that did not fire
    pub ticks: u64,
    /// Shutdown was requested before every agent finished
    pub interrupted: bool,
    pub elapsed: Duration,
}

pub struct PathController<S> {
    client: Arc<S>,
    agents: Vec<AgentSpec>,
    velocity: f64,
    tick_interval: Duration,
    metrics: Arc<Metrics>,
    /// Started and not yet handed a stop
    recording: AtomicBool,
}

impl<S: SimClient + 'static> PathController<S> {
    pub fn new(
        client: Arc<S>,
        agents: Vec<AgentSpec>,
        velocity: f64,
        tick_interval: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { client, agents, velocity, tick_interval, metrics, recording: AtomicBool::new(false) }
    }

    /// True while a started recording has not been sent its stop
    pub fn recording_open(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Run the traversal bracketed by the simulator recording
    pub async fn run(
        &self,
        trajectory: &Trajectory,
        gate: &CaptureGate<S>,
        session: &mut CaptureSession,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<TraversalOutcome> {
        let started = Instant::now();
        let mut ticks = 0u64;

        if *shutdown.borrow() {
            warn!(session = %session.id(), "traversal_skipped_shutdown_requested");
            return Ok(self.outcome(session, ticks, true, started));
        }

        self.client.start_recording().await?;
        self.recording.store(true, Ordering::Release);
        info!(
            session = %session.id(),
            agents = self.agents.len(),
            waypoints = trajectory.len(),
            velocity = %self.velocity,
            "recording_started"
        );

        let path: Arc<[Waypoint]> = trajectory.waypoints().into();
        let mut tasks = JoinSet::new();
        let mut vehicles_by_task = FxHashMap::default();
        for agent in &self.agents {
            let client = self.client.clone();
            let path = path.clone();
            let vehicle = agent.vehicle.clone();
            let z = agent.z();
            let velocity = self.velocity;
            let handle = tasks.spawn(async move {
                let result = client.follow_path(&vehicle, &path, z, velocity).await;
                (vehicle, result)
            });
            vehicles_by_task.insert(handle.id(), agent.vehicle.clone());
            debug!(vehicle = %agent.vehicle, role = %agent.role, z = agent.z(), "agent_path_dispatched");
        }

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut remaining = self.agents.len();
        let mut signals_open = true;
        let mut interrupted = false;

        while remaining > 0 {
            tokio::select! {
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok((vehicle, Ok(()))) => {
                            remaining -= 1;
                            self.metrics.record_path_completed();
                            info!(vehicle = %vehicle, remaining = remaining, "agent_path_completed");
                        }
                        Ok((vehicle, Err(e))) => {
                            tasks.abort_all();
                            self.metrics.record_path_fault();
                            let e = match e {
                                e @ CaptureError::PathExecution { .. } => e,
                                other => CaptureError::PathExecution { vehicle, reason: other.to_string() },
                            };
                            error!(session = %session.id(), error = %e, "agent_path_fault");
                            return Err(e);
                        }
                        Err(join_err) => {
                            tasks.abort_all();
                            self.metrics.record_path_fault();
                            let vehicle = vehicles_by_task
                                .get(&join_err.id())
                                .cloned()
                                .unwrap_or_else(|| "unknown".to_string());
                            error!(session = %session.id(), vehicle = %vehicle, error = %join_err, "agent_task_failed");
                            return Err(CaptureError::PathExecution { vehicle, reason: join_err.to_string() });
                        }
                    }
                }
                _ = ticker.tick() => {
                    ticks += 1;
                    if let Err(e) = gate.tick(session).await {
                        tasks.abort_all();
                        error!(session = %session.id(), error = %e, "capture_tick_failed");
                        return Err(e);
                    }
                }
                changed = shutdown.changed(), if signals_open => {
                    if changed.is_err() {
                        signals_open = false;
                    } else if *shutdown.borrow() {
                        tasks.abort_all();
                        interrupted = true;
                        warn!(session = %session.id(), remaining = remaining, "traversal_interrupted");
                        break;
                    }
                }
            }
        }

        // Resting pose after the last leg
        if !interrupted {
            ticks += 1;
            gate.tick(session).await?;
        }

        // Stop is issued at most once, even when it fails
        self.recording.store(false, Ordering::Release);
        self.client.stop_recording().await?;
        self.client.reset().await?;

        let outcome = self.outcome(session, ticks, interrupted, started);
        info!(
            session = %session.id(),
            aerial_frames = outcome.aerial_frames,
            ground_frames = outcome.ground_frames,
            ticks = outcome.ticks,
            interrupted = outcome.interrupted,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "recording_stopped"
        );
        Ok(outcome)
    }

    fn outcome(&self, session: &CaptureSession, ticks: u64, interrupted: bool, started: Instant) -> TraversalOutcome {
        TraversalOutcome {
            aerial_frames: session.captured(AgentRole::Aerial),
            ground_frames: session.captured(AgentRole::Ground),
            ticks,
            interrupted,
            elapsed: started.elapsed(),
        }
    }
}
