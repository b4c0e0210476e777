//! Movement gate - decides per tick whether the traversal warrants a capture
//!
//! A firing tick captures one frame from every configured camera, writes them,
//! appends their events to the capture log, and only then advances the
//! session counters and remembered pose. Any failure before that point leaves
//! the session untouched. Image files written before a failed log append stay
//! on disk without a log line; the fault ends the session.

use crate::domain::capture::{CaptureEvent, CaptureSession};
use crate::domain::error::Result;
use crate::domain::types::{AgentRole, AgentSpec, CameraPose, Pose};
use crate::infra::metrics::Metrics;
use crate::io::capture_log::CaptureLog;
use crate::io::image_store::ImageStore;
use crate::io::sim::SimClient;
use bytes::Bytes;
use chrono::Utc;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, trace};

/// Events produced by a single firing tick
pub type TickCaptures = SmallVec<[CaptureEvent; 4]>;

/// When two poses count as "moved"
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MovementPolicy {
    /// Any coordinate differs under exact float comparison
    Exact,
    /// Euclidean distance strictly greater than the threshold (meters)
    Epsilon(f64),
}

impl MovementPolicy {
    pub fn from_epsilon(epsilon: Option<f64>) -> Self {
        epsilon.map_or(MovementPolicy::Exact, MovementPolicy::Epsilon)
    }

    #[inline]
    pub fn moved(&self, current: &Pose, last: &Pose) -> bool {
        match self {
            MovementPolicy::Exact => !current.same_position(last),
            MovementPolicy::Epsilon(eps) => current.distance_to(last) > *eps,
        }
    }
}

/// Pure gating decision; a session with no recorded pose always captures
#[inline]
pub fn should_capture(current: &Pose, last: Option<&Pose>, policy: MovementPolicy) -> bool {
    last.map_or(true, |last| policy.moved(current, last))
}

pub struct CaptureGate<S> {
    client: Arc<S>,
    /// One entry per camera, ground cameras first
    cameras: Vec<AgentSpec>,
    roles: SmallVec<[AgentRole; 4]>,
    /// Vehicle whose pose drives the gate
    anchor_vehicle: String,
    policy: MovementPolicy,
    store: ImageStore,
    log: CaptureLog,
    metrics: Arc<Metrics>,
}

impl<S: SimClient> CaptureGate<S> {
    pub fn new(
        client: Arc<S>,
        agents: &[AgentSpec],
        anchor_vehicle: impl Into<String>,
        policy: MovementPolicy,
        store: ImageStore,
        log: CaptureLog,
        metrics: Arc<Metrics>,
    ) -> Self {
        let mut cameras: Vec<AgentSpec> = agents.to_vec();
        // Stable sort keeps configured order within a role
        cameras.sort_by_key(|a| a.role != AgentRole::Ground);
        let roles = cameras.iter().map(|a| a.role).collect();
        Self { client, cameras, roles, anchor_vehicle: anchor_vehicle.into(), policy, store, log, metrics }
    }

    pub fn anchor_vehicle(&self) -> &str {
        &self.anchor_vehicle
    }

    pub fn log(&self) -> &CaptureLog {
        &self.log
    }

    /// Read the anchor pose and evaluate the gate
    pub async fn tick(&self, session: &mut CaptureSession) -> Result<TickCaptures> {
        let pose = self.client.vehicle_pose(&self.anchor_vehicle).await?;
        self.tick_at(session, pose).await
    }

    /// Evaluate the gate for a known pose
    pub async fn tick_at(&self, session: &mut CaptureSession, pose: Pose) -> Result<TickCaptures> {
        if !should_capture(&pose, session.last_recorded_pose().as_ref(), self.policy) {
            self.metrics.record_tick_skipped();
            trace!(x = pose.x, y = pose.y, z = pose.z, "gate_skipped");
            return Ok(TickCaptures::new());
        }

        let started = Instant::now();
        let frames = self.request_frames(&pose).await?;
        let indices = session.peek_indices(&self.roles);
        let captured_at = Utc::now();

        let mut events = TickCaptures::new();
        for ((agent, frame), sequence_index) in self.cameras.iter().zip(frames).zip(indices) {
            let file_path = self.store.write(agent.role, sequence_index, &frame)?;
            self.metrics.record_image_written(agent.role, frame.len());
            events.push(CaptureEvent {
                role: agent.role,
                vehicle: agent.vehicle.clone(),
                sequence_index,
                file_path,
                pose_at_capture: pose,
                captured_at,
            });
        }

        self.log.append(&events)?;
        session.commit(&self.roles, pose);

        let latency_us = started.elapsed().as_micros() as u64;
        self.metrics.record_capture(latency_us);
        info!(
            session = %session.id(),
            x = pose.x,
            y = pose.y,
            frames = events.len(),
            aerial_total = session.captured(AgentRole::Aerial),
            ground_total = session.captured(AgentRole::Ground),
            latency_us = %latency_us,
            "capture_fired"
        );
        Ok(events)
    }

    /// Fetch every camera's frame before anything is written
    async fn request_frames(&self, anchor: &Pose) -> Result<SmallVec<[Bytes; 4]>> {
        let mut frames = SmallVec::new();
        for agent in &self.cameras {
            if agent.camera.external {
                let placement = CameraPose::overhead(anchor, agent.altitude, agent.camera.pitch_deg);
                self.client.set_camera_pose(&agent.camera.name, placement, true).await?;
            }
            let frame = self.client.capture_image(&agent.vehicle, &agent.camera.name, agent.camera.external).await?;
            frames.push(frame);
        }
        Ok(frames)
    }
}
