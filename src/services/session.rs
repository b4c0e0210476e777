//! Session runner - one capture session from connection to pairing index
//!
//! Order of operations:
//! 1. Confirm the simulator connection (before any state is touched)
//! 2. Load the trajectory and object list (before any vehicle is armed)
//! 3. Create the session directory
//! 4. Remove scenery objects, configure cameras, pin ground vehicles at their
//!    altitude, arm and take off
//! 5. Run the traversal
//! 6. Build and write the pairing index
//!
//! A fault during setup or traversal triggers a best-effort simulator reset
//! before the fault is returned. Recording is stopped first, but only when it
//! was started and has not yet been sent its stop.

use crate::domain::capture::{new_session_id, CaptureSession};
use crate::domain::error::Result;
use crate::domain::types::{AgentRole, Pose};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::capture_log::{read_capture_log, CaptureLog};
use crate::io::image_store::ImageStore;
use crate::io::scenery::load_object_list;
use crate::io::sim::SimClient;
use crate::io::trajectory_log::load_trajectory;
use crate::services::controller::{PathController, TraversalOutcome};
use crate::services::gate::{CaptureGate, MovementPolicy};
use crate::services::pairing::{ImagePairIndexer, PAIRS_FILE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Result of a completed (or interrupted) session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: String,
    pub output_dir: PathBuf,
    pub traversal: TraversalOutcome,
    /// Entries in the written pairing index
    pub pairs: usize,
    pub pairs_file: PathBuf,
}

impl SessionReport {
    pub fn interrupted(&self) -> bool {
        self.traversal.interrupted
    }
}

pub struct SessionRunner<S> {
    client: Arc<S>,
    config: Config,
    metrics: Arc<Metrics>,
    session_id: String,
}

impl<S: SimClient + 'static> SessionRunner<S> {
    pub fn new(client: Arc<S>, config: Config, metrics: Arc<Metrics>) -> Self {
        Self { client, config, metrics, session_id: new_session_id() }
    }

    /// Id of the session this runner will record; also names its output directory
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<SessionReport> {
        self.client.confirm_connection().await?;

        let trajectory = load_trajectory(self.config.trajectory_file())?;
        let objects = match self.config.objects_file() {
            Some(path) => load_object_list(path)?,
            None => Vec::new(),
        };

        let session_id = self.session_id.clone();
        let output_dir = Path::new(self.config.output_root()).join(&session_id);
        let store = ImageStore::create(&output_dir, self.config.image_ext())?;
        let log = CaptureLog::in_dir(&output_dir);
        let mut session = CaptureSession::new(session_id.clone());

        info!(
            session = %session_id,
            output_dir = %output_dir.display(),
            waypoints = trajectory.len(),
            path_length_m = trajectory.length(),
            objects = objects.len(),
            "session_started"
        );

        let agents = self.config.agents();
        let gate = CaptureGate::new(
            self.client.clone(),
            &agents,
            self.config.gate_vehicle(),
            MovementPolicy::from_epsilon(self.config.movement_epsilon()),
            store,
            log,
            self.metrics.clone(),
        );
        let controller = PathController::new(
            self.client.clone(),
            agents,
            self.config.velocity(),
            self.config.tick_interval(),
            self.metrics.clone(),
        );

        let traversal = async {
            self.prepare_scene(&objects).await?;
            controller.run(&trajectory, &gate, &mut session, shutdown).await
        };
        let outcome = match traversal.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(session = %session_id, kind = e.kind(), error = %e, "session_fault");
                self.cleanup_after_fault(controller.recording_open()).await;
                return Err(e);
            }
        };

        let pairs_file = output_dir.join(PAIRS_FILE);
        let pairs = self.write_pairing_index(gate.log().path(), &pairs_file)?;

        info!(
            session = %session_id,
            aerial_frames = outcome.aerial_frames,
            ground_frames = outcome.ground_frames,
            pairs = pairs,
            interrupted = outcome.interrupted,
            "session_completed"
        );
        Ok(SessionReport { session_id, output_dir, traversal: outcome, pairs, pairs_file })
    }

    async fn prepare_scene(&self, objects: &[String]) -> Result<()> {
        for object in objects {
            if self.client.remove_object(object).await? {
                info!(object = %object, "scene_object_removed");
            } else {
                warn!(object = %object, "scene_object_not_found");
            }
        }

        for agent in self.config.agents() {
            self.client.set_camera_fov(&agent.vehicle, &agent.camera.name, agent.camera.fov_deg).await?;
            if agent.role == AgentRole::Ground {
                let pose = self.client.vehicle_pose(&agent.vehicle).await?;
                let pinned = Pose { z: agent.z(), ..pose };
                self.client.set_vehicle_pose(&agent.vehicle, pinned).await?;
                debug!(vehicle = %agent.vehicle, x = pinned.x, y = pinned.y, z = pinned.z, "ground_vehicle_pinned");
            }
            self.client.arm_and_takeoff(&agent.vehicle, agent.altitude).await?;
            info!(
                vehicle = %agent.vehicle,
                role = %agent.role,
                camera = %agent.camera.name,
                fov_deg = agent.camera.fov_deg,
                altitude = agent.altitude,
                "agent_ready"
            );
        }
        Ok(())
    }

    async fn cleanup_after_fault(&self, recording_open: bool) {
        if recording_open {
            if let Err(e) = self.client.stop_recording().await {
                warn!(error = %e, "cleanup_stop_recording_failed");
            }
        }
        if let Err(e) = self.client.reset().await {
            warn!(error = %e, "cleanup_reset_failed");
        }
        info!(recording_stopped = recording_open, "session_cleanup_done");
    }

    fn write_pairing_index(&self, capture_log: &Path, pairs_file: &Path) -> Result<usize> {
        // No log means no tick fired (shutdown before the traversal began)
        let events = if capture_log.exists() { read_capture_log(capture_log)? } else { Vec::new() };

        let index = ImagePairIndexer::new(self.config.ratio())?
            .with_tail(self.config.tail_policy())
            .with_selection(self.config.aerial_selection())
            .build(&events)?;
        index.write_json(pairs_file)?;
        Ok(index.len())
    }
}

