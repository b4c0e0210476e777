//! In-process kinematic simulator
//!
//! Moves vehicles along polylines at the commanded velocity in tokio time,
//! so paused-clock tests run instantly and deterministically. Frames are
//! small binary PGM images whose pixels derive from the camera pose; pair it
//! with `image_ext = "pgm"`.
//!
//! Faults can be injected per vehicle to exercise the session failure paths.

use crate::domain::error::{CaptureError, Result};
use crate::domain::types::{CameraPose, Pose, Waypoint};
use crate::infra::config::Config;
use crate::io::scenery::load_object_list;
use crate::io::sim::SimClient;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Simulated seconds per interpolation step while following a path
const STEP_SECS: f64 = 0.25;

const FRAME_WIDTH: usize = 32;
const FRAME_HEIGHT: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingMark {
    Start,
    Stop,
}

#[derive(Debug, Clone)]
struct PathFault {
    /// Index of the waypoint the vehicle fails to reach
    at_waypoint: usize,
    reason: String,
}

#[derive(Debug, Clone)]
struct VehicleState {
    home: Pose,
    pose: Pose,
    armed: bool,
    /// Vehicle capability; commanded velocities above it are clamped
    max_velocity: Option<f64>,
}

#[derive(Debug, Default)]
struct SimState {
    vehicles: FxHashMap<String, VehicleState>,
    /// External cameras positioned in world space
    external_cameras: FxHashMap<String, CameraPose>,
    camera_fov: FxHashMap<(String, String), f64>,
    scene_objects: FxHashSet<String>,
    faults: FxHashMap<String, PathFault>,
    recording: bool,
    recording_marks: Vec<(RecordingMark, Instant)>,
    path_completions: Vec<(String, Instant)>,
    resets: u32,
}

pub struct KinematicSim {
    state: Mutex<SimState>,
    /// Simulated seconds per wall-clock second
    time_scale: f64,
    reachable: bool,
}

impl KinematicSim {
    pub fn new(time_scale: f64) -> Self {
        Self { state: Mutex::new(SimState::default()), time_scale, reachable: true }
    }

    /// Simulator populated with every configured vehicle at the origin
    ///
    /// Objects named in the configured object list are placed in the scene so
    /// that a session can remove them.
    pub fn from_config(config: &Config) -> Self {
        let mut sim = Self::new(config.time_scale());
        for agent in config.agents() {
            sim = sim.with_vehicle(agent.vehicle, Pose::default());
        }
        if !sim.state.lock().vehicles.contains_key(config.sampler_vehicle()) {
            sim = sim.with_vehicle(config.sampler_vehicle(), Pose::default());
        }
        if let Some(objects) = config.objects_file().and_then(|path| load_object_list(path).ok()) {
            sim = sim.with_scene_objects(objects);
        }
        sim
    }

    /// Add a vehicle at `home`
    pub fn with_vehicle(self, name: impl Into<String>, home: Pose) -> Self {
        self.state.lock().vehicles.insert(
            name.into(),
            VehicleState { home, pose: home, armed: false, max_velocity: None },
        );
        self
    }

    /// Clamp a vehicle's path velocity
    pub fn with_max_velocity(self, name: &str, max_velocity: f64) -> Self {
        if let Some(vehicle) = self.state.lock().vehicles.get_mut(name) {
            vehicle.max_velocity = Some(max_velocity);
        }
        self
    }

    pub fn with_scene_objects<I, S>(self, objects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().scene_objects.extend(objects.into_iter().map(Into::into));
        self
    }

    /// Make `vehicle` fail its path command before reaching waypoint `at_waypoint`
    pub fn with_path_fault(self, vehicle: &str, at_waypoint: usize, reason: &str) -> Self {
        self.state
            .lock()
            .faults
            .insert(vehicle.to_string(), PathFault { at_waypoint, reason: reason.to_string() });
        self
    }

    /// Simulate an unreachable simulator
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    pub fn recording_marks(&self) -> Vec<(RecordingMark, Instant)> {
        self.state.lock().recording_marks.clone()
    }

    pub fn path_completed_at(&self, vehicle: &str) -> Option<Instant> {
        self.state.lock().path_completions.iter().find(|(v, _)| v == vehicle).map(|(_, at)| *at)
    }

    pub fn is_armed(&self, vehicle: &str) -> bool {
        self.state.lock().vehicles.get(vehicle).is_some_and(|v| v.armed)
    }

    pub fn camera_fov(&self, vehicle: &str, camera: &str) -> Option<f64> {
        self.state.lock().camera_fov.get(&(vehicle.to_string(), camera.to_string())).copied()
    }

    pub fn scene_contains(&self, object: &str) -> bool {
        self.state.lock().scene_objects.contains(object)
    }

    pub fn resets(&self) -> u32 {
        self.state.lock().resets
    }

    fn unknown_vehicle(vehicle: &str) -> CaptureError {
        CaptureError::Simulator(format!("unknown vehicle '{vehicle}'"))
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(CaptureError::Connection("kinematic simulator marked unreachable".to_string()))
        }
    }

    fn set_pose(&self, vehicle: &str, pose: Pose) {
        if let Some(v) = self.state.lock().vehicles.get_mut(vehicle) {
            v.pose = pose;
        }
    }

    /// Binary PGM frame; pixel values derive from the viewpoint
    fn render_frame(x: f64, y: f64, z: f64, salt: u8) -> Bytes {
        let header = format!("P5\n{FRAME_WIDTH} {FRAME_HEIGHT}\n255\n");
        let mut frame = BytesMut::with_capacity(header.len() + FRAME_WIDTH * FRAME_HEIGHT);
        frame.put_slice(header.as_bytes());
        let base = (x * 8.0 + y * 4.0 - z * 2.0) as i64;
        for row in 0..FRAME_HEIGHT {
            for col in 0..FRAME_WIDTH {
                let v = base.wrapping_add((row * 3 + col * 5) as i64).wrapping_add(salt as i64);
                frame.put_u8(v.rem_euclid(256) as u8);
            }
        }
        frame.freeze()
    }
}

#[async_trait]
impl SimClient for KinematicSim {
    async fn confirm_connection(&self) -> Result<()> {
        self.ensure_reachable()?;
        info!(vehicles = self.state.lock().vehicles.len(), "kinematic_sim_connected");
        Ok(())
    }

    async fn vehicle_pose(&self, vehicle: &str) -> Result<Pose> {
        self.ensure_reachable()?;
        self.state.lock().vehicles.get(vehicle).map(|v| v.pose).ok_or_else(|| Self::unknown_vehicle(vehicle))
    }

    async fn set_vehicle_pose(&self, vehicle: &str, pose: Pose) -> Result<()> {
        let mut state = self.state.lock();
        let v = state.vehicles.get_mut(vehicle).ok_or_else(|| Self::unknown_vehicle(vehicle))?;
        v.pose = pose;
        Ok(())
    }

    async fn set_camera_fov(&self, vehicle: &str, camera: &str, fov_deg: f64) -> Result<()> {
        if !(0.0..180.0).contains(&fov_deg) {
            return Err(CaptureError::Simulator(format!("invalid field of view {fov_deg}")));
        }
        self.state.lock().camera_fov.insert((vehicle.to_string(), camera.to_string()), fov_deg);
        Ok(())
    }

    async fn set_camera_pose(&self, camera: &str, pose: CameraPose, external: bool) -> Result<()> {
        if external {
            self.state.lock().external_cameras.insert(camera.to_string(), pose);
        }
        Ok(())
    }

    async fn capture_image(&self, vehicle: &str, camera: &str, external: bool) -> Result<Bytes> {
        self.ensure_reachable()?;
        let state = self.state.lock();
        if external {
            let pose = state
                .external_cameras
                .get(camera)
                .ok_or_else(|| CaptureError::Simulator(format!("external camera '{camera}' not placed")))?;
            Ok(Self::render_frame(pose.x, pose.y, pose.z, 0x55))
        } else {
            let pose = state.vehicles.get(vehicle).map(|v| v.pose).ok_or_else(|| Self::unknown_vehicle(vehicle))?;
            Ok(Self::render_frame(pose.x, pose.y, pose.z, 0))
        }
    }

    async fn remove_object(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().scene_objects.remove(name))
    }

    async fn arm_and_takeoff(&self, vehicle: &str, altitude: f64) -> Result<()> {
        let mut state = self.state.lock();
        let v = state.vehicles.get_mut(vehicle).ok_or_else(|| Self::unknown_vehicle(vehicle))?;
        v.armed = true;
        v.pose.z = -altitude;
        debug!(vehicle = %vehicle, altitude = %altitude, "vehicle_armed");
        Ok(())
    }

    async fn follow_path(&self, vehicle: &str, path: &[Waypoint], z: f64, velocity: f64) -> Result<()> {
        let path_error = |reason: String| CaptureError::PathExecution { vehicle: vehicle.to_string(), reason };

        if velocity <= 0.0 {
            return Err(path_error(format!("invalid velocity {velocity}")));
        }

        let (mut current, speed, fault) = {
            let state = self.state.lock();
            let v = state.vehicles.get(vehicle).ok_or_else(|| Self::unknown_vehicle(vehicle))?;
            if !v.armed {
                return Err(path_error("vehicle not armed".to_string()));
            }
            let speed = v.max_velocity.map_or(velocity, |max| max.min(velocity));
            (v.pose, speed, state.faults.get(vehicle).cloned())
        };

        for (idx, target) in path.iter().enumerate() {
            if let Some(fault) = fault.as_ref().filter(|f| f.at_waypoint == idx) {
                return Err(path_error(fault.reason.clone()));
            }

            let start = current;
            let (dx, dy, dz) = (target.x - start.x, target.y - start.y, z - start.z);
            let distance = (dx * dx + dy * dy + dz * dz).sqrt();
            let yaw = if dx != 0.0 || dy != 0.0 { dy.atan2(dx) } else { start.yaw };
            let secs = distance / speed;
            let steps = (secs / STEP_SECS).ceil().max(1.0) as u32;
            let step_wait = Duration::from_secs_f64(secs / f64::from(steps) / self.time_scale);

            for step in 1..=steps {
                tokio::time::sleep(step_wait).await;
                current = if step == steps {
                    Pose { x: target.x, y: target.y, z, yaw }
                } else {
                    let t = f64::from(step) / f64::from(steps);
                    Pose { x: start.x + dx * t, y: start.y + dy * t, z: start.z + dz * t, yaw }
                };
                self.set_pose(vehicle, current);
            }
        }

        self.state.lock().path_completions.push((vehicle.to_string(), Instant::now()));
        debug!(vehicle = %vehicle, waypoints = path.len(), "path_completed");
        Ok(())
    }

    async fn start_recording(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.recording {
            state.recording = true;
            state.recording_marks.push((RecordingMark::Start, Instant::now()));
        }
        Ok(())
    }

    async fn stop_recording(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.recording {
            state.recording = false;
            state.recording_marks.push((RecordingMark::Stop, Instant::now()));
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.lock();
        for v in state.vehicles.values_mut() {
            v.pose = v.home;
            v.armed = false;
        }
        state.external_cameras.clear();
        state.resets += 1;
        Ok(())
    }
}
