//! End-to-end capture sessions against the kinematic simulator

use async_trait::async_trait;
use bytes::Bytes;
use paired_capture::domain::{AgentRole, CameraPose, CaptureError, CaptureEvent, Pose, Result, Waypoint};
use paired_capture::infra::{Config, Metrics};
use paired_capture::io::capture_log::CAPTURE_LOG_FILE;
use paired_capture::io::kinematic_sim::RecordingMark;
use paired_capture::io::{read_capture_log, KinematicSim, SimClient, TrajectoryLog};
use paired_capture::services::{PairingIndex, SessionRunner};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tokio::sync::watch;

struct Workspace {
    dir: TempDir,
    config: Config,
}

impl Workspace {
    fn output_root(&self) -> PathBuf {
        self.dir.path().join("captures")
    }
}

fn workspace(samples: &[(f64, f64)]) -> Workspace {
    let dir = tempdir().unwrap();
    let trajectory = dir.path().join("trajectory.csv");
    let log = TrajectoryLog::new(&trajectory);
    log.write_header().unwrap();
    for &(x, y) in samples {
        log.append(Waypoint::new(x, y)).unwrap();
    }

    let config = Config::default()
        .with_output_root(dir.path().join("captures").display().to_string())
        .with_trajectory_file(trajectory.display().to_string());
    Workspace { dir, config }
}

fn l_shaped() -> Workspace {
    workspace(&[(0.0, 0.0), (0.0, 0.0), (10.0, 0.0), (10.0, 0.0), (10.0, 10.0)])
}

/// L-shaped workspace whose config file lists two ground agents
fn two_ground_workspace() -> Workspace {
    let ws = l_shaped();
    let path = ws.dir.path().join("two_ground.toml");
    let toml = format!(
        "[session]\noutput_root = {:?}\ntrajectory_file = {:?}\n\n\
         [[ground]]\nvehicle = \"Drone2\"\n\n[[ground]]\nvehicle = \"Drone3\"\n",
        ws.config.output_root(),
        ws.config.trajectory_file(),
    );
    fs::write(&path, toml).unwrap();
    let config = Config::from_file(&path).unwrap();
    Workspace { dir: ws.dir, config }
}

fn event_named<'a>(events: &'a [CaptureEvent], name: &str) -> &'a CaptureEvent {
    events.iter().find(|e| e.file_name() == name).unwrap()
}

/// Simulator wrapper counting the session-bracketing calls
struct CountingSim {
    inner: KinematicSim,
    fail_fov: bool,
    fail_stop: bool,
    starts: AtomicU32,
    stops: AtomicU32,
    resets: AtomicU32,
    pins: AtomicU32,
}

impl CountingSim {
    fn new(inner: KinematicSim) -> Self {
        Self {
            inner,
            fail_fov: false,
            fail_stop: false,
            starts: AtomicU32::new(0),
            stops: AtomicU32::new(0),
            resets: AtomicU32::new(0),
            pins: AtomicU32::new(0),
        }
    }

    fn counts(&self) -> (u32, u32, u32) {
        (
            self.starts.load(Ordering::Relaxed),
            self.stops.load(Ordering::Relaxed),
            self.resets.load(Ordering::Relaxed),
        )
    }
}

#[async_trait]
impl SimClient for CountingSim {
    async fn confirm_connection(&self) -> Result<()> {
        self.inner.confirm_connection().await
    }

    async fn vehicle_pose(&self, vehicle: &str) -> Result<Pose> {
        self.inner.vehicle_pose(vehicle).await
    }

    async fn set_vehicle_pose(&self, vehicle: &str, pose: Pose) -> Result<()> {
        self.pins.fetch_add(1, Ordering::Relaxed);
        self.inner.set_vehicle_pose(vehicle, pose).await
    }

    async fn set_camera_fov(&self, vehicle: &str, camera: &str, fov_deg: f64) -> Result<()> {
        if self.fail_fov {
            return Err(CaptureError::Simulator(format!("camera '{camera}' rejected fov {fov_deg}")));
        }
        self.inner.set_camera_fov(vehicle, camera, fov_deg).await
    }

    async fn set_camera_pose(&self, camera: &str, pose: CameraPose, external: bool) -> Result<()> {
        self.inner.set_camera_pose(camera, pose, external).await
    }

    async fn capture_image(&self, vehicle: &str, camera: &str, external: bool) -> Result<Bytes> {
        self.inner.capture_image(vehicle, camera, external).await
    }

    async fn remove_object(&self, name: &str) -> Result<bool> {
        self.inner.remove_object(name).await
    }

    async fn arm_and_takeoff(&self, vehicle: &str, altitude: f64) -> Result<()> {
        self.inner.arm_and_takeoff(vehicle, altitude).await
    }

    async fn follow_path(&self, vehicle: &str, path: &[Waypoint], z: f64, velocity: f64) -> Result<()> {
        self.inner.follow_path(vehicle, path, z, velocity).await
    }

    async fn start_recording(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::Relaxed);
        self.inner.start_recording().await
    }

    async fn stop_recording(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::Relaxed);
        if self.fail_stop {
            return Err(CaptureError::Simulator("recorder busy".to_string()));
        }
        self.inner.stop_recording().await
    }

    async fn reset(&self) -> Result<()> {
        self.resets.fetch_add(1, Ordering::Relaxed);
        self.inner.reset().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_session_captures_and_pairs() {
    let ws = l_shaped();
    let sim = Arc::new(KinematicSim::from_config(&ws.config));
    let runner = SessionRunner::new(sim.clone(), ws.config.clone(), Arc::new(Metrics::new()));
    let (_tx, rx) = watch::channel(false);

    let report = runner.run(rx).await.unwrap();

    assert!(!report.interrupted());
    assert_eq!(report.output_dir, ws.dir.path().join("captures").join(&report.session_id));
    assert_eq!(report.traversal.aerial_frames, report.traversal.ground_frames);
    assert!(report.traversal.ground_frames > 2);

    // Contiguous per-role indices, each backed by a file
    let events = read_capture_log(report.output_dir.join(CAPTURE_LOG_FILE)).unwrap();
    for role in [AgentRole::Aerial, AgentRole::Ground] {
        let indices: Vec<u64> = events.iter().filter(|e| e.role == role).map(|e| e.sequence_index).collect();
        let expected: Vec<u64> = (0..indices.len() as u64).collect();
        assert_eq!(indices, expected);
    }
    assert!(events.iter().all(|e| e.file_path.exists()));
    assert!(report.output_dir.join("aerial_0.png").exists());
    assert!(report.output_dir.join("ground_0.png").exists());

    // Resting pose at the final waypoint was captured
    let last = events.last().unwrap();
    assert_eq!((last.pose_at_capture.x, last.pose_at_capture.y), (10.0, 10.0));

    let index: PairingIndex = serde_json::from_str(&fs::read_to_string(&report.pairs_file).unwrap()).unwrap();
    assert_eq!(index.ratio, 5);
    assert_eq!(index.len(), report.pairs);
    assert_eq!(index.entries[0].aerial, "aerial_0.png");
    assert_eq!(index.entries[0].ground, vec!["ground_0.png", "ground_1.png", "ground_2.png", "ground_3.png", "ground_4.png"]);

    // Every ground frame is paired; only the final block may be short, none is empty
    let ground_total = report.traversal.ground_frames as usize;
    assert_eq!(index.len(), ground_total.div_ceil(5));
    let (last, full) = index.entries.split_last().unwrap();
    assert!(full.iter().all(|p| p.ground.len() == 5));
    assert!(!last.ground.is_empty());

    // aerial_5k opens the block starting at ground_5k, captured on the same tick
    for (k, pair) in index.entries.iter().enumerate() {
        assert_eq!(pair.aerial, format!("aerial_{}.png", 5 * k));
        assert_eq!(pair.ground[0], format!("ground_{}.png", 5 * k));
        let aerial = event_named(&events, &pair.aerial);
        let ground = event_named(&events, &pair.ground[0]);
        assert_eq!(aerial.pose_at_capture, ground.pose_at_capture);
        assert_eq!(aerial.captured_at, ground.captured_at);
    }

    assert!(!sim.is_recording());
    assert_eq!(sim.resets(), 1);
    assert_eq!(sim.camera_fov("Drone2", "front_center"), Some(120.0));
    assert_eq!(sim.camera_fov("Drone1", "AerialCamera"), Some(90.0));
}

#[tokio::test]
async fn test_unreachable_simulator_is_connection_fault() {
    let ws = l_shaped();
    let sim = Arc::new(KinematicSim::from_config(&ws.config).unreachable());
    let runner = SessionRunner::new(sim.clone(), ws.config.clone(), Arc::new(Metrics::new()));
    let (_tx, rx) = watch::channel(false);

    let err = runner.run(rx).await.unwrap_err();

    assert!(matches!(err, CaptureError::Connection(_)));
    assert!(!sim.is_armed("Drone1"));
    assert!(!ws.output_root().exists());
}

#[tokio::test]
async fn test_missing_trajectory_fails_before_arming() {
    let ws = l_shaped();
    let config = ws.config.clone().with_trajectory_file(ws.dir.path().join("absent.csv").display().to_string());
    let sim = Arc::new(KinematicSim::from_config(&config));
    let runner = SessionRunner::new(sim.clone(), config, Arc::new(Metrics::new()));
    let (_tx, rx) = watch::channel(false);

    let err = runner.run(rx).await.unwrap_err();

    assert!(matches!(err, CaptureError::MissingInput(_)));
    assert!(!sim.is_armed("Drone1"));
    assert!(!sim.is_armed("Drone2"));
    assert!(sim.recording_marks().is_empty());
    assert!(!ws.output_root().exists());
}

#[tokio::test]
async fn test_missing_object_list_fails_before_arming() {
    let ws = l_shaped();
    let config = ws.config.clone().with_objects_file(ws.dir.path().join("objects.txt").display().to_string());
    let sim = Arc::new(KinematicSim::from_config(&config));
    let runner = SessionRunner::new(sim.clone(), config, Arc::new(Metrics::new()));
    let (_tx, rx) = watch::channel(false);

    assert!(matches!(runner.run(rx).await.unwrap_err(), CaptureError::MissingInput(_)));
    assert!(!sim.is_armed("Drone1"));
}

#[tokio::test(start_paused = true)]
async fn test_scenery_objects_are_removed() {
    let ws = l_shaped();
    let objects = ws.dir.path().join("objects.txt");
    fs::write(&objects, "Tree_1\n\nLamp_3\n").unwrap();
    let config = ws.config.clone().with_objects_file(objects.display().to_string());
    let sim = Arc::new(KinematicSim::from_config(&config).with_scene_objects(["Bench_2"]));
    let runner = SessionRunner::new(sim.clone(), config, Arc::new(Metrics::new()));
    let (_tx, rx) = watch::channel(false);

    runner.run(rx).await.unwrap();

    assert!(!sim.scene_contains("Tree_1"));
    assert!(!sim.scene_contains("Lamp_3"));
    assert!(sim.scene_contains("Bench_2"));
}

#[tokio::test(start_paused = true)]
async fn test_path_fault_stops_recording_and_resets() {
    let ws = l_shaped();
    let sim = Arc::new(KinematicSim::from_config(&ws.config).with_path_fault("Drone2", 2, "collision"));
    let runner = SessionRunner::new(sim.clone(), ws.config.clone(), Arc::new(Metrics::new()));
    let (_tx, rx) = watch::channel(false);

    let err = runner.run(rx).await.unwrap_err();

    match err {
        CaptureError::PathExecution { vehicle, reason } => {
            assert_eq!(vehicle, "Drone2");
            assert_eq!(reason, "collision");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!sim.is_recording());
    assert_eq!(sim.resets(), 1);
    assert!(!sim.is_armed("Drone1"));
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_session_still_writes_index() {
    let ws = l_shaped();
    let sim = Arc::new(KinematicSim::from_config(&ws.config));
    let runner = SessionRunner::new(sim.clone(), ws.config.clone(), Arc::new(Metrics::new()));
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let _ = tx.send(true);
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let report = runner.run(rx).await.unwrap();

    assert!(report.interrupted());
    assert!(report.traversal.ground_frames >= 1);
    assert!(report.pairs_file.exists());
    assert!(!sim.is_recording());
    assert!(sim.path_completed_at("Drone2").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_two_ground_agents_share_the_session() {
    let ws = two_ground_workspace();
    let sim = Arc::new(KinematicSim::from_config(&ws.config).with_max_velocity("Drone3", 4.0));
    let runner = SessionRunner::new(sim.clone(), ws.config.clone(), Arc::new(Metrics::new()));
    let (_tx, rx) = watch::channel(false);

    let report = runner.run(rx).await.unwrap();

    assert_eq!(report.traversal.ground_frames, 2 * report.traversal.aerial_frames);

    // Ground indices stay contiguous across both vehicles, Drone2 first within a tick
    let events = read_capture_log(report.output_dir.join(CAPTURE_LOG_FILE)).unwrap();
    let ground: Vec<&CaptureEvent> = events.iter().filter(|e| e.role == AgentRole::Ground).collect();
    let indices: Vec<u64> = ground.iter().map(|e| e.sequence_index).collect();
    assert_eq!(indices, (0..ground.len() as u64).collect::<Vec<_>>());
    for tick in ground.chunks(2) {
        assert_eq!(tick[0].vehicle, "Drone2");
        assert_eq!(tick[1].vehicle, "Drone3");
        assert_eq!(tick[0].captured_at, tick[1].captured_at);
    }
    assert!(report.output_dir.join(format!("ground_{}.png", ground.len() - 1)).exists());

    // Both ground paths joined before the recording stopped
    let marks = sim.recording_marks();
    let (RecordingMark::Start, started) = marks[0] else { panic!("expected start mark") };
    let (RecordingMark::Stop, stopped) = marks[1] else { panic!("expected stop mark") };
    for vehicle in ["Drone1", "Drone2", "Drone3"] {
        assert!(sim.path_completed_at(vehicle).unwrap() <= stopped, "{vehicle} still moving at stop");
    }
    assert!(sim.path_completed_at("Drone3").unwrap() > sim.path_completed_at("Drone2").unwrap());
    assert!(started < stopped);
    assert_eq!(sim.camera_fov("Drone3", "front_center"), Some(120.0));

    // Block k starts at ground_5k and is opened by the aerial frame of that tick
    let index: PairingIndex = serde_json::from_str(&fs::read_to_string(&report.pairs_file).unwrap()).unwrap();
    assert_eq!(index.len(), ground.len().div_ceil(5));
    for (k, pair) in index.entries.iter().enumerate() {
        assert_eq!(pair.ground[0], format!("ground_{}.png", 5 * k));
        assert_eq!(pair.aerial, format!("aerial_{}.png", 5 * k / 2));
    }
}

#[tokio::test(start_paused = true)]
async fn test_recording_bracketed_once_and_ground_pinned() {
    let ws = two_ground_workspace();
    let sim = Arc::new(CountingSim::new(KinematicSim::from_config(&ws.config)));
    let runner = SessionRunner::new(sim.clone(), ws.config.clone(), Arc::new(Metrics::new()));
    let (_tx, rx) = watch::channel(false);

    runner.run(rx).await.unwrap();

    assert_eq!(sim.counts(), (1, 1, 1));
    assert_eq!(sim.pins.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn test_setup_fault_resets_without_stopping() {
    let ws = l_shaped();
    let mut sim = CountingSim::new(KinematicSim::from_config(&ws.config));
    sim.fail_fov = true;
    let sim = Arc::new(sim);
    let runner = SessionRunner::new(sim.clone(), ws.config.clone(), Arc::new(Metrics::new()));
    let (_tx, rx) = watch::channel(false);

    let err = runner.run(rx).await.unwrap_err();

    assert!(matches!(err, CaptureError::Simulator(_)));
    assert_eq!(sim.counts(), (0, 0, 1));
}

#[tokio::test(start_paused = true)]
async fn test_path_fault_stops_recording_once() {
    let ws = l_shaped();
    let inner = KinematicSim::from_config(&ws.config).with_path_fault("Drone1", 2, "motor failure");
    let sim = Arc::new(CountingSim::new(inner));
    let runner = SessionRunner::new(sim.clone(), ws.config.clone(), Arc::new(Metrics::new()));
    let (_tx, rx) = watch::channel(false);

    let err = runner.run(rx).await.unwrap_err();

    assert!(matches!(err, CaptureError::PathExecution { .. }));
    assert_eq!(sim.counts(), (1, 1, 1));
    assert!(!sim.inner.is_recording());
}

#[tokio::test(start_paused = true)]
async fn test_failed_stop_is_not_reissued() {
    let ws = l_shaped();
    let mut sim = CountingSim::new(KinematicSim::from_config(&ws.config));
    sim.fail_stop = true;
    let sim = Arc::new(sim);
    let runner = SessionRunner::new(sim.clone(), ws.config.clone(), Arc::new(Metrics::new()));
    let (_tx, rx) = watch::channel(false);

    let err = runner.run(rx).await.unwrap_err();

    assert!(matches!(err, CaptureError::Simulator(_)));
    assert_eq!(sim.counts(), (1, 1, 1));
}
