use super::{Camera, Frame, NumberRecognizer, PayloadProcess, RangeSensor, TagDetector, TagPose};
use crate::ipc::{ConsoleSink, Response, Supervisor};
use crate::protocol::{Command, HealthReport, HealthStatus, NumberId, request};
use crate::simulation::{SimulatedPlant, SimulatedScene};
use crate::subsystems::{SubsystemId, SubsystemRegistry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// A payload whose camera and range sensor never deliver.
struct BlindSensors;

impl Camera for BlindSensors {
    fn capture(&self) -> Option<Frame> { None }
}

impl NumberRecognizer for BlindSensors {
    fn recognize(&self, _frame: &Frame) -> Vec<NumberId> { Vec::new() }
}

impl TagDetector for BlindSensors {
    fn detect(&self, _frame: &Frame) -> Option<TagPose> { None }
}

impl RangeSensor for BlindSensors {
    fn distance_cm(&self) -> Option<f64> { None }
}

fn payload_at(yaw: f64) -> Supervisor {
    let scene = Arc::new(SimulatedScene::default_range(SimulatedPlant::with_yaw(yaw, 0.0)));
    let mut registry = SubsystemRegistry::new();
    registry.register(SubsystemId::Payload, move || Box::new(PayloadProcess::new(scene.clone())));
    let (mut sv, _telemetry) = Supervisor::new(registry, Box::new(ConsoleSink));
    sv.start(SubsystemId::Payload).unwrap();
    sv
}

async fn ask(sv: &mut Supervisor, command: Command) -> Response {
    request(sv, SubsystemId::Payload, command, Some(Duration::from_secs(1))).await.unwrap()
}

#[tokio::test]
async fn test_pictures_collect_numbers_once() {
    let mut sv = payload_at(60.0);
    assert_eq!(ask(&mut sv, Command::IsReady).await.as_bool(), Some(true));
    assert_eq!(ask(&mut sv, Command::GetState).await.raw(), json!("IDLE"));

    assert_eq!(ask(&mut sv, Command::TakePicture { current_yaw: 58.0 }).await.as_bool(), Some(true));
    assert_eq!(ask(&mut sv, Command::TakePicture { current_yaw: 61.0 }).await.as_bool(), Some(true));
    assert_eq!(ask(&mut sv, Command::GetState).await.raw(), json!("IMAGING"));
    // the first yaw a number was seen at wins
    assert_eq!(ask(&mut sv, Command::GetNumbers).await.raw(), json!({"14": 58.0}));
    assert_eq!(ask(&mut sv, Command::GetNumbers).await.raw(), json!({}));
    assert_eq!(ask(&mut sv, Command::GetState).await.raw(), json!("IDLE"));
    sv.shutdown().await;
}

#[tokio::test]
async fn test_distance_and_tag() {
    let mut sv = payload_at(60.0);
    let distance = ask(&mut sv, Command::TakeDistance).await.raw().as_f64().unwrap();
    assert!((distance - 80.0).abs() <= 0.5 + 1e-9, "distance {distance}");
    assert_eq!(ask(&mut sv, Command::DetectAprilTag).await.raw(), json!(null));
    assert_eq!(ask(&mut sv, Command::ReadTarget).await.raw(), json!(null));
    sv.shutdown().await;

    let mut sv = payload_at(195.0);
    let pose = ask(&mut sv, Command::DetectAprilTag).await.raw();
    assert_eq!(pose["id"], json!(7));
    assert!((pose["bearing"].as_f64().unwrap() - 5.0).abs() < 1e-6);
    assert!(pose["distance"].as_f64().unwrap() <= 150.0);
    assert_eq!(ask(&mut sv, Command::ReadTarget).await.raw(), json!(7));
    sv.shutdown().await;
}

#[tokio::test]
async fn test_health_reports_missing_readings() {
    let mut sv = payload_at(0.0);
    let report = HealthReport::from_response(&ask(&mut sv, Command::HealthCheck).await).unwrap();
    assert_eq!(report.components[0].name, "Camera");
    // nothing in front of the range sensor at 0 deg
    assert_eq!(report.status(), HealthStatus::Degraded);
    sv.shutdown().await;
}

#[tokio::test]
async fn test_blind_camera() {
    let mut registry = SubsystemRegistry::new();
    registry.register(SubsystemId::Payload, || Box::new(PayloadProcess::new(Arc::new(BlindSensors))));
    let (mut sv, _telemetry) = Supervisor::new(registry, Box::new(ConsoleSink));
    sv.start(SubsystemId::Payload).unwrap();

    assert_eq!(ask(&mut sv, Command::IsReady).await.as_bool(), Some(false));
    assert_eq!(ask(&mut sv, Command::TakePicture { current_yaw: 0.0 }).await.as_bool(), Some(false));
    let report = HealthReport::from_response(&ask(&mut sv, Command::HealthCheck).await).unwrap();
    assert_eq!(report.status(), HealthStatus::Down);
    sv.shutdown().await;
}
