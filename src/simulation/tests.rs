use super::{SimulatedPlant, SimulatedScene};
use crate::attitude::{SunSensorArray, WheelDriver};
use crate::common::math::angle_delta;
use crate::payload::{Camera, TagDetector};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_plant_turns_with_the_wheel() {
    let plant = SimulatedPlant::with_yaw(10.0, 0.0);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!((plant.true_yaw() - 10.0).abs() < 1e-9);

    plant.set_duty(100.0);
    tokio::time::sleep(Duration::from_secs(2)).await;
    let turned = angle_delta(10.0, plant.true_yaw());
    assert!(turned > 10.0, "turned {turned}");

    plant.set_duty(-100.0);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(angle_delta(10.0, plant.true_yaw()) < turned);
}

#[test]
fn test_sun_sensor_facing_the_sun_is_brightest() {
    let plant = SimulatedPlant::with_yaw(0.0, 90.0);
    let intensities = plant.intensities();
    assert_eq!(intensities.len(), 4);
    assert!((intensities[1].unwrap() - 1000.0).abs() < 1e-6);
    assert!(intensities[3].unwrap().abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_target_closes_in_and_spins() {
    let scene = SimulatedScene::default_range(SimulatedPlant::with_yaw(200.0, 0.0));
    tokio::time::sleep(Duration::from_secs(10)).await;
    let frame = scene.capture().unwrap();
    let pose = scene.detect(&frame).unwrap();
    assert_eq!(pose.id, 7);
    assert!((pose.distance - 120.0).abs() < 1e-6);
    assert!((pose.roll - 120.0).abs() < 1e-6);

    // closing stops at the minimum distance
    tokio::time::sleep(Duration::from_secs(100)).await;
    let pose = scene.detect(&scene.capture().unwrap()).unwrap();
    assert!((pose.distance - 5.0).abs() < 1e-6);
}
