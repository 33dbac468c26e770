use super::calibration::CalibratedSensor;
use super::{
    Actuator, ActuatorConfig, ActuatorExit, ActuatorMode, ActuatorState, AdcsProcess, AdcsTiming,
    AttitudeSensor, OnTarget, Pid, PidGains, Setpoint, SunSample, WheelDriver, sun_offset,
};
use crate::common::math::angle_delta;
use crate::ipc::{ConsoleSink, Supervisor};
use crate::protocol::{Command, request};
use crate::simulation::SimulatedPlant;
use crate::subsystems::{SubsystemId, SubsystemRegistry};
use std::sync::Arc;
use std::time::Duration;

fn stalled_state() -> ActuatorState { ActuatorState::new(ActuatorConfig::default(), false) }

#[test]
fn test_pid_no_derivative_kick() {
    let mut pid = Pid::new(PidGains { kp: 1.0, ki: 0.0, kd: 1.0 }, 10.0);
    assert!((pid.update(10.0, 0.1) - 10.0).abs() < 1e-9);
    assert!((pid.update(12.0, 0.1) - 32.0).abs() < 1e-9);
    pid.reset();
    assert!((pid.update(12.0, 0.1) - 12.0).abs() < 1e-9);
}

#[test]
fn test_pid_integral_is_clamped() {
    let mut pid = Pid::new(PidGains { kp: 0.0, ki: 1.0, kd: 0.0 }, 5.0);
    pid.update(100.0, 1.0);
    assert!((pid.integral() - 5.0).abs() < 1e-9);
    pid.update(-100.0, 1.0);
    assert!((pid.integral() + 5.0).abs() < 1e-9);
}

#[test]
fn test_saturation_escape_moves_setpoint_by_full_turn() {
    let config = ActuatorConfig::default();
    let mut state = stalled_state();
    let before = {
        let tick = state.tick(100.0, Some(0.0), Some(0.0)).unwrap();
        assert!(!tick.escaped);
        state.setpoint().unwrap()
    };
    assert!((before - 100.0).abs() < 1e-9);
    for _ in 1..config.saturation_ticks - 1 {
        assert!(!state.tick(100.0, Some(0.0), Some(0.0)).unwrap().escaped);
    }
    assert_eq!(state.saturation_counter(), config.saturation_ticks - 1);

    let tick = state.tick(100.0, Some(0.0), Some(0.0)).unwrap();
    assert!(tick.escaped);
    assert_eq!(state.saturation_counter(), 0);
    let after = state.setpoint().unwrap();
    assert!((after - before + 360.0).abs() < 1e-9, "setpoint {before} -> {after}");

    // still stuck: the next escape goes back the other way
    for _ in 0..config.saturation_ticks {
        state.tick(100.0, Some(0.0), Some(0.0));
    }
    assert!((state.setpoint().unwrap() - before).abs() < 1e-9);
}

#[test]
fn test_live_escape_drives_round_to_target() {
    let config = ActuatorConfig::default();
    let mut state = ActuatorState::new(config.clone(), true);
    for _ in 0..config.saturation_ticks - 1 {
        assert!(!state.tick(100.0, Some(0.0), Some(0.0)).unwrap().escaped);
    }
    assert!(state.tick(100.0, Some(0.0), Some(0.0)).unwrap().escaped);
    assert!((state.setpoint().unwrap() + 260.0).abs() < 1e-9);

    // the long way round: -10 deg per tick until the body sits on 100
    let mut yaw = 0.0;
    let mut tick = None;
    while angle_delta(yaw, 100.0).abs() > 1e-9 {
        yaw = (yaw - 10.0_f64).rem_euclid(360.0);
        tick = state.tick(100.0, Some(yaw), Some(-10.0));
        assert!(!tick.unwrap().escaped);
    }
    assert!(tick.unwrap().error.abs() < 1e-9);
    for _ in 0..config.settle_ticks {
        tick = state.tick(100.0, Some(100.0), Some(0.0));
    }
    let tick = tick.unwrap();
    assert!(tick.error.abs() < 1e-9, "error {}", tick.error);
    assert!(tick.reached);
}

#[test]
fn test_live_target_moves_setpoint_by_its_change() {
    let mut state = ActuatorState::new(ActuatorConfig::default(), true);
    state.tick(10.0, Some(0.0), Some(0.0));
    assert!((state.setpoint().unwrap() - 10.0).abs() < 1e-9);
    state.tick(20.0, Some(0.0), Some(0.0));
    assert!((state.setpoint().unwrap() - 20.0).abs() < 1e-9);
    state.tick(350.0, Some(0.0), Some(0.0));
    assert!((state.setpoint().unwrap() + 10.0).abs() < 1e-9);
}

#[test]
fn test_no_escape_while_turning() {
    let mut state = stalled_state();
    for _ in 0..100 {
        let tick = state.tick(100.0, Some(0.0), Some(10.0)).unwrap();
        assert!(!tick.escaped);
        assert!((tick.duty - 100.0).abs() < 1e-9);
    }
    assert_eq!(state.saturation_counter(), 0);
}

#[test]
fn test_stale_yaw_is_reused() {
    let mut state = stalled_state();
    assert!(state.tick(50.0, None, None).is_none());
    let first = state.tick(50.0, Some(10.0), Some(0.0)).unwrap();
    let stale = state.tick(50.0, None, None).unwrap();
    assert!((first.error - 40.0).abs() < 1e-9);
    assert!((stale.error - 40.0).abs() < 1e-9);
}

#[test]
fn test_short_way_and_target_reached() {
    let mut state = stalled_state();
    let tick = state.tick(350.0, Some(10.0), Some(0.0)).unwrap();
    assert!((tick.error + 20.0).abs() < 1e-9);

    let mut state = stalled_state();
    let settle = ActuatorConfig::default().settle_ticks;
    for i in 1..=settle {
        let tick = state.tick(10.0, Some(9.5), Some(0.0)).unwrap();
        assert_eq!(tick.reached, i == settle);
    }
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let plant = Arc::new(SimulatedPlant::new());
    let actuator = Actuator::new(plant.clone(), plant.clone(), ActuatorConfig::default());
    actuator.stop().await;
    actuator.stop().await;
    assert_eq!(actuator.mode(), ActuatorMode::Standby);
    assert!(actuator.duty().abs() < f64::EPSILON);
    assert!(plant.duty().abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn test_snap_reaches_fixed_setpoint() {
    let plant = Arc::new(SimulatedPlant::with_yaw(0.0, 135.0));
    let actuator = Actuator::new(plant.clone(), plant.clone(), ActuatorConfig::default());
    let run = actuator.engage(Setpoint::Fixed(45.0), OnTarget::Snap).await;
    assert_eq!(actuator.mode(), ActuatorMode::Rotating);
    let exit = tokio::time::timeout(Duration::from_secs(60), run.finished()).await.unwrap();
    assert_eq!(exit, ActuatorExit::Reached);
    assert!(angle_delta(plant.true_yaw(), 45.0).abs() < 5.0, "yaw {}", plant.true_yaw());
    assert_eq!(actuator.mode(), ActuatorMode::Standby);
    assert!(plant.duty().abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_hold() {
    let plant = Arc::new(SimulatedPlant::new());
    let actuator = Actuator::new(plant.clone(), plant.clone(), ActuatorConfig::default());
    let run = actuator.engage(Setpoint::Fixed(180.0), OnTarget::Hold).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(plant.duty().abs() > 0.0);
    actuator.stop().await;
    assert_eq!(run.finished().await, ActuatorExit::Cancelled);
    assert_eq!(actuator.mode(), ActuatorMode::Standby);
    assert!(plant.duty().abs() < f64::EPSILON);
}

#[test]
fn test_sun_offset_finds_brightest_yaw() {
    let sun_yaw: f64 = 135.0;
    let samples: Vec<SunSample> = (0..90)
        .map(|yaw| {
            let yaw = f64::from(yaw);
            let intensities = (0..4)
                .map(|idx| {
                    let off = angle_delta(yaw + 90.0 * f64::from(idx), sun_yaw).to_radians();
                    Some((off.cos() * 1000.0).max(0.0))
                })
                .collect();
            SunSample { yaw, intensities }
        })
        .collect();
    assert_eq!(sun_offset(&samples), Some(135.0));
    assert_eq!(sun_offset(&[]), None);
    assert_eq!(sun_offset(&[SunSample { yaw: 0.0, intensities: vec![None; 4] }]), None);
}

#[test]
fn test_calibrated_sensor_subtracts_offset() {
    let plant: Arc<dyn AttitudeSensor> = Arc::new(SimulatedPlant::with_yaw(10.0, 0.0));
    let sensor = CalibratedSensor::new(plant);
    sensor.set_offset(30.0);
    let yaw = sensor.yaw().unwrap();
    assert!(angle_delta(yaw, 340.0).abs() < 0.5, "yaw {yaw}");
    let raw = sensor.raw().yaw().unwrap();
    assert!(angle_delta(raw, 10.0).abs() < 0.5);
}

#[tokio::test]
async fn test_adcs_ready_after_init() {
    let plant = Arc::new(SimulatedPlant::new());
    let timing = AdcsTiming { init_delay: Duration::from_millis(200), ..AdcsTiming::default() };
    let mut registry = SubsystemRegistry::new();
    registry.register(SubsystemId::Adcs, move || {
        Box::new(
            AdcsProcess::new(plant.clone(), plant.clone(), plant.clone(), ActuatorConfig::default())
                .with_timing(timing.clone()),
        )
    });
    let (mut sv, _telemetry) = Supervisor::new(registry, Box::new(ConsoleSink));
    sv.start(SubsystemId::Adcs).unwrap();
    let timeout = Some(Duration::from_secs(1));

    let early = request(&mut sv, SubsystemId::Adcs, Command::IsReady, timeout).await.unwrap();
    assert_eq!(early.as_bool(), Some(false));
    tokio::time::sleep(Duration::from_millis(400)).await;
    let late = request(&mut sv, SubsystemId::Adcs, Command::IsReady, timeout).await.unwrap();
    assert_eq!(late.as_bool(), Some(true));

    let state = request(&mut sv, SubsystemId::Adcs, Command::GetState, timeout).await.unwrap();
    assert_eq!(state.raw(), serde_json::json!("STANDBY"));
    sv.shutdown().await;
}
