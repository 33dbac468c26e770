use crate::attitude::{AttitudeSensor, ImuReading, SunSensorArray, WheelDriver};
use crate::common::math::{angle_delta, wrap_degrees};
use rand::Rng;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// Yaw acceleration in deg/s² per percent of wheel duty.
const WHEEL_AUTHORITY: f64 = 0.5;
/// Linear damping of the body rate, 1/s.
const DRAG: f64 = 1.5;
const INTEGRATION_STEP: f64 = 0.01;
const YAW_NOISE_DEG: f64 = 0.05;
const SUN_SENSORS: usize = 4;

#[derive(Debug)]
struct PlantState {
    yaw: f64,
    rate: f64,
    duty: f64,
    sun_yaw: f64,
    updated: Instant,
}

impl PlantState {
    fn advance(&mut self) {
        let now = Instant::now();
        let mut remaining = now.duration_since(self.updated).as_secs_f64();
        self.updated = now;
        while remaining > 0.0 {
            let dt = remaining.min(INTEGRATION_STEP);
            self.rate += (WHEEL_AUTHORITY * self.duty - DRAG * self.rate) * dt;
            self.yaw = wrap_degrees(self.yaw + self.rate * dt);
            remaining -= dt;
        }
    }
}

/// Single-axis rigid body spun by one reaction wheel, integrated on demand.
#[derive(Debug, Clone)]
pub struct SimulatedPlant {
    state: Arc<Mutex<PlantState>>,
}

impl SimulatedPlant {
    pub fn new() -> Self { Self::with_yaw(0.0, 135.0) }

    pub fn with_yaw(yaw: f64, sun_yaw: f64) -> Self {
        let state = PlantState { yaw, rate: 0.0, duty: 0.0, sun_yaw, updated: Instant::now() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut PlantState) -> R) -> Option<R> {
        let mut state = self.state.lock().ok()?;
        state.advance();
        Some(f(&mut state))
    }

    /// True yaw without sensor noise.
    pub fn true_yaw(&self) -> f64 { self.with_state(|s| s.yaw).unwrap_or_default() }
}

impl Default for SimulatedPlant {
    fn default() -> Self { Self::new() }
}

impl AttitudeSensor for SimulatedPlant {
    fn read(&self) -> Option<ImuReading> {
        let (yaw, rate, duty) = self.with_state(|s| (s.yaw, s.rate, s.duty))?;
        let mut rng = rand::rng();
        Some(ImuReading {
            gyroscope: [0.0, 0.0, rate],
            orientation: [0.0, 0.0, wrap_degrees(yaw + rng.random_range(-YAW_NOISE_DEG..YAW_NOISE_DEG))],
            bms_voltage: 7.4 + rng.random_range(-0.05..0.05),
            bms_current: 0.3 + duty.abs() * 0.01,
            bms_temp: 24.0 + rng.random_range(-0.5..0.5),
        })
    }
}

impl WheelDriver for SimulatedPlant {
    fn set_duty(&self, duty: f64) {
        let _ = self.with_state(|s| s.duty = duty);
    }

    fn duty(&self) -> f64 { self.with_state(|s| s.duty).unwrap_or_default() }
}

impl SunSensorArray for SimulatedPlant {
    #[allow(clippy::cast_precision_loss)]
    fn intensities(&self) -> Vec<Option<f64>> {
        let Some((yaw, sun_yaw)) = self.with_state(|s| (s.yaw, s.sun_yaw)) else {
            return vec![None; SUN_SENSORS];
        };
        (0..SUN_SENSORS)
            .map(|idx| {
                let off_axis = angle_delta(yaw + 90.0 * idx as f64, sun_yaw).to_radians();
                Some((off_axis.cos() * 1000.0).max(0.0))
            })
            .collect()
    }
}
