use super::hardware::{AttitudeSensor, WheelDriver};
use super::pid::{Pid, PidGains};
use crate::common::math::angle_delta;
use crate::{event, warn};
use std::sync::Arc;
use std::time::Duration;
use strum_macros::{AsRefStr, Display};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActuatorMode {
    Standby,
    Rotating,
    Aligning,
}

/// Control constants of one reaction wheel loop.
#[derive(Debug, Clone)]
pub struct ActuatorConfig {
    pub gains: PidGains,
    /// Fixed tick period.
    pub dt: Duration,
    /// Duty authority in percent, output is clamped to `±max_duty`.
    pub max_duty: f64,
    pub integral_limit: f64,
    /// Degrees within which the setpoint counts as reached.
    pub tolerance: f64,
    /// Rate in deg/s below which the body counts as not turning.
    pub stall_rate: f64,
    /// Consecutive saturated ticks before the setpoint is moved by a full turn.
    pub saturation_ticks: u32,
    /// Consecutive ticks within tolerance before the target counts as reached.
    pub settle_ticks: u32,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            gains: PidGains::default(),
            dt: Duration::from_millis(100),
            max_duty: 100.0,
            integral_limit: 50.0,
            tolerance: 2.0,
            stall_rate: 1.0,
            saturation_ticks: 30,
            settle_ticks: 5,
        }
    }
}

/// What the loop does once the target has been held for `settle_ticks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnTarget {
    Snap,
    Settle(Duration),
    Hold,
}

/// Where the loop steers to, in absolute degrees.
#[derive(Debug, Clone)]
pub enum Setpoint {
    Fixed(f64),
    /// Externally updated, re-read on every tick.
    Live(watch::Receiver<f64>),
}

impl Setpoint {
    fn current(&self) -> f64 {
        match self {
            Setpoint::Fixed(yaw) => *yaw,
            Setpoint::Live(rx) => *rx.borrow(),
        }
    }

    fn is_live(&self) -> bool { matches!(self, Setpoint::Live(_)) }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub duty: f64,
    pub error: f64,
    pub reached: bool,
    pub escaped: bool,
}

/// Controller memory of one loop invocation.
///
/// Yaw readings wrap at 360°, the controller works on the unwrapped angle so a setpoint
/// moved by a full turn really asks for the other way around.
#[derive(Debug, Clone)]
pub struct ActuatorState {
    config: ActuatorConfig,
    pid: Pid,
    live: bool,
    anchor: Option<f64>,
    last_target: f64,
    shift: f64,
    last_yaw: Option<f64>,
    unwrapped_yaw: f64,
    saturation_counter: u32,
    on_target_counter: u32,
}

impl ActuatorState {
    pub fn new(config: ActuatorConfig, live: bool) -> Self {
        let pid = Pid::new(config.gains, config.integral_limit);
        Self {
            config,
            pid,
            live,
            anchor: None,
            last_target: 0.0,
            shift: 0.0,
            last_yaw: None,
            unwrapped_yaw: 0.0,
            saturation_counter: 0,
            on_target_counter: 0,
        }
    }

    /// Unwrapped setpoint currently steered to, `None` before the first reading.
    pub fn setpoint(&self) -> Option<f64> { self.anchor.map(|a| a + self.shift) }

    pub fn saturation_counter(&self) -> u32 { self.saturation_counter }

    /// Advances the loop by one period. A failed yaw read reuses the last known yaw;
    /// without any reading so far there is nothing to control and `None` is returned.
    pub fn tick(&mut self, target: f64, yaw: Option<f64>, rate: Option<f64>) -> Option<Tick> {
        let yaw = match (yaw, self.last_yaw) {
            (Some(yaw), Some(prev)) => {
                self.unwrapped_yaw += angle_delta(prev, yaw);
                yaw
            }
            (Some(yaw), None) => {
                self.unwrapped_yaw = yaw;
                yaw
            }
            (None, Some(prev)) => prev,
            (None, None) => return None,
        };
        self.last_yaw = Some(yaw);
        // a live target moves the anchor by its own change, keeping any escape shift
        match self.anchor {
            None => self.anchor = Some(self.unwrapped_yaw + angle_delta(yaw, target)),
            Some(anchor) if self.live => {
                self.anchor = Some(anchor + angle_delta(self.last_target, target));
            }
            Some(_) => {}
        }
        self.last_target = target;
        let setpoint = self.anchor.unwrap_or(self.unwrapped_yaw) + self.shift;
        let error = setpoint - self.unwrapped_yaw;

        let raw = self.pid.update(error, self.config.dt.as_secs_f64());
        let max = self.config.max_duty;
        let duty = raw.clamp(-max, max);

        let pinned = raw.abs() >= max;
        let stalled = rate.is_some_and(|r| r.abs() < self.config.stall_rate);
        if pinned && stalled && error.abs() > self.config.tolerance {
            self.saturation_counter += 1;
        } else {
            self.saturation_counter = 0;
        }
        let escaped = self.saturation_counter >= self.config.saturation_ticks;
        if escaped {
            self.shift -= 360.0 * error.signum();
            self.saturation_counter = 0;
            self.pid.reset();
        }

        if error.abs() < self.config.tolerance {
            self.on_target_counter += 1;
        } else {
            self.on_target_counter = 0;
        }
        let reached = self.on_target_counter >= self.config.settle_ticks;
        Some(Tick { duty, error, reached, escaped })
    }
}

/// How a loop invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ActuatorExit {
    Reached,
    Cancelled,
}

/// Handle of a spawned loop invocation.
pub struct ActuatorRun {
    handle: JoinHandle<ActuatorExit>,
}

impl ActuatorRun {
    /// Waits for the invocation to end. A loop that died counts as cancelled.
    pub async fn finished(self) -> ActuatorExit {
        self.handle.await.unwrap_or(ActuatorExit::Cancelled)
    }
}

/// One reaction wheel and the control loop driving it.
///
/// At most one loop invocation is active; starting a new one stops the previous one first.
pub struct Actuator {
    sensor: Arc<dyn AttitudeSensor>,
    wheel: Arc<dyn WheelDriver>,
    config: ActuatorConfig,
    mode: Arc<watch::Sender<ActuatorMode>>,
    active: Mutex<Option<CancellationToken>>,
}

impl Actuator {
    const STANDBY_WAIT: Duration = Duration::from_secs(1);

    pub fn new(
        sensor: Arc<dyn AttitudeSensor>,
        wheel: Arc<dyn WheelDriver>,
        config: ActuatorConfig,
    ) -> Self {
        let (mode, _) = watch::channel(ActuatorMode::Standby);
        Self { sensor, wheel, config, mode: Arc::new(mode), active: Mutex::new(None) }
    }

    pub fn mode(&self) -> ActuatorMode { *self.mode.borrow() }

    pub fn config(&self) -> &ActuatorConfig { &self.config }

    pub fn duty(&self) -> f64 { self.wheel.duty() }

    /// Starts a loop invocation towards `setpoint`.
    pub async fn engage(&self, setpoint: Setpoint, on_target: OnTarget) -> ActuatorRun {
        self.engage_with(setpoint, on_target, self.config.clone()).await
    }

    /// Same as [`Actuator::engage`] with a one-off controller configuration.
    pub async fn engage_with(
        &self,
        setpoint: Setpoint,
        on_target: OnTarget,
        config: ActuatorConfig,
    ) -> ActuatorRun {
        let mut active = self.active.lock().await;
        if let Some(token) = active.take() {
            self.wind_down(&token).await;
        }
        let token = CancellationToken::new();
        let mode = if setpoint.is_live() { ActuatorMode::Aligning } else { ActuatorMode::Rotating };
        self.mode.send_replace(mode);
        event!("Actuator engaged in {mode}");
        let handle = tokio::spawn(Self::drive(
            ActuatorState::new(config, setpoint.is_live()),
            setpoint,
            on_target,
            Arc::clone(&self.sensor),
            Arc::clone(&self.wheel),
            Arc::clone(&self.mode),
            token.clone(),
        ));
        *active = Some(token);
        ActuatorRun { handle }
    }

    /// Returns to STANDBY with zero output. Safe to call in any mode.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        if let Some(token) = active.take() {
            self.wind_down(&token).await;
        }
        self.wheel.set_duty(0.0);
        self.mode.send_replace(ActuatorMode::Standby);
    }

    async fn wind_down(&self, token: &CancellationToken) {
        token.cancel();
        let mut rx = self.mode.subscribe();
        let settled = tokio::time::timeout(
            Self::STANDBY_WAIT,
            rx.wait_for(|m| *m == ActuatorMode::Standby),
        )
        .await
        .is_ok();
        if !settled {
            warn!("Actuator loop did not reach STANDBY in time, forcing output to zero");
        }
        self.wheel.set_duty(0.0);
    }

    async fn drive(
        mut state: ActuatorState,
        setpoint: Setpoint,
        on_target: OnTarget,
        sensor: Arc<dyn AttitudeSensor>,
        wheel: Arc<dyn WheelDriver>,
        mode: Arc<watch::Sender<ActuatorMode>>,
        cancel: CancellationToken,
    ) -> ActuatorExit {
        let mut interval = tokio::time::interval(state.config.dt);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut settle_deadline: Option<Instant> = None;
        let exit = loop {
            tokio::select! {
                () = cancel.cancelled() => break ActuatorExit::Cancelled,
                _ = interval.tick() => {}
            }
            let Some(tick) = state.tick(setpoint.current(), sensor.yaw(), sensor.angular_rate()) else {
                continue;
            };
            wheel.set_duty(tick.duty);
            if tick.escaped {
                event!("Wheel saturated, moving setpoint to {:?}", state.setpoint());
            }
            if let Some(deadline) = settle_deadline {
                if Instant::now() >= deadline {
                    break ActuatorExit::Reached;
                }
                continue;
            }
            if !tick.reached {
                continue;
            }
            match on_target {
                OnTarget::Snap => break ActuatorExit::Reached,
                // keeps tracking through the grace period
                OnTarget::Settle(grace) => settle_deadline = Some(Instant::now() + grace),
                OnTarget::Hold => {}
            }
        };
        wheel.set_duty(0.0);
        mode.send_replace(ActuatorMode::Standby);
        exit
    }
}
