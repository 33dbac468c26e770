use super::actuator::{Actuator, ActuatorConfig, ActuatorExit, OnTarget, Setpoint};
use super::calibration::{CalibratedSensor, SunSample, sun_offset};
use super::hardware::{AttitudeSensor, SunSensorArray, WheelDriver};
use crate::common::math::{angle_delta, wrap_degrees};
use crate::ipc::{
    ChannelSender, Message, SubsystemError, SubsystemLink, SubsystemLogger, SubsystemProcess,
    TelemetryReporter,
};
use crate::protocol::{Command, Event, HealthReport, NumberId, WheelTest};
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Step sizes and waits of the ADCS-internal procedures.
#[derive(Debug, Clone)]
pub struct AdcsTiming {
    /// Self-check delay before the subsystem reports ready.
    pub init_delay: Duration,
    pub telemetry_interval: Duration,
    pub scan_step_deg: f64,
    pub search_step_deg: f64,
    pub calibration_step_deg: f64,
    /// Grace period the wheel keeps tracking after a step was reached.
    pub settle_grace: Duration,
    /// Time spent still after announcing a step, e.g. for a picture to be taken.
    pub dwell: Duration,
    pub detection_wait: Duration,
    pub align_tolerance_deg: f64,
    pub aligned_detections: u32,
    pub max_missed_detections: u32,
}

impl Default for AdcsTiming {
    fn default() -> Self {
        Self {
            init_delay: Duration::from_millis(500),
            telemetry_interval: Duration::from_secs(5),
            scan_step_deg: 30.0,
            search_step_deg: 30.0,
            calibration_step_deg: 10.0,
            settle_grace: Duration::from_millis(300),
            dwell: Duration::from_millis(500),
            detection_wait: Duration::from_secs(2),
            align_tolerance_deg: 2.0,
            aligned_detections: 3,
            max_missed_detections: 5,
        }
    }
}

/// AprilTag sighting relayed by the orchestrator.
#[derive(Debug, Clone, Copy)]
struct Detection {
    detected: bool,
    bearing: Option<f64>,
}

enum Procedure {
    Scan,
    Sequence { order: Vec<NumberId>, numbers: BTreeMap<NumberId, f64> },
    Search { prior: Option<f64> },
    Align { target_yaw: f64 },
    TestWheel(WheelTest),
    CalibrateSun,
}

struct RunningProcedure {
    cancel: CancellationToken,
    detections: mpsc::UnboundedSender<Detection>,
}

/// Attitude determination and control subsystem.
pub struct AdcsProcess {
    sensor: Arc<CalibratedSensor>,
    wheel: Arc<dyn WheelDriver>,
    sun: Arc<dyn SunSensorArray>,
    actuator_config: ActuatorConfig,
    timing: AdcsTiming,
}

impl AdcsProcess {
    pub fn new(
        sensor: Arc<dyn AttitudeSensor>,
        wheel: Arc<dyn WheelDriver>,
        sun: Arc<dyn SunSensorArray>,
        actuator_config: ActuatorConfig,
    ) -> Self {
        Self {
            sensor: Arc::new(CalibratedSensor::new(sensor)),
            wheel,
            sun,
            actuator_config,
            timing: AdcsTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: AdcsTiming) -> Self {
        self.timing = timing;
        self
    }

    fn health(&self, actuator: &Actuator) -> HealthReport {
        let mut report = HealthReport::new();
        match self.sensor.read() {
            Some(imu) => {
                report
                    .component("Gyroscope", json!(imu.gyroscope))
                    .component("Orientation", json!(imu.orientation))
                    .component("BMS Voltage", json!(imu.bms_voltage))
                    .component("BMS Current", json!(imu.bms_current))
                    .component("BMS Temperature", json!(imu.bms_temp));
            }
            None => {
                report.fault("IMU", "No response from IMU");
            }
        }
        for (idx, intensity) in self.sun.intensities().into_iter().enumerate() {
            report.component(format!("Sun Sensor {}", idx + 1), json!(intensity));
        }
        report
            .component("Reaction Wheel Duty", json!(actuator.duty()))
            .component("Actuator Mode", json!(actuator.mode().to_string()))
            .component("Yaw Offset", json!(self.sensor.offset()));
        report
    }

    fn launch(
        &self,
        slot: &mut Option<RunningProcedure>,
        procedure: Procedure,
        actuator: &Arc<Actuator>,
        link: &SubsystemLink,
    ) {
        Self::cancel_procedure(slot);
        let cancel = CancellationToken::new();
        let (detections_tx, detections_rx) = mpsc::unbounded_channel();
        let ctx = ProcedureCtx {
            actuator: Arc::clone(actuator),
            sensor: Arc::clone(&self.sensor),
            sun: Arc::clone(&self.sun),
            actuator_config: self.actuator_config.clone(),
            timing: self.timing.clone(),
            events: link.channel.sender(),
            logger: link.logger.clone(),
            cancel: cancel.clone(),
            detections: detections_rx,
        };
        tokio::spawn(ctx.run(procedure));
        *slot = Some(RunningProcedure { cancel, detections: detections_tx });
    }

    fn cancel_procedure(slot: &mut Option<RunningProcedure>) {
        if let Some(running) = slot.take() {
            running.cancel.cancel();
        }
    }

    fn spawn_telemetry(
        &self,
        actuator: Arc<Actuator>,
        telemetry: TelemetryReporter,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let sensor = Arc::clone(&self.sensor);
        let interval = self.timing.telemetry_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                telemetry.report("yaw", json!(sensor.yaw()));
                telemetry.report("wheel_duty", json!(actuator.duty()));
                telemetry.report("actuator_mode", json!(actuator.mode().to_string()));
            }
        })
    }
}

#[async_trait]
impl SubsystemProcess for AdcsProcess {
    async fn run(self: Box<Self>, mut link: SubsystemLink) -> Result<(), SubsystemError> {
        let sensor: Arc<dyn AttitudeSensor> = self.sensor.clone();
        let actuator =
            Arc::new(Actuator::new(sensor, Arc::clone(&self.wheel), self.actuator_config.clone()));
        let ready = Arc::new(AtomicBool::new(false));
        {
            let (ready, sensor, logger) = (Arc::clone(&ready), self.sensor.clone(), link.logger.clone());
            let delay = self.timing.init_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                match sensor.read() {
                    Some(_) => logger.log("Orientation system initialised"),
                    None => logger.log("[ERROR] IMU not responding, continuing degraded"),
                }
                ready.store(true, Ordering::Release);
            });
        }
        let background = CancellationToken::new();
        let telemetry =
            self.spawn_telemetry(Arc::clone(&actuator), link.telemetry.clone(), background.clone());

        let mut procedure: Option<RunningProcedure> = None;
        loop {
            let msg = link.channel.recv().await?;
            let command = match Command::try_from(msg) {
                Ok(command) => command,
                Err(e) => {
                    link.logger.log(format!("[ERROR] {e}"));
                    continue;
                }
            };
            match command {
                Command::IsReady => link.channel.send(Message::bare(ready.load(Ordering::Acquire)))?,
                Command::HealthCheck => link.channel.send(self.health(&actuator).into_message())?,
                Command::GetState => link.channel.send(Message::bare(actuator.mode().to_string()))?,
                Command::Phase2Rotate => {
                    self.launch(&mut procedure, Procedure::Scan, &actuator, &link);
                }
                Command::Phase2Sequence { order, numbers } => {
                    self.launch(&mut procedure, Procedure::Sequence { order, numbers }, &actuator, &link);
                }
                Command::Phase3SearchTarget => {
                    self.launch(&mut procedure, Procedure::Search { prior: None }, &actuator, &link);
                }
                Command::Phase3ReacquireTarget { target_yaw } => {
                    let search = Procedure::Search { prior: Some(target_yaw) };
                    self.launch(&mut procedure, search, &actuator, &link);
                }
                Command::Phase3AlignTarget { target_yaw } => {
                    self.launch(&mut procedure, Procedure::Align { target_yaw }, &actuator, &link);
                }
                Command::AprilTagDetection { detected, bearing } => {
                    let relayed = procedure
                        .as_ref()
                        .is_some_and(|p| p.detections.send(Detection { detected, bearing }).is_ok());
                    if !relayed {
                        link.logger.log("AprilTag detection without a waiting procedure, dropped");
                    }
                }
                Command::TestWheel(test) => {
                    self.launch(&mut procedure, Procedure::TestWheel(test), &actuator, &link);
                    link.channel.send(Message::bare(true))?;
                }
                Command::StopWheel => {
                    Self::cancel_procedure(&mut procedure);
                    actuator.stop().await;
                    link.logger.log("Reaction wheel stopped");
                }
                Command::CalibrateSunSensors => {
                    self.launch(&mut procedure, Procedure::CalibrateSun, &actuator, &link);
                    link.channel.send(Message::bare(true))?;
                }
                Command::Stop => break,
                other => link.logger.log(format!("[ERROR] {} is not an ADCS command", other.as_ref())),
            }
        }
        Self::cancel_procedure(&mut procedure);
        actuator.stop().await;
        background.cancel();
        let _ = telemetry.await;
        link.logger.log("ADCS stopped");
        Ok(())
    }
}

/// Everything a spawned ADCS procedure works with.
struct ProcedureCtx {
    actuator: Arc<Actuator>,
    sensor: Arc<CalibratedSensor>,
    sun: Arc<dyn SunSensorArray>,
    actuator_config: ActuatorConfig,
    timing: AdcsTiming,
    events: ChannelSender,
    logger: SubsystemLogger,
    cancel: CancellationToken,
    detections: mpsc::UnboundedReceiver<Detection>,
}

impl ProcedureCtx {
    async fn run(mut self, procedure: Procedure) {
        let finished = match procedure {
            Procedure::Scan => self.scan().await,
            Procedure::Sequence { order, numbers } => self.sequence(order, numbers).await,
            Procedure::Search { prior } => self.search(prior).await,
            Procedure::Align { target_yaw } => self.align(target_yaw).await,
            Procedure::TestWheel(test) => self.test_wheel(test).await,
            Procedure::CalibrateSun => self.calibrate_sun().await,
        };
        if finished.is_none() {
            self.logger.log("Procedure interrupted");
        }
    }

    fn yaw(&self) -> f64 { self.sensor.yaw().unwrap_or_default() }

    fn emit(&self, event: Event) -> Option<()> { self.events.send(event).ok() }

    /// Drives to `target` and returns the yaw reached, `None` once cancelled.
    async fn settle_at(&self, target: f64) -> Option<f64> {
        let setpoint = Setpoint::Fixed(wrap_degrees(target));
        let run = self.actuator.engage(setpoint, OnTarget::Settle(self.timing.settle_grace)).await;
        tokio::select! {
            () = self.cancel.cancelled() => None,
            exit = run.finished() => (exit == ActuatorExit::Reached).then(|| self.yaw()),
        }
    }

    async fn pause(&self, duration: Duration) -> Option<()> {
        tokio::select! {
            () = self.cancel.cancelled() => None,
            () = tokio::time::sleep(duration) => Some(()),
        }
    }

    async fn next_detection(&mut self) -> Option<Option<Detection>> {
        tokio::select! {
            () = self.cancel.cancelled() => None,
            res = tokio::time::timeout(self.timing.detection_wait, self.detections.recv()) => {
                Some(res.ok().flatten())
            }
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn steps(step_deg: f64) -> u32 { (360.0 / step_deg).round().max(1.0) as u32 }

    async fn scan(&mut self) -> Option<()> {
        let start = self.yaw();
        let step = self.timing.scan_step_deg;
        for k in 0..Self::steps(step) {
            let current_yaw = self.settle_at(start + f64::from(k) * step).await?;
            self.emit(Event::TakePicture { current_yaw })?;
            self.pause(self.timing.dwell).await?;
        }
        self.actuator.stop().await;
        self.emit(Event::RotationComplete)
    }

    async fn sequence(&mut self, order: Vec<NumberId>, numbers: BTreeMap<NumberId, f64>) -> Option<()> {
        let mut angle_deltas = BTreeMap::new();
        for number in order {
            let Some(&target) = numbers.get(&number) else {
                self.logger.log(format!("No yaw known for number {number}, skipping"));
                continue;
            };
            let current_yaw = self.settle_at(target).await?;
            self.emit(Event::TakeDistance { number, current_yaw })?;
            angle_deltas.insert(number, angle_delta(target, current_yaw));
            self.pause(self.timing.dwell).await?;
        }
        self.actuator.stop().await;
        self.emit(Event::SequenceRotationComplete)?;
        self.emit(Event::Phase2SequenceResponse { angle_deltas })
    }

    async fn search(&mut self, prior: Option<f64>) -> Option<()> {
        let start = match prior {
            Some(target_yaw) => self.settle_at(target_yaw).await?,
            None => self.yaw(),
        };
        let step = self.timing.search_step_deg;
        for k in 0..Self::steps(step) {
            if k > 0 {
                self.settle_at(start + f64::from(k) * step).await?;
            }
            self.emit(Event::DetectAprilTag)?;
            if let Some(Detection { detected: true, bearing: Some(bearing) }) = self.next_detection().await? {
                let target_yaw = wrap_degrees(self.yaw() + bearing);
                self.actuator.stop().await;
                return self.emit(Event::TargetFound { target_yaw });
            }
        }
        self.actuator.stop().await;
        self.logger.log("Target not found after a full turn");
        self.emit(Event::Timeout)
    }

    async fn align(&mut self, target_yaw: f64) -> Option<()> {
        let (tx, rx) = watch::channel(wrap_degrees(target_yaw));
        let _run = self.actuator.engage(Setpoint::Live(rx), OnTarget::Hold).await;
        let (mut misses, mut centred) = (0, 0);
        loop {
            self.emit(Event::DetectAprilTag)?;
            match self.next_detection().await? {
                Some(Detection { detected: true, bearing: Some(bearing) }) => {
                    misses = 0;
                    let _ = tx.send(wrap_degrees(self.yaw() + bearing));
                    centred = if bearing.abs() < self.timing.align_tolerance_deg { centred + 1 } else { 0 };
                    if centred >= self.timing.aligned_detections {
                        // the wheel keeps holding the last bearing until stop_wheel
                        return self.emit(Event::TargetAligned { current_yaw: self.yaw() });
                    }
                }
                _ => {
                    misses += 1;
                    centred = 0;
                    if misses >= self.timing.max_missed_detections {
                        self.actuator.stop().await;
                        return self.emit(Event::TargetLost);
                    }
                }
            }
        }
    }

    async fn test_wheel(&mut self, test: WheelTest) -> Option<()> {
        let mut config = self.actuator_config.clone();
        config.gains.kp = test.kp;
        config.gains.ki = test.ki;
        config.gains.kd = test.kd;
        let target = wrap_degrees(self.yaw() + test.degree);
        self.logger.log(format!("Testing wheel: {test:?}, target yaw {target:.1}"));
        let _run = self.actuator.engage_with(Setpoint::Fixed(target), OnTarget::Hold, config).await;
        self.pause(Duration::try_from_secs_f64(test.duration).unwrap_or_default()).await?;
        self.actuator.stop().await;
        self.logger.log(format!(
            "Wheel test finished at yaw {:.1}, error {:.1}",
            self.yaw(),
            angle_delta(self.yaw(), target)
        ));
        Some(())
    }

    async fn calibrate_sun(&mut self) -> Option<()> {
        self.logger.log("Calibrating sun sensors...");
        let start = self.yaw();
        let step = self.timing.calibration_step_deg;
        let mut samples = Vec::new();
        for k in 0..Self::steps(step) {
            self.settle_at(start + f64::from(k) * step).await?;
            if let Some(raw_yaw) = self.sensor.raw().yaw() {
                samples.push(SunSample { yaw: raw_yaw, intensities: self.sun.intensities() });
            }
        }
        self.actuator.stop().await;
        match sun_offset(&samples) {
            Some(offset) => {
                self.sensor.set_offset(offset);
                self.logger.log(format!("Sun sensor calibration done, yaw offset {offset:.0} deg"));
            }
            None => self.logger.log("[ERROR] Sun sensor calibration failed: no readings"),
        }
        Some(())
    }
}
