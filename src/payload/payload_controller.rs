use super::sensors::PayloadSensors;
use crate::ipc::{Message, SubsystemError, SubsystemLink, SubsystemProcess};
use crate::protocol::{Command, HealthReport, NumberId, numbers_to_value};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
enum PayloadState {
    Idle,
    /// Pictures of a scan are being collected.
    Imaging,
}

/// Camera, number recognition, AprilTag detection and ranging.
pub struct PayloadProcess {
    sensors: Arc<dyn PayloadSensors>,
    state: PayloadState,
    /// First yaw each number was seen at.
    numbers: BTreeMap<NumberId, f64>,
}

impl PayloadProcess {
    pub fn new(sensors: Arc<dyn PayloadSensors>) -> Self {
        Self { sensors, state: PayloadState::Idle, numbers: BTreeMap::new() }
    }

    fn take_picture(&mut self, current_yaw: f64) -> bool {
        let Some(frame) = self.sensors.capture() else { return false };
        self.state = PayloadState::Imaging;
        for id in self.sensors.recognize(&frame) {
            self.numbers.entry(id).or_insert(current_yaw);
        }
        true
    }

    /// Hands out the numbers found so far and starts over.
    fn collect_numbers(&mut self) -> Value {
        self.state = PayloadState::Idle;
        numbers_to_value(&std::mem::take(&mut self.numbers))
    }

    fn detect_apriltag(&self) -> Value {
        self.sensors
            .capture()
            .and_then(|frame| self.sensors.detect(&frame))
            .map_or(Value::Null, |pose| json!(pose))
    }

    fn read_target(&self) -> Value {
        self.sensors
            .capture()
            .and_then(|frame| self.sensors.detect(&frame))
            .map_or(Value::Null, |pose| json!(pose.id))
    }

    fn health(&self) -> HealthReport {
        let mut report = HealthReport::new();
        match self.sensors.capture() {
            Some(frame) => {
                report.component("Camera", json!("OK"));
                report.component("Numbers In View", json!(self.sensors.recognize(&frame)));
                report.component("AprilTag", json!(self.sensors.detect(&frame).map(|p| p.id)));
            }
            None => {
                report.fault("Camera", "Capture failed");
            }
        }
        report.component("Distance Sensor", json!(self.sensors.distance_cm()));
        report
    }
}

#[async_trait]
impl SubsystemProcess for PayloadProcess {
    async fn run(self: Box<Self>, mut link: SubsystemLink) -> Result<(), SubsystemError> {
        let mut payload = self;
        let ready = payload.sensors.capture().is_some();
        if !ready {
            link.logger.log("[ERROR] Camera check failed");
        }
        loop {
            let msg = link.channel.recv().await?;
            let command = match Command::try_from(msg) {
                Ok(command) => command,
                Err(e) => {
                    link.logger.log(format!("[ERROR] {e}"));
                    continue;
                }
            };
            let reply = match command {
                Command::IsReady => Value::Bool(ready),
                Command::HealthCheck => {
                    link.channel.send(payload.health().into_message())?;
                    continue;
                }
                Command::GetState => Value::String(payload.state.to_string()),
                Command::TakePicture { current_yaw } => Value::Bool(payload.take_picture(current_yaw)),
                Command::GetNumbers => payload.collect_numbers(),
                Command::TakeDistance => json!(payload.sensors.distance_cm()),
                Command::DetectAprilTag => payload.detect_apriltag(),
                Command::ReadTarget => payload.read_target(),
                Command::Stop => break,
                other => {
                    link.logger.log(format!("[ERROR] {} is not a Payload command", other.as_ref()));
                    continue;
                }
            };
            link.channel.send(Message::Bare(reply))?;
        }
        link.logger.log("Payload stopped");
        Ok(())
    }
}
