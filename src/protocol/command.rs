use super::args::{ArgReader, numbers_to_value};
use crate::ipc::{Arguments, CommandEnvelope, Message, TelemetrySample, args};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use strum_macros::AsRefStr;

/// Identifier printed on a number board, as recognised by the payload.
pub type NumberId = u32;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("expected a named envelope, got bare value {0}")]
    NotAnEnvelope(Value),
    #[error("{0} is not a known command")]
    UnknownCommand(String),
    #[error("{0} is not a known event")]
    UnknownEvent(String),
    #[error("{command} is missing argument '{field}'")]
    MissingArgument { command: String, field: &'static str },
    #[error("{command} has a malformed argument '{field}'")]
    MalformedArgument { command: String, field: &'static str },
    #[error("expected {expected}, got {got}")]
    UnexpectedReply { expected: &'static str, got: Value },
}

/// Operator supplied gains and target for a manual wheel run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelTest {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Run time in seconds.
    pub duration: f64,
    pub degree: f64,
}

/// Every command the orchestrator may write to a subsystem channel.
#[derive(Debug, Clone, PartialEq, AsRefStr)]
pub enum Command {
    #[strum(serialize = "is_ready")]
    IsReady,
    #[strum(serialize = "health_check")]
    HealthCheck,
    #[strum(serialize = "get_state")]
    GetState,
    #[strum(serialize = "echo")]
    Echo { text: Option<String> },
    #[strum(serialize = "stop")]
    Stop,
    #[strum(serialize = "phase2_rotate")]
    Phase2Rotate,
    #[strum(serialize = "phase2_sequence")]
    Phase2Sequence { order: Vec<NumberId>, numbers: BTreeMap<NumberId, f64> },
    #[strum(serialize = "phase3_search_target")]
    Phase3SearchTarget,
    #[strum(serialize = "phase3_reacquire_target")]
    Phase3ReacquireTarget { target_yaw: f64 },
    #[strum(serialize = "phase3_align_target")]
    Phase3AlignTarget { target_yaw: f64 },
    #[strum(serialize = "apriltag_detection")]
    AprilTagDetection { detected: bool, bearing: Option<f64> },
    #[strum(serialize = "test_wheel")]
    TestWheel(WheelTest),
    #[strum(serialize = "stop_wheel")]
    StopWheel,
    #[strum(serialize = "calibrate_sun_sensors")]
    CalibrateSunSensors,
    #[strum(serialize = "take_picture")]
    TakePicture { current_yaw: f64 },
    #[strum(serialize = "get_numbers")]
    GetNumbers,
    #[strum(serialize = "take_distance")]
    TakeDistance,
    #[strum(serialize = "detect_apriltag")]
    DetectAprilTag,
    #[strum(serialize = "read_target")]
    ReadTarget,
    #[strum(serialize = "send_message")]
    SendMessage { message: String },
    #[strum(serialize = "send_error")]
    SendError { message: String },
    #[strum(serialize = "send_data")]
    SendData(TelemetrySample),
    #[strum(serialize = "send_file")]
    SendFile { path: String },
}

impl Command {
    /// Whether the receiving subsystem answers this command with exactly one reply.
    pub fn expects_reply(&self) -> bool {
        !matches!(
            self,
            Command::Stop
                | Command::StopWheel
                | Command::AprilTagDetection { .. }
                | Command::SendMessage { .. }
                | Command::SendError { .. }
                | Command::SendData(_)
                | Command::SendFile { .. }
                | Command::Phase2Rotate
                | Command::Phase2Sequence { .. }
                | Command::Phase3SearchTarget
                | Command::Phase3ReacquireTarget { .. }
                | Command::Phase3AlignTarget { .. }
        )
    }

    fn arguments(&self) -> Option<Arguments> {
        let value = match self {
            Command::IsReady
            | Command::HealthCheck
            | Command::GetState
            | Command::Stop
            | Command::Phase2Rotate
            | Command::Phase3SearchTarget
            | Command::StopWheel
            | Command::CalibrateSunSensors
            | Command::GetNumbers
            | Command::TakeDistance
            | Command::DetectAprilTag
            | Command::ReadTarget => return None,
            Command::Echo { text } => return text.as_ref().map(|t| args(json!({ "message": t }))),
            Command::Phase2Sequence { order, numbers } => {
                json!({ "order": order, "numbers": numbers_to_value(numbers) })
            }
            Command::Phase3ReacquireTarget { target_yaw } | Command::Phase3AlignTarget { target_yaw } => {
                json!({ "target_yaw": target_yaw })
            }
            Command::AprilTagDetection { detected, bearing } => {
                json!({ "detected": detected, "bearing": bearing })
            }
            Command::TestWheel(t) => {
                json!({ "kp": t.kp, "ki": t.ki, "kd": t.kd, "t": t.duration, "degree": t.degree })
            }
            Command::TakePicture { current_yaw } => json!({ "current_yaw": current_yaw }),
            Command::SendMessage { message } | Command::SendError { message } => {
                json!({ "message": message })
            }
            Command::SendData(sample) => json!({
                "subsystem": sample.subsystem,
                "label": sample.label,
                "data": sample.value,
                "timestamp": sample.timestamp.to_rfc3339(),
            }),
            Command::SendFile { path } => json!({ "path": path }),
        };
        Some(args(value))
    }
}

impl From<Command> for CommandEnvelope {
    fn from(value: Command) -> Self {
        let name = value.as_ref().to_string();
        match value.arguments() {
            Some(arguments) => CommandEnvelope::with_args(name, arguments),
            None => CommandEnvelope::new(name),
        }
    }
}

impl From<Command> for Message {
    fn from(value: Command) -> Self { CommandEnvelope::from(value).into() }
}

impl TryFrom<Message> for Command {
    type Error = ProtocolError;

    fn try_from(value: Message) -> Result<Self, Self::Error> {
        let (name, arguments) = match value {
            Message::Pair(name, arguments) => (name, arguments.unwrap_or_default()),
            Message::Bare(raw) => return Err(ProtocolError::NotAnEnvelope(raw)),
        };
        let r = ArgReader::new(&name, &arguments);
        let command = match name.as_str() {
            "is_ready" => Command::IsReady,
            "health_check" => Command::HealthCheck,
            "get_state" => Command::GetState,
            "echo" => Command::Echo { text: r.opt_str("message").map(String::from) },
            "stop" => Command::Stop,
            "phase2_rotate" => Command::Phase2Rotate,
            "phase2_sequence" => {
                Command::Phase2Sequence { order: r.id_list("order")?, numbers: r.id_map("numbers")? }
            }
            "phase3_search_target" => Command::Phase3SearchTarget,
            "phase3_reacquire_target" => {
                Command::Phase3ReacquireTarget { target_yaw: r.f64("target_yaw")? }
            }
            "phase3_align_target" => Command::Phase3AlignTarget { target_yaw: r.f64("target_yaw")? },
            "apriltag_detection" => Command::AprilTagDetection {
                detected: r.bool("detected")?,
                bearing: r.opt_f64("bearing"),
            },
            "test_wheel" => Command::TestWheel(WheelTest {
                kp: r.f64("kp")?,
                ki: r.f64("ki")?,
                kd: r.f64("kd")?,
                duration: r.f64("t")?,
                degree: r.f64("degree")?,
            }),
            "stop_wheel" => Command::StopWheel,
            "calibrate_sun_sensors" => Command::CalibrateSunSensors,
            "take_picture" => Command::TakePicture { current_yaw: r.f64("current_yaw")? },
            "get_numbers" => Command::GetNumbers,
            "take_distance" => Command::TakeDistance,
            "detect_apriltag" => Command::DetectAprilTag,
            "read_target" => Command::ReadTarget,
            "send_message" => Command::SendMessage { message: r.str("message")?.to_string() },
            "send_error" => Command::SendError { message: r.str("message")?.to_string() },
            "send_data" => Command::SendData(TelemetrySample {
                subsystem: r.str("subsystem")?.to_string(),
                label: r.str("label")?.to_string(),
                value: r.value("data").cloned().unwrap_or(Value::Null),
                timestamp: r.timestamp("timestamp")?,
            }),
            "send_file" => Command::SendFile { path: r.str("path")?.to_string() },
            _ => return Err(ProtocolError::UnknownCommand(name)),
        };
        Ok(command)
    }
}
