use super::args::{ArgReader, numbers_to_value};
use super::command::{NumberId, ProtocolError};
use crate::ipc::{Message, Response, args};
use serde_json::json;
use std::collections::BTreeMap;
use strum_macros::AsRefStr;

/// Unsolicited envelopes emitted by subsystem-internal loops while a choreography runs.
#[derive(Debug, Clone, PartialEq, AsRefStr)]
pub enum Event {
    #[strum(serialize = "take_picture")]
    TakePicture { current_yaw: f64 },
    #[strum(serialize = "rotation_complete")]
    RotationComplete,
    #[strum(serialize = "take_distance")]
    TakeDistance { number: NumberId, current_yaw: f64 },
    #[strum(serialize = "sequence_rotation_complete")]
    SequenceRotationComplete,
    #[strum(serialize = "phase2_sequence_response")]
    Phase2SequenceResponse { angle_deltas: BTreeMap<NumberId, f64> },
    #[strum(serialize = "detect_apriltag")]
    DetectAprilTag,
    #[strum(serialize = "target_found")]
    TargetFound { target_yaw: f64 },
    #[strum(serialize = "target_aligned")]
    TargetAligned { current_yaw: f64 },
    #[strum(serialize = "target_lost")]
    TargetLost,
    #[strum(serialize = "timeout")]
    Timeout,
    /// A ground-station command line the TTC does not serve on its own.
    #[strum(serialize = "ground_command")]
    GroundCommand { line: String },
}

impl From<Event> for Message {
    fn from(value: Event) -> Self {
        let arguments = match &value {
            Event::RotationComplete
            | Event::SequenceRotationComplete
            | Event::DetectAprilTag
            | Event::TargetLost
            | Event::Timeout => None,
            Event::TakePicture { current_yaw } => Some(json!({ "current_yaw": current_yaw })),
            Event::TakeDistance { number, current_yaw } => {
                Some(json!({ "number": number, "current_yaw": current_yaw }))
            }
            Event::Phase2SequenceResponse { angle_deltas } => {
                Some(json!({ "angle_deltas": numbers_to_value(angle_deltas) }))
            }
            Event::TargetFound { target_yaw } => Some(json!({ "target_yaw": target_yaw })),
            Event::TargetAligned { current_yaw } => Some(json!({ "current_yaw": current_yaw })),
            Event::GroundCommand { line } => Some(json!({ "line": line })),
        };
        Message::pair(value.as_ref(), arguments.map(args))
    }
}

impl TryFrom<&Response> for Event {
    type Error = ProtocolError;

    fn try_from(value: &Response) -> Result<Self, Self::Error> {
        let Response::Structured { command, arguments } = value else {
            return Err(ProtocolError::NotAnEnvelope(value.raw()));
        };
        let empty = Default::default();
        let r = ArgReader::new(command, arguments.as_ref().unwrap_or(&empty));
        let event = match command.as_str() {
            "take_picture" => Event::TakePicture { current_yaw: r.f64("current_yaw")? },
            "rotation_complete" => Event::RotationComplete,
            "take_distance" => {
                let number = r.value("number").and_then(super::args::number_id).ok_or(
                    ProtocolError::MissingArgument { command: command.clone(), field: "number" },
                )?;
                Event::TakeDistance { number, current_yaw: r.f64("current_yaw")? }
            }
            "sequence_rotation_complete" => Event::SequenceRotationComplete,
            "phase2_sequence_response" => {
                Event::Phase2SequenceResponse { angle_deltas: r.id_map("angle_deltas")? }
            }
            "detect_apriltag" => Event::DetectAprilTag,
            "target_found" => Event::TargetFound { target_yaw: r.f64("target_yaw")? },
            "target_aligned" => Event::TargetAligned { current_yaw: r.f64("current_yaw")? },
            "target_lost" => Event::TargetLost,
            "timeout" => Event::Timeout,
            "ground_command" => Event::GroundCommand { line: r.str("line")?.to_string() },
            _ => return Err(ProtocolError::UnknownEvent(command.clone())),
        };
        Ok(event)
    }
}
