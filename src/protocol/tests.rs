use super::{
    Command, Event, GroundCommand, GroundCommandError, HealthReport, HealthStatus, PhaseRequest,
    ProtocolError, WheelTest, numbers_from_map,
};
use crate::ipc::{CommandEnvelope, Message, Response, TelemetrySample, args};
use crate::mission::SubPhase;
use crate::subsystems::SubsystemId;
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[test]
fn test_phase2_sequence_envelope() {
    let numbers = BTreeMap::from([(14, 10.0), (15, 30.0)]);
    let envelope = CommandEnvelope::from(Command::Phase2Sequence { order: vec![14, 15], numbers });
    assert_eq!(envelope.name(), "phase2_sequence");
    let arguments = envelope.arguments().unwrap();
    assert_eq!(arguments["order"], json!([14, 15]));
    assert_eq!(arguments["numbers"], json!({"14": 10.0, "15": 30.0}));
}

#[test]
fn test_command_from_envelope() {
    let msg = Message::pair("phase3_align_target", Some(args(json!({"target_yaw": 200.5}))));
    assert_eq!(Command::try_from(msg), Ok(Command::Phase3AlignTarget { target_yaw: 200.5 }));

    let msg = Message::pair("apriltag_detection", Some(args(json!({"detected": false, "bearing": null}))));
    assert_eq!(Command::try_from(msg), Ok(Command::AprilTagDetection { detected: false, bearing: None }));

    // identifiers may arrive as text
    let msg = Message::pair(
        "phase2_sequence",
        Some(args(json!({"order": ["14", 15], "numbers": {"14": 10, "15": 30.0}}))),
    );
    let Ok(Command::Phase2Sequence { order, numbers }) = Command::try_from(msg) else {
        panic!("phase2_sequence not decoded");
    };
    assert_eq!(order, vec![14, 15]);
    assert_eq!(numbers, BTreeMap::from([(14, 10.0), (15, 30.0)]));
}

#[test]
fn test_send_data_keeps_sample() {
    let sample = TelemetrySample {
        subsystem: "ADCS".to_string(),
        label: "yaw".to_string(),
        value: json!(12.5),
        timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
    };
    let msg = Message::from(Command::SendData(sample.clone()));
    assert_eq!(Command::try_from(msg), Ok(Command::SendData(sample)));
}

#[test]
fn test_protocol_errors() {
    assert_eq!(
        Command::try_from(Message::pair("warp_drive", None)),
        Err(ProtocolError::UnknownCommand("warp_drive".to_string()))
    );
    assert_eq!(Command::try_from(Message::bare(true)), Err(ProtocolError::NotAnEnvelope(json!(true))));
    assert_eq!(
        Command::try_from(Message::pair("take_picture", None)),
        Err(ProtocolError::MissingArgument { command: "take_picture".to_string(), field: "current_yaw" })
    );
    assert_eq!(
        Command::try_from(Message::pair("take_picture", Some(args(json!({"current_yaw": "north"}))))),
        Err(ProtocolError::MalformedArgument { command: "take_picture".to_string(), field: "current_yaw" })
    );
}

#[test]
fn test_replies_and_fire_and_forget() {
    assert!(Command::IsReady.expects_reply());
    assert!(Command::GetNumbers.expects_reply());
    let test = WheelTest { kp: 1.0, ki: 0.0, kd: 0.0, duration: 1.0, degree: 90.0 };
    assert!(Command::TestWheel(test).expects_reply());
    assert!(!Command::Stop.expects_reply());
    assert!(!Command::StopWheel.expects_reply());
    assert!(!Command::SendFile { path: "x".to_string() }.expects_reply());
    assert!(!Command::AprilTagDetection { detected: true, bearing: Some(1.0) }.expects_reply());
}

#[test]
fn test_events_from_responses() {
    let response = Response::from(Message::from(Event::TakeDistance { number: 14, current_yaw: 61.0 }));
    assert_eq!(Event::try_from(&response), Ok(Event::TakeDistance { number: 14, current_yaw: 61.0 }));

    let response = Response::from(Message::bare(json!(["rotation_complete", null])));
    assert_eq!(Event::try_from(&response), Ok(Event::RotationComplete));

    let deltas = Message::pair("phase2_sequence_response", Some(args(json!({"angle_deltas": {"14": -0.5}}))));
    assert_eq!(
        Event::try_from(&Response::from(deltas)),
        Ok(Event::Phase2SequenceResponse { angle_deltas: BTreeMap::from([(14, -0.5)]) })
    );

    let unknown = Response::from(Message::pair("explode", None));
    assert_eq!(Event::try_from(&unknown), Err(ProtocolError::UnknownEvent("explode".to_string())));
    assert!(Event::try_from(&Response::from(Message::bare(3))).is_err());
}

#[test]
fn test_ground_commands() {
    assert_eq!("ping".parse::<GroundCommand>(), Ok(GroundCommand::Ping));
    assert_eq!(
        "  get_file  /tmp/report.txt ".parse::<GroundCommand>(),
        Ok(GroundCommand::GetFile(PathBuf::from("/tmp/report.txt")))
    );
    assert_eq!("start_phase 1".parse::<GroundCommand>(), Ok(GroundCommand::StartPhase(PhaseRequest::Health)));
    assert_eq!(
        "start_phase 2 14,15 27".parse::<GroundCommand>(),
        Ok(GroundCommand::StartPhase(PhaseRequest::Scan { sequence: vec![14, 15, 27] }))
    );
    assert_eq!(
        "start_phase 3 B".parse::<GroundCommand>(),
        Ok(GroundCommand::StartPhase(PhaseRequest::Target(SubPhase::B)))
    );
    assert_eq!(
        "test_wheel 2 0.05 0.01 10 90".parse::<GroundCommand>(),
        Ok(GroundCommand::TestWheel(WheelTest { kp: 2.0, ki: 0.05, kd: 0.01, duration: 10.0, degree: 90.0 }))
    );
    assert_eq!("restart adcs".parse::<GroundCommand>(), Ok(GroundCommand::Restart(SubsystemId::Adcs)));
    assert!(GroundCommand::Ping.is_local());
    assert!(!GroundCommand::CancelPhase.is_local());
}

#[test]
fn test_ground_command_errors() {
    let parse = |line: &str| line.parse::<GroundCommand>().unwrap_err();
    assert_eq!(parse(""), GroundCommandError::Empty);
    assert_eq!(parse("fly"), GroundCommandError::UnknownCommand("fly".to_string()));
    assert_eq!(parse("get_folder"), GroundCommandError::NoPath);
    assert_eq!(parse("start_phase"), GroundCommandError::NoPhase);
    assert_eq!(parse("start_phase 4"), GroundCommandError::InvalidPhase("4".to_string()));
    assert_eq!(parse("start_phase 2"), GroundCommandError::NoSequence);
    assert_eq!(parse("start_phase 2 14,x"), GroundCommandError::InvalidNumber("x".to_string()));
    assert_eq!(parse("start_phase 3"), GroundCommandError::NoSubphase);
    assert_eq!(parse("start_phase 3 d"), GroundCommandError::InvalidSubphase("d".to_string()));
    assert_eq!(parse("restart"), GroundCommandError::NoSubsystem);
    assert_eq!(parse("restart gps"), GroundCommandError::InvalidSubsystem("gps".to_string()));
    assert_eq!(parse("test_wheel 1 2 3"), GroundCommandError::TestWheelUsage);
    assert_eq!(parse("start_phase 4").to_string(), "4 is not a valid phase!");
}

#[test]
fn test_phase_request_display() {
    assert_eq!(PhaseRequest::Health.to_string(), "phase 1");
    assert_eq!(PhaseRequest::Target(SubPhase::C).to_string(), "phase 3 subphase c");
}

#[test]
fn test_health_status_aggregation() {
    let mut report = HealthReport::new();
    report.component("Gyroscope", json!([0.0, 0.1, 0.0]));
    assert_eq!(report.status(), HealthStatus::Ok);
    report.component("Sun Sensor 1", json!(null));
    assert_eq!(report.status(), HealthStatus::Degraded);
    report.fault("IMU", "No response from IMU");
    assert_eq!(report.status(), HealthStatus::Down);

    let decoded = HealthReport::from_response(&Response::from(report.clone().into_message())).unwrap();
    assert_eq!(decoded, report);
    assert_eq!(
        decoded.lines(),
        vec![
            "Gyroscope: [0.0,0.1,0.0]".to_string(),
            "Sun Sensor 1: Not available".to_string(),
            "IMU: No response from IMU".to_string(),
            "STATUS: DOWN - Error in one or more components".to_string(),
        ]
    );
    assert!(HealthReport::from_response(&Response::from(Message::bare(true))).is_none());
}

#[test]
fn test_numbers_from_map_rejects_garbage() {
    let good = json!({"14": 10, " 15": 30.5});
    assert_eq!(numbers_from_map(good.as_object().unwrap()), Some(BTreeMap::from([(14, 10.0), (15, 30.5)])));
    let bad = json!({"fourteen": 10});
    assert_eq!(numbers_from_map(bad.as_object().unwrap()), None);
}
