use super::funnel::spawn_log_aggregator;
use super::{
    LogRecord, LogSink, Message, Response, SubsystemError, SubsystemLink, SubsystemProcess,
    Supervisor, SupervisorError, duplex,
};
use crate::ipc::Liveness;
use crate::protocol::Command;
use crate::subsystems::{DummyProcess, SubsystemId, SubsystemRegistry};
use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Default)]
struct VecSink(Arc<Mutex<Vec<LogRecord>>>);

impl LogSink for VecSink {
    fn write(&mut self, record: &LogRecord) { self.0.lock().unwrap().push(record.clone()); }
}

/// Reads commands until `stop`, never answers.
struct SilentProcess;

#[async_trait]
impl SubsystemProcess for SilentProcess {
    async fn run(self: Box<Self>, mut link: SubsystemLink) -> Result<(), SubsystemError> {
        loop {
            if link.channel.recv().await?.name() == Some("stop") {
                return Ok(());
            }
        }
    }
}

struct CrashingProcess;

#[async_trait]
impl SubsystemProcess for CrashingProcess {
    async fn run(self: Box<Self>, link: SubsystemLink) -> Result<(), SubsystemError> {
        link.logger.log("about to fail");
        Err(SubsystemError::Init("boom".to_string()))
    }
}

struct ReportingProcess;

#[async_trait]
impl SubsystemProcess for ReportingProcess {
    async fn run(self: Box<Self>, mut link: SubsystemLink) -> Result<(), SubsystemError> {
        link.telemetry.report("wheel_duty", 42.0);
        link.telemetry.report("yaw", 90.0);
        while link.channel.recv().await?.name() != Some("stop") {}
        Ok(())
    }
}

fn supervisor(
    registry: SubsystemRegistry,
) -> (Supervisor, tokio::sync::mpsc::UnboundedReceiver<crate::ipc::TelemetrySample>, VecSink) {
    let sink = VecSink::default();
    let (sv, telemetry) = Supervisor::new(registry, Box::new(sink.clone()));
    (sv, telemetry, sink)
}

#[tokio::test]
async fn test_receive_times_out_within_bound() {
    let mut registry = SubsystemRegistry::new();
    registry.register(SubsystemId::Adcs, || Box::new(SilentProcess));
    let (mut sv, _telemetry, _sink) = supervisor(registry);
    sv.start(SubsystemId::Adcs).unwrap();

    let timeout = Duration::from_millis(100);
    let started = Instant::now();
    let res = sv.receive(SubsystemId::Adcs, Some(timeout)).await;
    let elapsed = started.elapsed();
    assert_eq!(res, Err(SupervisorError::Timeout(SubsystemId::Adcs)));
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_millis(250), "took {elapsed:?}");
    assert!(sv.is_running(SubsystemId::Adcs));
    sv.shutdown().await;
}

#[tokio::test]
async fn test_start_twice_and_unknown_targets() {
    let mut registry = SubsystemRegistry::new();
    registry.register(SubsystemId::Dummy, || Box::new(DummyProcess));
    let (mut sv, _telemetry, _sink) = supervisor(registry);

    assert_eq!(sv.start(SubsystemId::Dummy), Ok(()));
    assert_eq!(sv.start(SubsystemId::Dummy), Err(SupervisorError::AlreadyRunning(SubsystemId::Dummy)));
    assert_eq!(
        sv.send(SubsystemId::Payload, Command::IsReady, false),
        Err(SupervisorError::NotRunning(SubsystemId::Payload))
    );
    assert_eq!(sv.poll(SubsystemId::Payload), Err(SupervisorError::NotRunning(SubsystemId::Payload)));
    // stopping something that never ran is a no-op
    sv.stop(SubsystemId::Payload).await;
    assert_eq!(sv.running(), vec![SubsystemId::Dummy]);
    sv.shutdown().await;
    assert!(sv.running().is_empty());
}

#[tokio::test]
async fn test_poll_does_not_consume() {
    let mut registry = SubsystemRegistry::new();
    registry.register(SubsystemId::Dummy, || Box::new(DummyProcess));
    let (mut sv, _telemetry, _sink) = supervisor(registry);
    sv.start(SubsystemId::Dummy).unwrap();

    assert!(!sv.poll(SubsystemId::Dummy).unwrap());
    sv.send(SubsystemId::Dummy, Command::Echo { text: Some("hello".to_string()) }, true).unwrap();
    assert!(sv.last_command(SubsystemId::Dummy).is_some());
    let deadline = Instant::now() + Duration::from_secs(2);
    while !sv.poll(SubsystemId::Dummy).unwrap() {
        assert!(Instant::now() < deadline, "no echo within 2s");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(sv.poll(SubsystemId::Dummy).unwrap());
    let reply = sv.receive(SubsystemId::Dummy, Some(Duration::from_millis(10))).await.unwrap();
    assert_eq!(reply, Response::Raw(json!("hello")));
    assert!(!sv.poll(SubsystemId::Dummy).unwrap());
    sv.shutdown().await;
}

#[tokio::test]
async fn test_crashed_subsystem_is_marked_down() {
    let mut registry = SubsystemRegistry::new();
    registry.register(SubsystemId::Payload, || Box::new(CrashingProcess));
    let (mut sv, _telemetry, sink) = supervisor(registry);
    sv.start(SubsystemId::Payload).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        sv.send(SubsystemId::Payload, Command::IsReady, false),
        Err(SupervisorError::ChannelClosed(SubsystemId::Payload))
    );
    assert_eq!(sv.liveness(SubsystemId::Payload), Some(Liveness::Stopped));
    assert!(!sv.is_running(SubsystemId::Payload));
    sv.shutdown().await;

    let records = sink.0.lock().unwrap();
    let messages: Vec<&str> = records.iter().map(|r| r.message.as_str()).collect();
    assert_eq!(messages, vec!["about to fail", "Subsystem terminated with error: initialisation failed: boom"]);
    assert!(records.iter().all(|r| r.subsystem == "Payload"));
}

#[tokio::test]
async fn test_missing_body_only_logs() {
    let (mut sv, _telemetry, sink) = supervisor(SubsystemRegistry::new());
    assert_eq!(sv.start(SubsystemId::Ttc), Ok(()));
    assert!(!sv.is_running(SubsystemId::Ttc));
    sv.shutdown().await;
    let records = sink.0.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].message.starts_with("Error starting subsystem"));
}

#[tokio::test]
async fn test_telemetry_is_routed_in_order() {
    let mut registry = SubsystemRegistry::new();
    registry.register(SubsystemId::Adcs, || Box::new(ReportingProcess));
    let (mut sv, mut telemetry, _sink) = supervisor(registry);
    sv.start(SubsystemId::Adcs).unwrap();

    let first = tokio::time::timeout(Duration::from_secs(1), telemetry.recv()).await.unwrap().unwrap();
    let second = tokio::time::timeout(Duration::from_secs(1), telemetry.recv()).await.unwrap().unwrap();
    assert_eq!((first.subsystem.as_str(), first.label.as_str()), ("ADCS", "wheel_duty"));
    assert_eq!(first.value, json!(42.0));
    assert_eq!(second.label, "yaw");
    sv.shutdown().await;
}

#[tokio::test]
async fn test_log_funnel_keeps_producer_order() {
    let sink = VecSink::default();
    let (funnel, aggregator) = spawn_log_aggregator(Box::new(sink.clone()));
    let producers: Vec<_> = ["ADCS", "Payload", "TTC"]
        .into_iter()
        .map(|name| {
            let logger = super::SubsystemLogger::new(name, funnel.clone());
            tokio::spawn(async move {
                for i in 0..200 {
                    logger.log(format!("{i}"));
                    if i % 17 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }
    aggregator.stop().await;

    let records = sink.0.lock().unwrap();
    assert_eq!(records.len(), 600);
    for name in ["ADCS", "Payload", "TTC"] {
        let seq: Vec<u32> =
            records.iter().filter(|r| r.subsystem == name).map(|r| r.message.parse().unwrap()).collect();
        assert_eq!(seq, (0..200).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_channel_closes_when_peer_drops() {
    let (mut parent, child) = duplex();
    child.send(Message::bare(true)).unwrap();
    drop(child);
    assert_eq!(parent.recv().await.unwrap(), Message::bare(true));
    assert!(parent.recv().await.is_err());
    assert!(parent.send(Message::bare(1)).is_err());
}

#[test]
fn test_response_decoding() {
    let pair = Response::from(Message::pair("take_picture", Some(super::args(json!({"current_yaw": 10.0})))));
    assert_eq!(pair.command(), Some("take_picture"));
    assert_eq!(pair.arg_f64("current_yaw"), Some(10.0));
    assert_eq!(pair.raw(), json!(["take_picture", {"current_yaw": 10.0}]));

    let array = Response::from(Message::bare(json!(["rotation_complete", null])));
    assert_eq!(array.command(), Some("rotation_complete"));
    assert!(array.arguments().is_none());

    let raw = Response::from(Message::bare(json!([1, 2])));
    assert_eq!(raw.command(), None);
    assert_eq!(raw.raw(), json!([1, 2]));
    assert_eq!(Response::from(Message::bare(false)).as_bool(), Some(false));
}
