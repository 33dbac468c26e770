use super::file_transfer::{CHUNK_SIZE, Transfer, TransferError};
use super::{Downstream, DownstreamContent, TtcProcess};
use crate::ipc::{ConsoleSink, Supervisor};
use crate::protocol::{Command, Event, HealthReport};
use crate::subsystems::{SubsystemId, SubsystemRegistry};
use prost::Message as _;
use std::io::{Cursor, Read};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_file_is_sent_as_metadata_and_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.txt");
    let bytes: Vec<u8> = (0..CHUNK_SIZE * 2 + 10).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &bytes).unwrap();

    let frames = Transfer::file(&path).await.unwrap().into_frames();
    assert_eq!(frames.len(), 4);
    let DownstreamContent::FileMetadata(meta) = &frames[0] else { panic!("metadata first") };
    assert_eq!((meta.name.as_str(), meta.size, meta.chunks), ("report.txt", bytes.len() as u64, 3));

    let mut joined = Vec::new();
    for (i, frame) in frames[1..].iter().enumerate() {
        let DownstreamContent::FileChunk(chunk) = frame else { panic!("chunk expected") };
        assert_eq!(chunk.index as usize, i);
        joined.extend_from_slice(&chunk.data);
    }
    assert_eq!(joined, bytes);
}

#[tokio::test]
async fn test_folder_is_zipped() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("results");
    std::fs::create_dir_all(root.join("phase2")).unwrap();
    std::fs::write(root.join("summary.txt"), "ok").unwrap();
    std::fs::write(root.join("phase2/rows.json"), "[]").unwrap();

    let transfer = Transfer::folder(&root).await.unwrap();
    assert_eq!(transfer.name, "results.zip");
    let mut archive = zip::ZipArchive::new(Cursor::new(transfer.bytes)).unwrap();
    let mut content = String::new();
    archive.by_name("phase2/rows.json").unwrap().read_to_string(&mut content).unwrap();
    assert_eq!(content, "[]");
    assert!(archive.by_name("summary.txt").is_ok());
}

#[tokio::test]
async fn test_transfer_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert!(matches!(Transfer::file(&missing).await, Err(TransferError::NotFound(_))));
    assert!(matches!(Transfer::file(dir.path()).await, Err(TransferError::NotAFile(_))));
    let file = dir.path().join("f");
    std::fs::write(&file, "x").unwrap();
    let err = Transfer::folder(&file).await.unwrap_err();
    assert_eq!(err.to_string(), format!("{} does not point to a directory!", file.display()));
}

async fn write_line(stream: &mut TcpStream, line: &str) {
    stream.write_u32(line.len() as u32).await.unwrap();
    stream.write_all(line.as_bytes()).await.unwrap();
}

async fn read_frame(stream: &mut TcpStream) -> DownstreamContent {
    let length = stream.read_u32().await.unwrap();
    let mut buffer = vec![0u8; length as usize];
    stream.read_exact(&mut buffer).await.unwrap();
    Downstream::decode(buffer.as_slice()).unwrap().content.unwrap()
}

#[tokio::test]
async fn test_ttc_round_trip() {
    let mut registry = SubsystemRegistry::new();
    registry.register(SubsystemId::Ttc, || Box::new(TtcProcess::new("127.0.0.1:0")));
    let (mut sv, _telemetry) = Supervisor::new(registry, Box::new(ConsoleSink));
    sv.start(SubsystemId::Ttc).unwrap();
    let timeout = Some(Duration::from_secs(2));

    let ready = sv.receive(SubsystemId::Ttc, timeout).await.unwrap();
    assert_eq!(ready.as_bool(), Some(true));

    // queued while nobody listens
    sv.send(SubsystemId::Ttc, Command::SendMessage { message: "hello ground".to_string() }, false).unwrap();
    sv.send(SubsystemId::Ttc, Command::HealthCheck, true).unwrap();
    let health = HealthReport::from_response(&sv.receive(SubsystemId::Ttc, timeout).await.unwrap()).unwrap();
    let listening = health.components.iter().find(|c| c.name == "Listening On").unwrap();
    let addr = listening.reading.as_str().unwrap().to_string();
    assert!(health.components.iter().any(|c| c.name == "Backlog" && c.reading == serde_json::json!(1)));

    let mut ground = TcpStream::connect(&addr).await.unwrap();
    let DownstreamContent::Message(backlogged) = read_frame(&mut ground).await else { panic!("text expected") };
    assert_eq!(backlogged.text, "hello ground");
    assert!(!backlogged.error);

    write_line(&mut ground, "ping").await;
    assert!(matches!(read_frame(&mut ground).await, DownstreamContent::Pong(_)));

    write_line(&mut ground, "start_phase 9").await;
    let DownstreamContent::Message(rejected) = read_frame(&mut ground).await else { panic!("error expected") };
    assert!(rejected.error);
    assert_eq!(rejected.text, "[ERROR] 9 is not a valid phase!");

    write_line(&mut ground, "start_phase 1").await;
    let forwarded = sv.receive(SubsystemId::Ttc, timeout).await.unwrap();
    assert_eq!(Event::try_from(&forwarded), Ok(Event::GroundCommand { line: "start_phase 1".to_string() }));

    sv.shutdown().await;
}
