use super::file_transfer::Transfer;
use super::ground_endpoint::{GroundEndpoint, GroundEvent};
use super::ground_messages::{Data, DownstreamContent, Pong, TextMessage};
use crate::ipc::{Message, SubsystemError, SubsystemLink, SubsystemLogger, SubsystemProcess};
use crate::protocol::{Command, Event, GroundCommand, HealthReport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::Path;

/// Frames kept while no ground station is connected; the oldest are dropped beyond this.
const BACKLOG_LIMIT: usize = 512;

fn text(message: String, error: bool) -> DownstreamContent {
    DownstreamContent::Message(TextMessage { timestamp: Utc::now().timestamp(), text: message, error })
}

/// Telemetry, tracking and command: the ground link subsystem.
pub struct TtcProcess {
    addr: String,
}

impl TtcProcess {
    pub fn new(addr: impl Into<String>) -> Self { Self { addr: addr.into() } }
}

struct Downlink {
    endpoint: GroundEndpoint,
    backlog: VecDeque<DownstreamContent>,
    peer: Option<SocketAddr>,
    last_command: Option<DateTime<Utc>>,
    logger: SubsystemLogger,
}

impl Downlink {
    fn deliver(&mut self, content: DownstreamContent) {
        if self.endpoint.is_ground_connected() {
            self.endpoint.send_downstream(content);
            return;
        }
        if self.backlog.len() == BACKLOG_LIMIT {
            self.backlog.pop_front();
        }
        self.backlog.push_back(content);
    }

    fn flush_backlog(&mut self) {
        if !self.backlog.is_empty() {
            self.logger.log(format!("Flushing {} backlogged frames", self.backlog.len()));
        }
        while let Some(content) = self.backlog.pop_front() {
            self.endpoint.send_downstream(content);
        }
    }

    fn message(&mut self, message: String) {
        self.logger.log(format!("Sending \"{message}\" to Ground"));
        self.deliver(text(message, false));
    }

    fn error(&mut self, message: &str) {
        self.logger.log(format!("Sending error \"{message}\" to Ground"));
        self.deliver(text(format!("[ERROR] {message}"), true));
    }

    async fn transfer(&mut self, path: &Path, folder: bool) {
        let transfer = if folder { Transfer::folder(path).await } else { Transfer::file(path).await };
        match transfer {
            Ok(transfer) => {
                self.logger.log(format!("Sending {} ({} bytes) to Ground", transfer.name, transfer.bytes.len()));
                for frame in transfer.into_frames() {
                    self.deliver(frame);
                }
            }
            Err(e) => self.error(&e.to_string()),
        }
    }

    fn health(&self) -> HealthReport {
        let mut report = HealthReport::new();
        report
            .component("Listening On", json!(self.endpoint.local_addr().to_string()))
            .component("Ground Station", json!(self.peer.map(|p| p.to_string())))
            .component("Backlog", json!(self.backlog.len()))
            .component("Last Command Received", json!(self.last_command.map(|t| t.to_rfc3339())));
        report
    }
}

#[async_trait]
impl SubsystemProcess for TtcProcess {
    async fn run(self: Box<Self>, mut link: SubsystemLink) -> Result<(), SubsystemError> {
        let endpoint = match GroundEndpoint::start(&self.addr).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                link.logger.log(format!("[ERROR] Could not bind ground link on {}: {e}", self.addr));
                return Err(e.into());
            }
        };
        link.logger.log(format!("Ground link listening on {}", endpoint.local_addr()));
        let mut downlink = Downlink {
            endpoint,
            backlog: VecDeque::new(),
            peer: None,
            last_command: None,
            logger: link.logger.clone(),
        };
        link.channel.send(Message::bare(true))?;

        loop {
            tokio::select! {
                msg = link.channel.recv() => {
                    let command = match Command::try_from(msg?) {
                        Ok(command) => command,
                        Err(e) => {
                            link.logger.log(format!("[ERROR] {e}"));
                            continue;
                        }
                    };
                    match command {
                        Command::SendMessage { message } => downlink.message(message),
                        Command::SendError { message } => downlink.error(&message),
                        Command::SendData(sample) => downlink.deliver(DownstreamContent::Data(Data {
                            timestamp: sample.timestamp.timestamp(),
                            subsystem: sample.subsystem,
                            label: sample.label,
                            json: sample.value.to_string(),
                        })),
                        Command::SendFile { path } => downlink.transfer(Path::new(&path), false).await,
                        Command::HealthCheck => link.channel.send(downlink.health().into_message())?,
                        Command::IsReady => link.channel.send(Message::bare(true))?,
                        Command::Stop => break,
                        other => link.logger.log(format!("[ERROR] {} is not a TTC command", other.as_ref())),
                    }
                }
                event = downlink.endpoint.next_event() => {
                    let Some(event) = event else { break };
                    match event {
                        GroundEvent::Connected(peer) => {
                            link.logger.log(format!("Ground station connected from {peer}"));
                            downlink.peer = Some(peer);
                            downlink.flush_backlog();
                        }
                        GroundEvent::Disconnected => {
                            link.logger.log("Ground station dropped");
                            downlink.peer = None;
                        }
                        GroundEvent::Command(line) => {
                            downlink.last_command = Some(Utc::now());
                            link.logger.log(format!("CubeSat received: {line}"));
                            match line.parse::<GroundCommand>() {
                                Ok(GroundCommand::Ping) => downlink.deliver(DownstreamContent::Pong(Pong {
                                    timestamp: Utc::now().timestamp(),
                                })),
                                Ok(GroundCommand::GetFile(path)) => downlink.transfer(&path, false).await,
                                Ok(GroundCommand::GetFolder(path)) => downlink.transfer(&path, true).await,
                                Ok(_) => link.channel.send(Event::GroundCommand { line })?,
                                Err(e) => downlink.error(&e.to_string()),
                            }
                        }
                    }
                }
            }
        }
        link.logger.log("TTC stopped");
        Ok(())
    }
}
