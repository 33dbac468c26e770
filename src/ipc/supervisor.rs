use super::{
    channel::{ChannelEnd, ChannelError, duplex},
    envelope::{CommandEnvelope, Response},
    funnel::{
        Aggregator, LogFunnel, LogRecord, LogSink, SubsystemLogger, TelemetryFunnel,
        TelemetryReporter, TelemetrySample, spawn_log_aggregator, spawn_telemetry_aggregator,
    },
};
use crate::subsystems::{SubsystemId, SubsystemRegistry};
use crate::{error, info, log, warn};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use strum_macros::Display;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

/// Everything a subsystem body gets handed when it is started.
pub struct SubsystemLink {
    pub channel: ChannelEnd,
    pub logger: SubsystemLogger,
    pub telemetry: TelemetryReporter,
}

#[derive(Debug, thiserror::Error)]
pub enum SubsystemError {
    #[error("lost the channel to the supervisor")]
    Channel(#[from] ChannelError),
    #[error("initialisation failed: {0}")]
    Init(String),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// The body of a subsystem. It owns its end of the channel for as long as it runs and
/// returns once it received `stop` or lost the supervisor.
#[async_trait]
pub trait SubsystemProcess: Send {
    async fn run(self: Box<Self>, link: SubsystemLink) -> Result<(), SubsystemError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Liveness {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SupervisorError {
    #[error("{0} is already running")]
    AlreadyRunning(SubsystemId),
    #[error("{0} is not running")]
    NotRunning(SubsystemId),
    #[error("timed out waiting for {0}")]
    Timeout(SubsystemId),
    #[error("channel to {0} is broken")]
    ChannelClosed(SubsystemId),
}

struct Subsystem {
    handle: JoinHandle<()>,
    channel: ChannelEnd,
    liveness: Liveness,
    last_command: Option<DateTime<Utc>>,
}

/// Owns the execution unit and the channel of every running subsystem.
///
/// Nothing else touches subsystem handles or channels; callers address subsystems by
/// [`SubsystemId`] and get failures back as [`SupervisorError`] values.
pub struct Supervisor {
    registry: SubsystemRegistry,
    subsystems: HashMap<SubsystemId, Subsystem>,
    log_funnel: LogFunnel,
    log_aggregator: Option<Aggregator<LogRecord>>,
    telemetry_funnel: TelemetryFunnel,
    telemetry_aggregator: Option<Aggregator<TelemetrySample>>,
}

impl Supervisor {
    /// Upper bound for a subsystem to wind down after `stop` before it gets aborted.
    const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a new supervisor along with the receiving end of the telemetry route.
    pub fn new(
        registry: SubsystemRegistry,
        sink: Box<dyn LogSink>,
    ) -> (Self, UnboundedReceiver<TelemetrySample>) {
        let (log_funnel, log_aggregator) = spawn_log_aggregator(sink);
        let (route_tx, route_rx) = mpsc::unbounded_channel();
        let (telemetry_funnel, telemetry_aggregator) = spawn_telemetry_aggregator(route_tx);
        (
            Self {
                registry,
                subsystems: HashMap::new(),
                log_funnel,
                log_aggregator: Some(log_aggregator),
                telemetry_funnel,
                telemetry_aggregator: Some(telemetry_aggregator),
            },
            route_rx,
        )
    }

    /// Spawns the body registered for `id`.
    ///
    /// A missing or failing body does not surface here, it ends up in the subsystem log.
    pub fn start(&mut self, id: SubsystemId) -> Result<(), SupervisorError> {
        if self.subsystems.contains_key(&id) {
            warn!("{id} already running.");
            return Err(SupervisorError::AlreadyRunning(id));
        }
        let logger = SubsystemLogger::new(id.to_string(), self.log_funnel.clone());
        let Some(process) = self.registry.instantiate(id) else {
            logger.log("Error starting subsystem: no process body registered");
            return Ok(());
        };
        let (parent, child) = duplex();
        let link = SubsystemLink {
            channel: child,
            logger: logger.clone(),
            telemetry: TelemetryReporter::new(id.to_string(), self.telemetry_funnel.clone()),
        };
        let handle = tokio::spawn(async move {
            if let Err(e) = process.run(link).await {
                logger.log(format!("Subsystem terminated with error: {e}"));
            }
        });
        self.subsystems.insert(
            id,
            Subsystem { handle, channel: parent, liveness: Liveness::Running, last_command: None },
        );
        info!("Started {id} subsystem.");
        Ok(())
    }

    pub fn send(
        &mut self,
        id: SubsystemId,
        command: impl Into<CommandEnvelope>,
        log: bool,
    ) -> Result<(), SupervisorError> {
        let command = command.into();
        let sub = self.subsystems.get_mut(&id).ok_or_else(|| {
            warn!("{id} is not running.");
            SupervisorError::NotRunning(id)
        })?;
        if log {
            log!("Sent instruction to {id}: {} with args {:?}", command.name(), command.arguments());
        }
        match sub.channel.send(command) {
            Ok(()) => {
                sub.last_command = Some(Utc::now());
                Ok(())
            }
            Err(ChannelError::Closed) => Err(Self::mark_down(id, sub)),
        }
    }

    /// Blocks for the next envelope from `id`, at most `timeout` if one is given.
    pub async fn receive(
        &mut self,
        id: SubsystemId,
        timeout: Option<Duration>,
    ) -> Result<Response, SupervisorError> {
        let sub = self.subsystems.get_mut(&id).ok_or(SupervisorError::NotRunning(id))?;
        let res = match timeout {
            Some(dt) => sub.channel.recv_timeout(dt).await,
            None => sub.channel.recv().await.map(Some),
        };
        match res {
            Ok(Some(msg)) => Ok(Response::from(msg)),
            Ok(None) => {
                warn!("Timeout waiting for response from {id}.");
                Err(SupervisorError::Timeout(id))
            }
            Err(ChannelError::Closed) => Err(Self::mark_down(id, sub)),
        }
    }

    /// Takes the next envelope from `id` if one is already waiting.
    pub fn try_receive(&mut self, id: SubsystemId) -> Result<Option<Response>, SupervisorError> {
        let sub = self.subsystems.get_mut(&id).ok_or(SupervisorError::NotRunning(id))?;
        match sub.channel.try_recv() {
            Ok(msg) => Ok(msg.map(Response::from)),
            Err(ChannelError::Closed) => Err(Self::mark_down(id, sub)),
        }
    }

    /// Non-blocking check whether `id` has something waiting to be received.
    pub fn poll(&mut self, id: SubsystemId) -> Result<bool, SupervisorError> {
        let sub = self.subsystems.get_mut(&id).ok_or(SupervisorError::NotRunning(id))?;
        sub.channel.poll().map_err(|_| Self::mark_down(id, sub))
    }

    fn mark_down(id: SubsystemId, sub: &mut Subsystem) -> SupervisorError {
        if sub.liveness == Liveness::Running {
            error!("Channel to {id} broke, marking subsystem as stopped.");
            sub.liveness = Liveness::Stopped;
        }
        SupervisorError::ChannelClosed(id)
    }

    pub async fn stop(&mut self, id: SubsystemId) {
        let Some(mut sub) = self.subsystems.remove(&id) else {
            warn!("{id} is not running.");
            return;
        };
        if let Err(e) = sub.channel.send(CommandEnvelope::new("stop")) {
            warn!("Could not send stop to {id}: {e}");
        }
        match tokio::time::timeout(Self::STOP_JOIN_TIMEOUT, &mut sub.handle).await {
            Ok(Ok(())) => info!("Stopped {id} subsystem."),
            Ok(Err(e)) => error!("{id} subsystem ended abnormally: {e}"),
            Err(_) => {
                warn!("{id} did not stop in time, aborting it.");
                sub.handle.abort();
            }
        }
    }

    /// Stops every subsystem, then the log and telemetry aggregators.
    pub async fn shutdown(&mut self) {
        info!("Shutting down supervisor...");
        let ids: Vec<SubsystemId> = self.subsystems.keys().copied().collect();
        for id in ids {
            self.stop(id).await;
        }
        if let Some(aggregator) = self.log_aggregator.take() {
            aggregator.stop().await;
        }
        if let Some(aggregator) = self.telemetry_aggregator.take() {
            aggregator.stop().await;
        }
        info!("Shutdown complete.");
    }

    pub fn is_running(&self, id: SubsystemId) -> bool {
        self.liveness(id) == Some(Liveness::Running)
    }

    pub fn liveness(&self, id: SubsystemId) -> Option<Liveness> {
        self.subsystems.get(&id).map(|s| s.liveness)
    }

    pub fn last_command(&self, id: SubsystemId) -> Option<DateTime<Utc>> {
        self.subsystems.get(&id).and_then(|s| s.last_command)
    }

    pub fn running(&self) -> Vec<SubsystemId> {
        let mut ids: Vec<SubsystemId> = self.subsystems.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// A logger feeding the shared funnel, for components without a subsystem body.
    pub fn logger(&self, name: &str) -> SubsystemLogger {
        SubsystemLogger::new(name, self.log_funnel.clone())
    }
}
