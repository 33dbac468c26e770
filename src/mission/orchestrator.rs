use super::mission_state::{MissionState, Phase};
use super::watchdog::Watchdog;
use super::{MissionError, PhaseError, PhaseOutcome};
use crate::config::MissionConfig;
use crate::ipc::{Response, Supervisor, SupervisorError, TelemetrySample};
use crate::protocol::{Command, Event, GroundCommand, PhaseRequest, await_ready, request};
use crate::subsystems::SubsystemId;
use crate::{error, event, info, phase, warn};
use chrono::Utc;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::mpsc::UnboundedReceiver;

/// On-board data handling: owns the supervisor and the mission state and runs phase
/// choreographies one after the other.
pub struct Orchestrator {
    pub(super) supervisor: Supervisor,
    telemetry: UnboundedReceiver<TelemetrySample>,
    pub(super) config: MissionConfig,
    pub(super) state: MissionState,
    watchdog: Watchdog,
    /// Ground commands received during a phase, executed once READY again.
    deferred: VecDeque<GroundCommand>,
    shutdown_requested: bool,
    ground_link_lost: bool,
    /// Absolute yaw the target was last seen at.
    pub(super) target_yaw: Option<f64>,
    last_outcome: Option<PhaseOutcome>,
}

impl Orchestrator {
    pub fn new(
        supervisor: Supervisor,
        telemetry: UnboundedReceiver<TelemetrySample>,
        config: MissionConfig,
    ) -> Self {
        Self {
            supervisor,
            telemetry,
            config,
            state: MissionState::new(),
            watchdog: Watchdog::new(),
            deferred: VecDeque::new(),
            shutdown_requested: false,
            ground_link_lost: false,
            target_yaw: None,
            last_outcome: None,
        }
    }

    pub fn state(&self) -> &MissionState { &self.state }
    pub fn target_yaw(&self) -> Option<f64> { self.target_yaw }
    pub fn last_outcome(&self) -> Option<&PhaseOutcome> { self.last_outcome.as_ref() }

    /// Handshake, then serve ground commands until `shutdown`.
    pub async fn run(&mut self) -> Result<(), MissionError> {
        self.handshake().await?;
        self.state.mark_ready();
        info!("All subsystems ready, OBDH is {}", self.state.state());
        self.send_message("Vector on-board computer ready".to_string());

        while !self.shutdown_requested {
            self.route_telemetry();
            if let Some(command) = self.deferred.pop_front() {
                self.execute(command).await;
                continue;
            }
            if let Some(line) = self.next_ground_line().await {
                match line.parse::<GroundCommand>() {
                    Ok(command) => self.execute(command).await,
                    Err(e) => self.send_error(e.to_string()),
                }
            }
        }
        self.send_message("Shutting down".to_string());
        self.route_telemetry();
        self.supervisor.shutdown().await;
        Ok(())
    }

    async fn handshake(&mut self) -> Result<(), MissionError> {
        for id in SubsystemId::REQUIRED {
            await_ready(&mut self.supervisor, id, self.config.ready_retry)
                .await
                .map_err(MissionError::Handshake)?;
        }
        if self.supervisor.is_running(SubsystemId::Dummy) {
            let dummy = await_ready(&mut self.supervisor, SubsystemId::Dummy, self.config.ready_retry);
            if tokio::time::timeout(self.config.reply_timeout, dummy).await.is_err() {
                warn!("Dummy subsystem did not report ready, continuing without it");
            }
        }
        Ok(())
    }

    /// Waits one poll interval for a command line forwarded by the ground link.
    async fn next_ground_line(&mut self) -> Option<String> {
        if self.ground_link_lost {
            tokio::time::sleep(self.config.poll_interval).await;
            return None;
        }
        match self.supervisor.receive(SubsystemId::Ttc, Some(self.config.poll_interval)).await {
            Ok(response) => Self::ground_line(&response),
            Err(SupervisorError::Timeout(_)) => None,
            Err(e) => {
                error!("Ground link unavailable: {e}");
                self.ground_link_lost = true;
                None
            }
        }
    }

    fn ground_line(response: &Response) -> Option<String> {
        match Event::try_from(response) {
            Ok(Event::GroundCommand { line }) => Some(line),
            Ok(other) => {
                event!("Ignoring {} from ground link", other.as_ref());
                None
            }
            Err(e) => {
                event!("Ignoring ground link envelope: {e}");
                None
            }
        }
    }

    async fn execute(&mut self, command: GroundCommand) {
        match command {
            GroundCommand::StartPhase(phase_request) => self.run_phase(phase_request).await,
            GroundCommand::CancelPhase => self.send_message("No phase running".to_string()),
            GroundCommand::TestWheel(test) => {
                self.acknowledged(SubsystemId::Adcs, Command::TestWheel(test), "Wheel test").await;
            }
            GroundCommand::StopWheel => {
                if let Err(e) = self.supervisor.send(SubsystemId::Adcs, Command::StopWheel, true) {
                    self.send_error(e.to_string());
                } else {
                    self.send_message("Reaction wheel stopped".to_string());
                }
            }
            GroundCommand::CalibrateSunSensors => {
                let command = Command::CalibrateSunSensors;
                self.acknowledged(SubsystemId::Adcs, command, "Sun sensor calibration").await;
            }
            GroundCommand::HealthCheck => {
                for id in self.supervisor.running() {
                    let lines = match self.health_of(id).await {
                        Some(report) => report.lines().join("\n"),
                        None => "No response".to_string(),
                    };
                    self.send_message(format!("{id} health:\n{lines}"));
                }
            }
            GroundCommand::Restart(id) => self.restart(id).await,
            GroundCommand::Shutdown => self.shutdown_requested = true,
            GroundCommand::Ping | GroundCommand::GetFile(_) | GroundCommand::GetFolder(_) => {
                warn!("Ground link forwarded a command it serves itself");
            }
        }
    }

    async fn acknowledged(&mut self, id: SubsystemId, command: Command, what: &str) {
        match request(&mut self.supervisor, id, command, Some(self.config.reply_timeout)).await {
            Ok(reply) if reply.as_bool() == Some(true) => self.send_message(format!("{what} started")),
            Ok(reply) => self.send_error(format!("{what} refused: {}", reply.raw())),
            Err(e) => self.send_error(format!("{what} failed: {e}")),
        }
    }

    async fn restart(&mut self, id: SubsystemId) {
        info!("Restarting {id}...");
        self.supervisor.stop(id).await;
        if let Err(e) = self.supervisor.start(id) {
            self.send_error(format!("Could not restart {id}: {e}"));
            return;
        }
        let ready = await_ready(&mut self.supervisor, id, self.config.ready_retry);
        match tokio::time::timeout(self.config.reply_timeout * 3, ready).await {
            Ok(Ok(())) => {
                if id == SubsystemId::Ttc {
                    self.ground_link_lost = false;
                }
                self.send_message(format!("{id} restarted"));
            }
            Ok(Err(e)) => self.send_error(format!("{id} did not come back: {e}")),
            Err(_) => self.send_error(format!("{id} did not report ready after restart")),
        }
    }

    pub(super) async fn run_phase(&mut self, phase_request: PhaseRequest) {
        if let Err(e) = self.state.begin(phase_request.phase(), phase_request.subphase()) {
            self.send_error(e.to_string());
            return;
        }
        let bound = match phase_request.phase() {
            Phase::Third => self.config.phase3_watchdog,
            Phase::First | Phase::Second => self.config.phase_watchdog,
        };
        self.watchdog.arm(phase_request.to_string(), bound);
        self.drain(SubsystemId::Adcs);
        self.drain(SubsystemId::Payload);
        phase!("Starting {phase_request}");
        self.send_message(format!("Starting {phase_request}"));

        let result = match &phase_request {
            PhaseRequest::Health => self.phase_health().await,
            PhaseRequest::Scan { sequence } => self.phase_scan(sequence).await,
            PhaseRequest::Target(sub) => self.phase_target(*sub).await,
        };
        self.watchdog.disarm();
        if self.state.is_busy() {
            self.state.finish();
        }

        let outcome = PhaseOutcome::from(result);
        phase!("{phase_request} ended: {outcome}");
        match &outcome {
            PhaseOutcome::Completed | PhaseOutcome::Cancelled => {
                self.send_message(format!("{phase_request}: {outcome}"));
            }
            PhaseOutcome::TimedOut | PhaseOutcome::Aborted(_) => {
                self.send_error(format!("{phase_request}: {outcome}"));
                if phase_request.phase() != Phase::First {
                    if let Err(e) = self.supervisor.send(SubsystemId::Adcs, Command::StopWheel, true) {
                        self.send_error(format!("Could not stop the reaction wheel: {e}"));
                    }
                }
            }
        }
        self.last_outcome = Some(outcome);
    }

    /// One choreography check: serves ground interrupts, then fails if the phase was
    /// cancelled or its watchdog expired.
    pub(super) fn checkpoint(&mut self) -> Result<(), PhaseError> {
        self.route_telemetry();
        self.service_interrupts();
        if self.watchdog.expired() {
            self.state.force_clear();
            return Err(PhaseError::TimedOut);
        }
        if !self.state.is_busy() {
            return Err(PhaseError::Cancelled);
        }
        Ok(())
    }

    /// Waits one poll interval for an unsolicited envelope from `id`.
    pub(super) async fn next_event(&mut self, id: SubsystemId) -> Result<Option<Event>, PhaseError> {
        self.checkpoint()?;
        match self.supervisor.receive(id, Some(self.config.poll_interval)).await {
            Ok(response) => match Event::try_from(&response) {
                Ok(event) => Ok(Some(event)),
                Err(e) => {
                    warn!("Unexpected envelope from {id}: {e}");
                    Ok(None)
                }
            },
            Err(SupervisorError::Timeout(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Synchronous request inside a choreography.
    pub(super) async fn reply(&mut self, id: SubsystemId, command: Command) -> Result<Response, PhaseError> {
        self.checkpoint()?;
        Ok(self.request(id, command).await?)
    }

    /// Sends `command` and waits for its reply. Ground commands the link forwards in the
    /// meantime are set aside, not mistaken for the reply. Late replies to earlier requests
    /// are dropped first so they cannot pair with this one.
    pub(super) async fn request(
        &mut self,
        id: SubsystemId,
        command: Command,
    ) -> Result<Response, SupervisorError> {
        self.drain(id);
        if id != SubsystemId::Ttc {
            return request(&mut self.supervisor, id, command, Some(self.config.reply_timeout)).await;
        }
        self.supervisor.send(id, command, true)?;
        loop {
            let response = self.supervisor.receive(id, Some(self.config.reply_timeout)).await?;
            match Event::try_from(&response) {
                Ok(Event::GroundCommand { line }) => self.intercept(&line),
                _ => return Ok(response),
            }
        }
    }

    /// Sleeps `duration` while still serving interrupts.
    pub(super) async fn idle(&mut self, duration: std::time::Duration) -> Result<(), PhaseError> {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            self.checkpoint()?;
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(());
            }
            tokio::time::sleep((deadline - now).min(self.config.poll_interval)).await;
        }
    }

    fn service_interrupts(&mut self) {
        if self.ground_link_lost {
            return;
        }
        loop {
            let waiting = self
                .supervisor
                .poll(SubsystemId::Ttc)
                .and_then(|_| self.supervisor.try_receive(SubsystemId::Ttc));
            match waiting {
                Ok(Some(response)) => {
                    if let Some(line) = Self::ground_line(&response) {
                        self.interrupt(&line);
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    error!("Ground link unavailable: {e}");
                    self.ground_link_lost = true;
                    return;
                }
            }
        }
    }

    fn intercept(&mut self, line: &str) {
        if self.state.is_busy() {
            self.interrupt(line);
            return;
        }
        match line.parse::<GroundCommand>() {
            Ok(command) => self.deferred.push_back(command),
            Err(e) => self.send_error(e.to_string()),
        }
    }

    /// Ground command received while a phase runs.
    fn interrupt(&mut self, line: &str) {
        match line.parse::<GroundCommand>() {
            Ok(GroundCommand::CancelPhase) => self.cancel_phase(),
            Ok(GroundCommand::Shutdown) => {
                self.shutdown_requested = true;
                self.cancel_phase();
            }
            Ok(GroundCommand::StartPhase(_)) => {
                self.send_error(format!("Busy with {}, cancel it first", self.state.label()));
            }
            Ok(GroundCommand::Ping | GroundCommand::GetFile(_) | GroundCommand::GetFolder(_)) => {}
            Ok(command) => {
                info!("Deferring {line} until {} ends", self.state.label());
                self.send_message(format!("Busy with {}, {line} queued", self.state.label()));
                self.deferred.push_back(command);
            }
            Err(e) => self.send_error(e.to_string()),
        }
    }

    fn cancel_phase(&mut self) {
        let label = self.state.label();
        if self.state.cancel() {
            phase!("Cancelling {label}");
        } else {
            self.send_message("No phase running".to_string());
        }
    }

    /// Discards unsolicited envelopes left over from an earlier choreography.
    /// Empties the channel of `id`. Ground commands still waiting on the TTC channel are served.
    fn drain(&mut self, id: SubsystemId) {
        while let Ok(Some(stale)) = self.supervisor.try_receive(id) {
            match Event::try_from(&stale) {
                Ok(Event::GroundCommand { line }) if id == SubsystemId::Ttc => self.intercept(&line),
                _ => event!("Dropping stale envelope from {id}: {:?}", stale.raw()),
            }
        }
    }

    fn route_telemetry(&mut self) {
        while let Ok(sample) = self.telemetry.try_recv() {
            self.send_ground(Command::SendData(sample));
        }
    }

    pub(super) fn send_message(&mut self, message: String) {
        self.send_ground(Command::SendMessage { message });
    }

    pub(super) fn send_error(&mut self, message: String) {
        warn!("{message}");
        self.send_ground(Command::SendError { message });
    }

    pub(super) fn send_data(&mut self, label: &str, value: Value) {
        self.send_ground(Command::SendData(TelemetrySample {
            subsystem: "OBDH".to_string(),
            label: label.to_string(),
            value,
            timestamp: Utc::now(),
        }));
    }

    pub(super) fn send_ground(&mut self, command: Command) {
        if self.ground_link_lost {
            return;
        }
        if let Err(e) = self.supervisor.send(SubsystemId::Ttc, command, false) {
            error!("Ground link unavailable: {e}");
            self.ground_link_lost = true;
        }
    }
}
