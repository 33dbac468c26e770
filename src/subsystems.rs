//! Subsystem identities and the registry of process bodies the supervisor can start.

use crate::attitude::{ActuatorConfig, AdcsProcess};
use crate::config::MissionConfig;
use crate::ground_link::TtcProcess;
use crate::ipc::{Message, SubsystemError, SubsystemLink, SubsystemProcess};
use crate::payload::PayloadProcess;
use crate::protocol::{Command, HealthReport};
use crate::simulation::{SimulatedPlant, SimulatedScene};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum SubsystemId {
    #[strum(serialize = "TTC")]
    Ttc,
    #[strum(serialize = "ADCS")]
    Adcs,
    #[strum(serialize = "Payload")]
    Payload,
    #[strum(serialize = "Dummy")]
    Dummy,
}

impl SubsystemId {
    /// Subsystems whose readiness handshake gates the transition to READY.
    pub const REQUIRED: [SubsystemId; 3] = [SubsystemId::Ttc, SubsystemId::Adcs, SubsystemId::Payload];

    /// Whether the subsystem answers `is_ready` or pushes its readiness by itself.
    pub fn answers_is_ready(self) -> bool { self != SubsystemId::Ttc }
}

type ProcessFactory = Box<dyn Fn() -> Box<dyn SubsystemProcess> + Send + Sync>;

/// Process bodies by identity. The catalogue is fixed once the supervisor owns it.
#[derive(Default)]
pub struct SubsystemRegistry {
    factories: HashMap<SubsystemId, ProcessFactory>,
}

impl SubsystemRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn register<F>(&mut self, id: SubsystemId, factory: F)
    where F: Fn() -> Box<dyn SubsystemProcess> + Send + Sync + 'static {
        self.factories.insert(id, Box::new(factory));
    }

    pub fn instantiate(&self, id: SubsystemId) -> Option<Box<dyn SubsystemProcess>> {
        self.factories.get(&id).map(|f| f())
    }

    /// The flight catalogue, wired to the simulated hardware.
    pub fn flight(config: &MissionConfig) -> Self {
        let plant = SimulatedPlant::new();
        let scene = SimulatedScene::default_range(plant.clone());
        let actuator = ActuatorConfig::default();
        let ground_addr = config.ground_addr.clone();

        let mut registry = Self::new();
        registry.register(SubsystemId::Ttc, move || Box::new(TtcProcess::new(ground_addr.clone())));
        let adcs_plant = Arc::new(plant);
        registry.register(SubsystemId::Adcs, move || {
            Box::new(AdcsProcess::new(
                adcs_plant.clone(),
                adcs_plant.clone(),
                adcs_plant.clone(),
                actuator.clone(),
            ))
        });
        let scene = Arc::new(scene);
        registry.register(SubsystemId::Payload, move || Box::new(PayloadProcess::new(scene.clone())));
        registry.register(SubsystemId::Dummy, || Box::new(DummyProcess));
        registry
    }
}

/// Bring-up subsystem: always ready, echoes whatever it is asked.
pub struct DummyProcess;

#[async_trait]
impl SubsystemProcess for DummyProcess {
    async fn run(self: Box<Self>, mut link: SubsystemLink) -> Result<(), SubsystemError> {
        link.logger.log("Dummy subsystem running");
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
                Command::IsReady => link.channel.send(Message::bare(true))?,
                Command::Echo { text } => {
                    link.channel.send(Message::bare(text.unwrap_or_else(|| "echo".to_string())))?;
                }
                Command::HealthCheck => {
                    let mut report = HealthReport::new();
                    report.component("Echo", json!("OK"));
                    link.channel.send(report.into_message())?;
                }
                Command::Stop => break,
                other => link.logger.log(format!("[ERROR] {} is not supported", other.as_ref())),
            }
        }
        link.logger.log("Dummy subsystem stopped");
        Ok(())
    }
}
