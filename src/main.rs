#![allow(dead_code, clippy::similar_names)]
#![warn(clippy::shadow_reuse, clippy::shadow_same, clippy::builtin_type_shadow)]
mod attitude;
mod common;
mod config;
mod ground_link;
mod ipc;
mod logger;
mod mission;
mod payload;
mod protocol;
mod simulation;
mod subsystems;

use crate::config::MissionConfig;
use crate::ipc::{ConsoleSink, Supervisor};
use crate::mission::Orchestrator;
use crate::subsystems::{SubsystemId, SubsystemRegistry};
use strum::IntoEnumIterator;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    let config = MissionConfig::from_env();
    info!("Vector on-board software starting, ground link on {}", config.ground_addr);

    let registry = SubsystemRegistry::flight(&config);
    let (mut supervisor, telemetry) = Supervisor::new(registry, Box::new(ConsoleSink));
    for id in SubsystemId::iter() {
        if let Err(e) = supervisor.start(id) {
            warn!("Could not start {id}: {e}");
        }
    }

    let mut orchestrator = Orchestrator::new(supervisor, telemetry, config);
    if let Err(e) = orchestrator.run().await {
        fatal!("Mission aborted: {e}");
    }
    info!("Vector on-board software stopped.");
}
