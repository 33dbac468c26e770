use super::PhaseError;
use super::health_report::{CommandLink, HealthArtifact};
use super::orchestrator::Orchestrator;
use crate::phase;
use crate::protocol::{Command, HealthReport};
use crate::subsystems::SubsystemId;
use strum::IntoEnumIterator;

impl Orchestrator {
    /// Health reply of `id`, `None` if it did not answer or answered something else.
    pub(super) async fn health_of(&mut self, id: SubsystemId) -> Option<HealthReport> {
        match self.request(id, Command::HealthCheck).await {
            Ok(response) => HealthReport::from_response(&response),
            Err(e) => {
                crate::warn!("No health response from {id}: {e}");
                None
            }
        }
    }

    /// Phase 1: collect every subsystem's health, write the artifact, downlink it.
    pub(super) async fn phase_health(&mut self) -> Result<(), PhaseError> {
        let mut reports = Vec::new();
        for id in self.supervisor.running() {
            self.checkpoint()?;
            phase!("Requesting health from {id}");
            let report = self.health_of(id).await;
            reports.push((id, report));
        }
        self.checkpoint()?;

        let links = SubsystemId::iter()
            .map(|id| CommandLink {
                id,
                liveness: self.supervisor.liveness(id),
                last_command: self.supervisor.last_command(id),
            })
            .collect();
        let artifact = HealthArtifact::new(reports, links);
        let path = artifact.write(&self.config.report_dir).await?;
        phase!("Health report written to {}, overall {}", path.display(), artifact.overall());

        self.send_message(format!("Health status: {}", artifact.overall()));
        self.send_ground(Command::SendFile { path: path.to_string_lossy().into_owned() });
        Ok(())
    }
}
