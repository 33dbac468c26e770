use crate::ipc::Liveness;
use crate::protocol::{ComponentHealth, HealthReport, HealthStatus};
use crate::subsystems::SubsystemId;
use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::path::{Path, PathBuf};

const POWER: [&str; 2] = ["BMS Voltage", "BMS Current"];
const THERMAL: [&str; 1] = ["BMS Temperature"];

/// Command-handling view of one subsystem at report time.
#[derive(Debug, Clone)]
pub(super) struct CommandLink {
    pub id: SubsystemId,
    pub liveness: Option<Liveness>,
    pub last_command: Option<DateTime<Utc>>,
}

/// The phase-1 artifact: every subsystem's health sorted into report sections.
#[derive(Debug, Clone)]
pub(super) struct HealthArtifact {
    generated: DateTime<Utc>,
    reports: Vec<(SubsystemId, Option<HealthReport>)>,
    links: Vec<CommandLink>,
}

impl HealthArtifact {
    pub(super) fn new(reports: Vec<(SubsystemId, Option<HealthReport>)>, links: Vec<CommandLink>) -> Self {
        Self { generated: Utc::now(), reports, links }
    }

    fn components(&self, id: SubsystemId) -> impl Iterator<Item = &ComponentHealth> {
        self.reports
            .iter()
            .filter(move |(sub, _)| *sub == id)
            .filter_map(|(_, report)| report.as_ref())
            .flat_map(|report| report.components.iter())
    }

    /// Worst status over all reports; a subsystem that did not answer degrades it.
    pub(super) fn overall(&self) -> HealthStatus {
        self.reports
            .iter()
            .map(|(_, report)| report.as_ref().map_or(HealthStatus::Degraded, HealthReport::status))
            .max()
            .unwrap_or(HealthStatus::Ok)
    }

    pub(super) fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "VECTOR HEALTH REPORT - {}", self.generated.format("%Y-%m-%d %H:%M:%S UTC"));
        let adcs: Vec<&ComponentHealth> = self.components(SubsystemId::Adcs).collect();

        section(&mut out, "POWER", adcs.iter().filter(|c| POWER.contains(&c.name.as_str())).map(|c| c.line()));
        section(&mut out, "THERMAL", adcs.iter().filter(|c| THERMAL.contains(&c.name.as_str())).map(|c| c.line()));
        section(&mut out, "COMMUNICATION", self.subsystem_lines(SubsystemId::Ttc));
        section(
            &mut out,
            "ATTITUDE",
            adcs.iter()
                .filter(|c| !POWER.contains(&c.name.as_str()) && !THERMAL.contains(&c.name.as_str()))
                .map(|c| c.line()),
        );
        section(&mut out, "PAYLOAD", self.subsystem_lines(SubsystemId::Payload));
        section(
            &mut out,
            "COMMAND HANDLING",
            self.links.iter().map(|link| {
                let liveness = link.liveness.map_or_else(|| "NOT STARTED".to_string(), |l| l.to_string());
                let last = link.last_command.map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
                format!("{}: {liveness}, last command {last}", link.id)
            }),
        );
        section(&mut out, "ERROR LOG", self.errors());
        let _ = writeln!(out, "\nOVERALL STATUS\n{}", self.overall());
        out
    }

    fn subsystem_lines(&self, id: SubsystemId) -> Vec<String> {
        if self.reports.iter().any(|(sub, report)| *sub == id && report.is_none()) {
            return vec!["No response".to_string()];
        }
        self.components(id).map(ComponentHealth::line).collect()
    }

    fn errors(&self) -> Vec<String> {
        self.reports
            .iter()
            .flat_map(|(id, report)| match report {
                None => vec![format!("{id}: no health response")],
                Some(report) => report
                    .components
                    .iter()
                    .filter(|c| c.status != HealthStatus::Ok)
                    .map(|c| format!("{id}: {}", c.line()))
                    .collect(),
            })
            .collect()
    }

    /// Writes the rendered report below `dir` and returns its path.
    pub(super) async fn write(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("health_report_{}.txt", self.generated.format("%Y%m%d_%H%M%S")));
        tokio::fs::write(&path, self.render()).await?;
        Ok(path)
    }
}

fn section(out: &mut String, title: &str, lines: impl IntoIterator<Item = String>) {
    let _ = writeln!(out, "\n{title}");
    let mut empty = true;
    for line in lines {
        empty = false;
        let _ = writeln!(out, "  {line}");
    }
    if empty {
        let _ = writeln!(out, "  Not available");
    }
}
