use super::mission_state::SubPhase;
use super::orchestrator::Orchestrator;
use super::PhaseError;
use crate::common::math::{linear_regression, unwrap_degrees};
use crate::protocol::{Command, Event};
use crate::subsystems::SubsystemId;
use crate::{phase, warn};
use serde_json::{Value, json};

/// What a sub-phase samples once the target is aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantity {
    Distance,
    Roll,
}

impl SubPhase {
    fn quantity(self) -> Quantity {
        match self {
            SubPhase::A | SubPhase::C => Quantity::Distance,
            SubPhase::B => Quantity::Roll,
        }
    }
}

/// Rate of a sampled series: approach speed in cm/s for distances, spin in deg/s for roll.
pub(crate) fn series_rate(quantity_is_roll: bool, samples: &[(f64, f64)]) -> Option<f64> {
    if quantity_is_roll {
        let angles: Vec<f64> = samples.iter().map(|s| s.1).collect();
        let points: Vec<(f64, f64)> =
            samples.iter().map(|s| s.0).zip(unwrap_degrees(&angles)).collect();
        linear_regression(&points).map(|(slope, _)| slope)
    } else {
        linear_regression(samples).map(|(slope, _)| -slope)
    }
}

impl Orchestrator {
    /// Phase 3: find or reacquire the target, align on it and sample it.
    pub(super) async fn phase_target(&mut self, sub: SubPhase) -> Result<(), PhaseError> {
        let start = match (sub, self.target_yaw) {
            (SubPhase::B | SubPhase::C, Some(target_yaw)) => Command::Phase3ReacquireTarget { target_yaw },
            (SubPhase::A, _) => Command::Phase3SearchTarget,
            (_, None) => {
                self.send_message(format!("No target yaw known for subphase {sub}, searching"));
                Command::Phase3SearchTarget
            }
        };
        self.supervisor.send(SubsystemId::Adcs, start, true)?;
        let aligned_yaw = self.acquire().await?;
        phase!("Target aligned at {aligned_yaw:.1} deg");

        let target_id = if sub == SubPhase::B {
            let id = self.reply(SubsystemId::Payload, Command::ReadTarget).await?.raw().as_u64();
            match id {
                Some(id) => self.send_message(format!("Target id: {id}")),
                None => self.send_message("Target id could not be read".to_string()),
            }
            id
        } else {
            None
        };

        let (samples, docked) = self.sample(sub).await?;
        let roll = sub.quantity() == Quantity::Roll;
        let rate = series_rate(roll, &samples);
        let (what, unit) = if roll { ("spin rate", "deg/s") } else { ("approach speed", "cm/s") };
        let summary = match rate {
            Some(rate) => format!("Phase 3{sub}: {what} {rate:.2} {unit} over {} samples", samples.len()),
            None => format!("Phase 3{sub}: not enough samples for a {what}"),
        };
        self.send_message(summary);
        self.send_data(
            &format!("phase3{sub}_series"),
            json!({
                "quantity": if roll { "roll" } else { "distance" },
                "unit": unit,
                "rate": rate,
                "target_yaw": self.target_yaw,
                "target_id": target_id,
                "docked": docked,
                "samples": samples.iter().map(|(t, v)| json!({ "t": t, "value": v })).collect::<Vec<_>>(),
            }),
        );
        self.supervisor.send(SubsystemId::Adcs, Command::StopWheel, true)?;
        Ok(())
    }

    /// Relays detections until the ADCS reports the target aligned.
    async fn acquire(&mut self) -> Result<f64, PhaseError> {
        loop {
            match self.next_event(SubsystemId::Adcs).await? {
                Some(Event::DetectAprilTag) => self.relay_detection().await?,
                Some(Event::TargetFound { target_yaw }) => {
                    phase!("Target found at {target_yaw:.1} deg, aligning");
                    self.target_yaw = Some(target_yaw);
                    self.supervisor.send(SubsystemId::Adcs, Command::Phase3AlignTarget { target_yaw }, true)?;
                }
                Some(Event::TargetAligned { current_yaw }) => {
                    self.target_yaw = Some(current_yaw);
                    return Ok(current_yaw);
                }
                Some(Event::Timeout) => return Err(PhaseError::Aborted("target not found".to_string())),
                Some(Event::TargetLost) => return Err(PhaseError::Aborted("target lost".to_string())),
                Some(other) => warn!("Ignoring {} while acquiring the target", other.as_ref()),
                None => {}
            }
        }
    }

    async fn relay_detection(&mut self) -> Result<(), PhaseError> {
        let pose = self.reply(SubsystemId::Payload, Command::DetectAprilTag).await?.raw();
        let bearing = pose.get("bearing").and_then(Value::as_f64);
        let detection = Command::AprilTagDetection { detected: bearing.is_some(), bearing };
        self.supervisor.send(SubsystemId::Adcs, detection, false)?;
        Ok(())
    }

    /// Fixed-rate samples as `(seconds, value)`. 3c samples until the docking distance is
    /// reached, the others a fixed count.
    async fn sample(&mut self, sub: SubPhase) -> Result<(Vec<(f64, f64)>, bool), PhaseError> {
        let started = tokio::time::Instant::now();
        let mut samples = Vec::new();
        loop {
            let value = match sub.quantity() {
                Quantity::Distance => self.reply(SubsystemId::Payload, Command::TakeDistance).await?.raw().as_f64(),
                Quantity::Roll => {
                    let pose = self.reply(SubsystemId::Payload, Command::DetectAprilTag).await?.raw();
                    pose.get("roll").and_then(Value::as_f64)
                }
            };
            let t = started.elapsed().as_secs_f64();
            match value {
                Some(value) => samples.push((t, value)),
                None => warn!("No sample at {t:.1}s"),
            }
            if sub == SubPhase::C {
                if value.is_some_and(|d| d <= self.config.dock_distance_cm) {
                    phase!("Docking distance reached");
                    return Ok((samples, true));
                }
            } else if samples.len() >= self.config.sample_count {
                return Ok((samples, false));
            }
            self.idle(self.config.sample_interval).await?;
        }
    }
}
