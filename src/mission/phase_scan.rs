use super::PhaseError;
use super::orchestrator::Orchestrator;
use crate::ipc::Response;
use crate::protocol::{Command, Event, NumberId, ProtocolError, numbers_from_map};
use crate::subsystems::SubsystemId;
use crate::{phase, warn};
use itertools::Itertools;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// One row of the phase-2 results table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ScanRow {
    pub number: NumberId,
    /// Yaw the number was first seen at during the scan.
    pub angle_degree: f64,
    pub distance_cm: Option<f64>,
    /// Deviation between the requested and the reached yaw.
    pub angle_variation: Option<f64>,
}

pub(crate) fn results_table(
    order: &[NumberId],
    numbers: &BTreeMap<NumberId, f64>,
    distances: &BTreeMap<NumberId, Option<f64>>,
    angle_deltas: &BTreeMap<NumberId, f64>,
) -> Vec<ScanRow> {
    order
        .iter()
        .filter_map(|number| {
            Some(ScanRow {
                number: *number,
                angle_degree: *numbers.get(number)?,
                distance_cm: distances.get(number).copied().flatten(),
                angle_variation: angle_deltas.get(number).copied(),
            })
        })
        .collect()
}

fn numbers_reply(response: &Response) -> Result<BTreeMap<NumberId, f64>, ProtocolError> {
    match response.raw() {
        Value::Object(map) => numbers_from_map(&map),
        _ => None,
    }
    .ok_or_else(|| ProtocolError::UnexpectedReply { expected: "number map", got: response.raw() })
}

impl Orchestrator {
    /// Phase 2: scan a full turn for number boards, then visit the requested ones in order
    /// and range each of them.
    pub(super) async fn phase_scan(&mut self, sequence: &[NumberId]) -> Result<(), PhaseError> {
        self.supervisor.send(SubsystemId::Adcs, Command::Phase2Rotate, true)?;
        loop {
            match self.next_event(SubsystemId::Adcs).await? {
                Some(Event::TakePicture { current_yaw }) => {
                    phase!("Taking picture at {current_yaw:.1} deg");
                    let ack = self.reply(SubsystemId::Payload, Command::TakePicture { current_yaw }).await?;
                    if ack.as_bool() != Some(true) {
                        warn!("Payload could not take a picture at {current_yaw:.1} deg");
                    }
                }
                Some(Event::RotationComplete) => break,
                Some(other) => warn!("Ignoring {} during the scan", other.as_ref()),
                None => {}
            }
        }

        let found = numbers_reply(&self.reply(SubsystemId::Payload, Command::GetNumbers).await?)?;
        phase!("Numbers found: {found:?}");
        let order: Vec<NumberId> = sequence.iter().copied().filter(|n| found.contains_key(n)).collect();
        let missing = sequence.iter().filter(|n| !found.contains_key(*n)).join(", ");
        if !missing.is_empty() {
            self.send_message(format!("Numbers not found during scan: {missing}"));
        }
        if order.is_empty() {
            return Err(PhaseError::Aborted("none of the requested numbers were found".to_string()));
        }

        let command = Command::Phase2Sequence { order: order.clone(), numbers: found.clone() };
        self.supervisor.send(SubsystemId::Adcs, command, true)?;
        let mut distances = BTreeMap::new();
        let mut rotation_done = false;
        let angle_deltas = loop {
            match self.next_event(SubsystemId::Adcs).await? {
                Some(Event::TakeDistance { number, current_yaw }) => {
                    let reply = self.reply(SubsystemId::Payload, Command::TakeDistance).await?;
                    let distance = reply.raw().as_f64();
                    phase!("Number {number} at {current_yaw:.1} deg: {distance:?} cm");
                    distances.insert(number, distance);
                }
                Some(Event::SequenceRotationComplete) => rotation_done = true,
                Some(Event::Phase2SequenceResponse { angle_deltas }) => {
                    if !rotation_done {
                        warn!("Sequence report arrived before the rotation completed");
                    }
                    break angle_deltas;
                }
                Some(other) => warn!("Ignoring {} during the sequence", other.as_ref()),
                None => {}
            }
        };

        let rows = results_table(&order, &found, &distances, &angle_deltas);
        let lines = rows
            .iter()
            .map(|row| {
                format!(
                    "{}: {:.1} deg, {} cm, variation {}",
                    row.number,
                    row.angle_degree,
                    row.distance_cm.map_or_else(|| "n/a".to_string(), |d| format!("{d:.1}")),
                    row.angle_variation.map_or_else(|| "n/a".to_string(), |d| format!("{d:.2}")),
                )
            })
            .join("\n");
        self.send_message(format!("Phase 2 results:\n{lines}"));
        self.send_data("phase2_results", json!(rows));
        Ok(())
    }
}
