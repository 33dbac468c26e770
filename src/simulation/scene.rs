use super::plant::SimulatedPlant;
use crate::common::math::{angle_delta, wrap_degrees};
use crate::payload::{Camera, Frame, NumberRecognizer, RangeSensor, TagDetector, TagPose};
use crate::protocol::NumberId;
use chrono::Utc;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;

const RANGE_NOISE_CM: f64 = 0.5;

/// A number board placed around the spacecraft.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Board {
    pub yaw: f64,
    pub distance_cm: f64,
}

/// The AprilTag-marked docking target. It spins around the line of sight and closes in at
/// a constant speed until it reaches `min_distance_cm`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub id: u32,
    pub yaw: f64,
    pub initial_distance_cm: f64,
    pub min_distance_cm: f64,
    pub closing_speed_cm_s: f64,
    pub spin_rate_deg_s: f64,
}

/// What the payload sees from the simulated spacecraft.
#[derive(Debug, Clone)]
pub struct SimulatedScene {
    plant: SimulatedPlant,
    boards: Arc<BTreeMap<NumberId, Board>>,
    target: Target,
    field_of_view: f64,
    epoch: Instant,
}

impl SimulatedScene {
    pub fn new(plant: SimulatedPlant, boards: BTreeMap<NumberId, Board>, target: Target) -> Self {
        Self { plant, boards: Arc::new(boards), target, field_of_view: 40.0, epoch: Instant::now() }
    }

    /// Four boards spread around the turn and one target.
    pub fn default_range(plant: SimulatedPlant) -> Self {
        let boards = [(14, 60.0, 80.0), (15, 150.0, 120.0), (27, 240.0, 95.0), (33, 320.0, 60.0)]
            .into_iter()
            .map(|(id, yaw, distance_cm)| (id, Board { yaw, distance_cm }))
            .collect();
        let target = Target {
            id: 7,
            yaw: 200.0,
            initial_distance_cm: 150.0,
            min_distance_cm: 5.0,
            closing_speed_cm_s: 3.0,
            spin_rate_deg_s: 12.0,
        };
        Self::new(plant, boards, target)
    }

    fn in_view(&self, heading: f64, yaw: f64) -> bool {
        angle_delta(heading, yaw).abs() <= self.field_of_view / 2.0
    }

    fn elapsed(&self) -> f64 { self.epoch.elapsed().as_secs_f64() }

    fn target_distance(&self) -> f64 {
        let t = &self.target;
        (t.initial_distance_cm - t.closing_speed_cm_s * self.elapsed()).max(t.min_distance_cm)
    }

    fn noisy(value: f64, amplitude: f64) -> f64 {
        value + rand::rng().random_range(-amplitude..=amplitude)
    }
}

impl Camera for SimulatedScene {
    fn capture(&self) -> Option<Frame> {
        Some(Frame { taken_at: Utc::now(), heading: self.plant.true_yaw(), data: Vec::new() })
    }
}

impl NumberRecognizer for SimulatedScene {
    fn recognize(&self, frame: &Frame) -> Vec<NumberId> {
        self.boards
            .iter()
            .filter(|(_, board)| self.in_view(frame.heading, board.yaw))
            .map(|(id, _)| *id)
            .collect()
    }
}

impl TagDetector for SimulatedScene {
    fn detect(&self, frame: &Frame) -> Option<TagPose> {
        if !self.in_view(frame.heading, self.target.yaw) {
            return None;
        }
        Some(TagPose {
            id: self.target.id,
            bearing: angle_delta(frame.heading, self.target.yaw),
            distance: self.target_distance(),
            roll: wrap_degrees(self.target.spin_rate_deg_s * self.elapsed()),
        })
    }
}

impl RangeSensor for SimulatedScene {
    fn distance_cm(&self) -> Option<f64> {
        let heading = self.plant.true_yaw();
        let ahead = if self.in_view(heading, self.target.yaw) {
            Some(self.target_distance())
        } else {
            self.boards.values().find(|b| self.in_view(heading, b.yaw)).map(|b| b.distance_cm)
        };
        ahead.map(|d| Self::noisy(d, RANGE_NOISE_CM))
    }
}
