use crate::protocol::NumberId;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A captured camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub taken_at: DateTime<Utc>,
    /// Absolute heading of the optical axis at capture time, in degrees.
    pub heading: f64,
    pub data: Vec<u8>,
}

/// Pose of an AprilTag relative to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TagPose {
    pub id: u32,
    /// Signed yaw from the optical axis to the tag, in degrees.
    pub bearing: f64,
    pub distance: f64,
    /// Rotation of the tag around the optical axis, in degrees.
    pub roll: f64,
}

pub trait Camera: Send + Sync {
    fn capture(&self) -> Option<Frame>;
}

pub trait NumberRecognizer: Send + Sync {
    fn recognize(&self, frame: &Frame) -> Vec<NumberId>;
}

pub trait TagDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Option<TagPose>;
}

pub trait RangeSensor: Send + Sync {
    /// Distance to whatever is in front of the sensor, `None` if out of range.
    fn distance_cm(&self) -> Option<f64>;
}

/// Everything the payload subsystem reads from.
pub trait PayloadSensors: Camera + NumberRecognizer + TagDetector + RangeSensor {}

impl<T: Camera + NumberRecognizer + TagDetector + RangeSensor> PayloadSensors for T {}
