//! Payload subsystem: imaging, number recognition, AprilTag detection and ranging.

mod payload_controller;
mod sensors;
#[cfg(test)]
mod tests;

pub(crate) use payload_controller::PayloadProcess;
pub(crate) use sensors::{
    Camera, Frame, NumberRecognizer, PayloadSensors, RangeSensor, TagDetector, TagPose,
};
