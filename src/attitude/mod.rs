//! Attitude determination and control: the reaction wheel PID loop and the ADCS subsystem
//! driving it.

mod actuator;
mod adcs;
mod calibration;
mod hardware;
mod pid;
#[cfg(test)]
mod tests;

pub(crate) use actuator::{
    Actuator, ActuatorConfig, ActuatorExit, ActuatorMode, ActuatorState, OnTarget, Setpoint,
};
pub(crate) use adcs::{AdcsProcess, AdcsTiming};
pub(crate) use calibration::{SunSample, sun_offset};
pub(crate) use hardware::{AttitudeSensor, ImuReading, SunSensorArray, WheelDriver};
pub(crate) use pid::{Pid, PidGains};
