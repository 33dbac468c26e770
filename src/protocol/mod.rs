//! The command/response contract spoken over subsystem channels, plus the ground-station
//! command language.
//!
//! Envelopes are converted to the closed [`Command`] and [`Event`] enums at the channel
//! boundary. There is no schema version on the wire; both ends are built from this module.

mod args;
mod command;
mod event;
mod ground_command;
mod health;
mod request;
#[cfg(test)]
mod tests;

pub(crate) use args::{number_id, numbers_from_map, numbers_to_value};
pub(crate) use command::{Command, NumberId, ProtocolError, WheelTest};
pub(crate) use event::Event;
pub(crate) use ground_command::{GroundCommand, GroundCommandError, PhaseRequest};
pub(crate) use health::{ComponentHealth, HealthReport, HealthStatus};
pub(crate) use request::{await_ready, request};
