//! Ground link: the TCP endpoint towards the ground station and the TTC subsystem on top of
//! it.

mod file_transfer;
mod ground_endpoint;
mod ground_messages;
mod ttc;
#[cfg(test)]
mod tests;

pub(crate) use ttc::TtcProcess;

#[cfg(test)]
pub(crate) use ground_messages::{Downstream, DownstreamContent};
