//! Subsystem supervision and the message substrate underneath it.
//!
//! Every subsystem runs as its own task bound to one duplex [`channel::ChannelEnd`]. Logs and
//! telemetry of all subsystems are funneled into single ordered consumers owned by the
//! [`Supervisor`].

mod channel;
mod envelope;
mod funnel;
mod supervisor;
#[cfg(test)]
mod tests;

pub(crate) use channel::{ChannelEnd, ChannelError, ChannelSender};
pub(crate) use envelope::{Arguments, CommandEnvelope, Message, Response, args};
pub(crate) use funnel::{
    ConsoleSink, LogRecord, LogSink, SubsystemLogger, TelemetryReporter, TelemetrySample,
};
pub(crate) use supervisor::{
    Liveness, SubsystemError, SubsystemLink, SubsystemProcess, Supervisor, SupervisorError,
};

#[cfg(test)]
pub(crate) use channel::duplex;
