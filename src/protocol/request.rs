use super::command::Command;
use crate::ipc::{Response, Supervisor, SupervisorError};
use crate::subsystems::SubsystemId;
use crate::{event, info};
use std::time::Duration;

/// Sends one command and waits for the reply paired with it.
pub async fn request(
    supervisor: &mut Supervisor,
    id: SubsystemId,
    command: Command,
    timeout: Option<Duration>,
) -> Result<Response, SupervisorError> {
    debug_assert!(command.expects_reply(), "{} has no reply", command.as_ref());
    supervisor.send(id, command, true)?;
    supervisor.receive(id, timeout).await
}

/// Blocks until `id` reported readiness.
///
/// Subsystems answering `is_ready` are asked again after every `retry` without a positive
/// answer; the others are only waited for.
pub async fn await_ready(
    supervisor: &mut Supervisor,
    id: SubsystemId,
    retry: Duration,
) -> Result<(), SupervisorError> {
    info!("Waiting for {id} to be ready...");
    loop {
        if id.answers_is_ready() {
            supervisor.send(id, Command::IsReady, false)?;
        }
        match supervisor.receive(id, Some(retry)).await {
            Ok(response) if response.as_bool() == Some(true) => {
                info!("{id} is ready.");
                return Ok(());
            }
            Ok(response) => event!("{id} not ready yet: {:?}", response.raw()),
            Err(SupervisorError::Timeout(_)) => {}
            Err(e) => return Err(e),
        }
    }
}
