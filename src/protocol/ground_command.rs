use super::command::{NumberId, WheelTest};
use crate::mission::{Phase, SubPhase};
use crate::subsystems::SubsystemId;
use std::path::PathBuf;
use std::str::FromStr;

/// Operator errors. Their text is sent back to ground verbatim after an `[ERROR]` tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroundCommandError {
    #[error("Empty command!")]
    Empty,
    #[error("{0} is not a valid command!")]
    UnknownCommand(String),
    #[error("No file path provided!")]
    NoPath,
    #[error("No phase provided!")]
    NoPhase,
    #[error("{0} is not a valid phase!")]
    InvalidPhase(String),
    #[error("No sequence provided!")]
    NoSequence,
    #[error("{0} is not a valid number!")]
    InvalidNumber(String),
    #[error("No subphase provided!")]
    NoSubphase,
    #[error("{0} is not a valid subphase!")]
    InvalidSubphase(String),
    #[error("No subsystem provided!")]
    NoSubsystem,
    #[error("{0} is not a valid subsystem!")]
    InvalidSubsystem(String),
    #[error("Usage: test_wheel <kp> <ki> <kd> <t> <degree>")]
    TestWheelUsage,
}

/// What `start_phase` asked for, arguments already validated.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseRequest {
    Health,
    Scan { sequence: Vec<NumberId> },
    Target(SubPhase),
}

impl PhaseRequest {
    pub fn phase(&self) -> Phase {
        match self {
            PhaseRequest::Health => Phase::First,
            PhaseRequest::Scan { .. } => Phase::Second,
            PhaseRequest::Target(_) => Phase::Third,
        }
    }

    pub fn subphase(&self) -> Option<SubPhase> {
        match self {
            PhaseRequest::Target(sub) => Some(*sub),
            _ => None,
        }
    }
}

impl std::fmt::Display for PhaseRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.subphase() {
            Some(sub) => write!(f, "phase {} subphase {sub}", self.phase().number()),
            None => write!(f, "phase {}", self.phase().number()),
        }
    }
}

/// A whitespace-tokenised command line from the ground station.
#[derive(Debug, Clone, PartialEq)]
pub enum GroundCommand {
    Ping,
    GetFile(PathBuf),
    GetFolder(PathBuf),
    StartPhase(PhaseRequest),
    CancelPhase,
    TestWheel(WheelTest),
    StopWheel,
    CalibrateSunSensors,
    HealthCheck,
    Restart(SubsystemId),
    Shutdown,
}

impl FromStr for GroundCommand {
    type Err = GroundCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let command = tokens.next().ok_or(GroundCommandError::Empty)?;
        let rest: Vec<&str> = tokens.collect();
        match command {
            "ping" => Ok(GroundCommand::Ping),
            "get_file" => Ok(GroundCommand::GetFile(Self::path(&rest)?)),
            "get_folder" => Ok(GroundCommand::GetFolder(Self::path(&rest)?)),
            "start_phase" => Self::phase_request(&rest).map(GroundCommand::StartPhase),
            "cancel_phase" => Ok(GroundCommand::CancelPhase),
            "test_wheel" => Self::wheel_test(&rest).map(GroundCommand::TestWheel),
            "stop_wheel" => Ok(GroundCommand::StopWheel),
            "calibrate_sun_sensors" => Ok(GroundCommand::CalibrateSunSensors),
            "health_check" => Ok(GroundCommand::HealthCheck),
            "restart" => {
                let name = rest.first().ok_or(GroundCommandError::NoSubsystem)?;
                SubsystemId::from_str(name)
                    .map(GroundCommand::Restart)
                    .map_err(|_| GroundCommandError::InvalidSubsystem((*name).to_string()))
            }
            "shutdown" => Ok(GroundCommand::Shutdown),
            other => Err(GroundCommandError::UnknownCommand(other.to_string())),
        }
    }
}

impl GroundCommand {
    /// Whether the command is served by the ground link itself instead of being forwarded.
    pub fn is_local(&self) -> bool {
        matches!(self, GroundCommand::Ping | GroundCommand::GetFile(_) | GroundCommand::GetFolder(_))
    }

    fn path(rest: &[&str]) -> Result<PathBuf, GroundCommandError> {
        rest.first().map(PathBuf::from).ok_or(GroundCommandError::NoPath)
    }

    fn phase_request(rest: &[&str]) -> Result<PhaseRequest, GroundCommandError> {
        let (phase, rest) = rest.split_first().ok_or(GroundCommandError::NoPhase)?;
        match phase.parse::<u8>() {
            Ok(1) => Ok(PhaseRequest::Health),
            Ok(2) => {
                // accepts "14 15", "14,15" and any mix of both
                let sequence = rest
                    .iter()
                    .flat_map(|t| t.split(','))
                    .filter(|t| !t.is_empty())
                    .map(|t| t.parse().map_err(|_| GroundCommandError::InvalidNumber(t.to_string())))
                    .collect::<Result<Vec<NumberId>, _>>()?;
                if sequence.is_empty() {
                    return Err(GroundCommandError::NoSequence);
                }
                Ok(PhaseRequest::Scan { sequence })
            }
            Ok(3) => {
                let sub = rest.first().ok_or(GroundCommandError::NoSubphase)?;
                SubPhase::from_str(sub)
                    .map(PhaseRequest::Target)
                    .map_err(|_| GroundCommandError::InvalidSubphase((*sub).to_string()))
            }
            _ => Err(GroundCommandError::InvalidPhase((*phase).to_string())),
        }
    }

    fn wheel_test(rest: &[&str]) -> Result<WheelTest, GroundCommandError> {
        let values = rest
            .iter()
            .map(|t| t.parse::<f64>().map_err(|_| GroundCommandError::TestWheelUsage))
            .collect::<Result<Vec<f64>, _>>()?;
        let &[kp, ki, kd, duration, degree] = values.as_slice() else {
            return Err(GroundCommandError::TestWheelUsage);
        };
        Ok(WheelTest { kp, ki, kd, duration, degree })
    }
}
