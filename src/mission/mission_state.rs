use super::MissionError;
use chrono::{DateTime, TimeDelta, Utc};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ObdhState {
    Initialising,
    Ready,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum Phase {
    #[strum(serialize = "FIRST")]
    First,
    #[strum(serialize = "SECOND")]
    Second,
    #[strum(serialize = "THIRD")]
    Third,
}

impl Phase {
    pub fn number(self) -> u8 {
        match self {
            Phase::First => 1,
            Phase::Second => 2,
            Phase::Third => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SubPhase {
    /// Search the target and measure the approach speed.
    A,
    /// Reacquire the target, read its id and measure its spin.
    B,
    /// Reacquire the target and close in until docked.
    C,
}

/// The single mission state owned by the orchestrator.
///
/// `state == Busy` holds exactly when a phase is set; every transition below keeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionState {
    state: ObdhState,
    phase: Option<Phase>,
    subphase: Option<SubPhase>,
    started: Option<DateTime<Utc>>,
}

impl Default for MissionState {
    fn default() -> Self { Self::new() }
}

impl MissionState {
    pub fn new() -> Self {
        Self { state: ObdhState::Initialising, phase: None, subphase: None, started: None }
    }

    pub fn state(&self) -> ObdhState { self.state }
    pub fn phase(&self) -> Option<Phase> { self.phase }
    pub fn subphase(&self) -> Option<SubPhase> { self.subphase }
    pub fn started(&self) -> Option<DateTime<Utc>> { self.started }
    pub fn is_busy(&self) -> bool { self.state == ObdhState::Busy }

    pub fn elapsed(&self) -> Option<TimeDelta> { self.started.map(|t| Utc::now() - t) }

    pub fn mark_ready(&mut self) {
        if self.state == ObdhState::Initialising {
            self.state = ObdhState::Ready;
        }
    }

    pub fn begin(&mut self, phase: Phase, subphase: Option<SubPhase>) -> Result<(), MissionError> {
        match self.state {
            ObdhState::Initialising => Err(MissionError::NotReady),
            ObdhState::Busy => Err(MissionError::Busy(self.label())),
            ObdhState::Ready => {
                self.state = ObdhState::Busy;
                self.phase = Some(phase);
                self.subphase = subphase;
                self.started = Some(Utc::now());
                Ok(())
            }
        }
    }

    /// Normal end of the running phase.
    pub fn finish(&mut self) { self.clear(); }

    /// Clears the running phase, `false` if there was none.
    pub fn cancel(&mut self) -> bool {
        if !self.is_busy() {
            return false;
        }
        self.clear();
        true
    }

    /// Watchdog path: clears whatever runs, even if the phase already ended.
    pub fn force_clear(&mut self) {
        if self.state != ObdhState::Initialising {
            self.clear();
        }
    }

    fn clear(&mut self) {
        if self.state == ObdhState::Busy {
            self.state = ObdhState::Ready;
        }
        self.phase = None;
        self.subphase = None;
        self.started = None;
    }

    /// Human readable name of the running phase, e.g. `phase 3 subphase b`.
    pub fn label(&self) -> String {
        match (self.phase, self.subphase) {
            (Some(phase), Some(sub)) => format!("phase {} subphase {sub}", phase.number()),
            (Some(phase), None) => format!("phase {}", phase.number()),
            _ => "no phase".to_string(),
        }
    }

    pub fn holds_invariant(&self) -> bool { self.is_busy() == self.phase.is_some() }
}
