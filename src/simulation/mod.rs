//! Stand-ins for the flight hardware so the on-board software runs on a workstation.

mod plant;
mod scene;

pub(crate) use plant::SimulatedPlant;
pub(crate) use scene::{Board, SimulatedScene, Target};
#[cfg(test)]
mod tests;
