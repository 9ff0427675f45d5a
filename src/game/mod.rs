//! Game simulation modules

pub mod collision;
pub mod combatant;
pub mod engine;
pub mod items;
pub mod pacing;
pub mod snapshot;

pub use engine::{EngineSettings, SimEvent, SimulationEngine};
