//! WaveSense deterministic simulation harness.
//!
//! Synthesizes radar byte streams from a scripted ground-truth world,
//! drives the full pipeline on a virtual clock, and checks scenario
//! oracles. Every run is reproducible from its seed: noise comes from a
//! seeded ChaCha stream and time from a manually advanced clock.

pub mod exporter;
pub mod runner;
pub mod scenarios;
pub mod world;

pub use exporter::{SimExport, SimFrameRecord};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use world::{TargetScript, World};
