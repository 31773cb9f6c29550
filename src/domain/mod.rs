//! Domain models - tag reads, payloads and simulation settings
//!
//! - `TagRead` - one observed tag event
//! - `Payload` - one inbound stream message (reads + verbatim body)
//! - `RunState` - Idle/Running lifecycle of the simulation
//! - `SourceConfig` / `SimulationParams` - pending start configuration

pub mod payload;
pub mod types;

pub use payload::{Payload, PayloadError};
pub use types::{RunState, SimulationParams, SourceConfig, TagRead, TimeStamp};
