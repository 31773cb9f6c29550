//! Services - dashboard state and operator actions
//!
//! - `ingest` - bounded most-recent-first buffer of tag reads
//! - `run_state` - Idle/Running tracker
//! - `dashboard` - the event fold and published snapshots
//! - `control` - validated start/stop against the engine
//! - `console` - wiring used by the front ends

pub mod console;
pub mod control;
pub mod dashboard;
pub mod ingest;
pub mod run_state;

// Re-export commonly used types
pub use console::Console;
pub use control::{ControlError, ControlFacade, StartOutcome};
pub use dashboard::{Dashboard, DashboardEvent, Snapshot};
pub use ingest::{ArrivalSignal, IngestionBuffer, DISPLAY_CAPACITY};
pub use run_state::{RunInput, RunStateTracker};
