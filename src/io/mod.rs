//! IO modules - external system interfaces
//!
//! - `engine` - HTTP client for the simulation engine's start/stop endpoints
//! - `stream` - WebSocket subscription to the engine's tag feed
//! - `status_server` - health, Prometheus metrics and snapshot HTTP endpoint

pub mod engine;
pub mod status_server;
pub mod stream;

// Re-export commonly used types
pub use engine::{EngineError, HttpEngine, SimulationEngine, StartRequest};
pub use stream::ConnectionManager;
