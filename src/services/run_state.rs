//! Idle/Running state machine for the simulation

use crate::domain::RunState;
use crate::services::ingest::ArrivalSignal;
use tracing::info;

/// Inputs that may move the run state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunInput {
    /// The engine accepted a start request
    StartSucceeded,
    /// The engine accepted a stop request
    StopSucceeded,
    /// Reads arrived from the stream; implies Running when Idle
    Arrival(ArrivalSignal),
}

impl From<ArrivalSignal> for RunInput {
    fn from(signal: ArrivalSignal) -> Self {
        RunInput::Arrival(signal)
    }
}

#[derive(Debug, Default)]
pub struct RunStateTracker {
    state: RunState,
}

impl RunStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Apply one input; returns the new state if it changed
    pub fn apply(&mut self, input: RunInput) -> Option<RunState> {
        let next = match (self.state, input) {
            (RunState::Idle, RunInput::StartSucceeded) => RunState::Running,
            // Producer was already emitting before we observed a start
            (RunState::Idle, RunInput::Arrival(ArrivalSignal::ReadsArrived { .. })) => RunState::Running,
            (RunState::Running, RunInput::StopSucceeded) => RunState::Idle,
            (state, _) => state,
        };

        if next == self.state {
            return None;
        }

        info!(from = %self.state, to = %next, input = ?input, "run_state_changed");
        self.state = next;
        Some(next)
    }
}
