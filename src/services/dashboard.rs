//! Dashboard state and the single event fold
//!
//! Every stream message and every settled control call is a [`DashboardEvent`].
//! `Dashboard::dispatch` folds one event under a lock and then publishes an
//! immutable [`Snapshot`] through a watch channel, so readers always see a
//! fully applied event and never a buffer or run state mid-transition.
//!
//! Ownership inside the fold stays split: the [`IngestionBuffer`] owns the reads
//! and the latest payload, the [`RunStateTracker`] owns the run state. The buffer
//! reports arrivals as an [`ArrivalSignal`] value which the fold hands to the
//! tracker.

use crate::domain::{Payload, RunState, TagRead};
use crate::infra::metrics::Metrics;
use crate::services::ingest::IngestionBuffer;
use crate::services::run_state::{RunInput, RunStateTracker};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::debug;

/// Identifies one streaming subscription opened by the connection manager
pub type SubscriptionId = u64;

/// Identifies one issued start/stop call
pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
}

impl ControlCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::Start => "start",
            ControlCommand::Stop => "stop",
        }
    }
}

/// Everything that can change what the dashboard shows
#[derive(Debug)]
pub enum DashboardEvent {
    /// A new subscription became the active one
    StreamOpened { subscription: SubscriptionId },
    StreamConnected { subscription: SubscriptionId },
    PayloadReceived { subscription: SubscriptionId, payload: Payload },
    StreamDisconnected { subscription: SubscriptionId },
    /// The stream source was switched off: drop the subscription and the display
    StreamDisabled,
    /// A control call is about to leave; newer generations supersede older ones
    ControlIssued { generation: Generation },
    ControlSettled { generation: Generation, command: ControlCommand, succeeded: bool },
}

/// Result of folding one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Unchanged,
    /// Event from an inactive subscription or a superseded control call
    Discarded,
}

/// Immutable view published after every applied event
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    /// Bumped on every published change
    pub seq: u64,
    pub run_state: RunState,
    pub connected: bool,
    /// Newest first, at most 50
    pub reads: Vec<TagRead>,
    pub latest_payload: Option<Arc<Payload>>,
    pub last_payload_unix_ms: Option<u64>,
}

#[derive(Debug, Default)]
pub struct DashboardState {
    buffer: IngestionBuffer,
    tracker: RunStateTracker,
    connected: bool,
    active_subscription: Option<SubscriptionId>,
    latest_generation: Generation,
    last_payload_unix_ms: Option<u64>,
    seq: u64,
}

fn now_unix_ms() -> u64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as u64
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_active(&self, subscription: SubscriptionId) -> bool {
        self.active_subscription == Some(subscription)
    }

    /// The one state-transition function
    pub fn apply(&mut self, event: DashboardEvent) -> Applied {
        let applied = match event {
            DashboardEvent::StreamOpened { subscription } => {
                self.active_subscription = Some(subscription);
                self.connected = false;
                Applied::Changed
            }
            DashboardEvent::StreamConnected { subscription } => {
                if !self.is_active(subscription) {
                    return Applied::Discarded;
                }
                self.connected = true;
                Applied::Changed
            }
            DashboardEvent::PayloadReceived { subscription, payload } => {
                if !self.is_active(subscription) {
                    return Applied::Discarded;
                }
                if let Some(signal) = self.buffer.ingest(payload) {
                    self.tracker.apply(RunInput::from(signal));
                }
                self.last_payload_unix_ms = Some(now_unix_ms());
                Applied::Changed
            }
            DashboardEvent::StreamDisconnected { subscription } => {
                if !self.is_active(subscription) {
                    return Applied::Discarded;
                }
                self.connected = false;
                Applied::Changed
            }
            DashboardEvent::StreamDisabled => {
                self.active_subscription = None;
                self.connected = false;
                self.buffer.clear();
                self.last_payload_unix_ms = None;
                Applied::Changed
            }
            DashboardEvent::ControlIssued { generation } => {
                self.latest_generation = self.latest_generation.max(generation);
                Applied::Unchanged
            }
            DashboardEvent::ControlSettled { generation, command, succeeded } => {
                if generation != self.latest_generation {
                    debug!(
                        generation = %generation,
                        latest = %self.latest_generation,
                        command = command.as_str(),
                        "control_outcome_superseded"
                    );
                    return Applied::Discarded;
                }
                if !succeeded {
                    return Applied::Unchanged;
                }
                let input = match command {
                    ControlCommand::Start => RunInput::StartSucceeded,
                    ControlCommand::Stop => RunInput::StopSucceeded,
                };
                match self.tracker.apply(input) {
                    Some(_) => Applied::Changed,
                    None => Applied::Unchanged,
                }
            }
        };

        if applied == Applied::Changed {
            self.seq += 1;
        }
        applied
    }

    pub fn run_state(&self) -> RunState {
        self.tracker.state()
    }

    pub fn snapshot(&self) -> Snapshot {
        let (reads, latest_payload) = self.buffer.snapshot();
        Snapshot {
            seq: self.seq,
            run_state: self.tracker.state(),
            connected: self.connected,
            reads,
            latest_payload,
            last_payload_unix_ms: self.last_payload_unix_ms,
        }
    }
}

/// Shared handle: serialized writes, lock-free snapshot reads
pub struct Dashboard {
    state: Mutex<DashboardState>,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    metrics: Arc<Metrics>,
}

impl Dashboard {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::default()));
        Self { state: Mutex::new(DashboardState::new()), snapshot_tx, metrics }
    }

    /// Fold one event and publish the resulting snapshot if anything changed
    pub fn dispatch(&self, event: DashboardEvent) -> Applied {
        let ingested_reads = match &event {
            DashboardEvent::PayloadReceived { payload, .. } => Some(payload.tag_reads().len()),
            _ => None,
        };
        let is_settlement = matches!(event, DashboardEvent::ControlSettled { .. });

        let mut state = self.state.lock();
        let applied = state.apply(event);

        match applied {
            Applied::Changed => {
                self.snapshot_tx.send_replace(Arc::new(state.snapshot()));
                if let Some(reads) = ingested_reads {
                    self.metrics.record_payload_ingested(reads);
                }
            }
            Applied::Discarded if is_settlement => self.metrics.record_stale_outcome(),
            _ => {}
        }

        applied
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot_tx.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn run_state(&self) -> RunState {
        self.snapshot().run_state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ingest::tests::payload_of;

    fn dashboard() -> Dashboard {
        Dashboard::new(Arc::new(Metrics::new()))
    }

    fn open(dashboard: &Dashboard, subscription: SubscriptionId) {
        dashboard.dispatch(DashboardEvent::StreamOpened { subscription });
        dashboard.dispatch(DashboardEvent::StreamConnected { subscription });
    }

    fn settle(dashboard: &Dashboard, generation: Generation, command: ControlCommand, succeeded: bool) -> Applied {
        dashboard.dispatch(DashboardEvent::ControlSettled { generation, command, succeeded })
    }

    #[test]
    fn test_non_empty_payload_while_idle_starts_running() {
        let dashboard = dashboard();
        open(&dashboard, 1);
        assert_eq!(dashboard.run_state(), RunState::Idle);

        dashboard.dispatch(DashboardEvent::PayloadReceived { subscription: 1, payload: payload_of(&["a"]) });

        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.run_state, RunState::Running);
        assert_eq!(snapshot.reads.len(), 1);
        assert!(snapshot.connected);
        assert!(snapshot.last_payload_unix_ms.is_some());
    }

    #[test]
    fn test_empty_payload_while_idle_stays_idle() {
        let dashboard = dashboard();
        open(&dashboard, 1);
        dashboard.dispatch(DashboardEvent::PayloadReceived { subscription: 1, payload: payload_of(&[]) });

        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.run_state, RunState::Idle);
        assert!(snapshot.reads.is_empty());
        assert!(snapshot.latest_payload.is_some());
    }

    #[test]
    fn test_stream_disabled_clears_display() {
        let dashboard = dashboard();
        open(&dashboard, 1);
        dashboard.dispatch(DashboardEvent::PayloadReceived { subscription: 1, payload: payload_of(&["a", "b"]) });

        dashboard.dispatch(DashboardEvent::StreamDisabled);

        let snapshot = dashboard.snapshot();
        assert!(snapshot.reads.is_empty());
        assert!(snapshot.latest_payload.is_none());
        assert!(!snapshot.connected);
        // Run state is not owned by the stream
        assert_eq!(snapshot.run_state, RunState::Running);
    }

    #[test]
    fn test_late_payload_from_closed_subscription_is_discarded() {
        let dashboard = dashboard();
        open(&dashboard, 1);
        dashboard.dispatch(DashboardEvent::StreamDisabled);

        let applied =
            dashboard.dispatch(DashboardEvent::PayloadReceived { subscription: 1, payload: payload_of(&["late"]) });
        assert_eq!(applied, Applied::Discarded);
        assert!(dashboard.snapshot().reads.is_empty());
        assert_eq!(dashboard.run_state(), RunState::Idle);
    }

    #[test]
    fn test_superseded_subscription_is_ignored() {
        let dashboard = dashboard();
        open(&dashboard, 1);
        open(&dashboard, 2);
        assert_eq!(dashboard.dispatch(DashboardEvent::StreamDisconnected { subscription: 1 }), Applied::Discarded);
        assert!(dashboard.snapshot().connected);
    }

    #[test]
    fn test_control_outcomes_drive_run_state() {
        let dashboard = dashboard();
        dashboard.dispatch(DashboardEvent::ControlIssued { generation: 1 });
        assert_eq!(settle(&dashboard, 1, ControlCommand::Start, true), Applied::Changed);
        assert_eq!(dashboard.run_state(), RunState::Running);

        dashboard.dispatch(DashboardEvent::ControlIssued { generation: 2 });
        assert_eq!(settle(&dashboard, 2, ControlCommand::Stop, false), Applied::Unchanged);
        assert_eq!(dashboard.run_state(), RunState::Running);

        dashboard.dispatch(DashboardEvent::ControlIssued { generation: 3 });
        settle(&dashboard, 3, ControlCommand::Stop, true);
        assert_eq!(dashboard.run_state(), RunState::Idle);
    }

    #[test]
    fn test_stale_outcome_is_discarded() {
        let dashboard = dashboard();
        dashboard.dispatch(DashboardEvent::ControlIssued { generation: 1 });
        dashboard.dispatch(DashboardEvent::ControlIssued { generation: 2 });

        // The older start settles after a newer call was issued
        assert_eq!(settle(&dashboard, 1, ControlCommand::Start, true), Applied::Discarded);
        assert_eq!(dashboard.run_state(), RunState::Idle);
        assert_eq!(dashboard.metrics().summary().stale_outcomes, 1);

        assert_eq!(settle(&dashboard, 2, ControlCommand::Start, true), Applied::Changed);
        assert_eq!(dashboard.run_state(), RunState::Running);
    }

    #[test]
    fn test_stop_keeps_buffer() {
        let dashboard = dashboard();
        open(&dashboard, 1);
        dashboard.dispatch(DashboardEvent::PayloadReceived { subscription: 1, payload: payload_of(&["a", "b"]) });
        dashboard.dispatch(DashboardEvent::ControlIssued { generation: 1 });
        settle(&dashboard, 1, ControlCommand::Stop, true);

        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.run_state, RunState::Idle);
        assert_eq!(snapshot.reads.len(), 2);
    }

    #[test]
    fn test_snapshot_seq_and_metrics() {
        let dashboard = dashboard();
        let before = dashboard.snapshot().seq;
        open(&dashboard, 1);
        dashboard.dispatch(DashboardEvent::PayloadReceived { subscription: 1, payload: payload_of(&["a", "b", "c"]) });
        assert_eq!(dashboard.snapshot().seq, before + 3);
        assert_eq!(dashboard.metrics().summary().reads_ingested, 3);
    }

    #[tokio::test]
    async fn test_subscribers_are_notified() {
        let dashboard = dashboard();
        let mut rx = dashboard.subscribe();
        open(&dashboard, 7);
        dashboard.dispatch(DashboardEvent::PayloadReceived { subscription: 7, payload: payload_of(&["a"]) });

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().reads.len(), 1);
    }
}
