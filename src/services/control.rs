//! Start/stop control of the simulation engine
//!
//! Validates locally, issues the request, and feeds the settled outcome into
//! the dashboard fold. Calls may overlap: each one takes a generation and only
//! the latest issued generation's success moves the run state.
//!
//! Requests run on their own task. Dropping the caller's future does not cancel
//! the request; its outcome is still applied when it settles.

use crate::domain::{SimulationParams, SourceConfig};
use crate::io::engine::{EngineError, SimulationEngine, StartRequest};
use crate::services::dashboard::{ControlCommand, Dashboard, DashboardEvent};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("select at least one source (stream or webhook) to start the simulation")]
    NoSourceSelected,
    #[error("invalid simulation parameters: {0}")]
    InvalidParams(String),
    #[error("{0}")]
    EngineRejected(String),
    #[error("engine unreachable: {0}")]
    EngineUnreachable(String),
    #[error("configuration is read-only while the simulation is running")]
    ConfigFrozen,
}

impl From<EngineError> for ControlError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Rejected(detail) => ControlError::EngineRejected(detail),
            EngineError::Unreachable(reason) => ControlError::EngineUnreachable(reason),
        }
    }
}

/// What a successful start did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The engine accepted a new start request
    Issued,
    /// Already Running; no request was sent
    AlreadyRunning,
}

/// Configuration submitted with the next start
#[derive(Debug, Clone)]
struct Pending {
    source: SourceConfig,
    params: SimulationParams,
}

pub struct ControlFacade {
    engine: Arc<dyn SimulationEngine>,
    dashboard: Arc<Dashboard>,
    request_timeout: Duration,
    generation: AtomicU64,
    pending: Mutex<Pending>,
}

impl ControlFacade {
    pub fn new(
        engine: Arc<dyn SimulationEngine>,
        dashboard: Arc<Dashboard>,
        request_timeout: Duration,
        source: SourceConfig,
        params: SimulationParams,
    ) -> Self {
        Self {
            engine,
            dashboard,
            request_timeout,
            generation: AtomicU64::new(0),
            pending: Mutex::new(Pending { source, params }),
        }
    }

    pub fn source_config(&self) -> SourceConfig {
        self.pending.lock().source.clone()
    }

    pub fn params(&self) -> SimulationParams {
        self.pending.lock().params
    }

    fn ensure_editable(&self) -> Result<(), ControlError> {
        if self.dashboard.run_state().is_running() {
            return Err(ControlError::ConfigFrozen);
        }
        Ok(())
    }

    /// Replace the pending source selection; refused while Running
    pub fn set_source_config(&self, source: SourceConfig) -> Result<(), ControlError> {
        self.ensure_editable()?;
        self.pending.lock().source = source;
        Ok(())
    }

    /// Replace the pending simulation parameters; refused while Running
    pub fn set_params(&self, params: SimulationParams) -> Result<(), ControlError> {
        self.ensure_editable()?;
        self.pending.lock().params = params;
        Ok(())
    }

    /// Start with the pending configuration
    pub async fn start_pending(&self) -> Result<StartOutcome, ControlError> {
        let Pending { source, params } = self.pending.lock().clone();
        self.start(source, params).await
    }

    /// Validate and ask the engine to start emitting
    pub async fn start(&self, config: SourceConfig, params: SimulationParams) -> Result<StartOutcome, ControlError> {
        if !config.any_source() {
            warn!("simulation_start_no_source");
            return Err(ControlError::NoSourceSelected);
        }
        params.validate().map_err(ControlError::InvalidParams)?;
        if config.use_webhook && config.webhook_url.as_deref().map_or(true, |url| url.trim().is_empty()) {
            return Err(ControlError::InvalidParams(
                "a webhook URL is required when webhook delivery is enabled".to_string(),
            ));
        }

        if self.dashboard.run_state().is_running() {
            debug!("simulation_start_ignored_already_running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let request = StartRequest {
            tag_count: params.tag_count,
            interval: params.interval_seconds,
            webhook_url: config.effective_webhook_url().map(str::to_string),
        };
        *self.pending.lock() = Pending { source: config, params };

        info!(
            tag_count = %request.tag_count,
            interval = %request.interval,
            webhook = request.webhook_url.is_some(),
            "simulation_start_requested"
        );

        let engine = self.engine.clone();
        self.issue(ControlCommand::Start, async move { engine.start_simulation(&request).await }).await?;
        Ok(StartOutcome::Issued)
    }

    /// Ask the engine to stop; issued regardless of the current run state
    pub async fn stop(&self) -> Result<(), ControlError> {
        info!("simulation_stop_requested");
        let engine = self.engine.clone();
        self.issue(ControlCommand::Stop, async move { engine.stop_simulation().await }).await
    }

    async fn issue<F>(&self, command: ControlCommand, call: F) -> Result<(), ControlError>
    where
        F: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.dashboard.dispatch(DashboardEvent::ControlIssued { generation });
        self.dashboard.metrics().record_control_request();

        let dashboard = self.dashboard.clone();
        let timeout = self.request_timeout;

        let handle = tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, call).await {
                Ok(result) => result.map_err(ControlError::from),
                Err(_) => Err(ControlError::EngineUnreachable(format!(
                    "no response within {} ms",
                    timeout.as_millis()
                ))),
            };

            match &result {
                Ok(()) => info!(command = command.as_str(), generation = %generation, "simulation_command_accepted"),
                Err(e) => {
                    dashboard.metrics().record_control_failure();
                    warn!(command = command.as_str(), generation = %generation, error = %e, "simulation_command_failed");
                }
            }

            dashboard.dispatch(DashboardEvent::ControlSettled { generation, command, succeeded: result.is_ok() });
            result
        });

        handle
            .await
            .unwrap_or_else(|e| Err(ControlError::EngineUnreachable(format!("control task failed: {}", e))))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::RunState;
    use crate::infra::metrics::Metrics;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Scripted engine: answers from a queue (default Ok) after an optional delay
    #[derive(Default)]
    pub(crate) struct FakeEngine {
        pub start_calls: AtomicUsize,
        pub stop_calls: AtomicUsize,
        pub last_start: Mutex<Option<StartRequest>>,
        start_script: Mutex<VecDeque<(Duration, Result<(), EngineError>)>>,
        stop_script: Mutex<VecDeque<(Duration, Result<(), EngineError>)>>,
    }

    impl FakeEngine {
        pub(crate) fn script_start(&self, delay: Duration, result: Result<(), EngineError>) {
            self.start_script.lock().push_back((delay, result));
        }

        pub(crate) fn script_stop(&self, delay: Duration, result: Result<(), EngineError>) {
            self.stop_script.lock().push_back((delay, result));
        }

        fn calls(&self) -> usize {
            self.start_calls.load(Ordering::SeqCst) + self.stop_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SimulationEngine for FakeEngine {
        async fn start_simulation(&self, request: &StartRequest) -> Result<(), EngineError> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_start.lock() = Some(request.clone());
            let (delay, result) = self.start_script.lock().pop_front().unwrap_or((Duration::ZERO, Ok(())));
            tokio::time::sleep(delay).await;
            result
        }

        async fn stop_simulation(&self) -> Result<(), EngineError> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            let (delay, result) = self.stop_script.lock().pop_front().unwrap_or((Duration::ZERO, Ok(())));
            tokio::time::sleep(delay).await;
            result
        }
    }

    fn facade_with(engine: Arc<FakeEngine>) -> (ControlFacade, Arc<Dashboard>) {
        let dashboard = Arc::new(Dashboard::new(Arc::new(Metrics::new())));
        let facade = ControlFacade::new(
            engine,
            dashboard.clone(),
            Duration::from_secs(1),
            SourceConfig::default(),
            SimulationParams::default(),
        );
        (facade, dashboard)
    }

    fn stream_only() -> SourceConfig {
        SourceConfig { use_stream_source: true, use_webhook: false, webhook_url: None }
    }

    fn params(tag_count: u32, interval_seconds: f64) -> SimulationParams {
        SimulationParams { tag_count, interval_seconds }
    }

    #[tokio::test]
    async fn test_start_without_source_makes_no_call() {
        let engine = Arc::new(FakeEngine::default());
        let (facade, dashboard) = facade_with(engine.clone());
        let none = SourceConfig { use_stream_source: false, use_webhook: false, webhook_url: None };

        assert_eq!(facade.start(none, params(5, 1.0)).await, Err(ControlError::NoSourceSelected));
        assert_eq!(engine.calls(), 0);
        assert_eq!(dashboard.run_state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_invalid_params_make_no_call() {
        let engine = Arc::new(FakeEngine::default());
        let (facade, dashboard) = facade_with(engine.clone());

        assert!(matches!(facade.start(stream_only(), params(0, 1.0)).await, Err(ControlError::InvalidParams(_))));
        assert!(matches!(facade.start(stream_only(), params(5, 0.0)).await, Err(ControlError::InvalidParams(_))));

        let webhook_without_url = SourceConfig { use_stream_source: false, use_webhook: true, webhook_url: None };
        assert!(matches!(
            facade.start(webhook_without_url, params(5, 1.0)).await,
            Err(ControlError::InvalidParams(_))
        ));

        assert_eq!(engine.calls(), 0);
        assert_eq!(dashboard.run_state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let engine = Arc::new(FakeEngine::default());
        let (facade, dashboard) = facade_with(engine.clone());

        facade.start(stream_only(), params(5, 1.0)).await.unwrap();
        assert_eq!(dashboard.run_state(), RunState::Running);
        assert_eq!(
            engine.last_start.lock().clone(),
            Some(StartRequest { tag_count: 5, interval: 1.0, webhook_url: None })
        );

        facade.stop().await.unwrap();
        assert_eq!(dashboard.run_state(), RunState::Idle);
        assert_eq!(engine.stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_webhook_url_forwarded_only_when_enabled() {
        let engine = Arc::new(FakeEngine::default());
        let (facade, _dashboard) = facade_with(engine.clone());

        let source = SourceConfig {
            use_stream_source: false,
            use_webhook: true,
            webhook_url: Some("https://hooks.example.com/rfid".to_string()),
        };
        facade.start(source, params(3, 0.5)).await.unwrap();
        let sent = engine.last_start.lock().clone().unwrap();
        assert_eq!(sent.webhook_url.as_deref(), Some("https://hooks.example.com/rfid"));
        assert_eq!(sent.interval, 0.5);

        facade.stop().await.unwrap();
        let source = SourceConfig {
            use_stream_source: true,
            use_webhook: false,
            webhook_url: Some("https://hooks.example.com/rfid".to_string()),
        };
        facade.start(source, params(3, 0.5)).await.unwrap();
        assert_eq!(engine.last_start.lock().clone().unwrap().webhook_url, None);
    }

    #[tokio::test]
    async fn test_rejected_start_leaves_idle() {
        let engine = Arc::new(FakeEngine::default());
        engine.script_start(Duration::ZERO, Err(EngineError::Rejected("reader busy".to_string())));
        let (facade, dashboard) = facade_with(engine.clone());

        let result = facade.start(stream_only(), params(5, 1.0)).await;
        assert_eq!(result, Err(ControlError::EngineRejected("reader busy".to_string())));
        assert_eq!(dashboard.run_state(), RunState::Idle);
        assert_eq!(dashboard.metrics().summary().control_failures, 1);
    }

    #[tokio::test]
    async fn test_failed_stop_leaves_running() {
        let engine = Arc::new(FakeEngine::default());
        engine.script_stop(Duration::ZERO, Err(EngineError::Unreachable("connection refused".to_string())));
        let (facade, dashboard) = facade_with(engine);

        facade.start(stream_only(), params(5, 1.0)).await.unwrap();
        let result = facade.stop().await;
        assert!(matches!(result, Err(ControlError::EngineUnreachable(_))));
        assert_eq!(dashboard.run_state(), RunState::Running);
    }

    #[tokio::test]
    async fn test_start_while_running_is_noop() {
        let engine = Arc::new(FakeEngine::default());
        let (facade, _dashboard) = facade_with(engine.clone());

        assert_eq!(facade.start(stream_only(), params(5, 1.0)).await, Ok(StartOutcome::Issued));
        assert_eq!(facade.start(stream_only(), params(9, 2.0)).await, Ok(StartOutcome::AlreadyRunning));
        assert_eq!(engine.start_calls.load(Ordering::SeqCst), 1);
        assert_eq!(facade.params(), params(5, 1.0));
    }

    #[tokio::test]
    async fn test_stop_while_idle_still_issued() {
        let engine = Arc::new(FakeEngine::default());
        let (facade, dashboard) = facade_with(engine.clone());

        facade.stop().await.unwrap();
        assert_eq!(engine.stop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(dashboard.run_state(), RunState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_unreachable() {
        let engine = Arc::new(FakeEngine::default());
        engine.script_start(Duration::from_secs(60), Ok(()));
        let (facade, dashboard) = facade_with(engine);

        let result = facade.start(stream_only(), params(5, 1.0)).await;
        assert!(matches!(result, Err(ControlError::EngineUnreachable(_))));
        assert_eq!(dashboard.run_state(), RunState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_calls_apply_latest_issued() {
        let engine = Arc::new(FakeEngine::default());
        // The start is slow, the stop issued after it settles first
        engine.script_start(Duration::from_millis(200), Ok(()));
        engine.script_stop(Duration::from_millis(10), Ok(()));
        let (facade, dashboard) = facade_with(engine);

        let (started, stopped) = tokio::join!(facade.start(stream_only(), params(5, 1.0)), facade.stop());
        assert!(started.is_ok());
        assert!(stopped.is_ok());

        // The start's late success must not resurrect Running
        assert_eq!(dashboard.run_state(), RunState::Idle);
        assert_eq!(dashboard.metrics().summary().stale_outcomes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcome_applied_after_caller_gives_up() {
        let engine = Arc::new(FakeEngine::default());
        engine.script_start(Duration::from_millis(100), Ok(()));
        let (facade, dashboard) = facade_with(engine);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), facade.start(stream_only(), params(5, 1.0))).await;
        assert!(abandoned.is_err());
        assert_eq!(dashboard.run_state(), RunState::Idle);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(dashboard.run_state(), RunState::Running);
    }

    #[tokio::test]
    async fn test_config_frozen_while_running() {
        let engine = Arc::new(FakeEngine::default());
        let (facade, _dashboard) = facade_with(engine);

        facade.set_params(params(8, 0.25)).unwrap();
        facade.start_pending().await.unwrap();

        assert_eq!(facade.set_params(params(1, 1.0)), Err(ControlError::ConfigFrozen));
        assert_eq!(facade.set_source_config(stream_only()), Err(ControlError::ConfigFrozen));

        facade.stop().await.unwrap();
        // Values persist across stop
        assert_eq!(facade.params(), params(8, 0.25));
        facade.set_params(params(1, 1.0)).unwrap();
    }
}
