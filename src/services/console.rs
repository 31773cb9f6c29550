//! Operator console: the dashboard, its stream subscription and its controls
//!
//! Front ends (the headless binary and the TUI) talk to this type only.
//! Switching the stream source in the pending configuration opens or closes
//! the subscription.

use crate::domain::{SimulationParams, SourceConfig};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::engine::{HttpEngine, SimulationEngine};
use crate::io::stream::ConnectionManager;
use crate::services::control::{ControlError, ControlFacade, StartOutcome};
use crate::services::dashboard::Dashboard;
use std::sync::Arc;
use tracing::info;

pub struct Console {
    dashboard: Arc<Dashboard>,
    stream: ConnectionManager,
    control: ControlFacade,
}

impl Console {
    /// Build a console talking to the configured HTTP engine
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let engine = HttpEngine::new(config.engine_base_url(), config.request_timeout())?;
        Ok(Self::with_engine(config, metrics, Arc::new(engine)))
    }

    pub fn with_engine(config: &Config, metrics: Arc<Metrics>, engine: Arc<dyn SimulationEngine>) -> Self {
        let dashboard = Arc::new(Dashboard::new(metrics));
        let stream = ConnectionManager::new(config.stream_url(), config.connect_timeout(), dashboard.clone());
        let control = ControlFacade::new(
            engine,
            dashboard.clone(),
            config.request_timeout(),
            config.source().clone(),
            config.params(),
        );

        info!(
            engine = %config.engine_base_url(),
            stream = %config.stream_url(),
            "console_created"
        );

        Self { dashboard, stream, control }
    }

    pub fn dashboard(&self) -> &Arc<Dashboard> {
        &self.dashboard
    }

    pub fn stream(&self) -> &ConnectionManager {
        &self.stream
    }

    pub fn control(&self) -> &ControlFacade {
        &self.control
    }

    pub fn source_config(&self) -> SourceConfig {
        self.control.source_config()
    }

    pub fn params(&self) -> SimulationParams {
        self.control.params()
    }

    /// Open or close the subscription to match the pending stream switch
    ///
    /// Must be called from within a Tokio runtime.
    pub fn sync_stream(&self) {
        if self.control.source_config().use_stream_source {
            self.stream.enable();
        } else {
            self.stream.disable();
        }
    }

    /// Replace the pending source selection and apply its stream switch
    pub fn set_source_config(&self, source: SourceConfig) -> Result<(), ControlError> {
        self.control.set_source_config(source)?;
        self.sync_stream();
        Ok(())
    }

    pub fn toggle_stream_source(&self) -> Result<bool, ControlError> {
        let mut source = self.source_config();
        source.use_stream_source = !source.use_stream_source;
        let enabled = source.use_stream_source;
        self.set_source_config(source)?;
        Ok(enabled)
    }

    pub fn toggle_webhook(&self) -> Result<bool, ControlError> {
        let mut source = self.source_config();
        source.use_webhook = !source.use_webhook;
        let enabled = source.use_webhook;
        self.control.set_source_config(source)?;
        Ok(enabled)
    }

    /// Set the webhook target; blank clears it. Refused while Running.
    pub fn set_webhook_url(&self, url: &str) -> Result<(), ControlError> {
        let mut source = self.source_config();
        let url = url.trim();
        source.webhook_url = if url.is_empty() { None } else { Some(url.to_string()) };
        self.control.set_source_config(source)
    }

    pub fn set_params(&self, params: SimulationParams) -> Result<(), ControlError> {
        self.control.set_params(params)
    }

    /// Start with the pending configuration
    pub async fn start(&self) -> Result<StartOutcome, ControlError> {
        self.control.start_pending().await
    }

    pub async fn stop(&self) -> Result<(), ControlError> {
        self.control.stop().await
    }
}
