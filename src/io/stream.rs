//! WebSocket subscription to the engine's tag feed (`/ws/tags`)
//!
//! The manager owns at most one subscription task. Every text message is
//! parsed as a [`Payload`] and dispatched to the dashboard in arrival order;
//! malformed messages are counted and dropped. A dropped connection is not
//! retried - the manager reports disconnected and waits for `enable()`.

use crate::domain::{Payload, PayloadError};
use crate::services::dashboard::{Dashboard, DashboardEvent, SubscriptionId};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

struct Subscription {
    id: SubscriptionId,
    handle: JoinHandle<()>,
}

pub struct ConnectionManager {
    url: String,
    connect_timeout: Duration,
    dashboard: Arc<Dashboard>,
    next_id: AtomicU64,
    subscription: Mutex<Option<Subscription>>,
}

impl ConnectionManager {
    pub fn new(url: &str, connect_timeout: Duration, dashboard: Arc<Dashboard>) -> Self {
        Self {
            url: url.to_string(),
            connect_timeout,
            dashboard,
            next_id: AtomicU64::new(0),
            subscription: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// True while a subscription task is alive (connecting or connected)
    pub fn is_open(&self) -> bool {
        self.subscription.lock().as_ref().is_some_and(|s| !s.handle.is_finished())
    }

    pub fn is_connected(&self) -> bool {
        self.dashboard.snapshot().connected
    }

    /// Open a subscription unless one is already open
    ///
    /// Returns whether a new subscription was started. Must be called from
    /// within a Tokio runtime.
    pub fn enable(&self) -> bool {
        let mut slot = self.subscription.lock();
        if slot.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            debug!(url = %self.url, "stream_enable_noop");
            return false;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.dashboard.dispatch(DashboardEvent::StreamOpened { subscription: id });

        let handle = tokio::spawn(run_subscription(
            id,
            self.url.clone(),
            self.connect_timeout,
            self.dashboard.clone(),
        ));
        *slot = Some(Subscription { id, handle });

        info!(subscription = %id, url = %self.url, "stream_enabled");
        true
    }

    /// Close the subscription and clear the display
    ///
    /// Returns false (and leaves the display alone) if already disabled.
    pub fn disable(&self) -> bool {
        let Some(subscription) = self.subscription.lock().take() else {
            debug!("stream_disable_noop");
            return false;
        };

        subscription.handle.abort();
        self.dashboard.dispatch(DashboardEvent::StreamDisabled);
        info!(subscription = %subscription.id, "stream_disabled");
        true
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.get_mut().take() {
            subscription.handle.abort();
        }
    }
}

fn forward(dashboard: &Dashboard, subscription: SubscriptionId, parsed: Result<Payload, PayloadError>) {
    let metrics = dashboard.metrics();
    metrics.record_message_received();

    match parsed {
        Ok(payload) => {
            debug!(subscription = %subscription, reads = %payload.tag_reads().len(), "payload_received");
            dashboard.dispatch(DashboardEvent::PayloadReceived { subscription, payload });
        }
        Err(e) => {
            metrics.record_message_malformed();
            debug!(subscription = %subscription, error = %e, "payload_malformed");
        }
    }
}

async fn run_subscription(
    subscription: SubscriptionId,
    url: String,
    connect_timeout: Duration,
    dashboard: Arc<Dashboard>,
) {
    info!(subscription = %subscription, url = %url, "stream_connecting");

    let ws_stream = match tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((ws_stream, _response))) => ws_stream,
        Ok(Err(e)) => {
            warn!(subscription = %subscription, url = %url, error = %e, "stream_connect_failed");
            dashboard.dispatch(DashboardEvent::StreamDisconnected { subscription });
            return;
        }
        Err(_) => {
            warn!(
                subscription = %subscription,
                url = %url,
                timeout_ms = %connect_timeout.as_millis(),
                "stream_connect_timeout"
            );
            dashboard.dispatch(DashboardEvent::StreamDisconnected { subscription });
            return;
        }
    };

    dashboard.metrics().record_stream_connect();
    dashboard.dispatch(DashboardEvent::StreamConnected { subscription });
    info!(subscription = %subscription, "stream_connected");

    let (mut write, mut read) = ws_stream.split();

    let reason = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => forward(&dashboard, subscription, Payload::parse(&text)),
            Some(Ok(Message::Binary(bytes))) => forward(&dashboard, subscription, Payload::parse_slice(&bytes)),
            Some(Ok(Message::Ping(data))) => {
                if let Err(e) = write.send(Message::Pong(data)).await {
                    break format!("pong failed: {}", e);
                }
            }
            Some(Ok(Message::Close(frame))) => break format!("server close: {:?}", frame),
            Some(Ok(_)) => {}
            Some(Err(e)) => break e.to_string(),
            None => break "stream ended".to_string(),
        }
    };

    dashboard.metrics().record_stream_disconnect();
    warn!(subscription = %subscription, reason = %reason, "stream_disconnected");
    dashboard.dispatch(DashboardEvent::StreamDisconnected { subscription });
}
