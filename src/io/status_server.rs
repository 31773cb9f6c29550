//! Read-only HTTP status endpoint
//!
//! - `GET /health` - liveness
//! - `GET /metrics` - counters and dashboard gauges in Prometheus text format
//! - `GET /snapshot` - the current dashboard snapshot as JSON

use crate::infra::metrics::MetricsSummary;
use crate::services::dashboard::{Dashboard, Snapshot};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Format counters and snapshot gauges in Prometheus text exposition format
fn format_prometheus_metrics(summary: &MetricsSummary, snapshot: &Snapshot) -> String {
    let mut output = String::with_capacity(2048);

    write_metric(
        &mut output,
        "rfid_dashboard_messages_total",
        "Stream messages received",
        MetricType::Counter,
        summary.messages_received,
    );
    write_metric(
        &mut output,
        "rfid_dashboard_messages_malformed_total",
        "Stream messages dropped as malformed",
        MetricType::Counter,
        summary.messages_malformed,
    );
    write_metric(
        &mut output,
        "rfid_dashboard_payloads_total",
        "Payloads ingested into the buffer",
        MetricType::Counter,
        summary.payloads_ingested,
    );
    write_metric(
        &mut output,
        "rfid_dashboard_reads_total",
        "Tag reads ingested into the buffer",
        MetricType::Counter,
        summary.reads_ingested,
    );
    write_metric(
        &mut output,
        "rfid_dashboard_stream_connects_total",
        "Successful stream connections",
        MetricType::Counter,
        summary.stream_connects,
    );
    write_metric(
        &mut output,
        "rfid_dashboard_stream_disconnects_total",
        "Stream connections lost",
        MetricType::Counter,
        summary.stream_disconnects,
    );
    write_metric(
        &mut output,
        "rfid_dashboard_control_requests_total",
        "Start/stop requests issued to the engine",
        MetricType::Counter,
        summary.control_requests,
    );
    write_metric(
        &mut output,
        "rfid_dashboard_control_failures_total",
        "Start/stop requests that failed",
        MetricType::Counter,
        summary.control_failures,
    );
    write_metric(
        &mut output,
        "rfid_dashboard_stale_outcomes_total",
        "Control outcomes discarded because a newer request was issued",
        MetricType::Counter,
        summary.stale_outcomes,
    );

    write_metric(
        &mut output,
        "rfid_dashboard_buffer_len",
        "Reads currently displayed",
        MetricType::Gauge,
        snapshot.reads.len() as u64,
    );
    write_metric(
        &mut output,
        "rfid_dashboard_running",
        "Simulation run state (0=idle, 1=running)",
        MetricType::Gauge,
        snapshot.run_state.is_running() as u64,
    );
    write_metric(
        &mut output,
        "rfid_dashboard_connected",
        "Stream connection state (0=disconnected, 1=connected)",
        MetricType::Gauge,
        snapshot.connected as u64,
    );

    output
}

fn text_response(status: StatusCode, content_type: &str, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    dashboard: Arc<Dashboard>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => Ok(text_response(StatusCode::OK, "text/plain", "ok".to_string())),
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&dashboard.metrics().summary(), &dashboard.snapshot());
            Ok(text_response(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", body))
        }
        (&Method::GET, "/snapshot") => match serde_json::to_string(dashboard.snapshot().as_ref()) {
            Ok(body) => Ok(text_response(StatusCode::OK, "application/json", body)),
            Err(e) => {
                error!(error = %e, "snapshot_serialize_failed");
                Ok(text_response(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e.to_string()))
            }
        },
        _ => Ok(text_response(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string())),
    }
}

/// Bind the status port on all interfaces and serve until shutdown
pub async fn start_status_server(
    port: u16,
    dashboard: Arc<Dashboard>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    serve(listener, dashboard, shutdown).await;
    Ok(())
}

/// Serve connections from an already bound listener until shutdown flips to true
pub async fn serve(listener: TcpListener, dashboard: Arc<Dashboard>, mut shutdown: watch::Receiver<bool>) {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "status_server_started");
    }

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let dashboard = dashboard.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| handle_request(req, dashboard.clone()));

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "status_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "status_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("status_server_shutdown");
                    return;
                }
            }
        }
    }
}
