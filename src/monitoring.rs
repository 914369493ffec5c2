use crate::{client_state::ConnectionStats, error::DashboardError};
use anyhow::Result;
use metrics::{Counter, Gauge, counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, sync::LazyLock};
use tracing::{error, info};

// Global metrics
pub static EVENTS_RECEIVED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("botdash_events_received_total"));
pub static RECONNECT_ATTEMPTS_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("botdash_reconnect_attempts_total"));
pub static SNAPSHOT_REFRESH_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("botdash_snapshot_refreshes_total"));
pub static CONNECTED_GAUGE: LazyLock<Gauge> = LazyLock::new(|| gauge!("botdash_connected"));

pub async fn setup_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", "botdash")
        .add_global_label("version", env!("CARGO_PKG_VERSION"));

    match builder.install() {
        Ok(_) => {
            info!(
                "Prometheus metrics server started on http://{}/metrics",
                addr
            );

            EVENTS_RECEIVED_COUNTER.absolute(0);
            RECONNECT_ATTEMPTS_COUNTER.absolute(0);
            SNAPSHOT_REFRESH_COUNTER.absolute(0);
            CONNECTED_GAUGE.set(0.0);

            Ok(())
        }
        Err(e) => {
            error!("Failed to start metrics server: {}", e);
            Err(DashboardError::MetricsError(e.to_string()).into())
        }
    }
}

/// Health document combining channel stats with uptime, for logging on shutdown.
pub fn health_json(stats: &ConnectionStats, uptime: chrono::Duration) -> serde_json::Value {
    serde_json::json!({
        "status": if stats.connected { "connected" } else { "disconnected" },
        "attempt_count": stats.attempt_count,
        "max_attempts": stats.max_attempts,
        "connection_id": stats.connection_id,
        "events_received": stats.events_received,
        "connected_for_seconds": stats.connected_for.map(|d| d.as_secs()),
        "seconds_since_last_event": stats.since_last_event.map(|d| d.as_secs()),
        "uptime_seconds": uptime.num_seconds(),
        "timestamp": chrono::Utc::now()
    })
}
