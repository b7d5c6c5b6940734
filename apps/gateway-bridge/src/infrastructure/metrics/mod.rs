//! Prometheus Metrics Module
//!
//! # Metrics Categories
//!
//! - **Callbacks**: gateway callbacks received and dropped, by kind
//! - **Events**: normalized events emitted, by kind
//! - **Sessions**: connection state and reconnect attempts, by channel
//! - **State**: tracked orders and pending locates
//!
//! Recording before [`init_metrics`] is a no-op, so tests never install a
//! recorder.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::session::SessionChannel;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder, or return the one already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "gateway_bridge_callbacks_received_total",
        "Total gateway callbacks received"
    );
    describe_counter!(
        "gateway_bridge_callbacks_dropped_total",
        "Callbacks dropped because no order matched or no listener was hooked"
    );
    describe_counter!(
        "gateway_bridge_callback_faults_total",
        "Callback handlers that failed or panicked"
    );
    describe_counter!(
        "gateway_bridge_events_emitted_total",
        "Normalized events handed to the application"
    );

    describe_gauge!(
        "gateway_bridge_session_connected",
        "1 when the channel is logged on, 0 otherwise"
    );
    describe_counter!(
        "gateway_bridge_reconnects_total",
        "Automatic reconnect attempts"
    );

    describe_gauge!(
        "gateway_bridge_tracked_orders",
        "Orders in the identity table"
    );
    describe_gauge!(
        "gateway_bridge_pending_locates",
        "Locate offers awaiting an answer"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a callback received from the gateway.
pub fn record_callback_received(kind: &'static str) {
    counter!("gateway_bridge_callbacks_received_total", "kind" => kind).increment(1);
}

/// Record a callback that was dropped.
pub fn record_callback_dropped(kind: &'static str, reason: &'static str) {
    counter!(
        "gateway_bridge_callbacks_dropped_total",
        "kind" => kind,
        "reason" => reason
    )
    .increment(1);
}

/// Record a handler fault (error or panic).
pub fn record_callback_fault(kind: &'static str) {
    counter!("gateway_bridge_callback_faults_total", "kind" => kind).increment(1);
}

/// Record an event handed to the application.
pub fn record_event_emitted(kind: &'static str) {
    counter!("gateway_bridge_events_emitted_total", "kind" => kind).increment(1);
}

/// Update the connection gauge for a channel.
pub fn set_session_connected(channel: SessionChannel, connected: bool) {
    gauge!("gateway_bridge_session_connected", "channel" => channel.as_str())
        .set(if connected { 1.0 } else { 0.0 });
}

/// Record an automatic reconnect attempt.
pub fn record_reconnect(channel: SessionChannel) {
    counter!("gateway_bridge_reconnects_total", "channel" => channel.as_str()).increment(1);
}

/// Update the tracked-order gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_tracked_orders(count: usize) {
    gauge!("gateway_bridge_tracked_orders").set(count as f64);
}

/// Update the pending-locate gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_pending_locates(count: usize) {
    gauge!("gateway_bridge_pending_locates").set(count as f64);
}

/// Value of an unlabelled gauge in a rendered scrape.
#[cfg(test)]
pub(crate) fn rendered_gauge(handle: &PrometheusHandle, name: &str) -> Option<f64> {
    handle.render().lines().find_map(|line| {
        let value = line.strip_prefix(name)?.strip_prefix(' ')?;
        value.trim().parse().ok()
    })
}

// =============================================================================
// Tests
// =============================================================================
