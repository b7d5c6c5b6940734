//! Gateway Bridge Binary
//!
//! Runs the bridge against the in-process simulated gateway and prints every
//! normalized event as a JSON line.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin gateway-bridge
//! ```
//!
//! # Environment Variables
//!
//! ## Connection (one of)
//! - `GATEWAY_CONFIG`: Path to a YAML file with `username`, `password`, `ip`,
//!   `port`, `clientport`
//! - `GATEWAY_USERNAME`, `GATEWAY_PASSWORD`, `GATEWAY_IP`, `GATEWAY_PORT`,
//!   `GATEWAY_CLIENT_PORT`
//!
//! ## Optional
//! - `GATEWAY_PROVIDER`: Provider name on events (default: Blackwood)
//! - `GATEWAY_SUBSCRIBE`: Comma-separated symbols to stream ticks for
//! - `GATEWAY_RECONNECT_DELAY_INITIAL_MS`, `GATEWAY_RECONNECT_DELAY_MAX_SECS`,
//!   `GATEWAY_RECONNECT_MULTIPLIER`, `GATEWAY_MAX_RECONNECT_ATTEMPTS`
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: Log filter (default: gateway_bridge=info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use gateway_bridge::infrastructure::broadcast::EventHub;
use gateway_bridge::infrastructure::metrics::get_metrics_handle;
use gateway_bridge::infrastructure::telemetry;
use gateway_bridge::{
    BridgeOptions, BridgeSettings, ConnectionParams, GatewayBridge, GatewayEvent,
    SimulatedGateway, Symbol, init_metrics, load_params_file,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

/// How often queued gateway callbacks are delivered.
const PUMP_INTERVAL: Duration = Duration::from_millis(20);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Gateway Bridge");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let settings = BridgeSettings::from_env();
    let params = load_connection_params()?;
    log_config(&settings, &params);

    let hub = Arc::new(EventHub::new(settings.events.clone().into()));
    let gateway = SimulatedGateway::new();
    let bridge = Arc::new(
        GatewayBridge::new(
            params.clone(),
            gateway.factory(),
            Arc::clone(&hub) as Arc<dyn gateway_bridge::EventSink>,
            BridgeOptions {
                provider: settings.provider.clone(),
                reconnect: settings.reconnect.clone().into(),
            },
        )
        .with_market_data(params, gateway.factory()),
    );

    let shutdown_token = CancellationToken::new();

    let printer = tokio::spawn(print_events(
        [hub.session_rx(), hub.orders_rx(), hub.market_data_rx()],
        shutdown_token.clone(),
    ));

    let pump_gateway = Arc::clone(&gateway);
    let pump_bridge = Arc::clone(&bridge);
    let pump_token = shutdown_token.clone();
    let pump = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PUMP_INTERVAL);
        loop {
            tokio::select! {
                () = pump_token.cancelled() => break,
                _ = interval.tick() => {
                    pump_gateway.pump(&pump_bridge);
                }
            }
        }
    });

    if !bridge.start() {
        tracing::error!("Gateway bridge failed to start; waiting for shutdown");
    }

    for symbol in subscribe_list() {
        bridge.subscribe_ticks(&symbol);
    }

    tracing::info!("Gateway bridge ready");

    await_shutdown().await;

    tracing::info!("Stopping gateway sessions");
    bridge.stop();
    gateway.pump(&bridge);

    shutdown_token.cancel();
    let _ = tokio::join!(pump, printer);

    if let Some(handle) = get_metrics_handle() {
        tracing::debug!(metrics = %handle.render(), "Final metrics");
    }

    tracing::info!("Gateway bridge stopped");
    Ok(())
}

/// Prefer a YAML file when `GATEWAY_CONFIG` is set, otherwise the environment.
fn load_connection_params() -> anyhow::Result<ConnectionParams> {
    match std::env::var("GATEWAY_CONFIG") {
        Ok(path) if !path.trim().is_empty() => load_params_file(path.trim())
            .with_context(|| format!("loading connection parameters from {path}")),
        _ => ConnectionParams::from_env().context("loading connection parameters from environment"),
    }
}

fn subscribe_list() -> Vec<Symbol> {
    std::env::var("GATEWAY_SUBSCRIBE")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|symbol| !symbol.is_empty())
        .map(|symbol| Symbol::new(symbol.to_uppercase()))
        .collect()
}

/// Print events from every channel as JSON lines until shutdown.
async fn print_events(
    receivers: [broadcast::Receiver<GatewayEvent>; 3],
    shutdown: CancellationToken,
) {
    let [mut session, mut orders, mut market_data] = receivers;
    loop {
        let received = tokio::select! {
            () = shutdown.cancelled() => break,
            event = session.recv() => event,
            event = orders.recv() => event,
            event = market_data.recv() => event,
        };

        match received {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::error!(error = %e, kind = event.kind(), "Event serialization failed"),
            },
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event printer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Wait for Ctrl-C.
async fn await_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
    tracing::info!("Shutdown signal received");
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let candidate = dir.join(".env");
            if candidate.is_file() && dotenvy::from_path(&candidate).is_ok() {
                return;
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(settings: &BridgeSettings, params: &ConnectionParams) {
    tracing::info!(
        provider = %settings.provider,
        username = params.credentials.username(),
        ip = %params.ip,
        port = params.port,
        client_port = params.client_port,
        "Configuration loaded"
    );
    tracing::debug!(
        reconnect = ?settings.reconnect,
        events = ?settings.events,
        "Bridge settings"
    );
}
