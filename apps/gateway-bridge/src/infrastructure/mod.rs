//! Infrastructure Layer
//!
//! Adapters around the application core:
//!
//! - `gateway/`: in-process simulated gateway session
//! - `broadcast/`: tokio broadcast fan-out implementing the event sink
//! - `config/`: connection parameters and bridge settings
//! - `metrics/`: Prometheus counters and gauges
//! - `telemetry/`: tracing subscriber and OTLP export

pub mod broadcast;
pub mod config;
pub mod gateway;
pub mod metrics;
pub mod telemetry;
