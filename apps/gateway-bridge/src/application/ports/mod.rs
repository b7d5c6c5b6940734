//! Application Ports (Driver and Driven)
//!
//! - **Driven**: `GatewaySession` (commands to the vendor gateway) and
//!   `EventSink` (normalized events to the application)
//! - **Driver**: `GatewayCallback` values the gateway pushes into the bridge

mod callbacks;
mod event_sink_port;
mod gateway_port;

pub use callbacks::{
    CancelReport, ConnectionStatus, ExecutionReport, GatewayCallback, GatewayOrderStatus,
    HistoricBarsReport, NetworkAvailability, OrderUpdate, PositionReport, QuoteReport,
    RejectReport, TradeReport,
};
pub use event_sink_port::{EventSink, NoOpEventSink, RecordingEventSink};
pub use gateway_port::{
    FixedSessionFactory, GatewayError, GatewaySession, GatewaySessionFactory, LocateHandle,
    OrderHandle, OrderSpec,
};

#[cfg(test)]
pub use gateway_port::{MockGatewaySession, MockGatewaySessionFactory};
