// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Gateway Bridge - Broker Session Reconciliation Core
//!
//! Sits between a broker gateway session and the trading application. The
//! gateway pushes callbacks from its own threads and exposes commands; the
//! bridge keeps the session alive, tracks which broker order belongs to
//! which application order, and turns raw callbacks into normalized events.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Identifiers, orders, fills, positions, ticks, events
//!
//! - **Application**: Ports and services
//!   - `ports`: `GatewaySession` commands, raw `GatewayCallback`s, `EventSink`
//!   - `services`: `SessionManager`, `OrderIdentityTable`,
//!     `OrderEventReconciler`, `LocateCoordinator`, `MarketDataFeed`, and the
//!     `GatewayBridge` facade
//!
//! - **Infrastructure**: Adapters
//!   - `gateway`: Simulated gateway session
//!   - `broadcast`: Event fan-out over tokio broadcast channels
//!   - `config`: Connection parameters and settings
//!   - `metrics` / `telemetry`: Prometheus and tracing
//!
//! # Data Flow
//!
//! ```text
//!               commands                      callbacks
//! Application ───────────► GatewayBridge ◄─────────────── Gateway session
//!      ▲                        │
//!      │   GatewayEvent         ▼
//!      └──────────────────── EventSink (EventHub)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core types with no external dependencies.
pub mod domain;

/// Application layer - Ports and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::events::GatewayEvent;
pub use domain::market::{
    Bar, BarType, HistoricBarRequest, HistoricBars, Position, PositionKind, Tick,
};
pub use domain::orders::{
    Execution, ExecutionKind, Fill, LimitOrder, MarketOrder, Order, OrderSide, OrderType,
    RejectReason, Rejection, TimeInForce,
};
pub use domain::session::{ConnectionParams, Credentials, SessionChannel, SessionState};
pub use domain::shared::{GatewayOrderId, LocalOrderId, Symbol};

// Application re-exports
pub use application::ports::{
    EventSink, GatewayCallback, GatewayError, GatewaySession, GatewaySessionFactory,
    NoOpEventSink, RecordingEventSink,
};
pub use application::services::{
    BridgeError, BridgeOptions, GatewayBridge, LocateCoordinator, MarketDataFeed,
    OrderEventReconciler, OrderIdentityTable, ReconnectConfig, SessionManager,
};

// Infrastructure re-exports
pub use infrastructure::broadcast::{EventHub, EventHubConfig};
pub use infrastructure::config::{BridgeSettings, ConfigError, load_params_file};
pub use infrastructure::gateway::SimulatedGateway;
pub use infrastructure::metrics::init_metrics;
