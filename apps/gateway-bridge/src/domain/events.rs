//! Normalized events handed to the application.
//!
//! Each event is a one-shot notification. Subscribers must tolerate
//! duplicates delivered across a reconnect.

use serde::{Deserialize, Serialize};

use super::market::{HistoricBars, Position, Tick};
use super::orders::{Execution, LimitOrder, Order, Rejection};
use super::session::SessionChannel;

/// Event emitted by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Gateway confirmed a logon.
    Logon {
        /// Provider name.
        provider: String,
        /// Channel that logged on.
        channel: SessionChannel,
    },
    /// Session lost, or stopped by the user.
    Logout {
        /// Provider name.
        provider: String,
        /// Channel that logged out.
        channel: SessionChannel,
    },
    /// Gateway acknowledged an order as live.
    OrderAccepted {
        /// Order snapshot.
        order: Order,
    },
    /// Fill or partial fill.
    Execution(Execution),
    /// Cancel confirmed.
    OrderCancelled {
        /// Order snapshot.
        order: Order,
    },
    /// Order rejected.
    OrderRejected(Rejection),
    /// Broker raised a locate offer the application must answer.
    LocateRequested {
        /// Locate terms as a limit order; `local_id` carries the locate id.
        order: LimitOrder,
    },
    /// Position snapshot.
    PositionUpdate(Position),
    /// Market-data tick.
    Tick(Tick),
    /// Answer to a historic bar request.
    HistoricBars(HistoricBars),
    /// Automatic reconnect gave up after the configured attempt ceiling.
    ReconnectAbandoned {
        /// Provider name.
        provider: String,
        /// Channel that stays down.
        channel: SessionChannel,
        /// Attempts made before giving up.
        attempts: u32,
    },
}

impl GatewayEvent {
    /// Event kind label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Logon { .. } => "logon",
            Self::Logout { .. } => "logout",
            Self::OrderAccepted { .. } => "order_accepted",
            Self::Execution(_) => "execution",
            Self::OrderCancelled { .. } => "order_cancelled",
            Self::OrderRejected(_) => "order_rejected",
            Self::LocateRequested { .. } => "locate_requested",
            Self::PositionUpdate(_) => "position_update",
            Self::Tick(_) => "tick",
            Self::HistoricBars(_) => "historic_bars",
            Self::ReconnectAbandoned { .. } => "reconnect_abandoned",
        }
    }

    /// Check whether this is a session-level event.
    #[must_use]
    pub const fn is_session_event(&self) -> bool {
        matches!(
            self,
            Self::Logon { .. } | Self::Logout { .. } | Self::ReconnectAbandoned { .. }
        )
    }

    /// Check whether this is a market-data event.
    #[must_use]
    pub const fn is_market_data_event(&self) -> bool {
        matches!(self, Self::Tick(_) | Self::HistoricBars(_))
    }
}
