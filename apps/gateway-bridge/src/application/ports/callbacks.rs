//! Raw Gateway Callbacks
//!
//! Field shapes of the callbacks a gateway session raises. Adapters convert
//! the vendor's objects into these and hand them to the bridge; nothing here
//! is normalized yet.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::gateway_port::LocateHandle;
use crate::domain::market::Bar;
use crate::domain::orders::OrderSide;
use crate::domain::session::SessionChannel;
use crate::domain::shared::{GatewayOrderId, Symbol};

/// Order status as the gateway reports it on order updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayOrderStatus {
    /// Created, not yet at the market.
    Pending,
    /// Working at the market.
    Live,
    /// Completely filled.
    Filled,
    /// Cancelled.
    Cancelled,
    /// Rejected.
    Rejected,
}

/// Gateway-level logon/logoff result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Channel the status is for.
    pub channel: SessionChannel,
    /// Whether the channel is now connected.
    pub connected: bool,
}

/// Network interface came up or went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAvailability {
    /// Whether the network is reachable.
    pub available: bool,
}

/// Order status change. The first `Live` update is the acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    /// Client-assigned id the order was sent with.
    pub client_order_id: GatewayOrderId,
    /// Permanent id; empty until the gateway assigns one.
    pub order_id: GatewayOrderId,
    /// Symbol.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Order size.
    pub quantity: u64,
    /// Gateway status.
    pub status: GatewayOrderStatus,
    /// Gateway order time.
    pub placed_at: Option<DateTime<Utc>>,
}

/// Fill or partial fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Permanent order id. Locate executions may carry one the bridge never saw.
    pub order_id: GatewayOrderId,
    /// Gateway execution id.
    pub execution_id: String,
    /// Symbol.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Price of this fill.
    pub price: Decimal,
    /// Size of this fill.
    pub size: u64,
    /// Average price so far.
    pub average_price: Decimal,
    /// Quantity still open.
    pub leaves_quantity: u64,
    /// Total order size.
    pub order_size: u64,
}

/// Cancel confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReport {
    /// Order id the cancel is for.
    pub order_id: GatewayOrderId,
    /// Symbol.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
}

/// Order rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectReport {
    /// Client-assigned id the order was sent with.
    pub client_order_id: GatewayOrderId,
    /// Permanent id if the order was live before the reject.
    pub order_id: Option<GatewayOrderId>,
    /// Symbol.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Order size.
    pub quantity: u64,
    /// Free-text reason.
    pub reason: String,
}

/// Position snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionReport {
    /// Symbol.
    pub symbol: Symbol,
    /// Signed quantity.
    pub quantity: i64,
    /// Last price.
    pub price: Decimal,
    /// Average buy price.
    pub avg_buy_price: Decimal,
    /// Average sell price.
    pub avg_sell_price: Decimal,
}

/// Level-1 quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteReport {
    /// Symbol.
    pub symbol: Symbol,
    /// Bid price.
    pub bid_price: Decimal,
    /// Bid size.
    pub bid_size: Decimal,
    /// Ask price.
    pub ask_price: Decimal,
    /// Ask size.
    pub ask_size: Decimal,
    /// Quote time.
    pub timestamp: DateTime<Utc>,
}

/// Time-and-sales print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeReport {
    /// Symbol.
    pub symbol: Symbol,
    /// Trade price.
    pub price: Decimal,
    /// Trade size.
    pub size: Decimal,
    /// Trade time.
    pub timestamp: DateTime<Utc>,
}

/// Answer to a historic bar request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricBarsReport {
    /// Id the request was sent with.
    pub request_id: u32,
    /// Symbol.
    pub symbol: Symbol,
    /// Bars in gateway order.
    pub bars: Vec<Bar>,
}

/// Any callback a gateway session can raise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayCallback {
    /// Connection status change.
    ConnectionStatus(ConnectionStatus),
    /// Network interface change.
    NetworkAvailability(NetworkAvailability),
    /// Order status change.
    OrderUpdate(OrderUpdate),
    /// Execution.
    Execution(ExecutionReport),
    /// Cancel confirmation.
    Cancel(CancelReport),
    /// Rejection.
    Reject(RejectReport),
    /// Position snapshot.
    Position(PositionReport),
    /// Broker-raised locate offer.
    LocateRequired(LocateHandle),
    /// Quote tick.
    Quote(QuoteReport),
    /// Trade tick.
    Trade(TradeReport),
    /// Historic bars.
    HistoricBars(HistoricBarsReport),
}

impl GatewayCallback {
    /// Callback kind label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionStatus(_) => "connection_status",
            Self::NetworkAvailability(_) => "network_availability",
            Self::OrderUpdate(_) => "order_update",
            Self::Execution(_) => "execution",
            Self::Cancel(_) => "cancel",
            Self::Reject(_) => "reject",
            Self::Position(_) => "position",
            Self::LocateRequired(_) => "locate_required",
            Self::Quote(_) => "quote",
            Self::Trade(_) => "trade",
            Self::HistoricBars(_) => "historic_bars",
        }
    }

    /// Channel whose session owns the listener for this callback.
    ///
    /// `None` for network availability, which is machine-wide.
    #[must_use]
    pub const fn channel(&self) -> Option<SessionChannel> {
        match self {
            Self::ConnectionStatus(status) => Some(status.channel),
            Self::NetworkAvailability(_) => None,
            Self::Quote(_) | Self::Trade(_) | Self::HistoricBars(_) => {
                Some(SessionChannel::MarketData)
            }
            Self::OrderUpdate(_)
            | Self::Execution(_)
            | Self::Cancel(_)
            | Self::Reject(_)
            | Self::Position(_)
            | Self::LocateRequired(_) => Some(SessionChannel::Orders),
        }
    }
}
