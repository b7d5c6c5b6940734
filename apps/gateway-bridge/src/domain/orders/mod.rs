//! Order Domain
//!
//! Order requests the application sends, and the normalized snapshots the
//! bridge hands back when the gateway reports on them.

mod value_objects;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{GatewayOrderId, LocalOrderId, Symbol};

pub use value_objects::{HARD_TO_BORROW_REASON, OrderSide, OrderType, RejectReason, TimeInForce};

// =============================================================================
// Order Requests
// =============================================================================

/// Market order request from the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketOrder {
    /// Application order ID.
    pub local_id: LocalOrderId,
    /// Symbol to trade.
    pub symbol: Symbol,
    /// Order side.
    pub side: OrderSide,
    /// Order size in shares.
    pub quantity: u64,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Venue for auction orders (OPG routing).
    pub venue: Option<String>,
}

impl MarketOrder {
    /// Create a day market order.
    #[must_use]
    pub fn new(local_id: LocalOrderId, symbol: Symbol, side: OrderSide, quantity: u64) -> Self {
        Self {
            local_id,
            symbol,
            side,
            quantity,
            time_in_force: TimeInForce::Day,
            venue: None,
        }
    }

    /// Set time in force.
    #[must_use]
    pub const fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Route to a specific venue.
    #[must_use]
    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }
}

/// Limit order request from the application.
///
/// Also used to present broker-raised locate offers, where `local_id`
/// carries the gateway's locate id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrder {
    /// Application order ID.
    pub local_id: LocalOrderId,
    /// Symbol to trade.
    pub symbol: Symbol,
    /// Order side.
    pub side: OrderSide,
    /// Order size in shares.
    pub quantity: u64,
    /// Limit price.
    pub limit_price: Decimal,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Provider that produced or will route the order.
    pub provider: String,
}

impl LimitOrder {
    /// Create a day limit order.
    #[must_use]
    pub fn new(
        local_id: LocalOrderId,
        symbol: Symbol,
        side: OrderSide,
        quantity: u64,
        limit_price: Decimal,
    ) -> Self {
        Self {
            local_id,
            symbol,
            side,
            quantity,
            limit_price,
            time_in_force: TimeInForce::Day,
            provider: String::new(),
        }
    }

    /// Set time in force.
    #[must_use]
    pub const fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Tag with the provider name.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }
}

// =============================================================================
// Normalized Reports
// =============================================================================

/// Order snapshot attached to accept/cancel/execution notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Application order ID.
    pub local_id: LocalOrderId,
    /// Gateway order ID at the time of the report.
    pub broker_order_id: Option<GatewayOrderId>,
    /// Symbol.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Order size (0 when the gateway did not echo it).
    pub quantity: u64,
    /// Provider name.
    pub provider: String,
    /// Gateway order timestamp, if reported.
    pub placed_at: Option<DateTime<Utc>>,
}

/// Whether an execution completes the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionKind {
    /// Nothing left to fill.
    Full,
    /// Quantity remains open.
    Partial,
}

/// Normalized fill report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Application order ID the fill is attributed to.
    pub local_id: LocalOrderId,
    /// Gateway execution ID.
    pub execution_id: String,
    /// Symbol.
    pub symbol: Symbol,
    /// Execution side.
    pub side: OrderSide,
    /// Price of this fill.
    pub price: Decimal,
    /// Size of this fill.
    pub size: u64,
    /// Average price across all fills so far.
    pub average_price: Decimal,
    /// Quantity still open.
    pub leaves_quantity: u64,
    /// Quantity filled so far.
    pub cumulative_quantity: u64,
    /// Full or partial.
    pub kind: ExecutionKind,
    /// Provider name.
    pub provider: String,
    /// When the bridge observed the execution.
    pub executed_at: DateTime<Utc>,
}

impl Fill {
    /// Check whether this fill completes the order.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.kind, ExecutionKind::Full)
    }
}

/// Fill paired with the order it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// The fill.
    pub fill: Fill,
    /// The order.
    pub order: Order,
}

/// Normalized rejection report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Application order ID.
    pub local_id: LocalOrderId,
    /// Symbol.
    pub symbol: Symbol,
    /// Structured reason.
    pub reason: RejectReason,
    /// Provider name.
    pub provider: String,
    /// When the bridge observed the rejection.
    pub rejected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn market_order_builder() {
        let order = MarketOrder::new(
            LocalOrderId::new("L1"),
            Symbol::new("ABC"),
            OrderSide::Buy,
            100,
        )
        .with_time_in_force(TimeInForce::Opg)
        .with_venue("NYSE");

        assert_eq!(order.time_in_force, TimeInForce::Opg);
        assert_eq!(order.venue.as_deref(), Some("NYSE"));
    }

    #[test]
    fn limit_order_builder() {
        let order = LimitOrder::new(
            LocalOrderId::new("L2"),
            Symbol::new("ABC"),
            OrderSide::Short,
            50,
            dec!(12.34),
        )
        .with_provider("Blackwood");

        assert_eq!(order.limit_price, dec!(12.34));
        assert_eq!(order.time_in_force, TimeInForce::Day);
        assert_eq!(order.provider, "Blackwood");
    }

    #[test]
    fn rejection_serializes_reason_code() {
        let rejection = Rejection {
            local_id: LocalOrderId::new("L1"),
            symbol: Symbol::new("ABC"),
            reason: RejectReason::HardToBorrow,
            provider: "Blackwood".to_string(),
            rejected_at: Utc::now(),
        };

        let json = serde_json::to_value(&rejection).unwrap();
        assert_eq!(json["reason"]["code"], "HARD_TO_BORROW");
    }
}
