//! Gateway Session Port (Driven Port)
//!
//! Commands the bridge issues to the vendor gateway session. Every command is
//! fire-and-forget: the outcome arrives later as a callback.

use std::net::IpAddr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::HistoricBarRequest;
use crate::domain::orders::{LimitOrder, MarketOrder, OrderSide, OrderType, TimeInForce};
use crate::domain::session::{Credentials, SessionChannel};
use crate::domain::shared::{GatewayOrderId, LocalOrderId, Symbol};

/// Order the gateway should build a native order object for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Application order ID.
    pub local_id: LocalOrderId,
    /// Symbol to trade.
    pub symbol: Symbol,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Quantity in shares.
    pub quantity: u64,
    /// Limit price (for limit orders).
    pub limit_price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Venue override.
    pub venue: Option<String>,
}

impl From<&MarketOrder> for OrderSpec {
    fn from(order: &MarketOrder) -> Self {
        Self {
            local_id: order.local_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: OrderType::Market,
            quantity: order.quantity,
            limit_price: None,
            time_in_force: order.time_in_force,
            venue: order.venue.clone(),
        }
    }
}

impl From<&LimitOrder> for OrderSpec {
    fn from(order: &LimitOrder) -> Self {
        Self {
            local_id: order.local_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: OrderType::Limit,
            quantity: order.quantity,
            limit_price: Some(order.limit_price),
            time_in_force: order.time_in_force,
            venue: None,
        }
    }
}

/// Reference to the gateway's native order object.
///
/// Needed to cancel, and to read fields the gateway does not echo in
/// callbacks (size, side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHandle {
    /// Client-assigned correlation id fixed at creation.
    pub client_order_id: GatewayOrderId,
    /// Symbol.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Original order size.
    pub quantity: u64,
    /// Limit price, if any.
    pub limit_price: Option<Decimal>,
}

/// Reference to a broker-raised locate offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocateHandle {
    /// Gateway id of the locate offer.
    pub locate_id: GatewayOrderId,
    /// Symbol to borrow.
    pub symbol: Symbol,
    /// Shares offered.
    pub quantity: u64,
    /// Price per share of the locate.
    pub price: Decimal,
}

/// Gateway command error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Connect or disconnect failed.
    #[error("Gateway connection error: {message}")]
    ConnectionError {
        /// Error details.
        message: String,
    },

    /// Configured address is not an IP address.
    #[error("Invalid gateway address: {address}")]
    InvalidAddress {
        /// The address as configured.
        address: String,
    },

    /// Command was not accepted by the session.
    #[error("Gateway rejected command {command}: {message}")]
    CommandFailed {
        /// Command name.
        command: &'static str,
        /// Error details.
        message: String,
    },

    /// Handle does not belong to this session.
    #[error("Unknown order handle: {client_order_id}")]
    UnknownHandle {
        /// The handle's client id.
        client_order_id: String,
    },

    /// Session object has been torn down.
    #[error("Gateway session unavailable")]
    SessionUnavailable,
}

/// Port for the vendor gateway session.
///
/// Implementations deliver their callbacks to
/// [`GatewayBridge::dispatch`](crate::application::services::GatewayBridge::dispatch).
#[cfg_attr(test, mockall::automock)]
pub trait GatewaySession: Send + Sync {
    /// Issue a logon for the channel.
    fn connect(
        &self,
        channel: SessionChannel,
        credentials: &Credentials,
        address: IpAddr,
        port: u16,
    ) -> Result<(), GatewayError>;

    /// Issue a logoff for the channel.
    fn disconnect(&self, channel: SessionChannel) -> Result<(), GatewayError>;

    /// Query live connection state.
    fn is_connected(&self, channel: SessionChannel) -> Result<bool, GatewayError>;

    /// Build a native order; this fixes its client-assigned id.
    fn create_order(&self, spec: &OrderSpec) -> Result<OrderHandle, GatewayError>;

    /// Send a previously created order.
    fn send_order(&self, handle: &OrderHandle) -> Result<(), GatewayError>;

    /// Request cancellation.
    fn cancel_order(&self, handle: &OrderHandle) -> Result<(), GatewayError>;

    /// Accept a broker-raised locate offer.
    fn accept_locate(&self, handle: &LocateHandle) -> Result<(), GatewayError>;

    /// Ask the broker to locate shares for a short sale.
    fn request_locate(&self, symbol: &Symbol, quantity: u64) -> Result<(), GatewayError>;

    /// Subscribe to level-1 quotes and trades.
    fn subscribe_ticks(&self, symbol: &Symbol) -> Result<(), GatewayError>;

    /// Drop a tick subscription.
    fn unsubscribe_ticks(&self, symbol: &Symbol) -> Result<(), GatewayError>;

    /// Ask for a range of historic bars; they arrive as one callback.
    fn request_historic_bars(&self, request: &HistoricBarRequest) -> Result<(), GatewayError>;
}

/// Builds fresh session objects after the transport is lost.
#[cfg_attr(test, mockall::automock)]
pub trait GatewaySessionFactory: Send + Sync {
    /// Create a new session object.
    fn create(&self) -> Arc<dyn GatewaySession>;
}

/// Factory that hands out the same session every time.
///
/// For gateways whose session object survives transport loss.
#[derive(Clone)]
pub struct FixedSessionFactory {
    session: Arc<dyn GatewaySession>,
}

impl FixedSessionFactory {
    /// Wrap an existing session.
    #[must_use]
    pub fn new(session: Arc<dyn GatewaySession>) -> Self {
        Self { session }
    }
}

impl GatewaySessionFactory for FixedSessionFactory {
    fn create(&self) -> Arc<dyn GatewaySession> {
        Arc::clone(&self.session)
    }
}

impl std::fmt::Debug for FixedSessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedSessionFactory").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn spec_from_market_order() {
        let order = MarketOrder::new(LocalOrderId::new("L1"), Symbol::new("ABC"), OrderSide::Buy, 10)
            .with_venue("ARCA");
        let spec = OrderSpec::from(&order);
        assert_eq!(spec.order_type, OrderType::Market);
        assert_eq!(spec.limit_price, None);
        assert_eq!(spec.venue.as_deref(), Some("ARCA"));
    }

    #[test]
    fn spec_from_limit_order() {
        let order = LimitOrder::new(
            LocalOrderId::new("L2"),
            Symbol::new("ABC"),
            OrderSide::Short,
            5,
            dec!(9.99),
        )
        .with_time_in_force(TimeInForce::Ioc);
        let spec = OrderSpec::from(&order);
        assert_eq!(spec.order_type, OrderType::Limit);
        assert_eq!(spec.limit_price, Some(dec!(9.99)));
        assert_eq!(spec.time_in_force, TimeInForce::Ioc);
    }

    #[test]
    fn fixed_factory_reuses_session() {
        let session: Arc<dyn GatewaySession> = Arc::new(MockGatewaySession::new());
        let factory = FixedSessionFactory::new(Arc::clone(&session));
        assert!(Arc::ptr_eq(&factory.create(), &session));
    }
}
