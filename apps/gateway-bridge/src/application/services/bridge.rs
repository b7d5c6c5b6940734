//! Gateway Bridge
//!
//! Facade the application talks to. Commands return `bool` and never
//! propagate errors; callbacks enter through [`GatewayBridge::dispatch`],
//! which gates them on the owning session's listener state and contains
//! every handler fault.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, info};

use super::error::BridgeError;
use super::identity_table::OrderIdentityTable;
use super::locate::{LocateBook, LocateCoordinator};
use super::market_data::MarketDataFeed;
use super::reconciler::{OrderEventReconciler, Reconciliation};
use super::reconnect::ReconnectConfig;
use super::session::{SessionManager, SessionOptions, SessionScopedState};
use crate::application::ports::{EventSink, GatewayCallback, GatewaySessionFactory, OrderSpec};
use crate::domain::market::HistoricBarRequest;
use crate::domain::orders::{LimitOrder, MarketOrder};
use crate::domain::session::{ConnectionParams, SessionChannel};
use crate::domain::shared::{GatewayOrderId, LocalOrderId, Symbol};
use crate::infrastructure::metrics;

/// Settings shared by the bridge's sessions.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Provider name stamped on every event.
    pub provider: String,
    /// Automatic reconnect policy for each channel.
    pub reconnect: ReconnectConfig,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            provider: "Blackwood".to_string(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Order and market-data bridge over one gateway.
pub struct GatewayBridge {
    orders: Arc<SessionManager>,
    market_data: Option<MarketDataFeed>,
    table: Arc<OrderIdentityTable>,
    locates: Arc<LocateCoordinator>,
    reconciler: OrderEventReconciler,
    sink: Arc<dyn EventSink>,
    options: BridgeOptions,
}

impl GatewayBridge {
    /// Create a bridge with an orders session.
    #[must_use]
    pub fn new(
        params: ConnectionParams,
        factory: Arc<dyn GatewaySessionFactory>,
        sink: Arc<dyn EventSink>,
        options: BridgeOptions,
    ) -> Self {
        let table = Arc::new(OrderIdentityTable::new());
        let book = Arc::new(LocateBook::new());

        let scoped_state: Vec<Arc<dyn SessionScopedState>> = vec![table.clone(), book.clone()];
        let orders = SessionManager::with_options(
            SessionChannel::Orders,
            params,
            factory,
            Arc::clone(&sink),
            SessionOptions {
                provider: options.provider.clone(),
                reconnect: options.reconnect.clone(),
                scoped_state,
            },
        );

        let locates = Arc::new(LocateCoordinator::new(
            book,
            Arc::clone(&sink),
            options.provider.clone(),
        ));
        let reconciler = OrderEventReconciler::new(
            Arc::clone(&table),
            Arc::clone(&locates),
            Arc::clone(&sink),
            options.provider.clone(),
        );

        Self {
            orders,
            market_data: None,
            table,
            locates,
            reconciler,
            sink,
            options,
        }
    }

    /// Add a market-data session.
    #[must_use]
    pub fn with_market_data(
        mut self,
        params: ConnectionParams,
        factory: Arc<dyn GatewaySessionFactory>,
    ) -> Self {
        let session = SessionManager::with_options(
            SessionChannel::MarketData,
            params,
            factory,
            Arc::clone(&self.sink),
            SessionOptions {
                provider: self.options.provider.clone(),
                reconnect: self.options.reconnect.clone(),
                scoped_state: Vec::new(),
            },
        );
        self.market_data = Some(MarketDataFeed::new(session, Arc::clone(&self.sink)));
        self
    }

    // =========================================================================
    // Session Commands
    // =========================================================================

    /// Start every session. Returns `true` only if every connect was issued.
    pub fn start(&self) -> bool {
        let orders = self.orders.start();
        let market_data = self
            .market_data
            .as_ref()
            .is_none_or(|feed| feed.session().start());
        orders && market_data
    }

    /// Stop every session. Returns `true` only if every disconnect was issued.
    pub fn stop(&self) -> bool {
        let orders = self.orders.stop();
        let market_data = self
            .market_data
            .as_ref()
            .is_none_or(|feed| feed.session().stop());
        orders && market_data
    }

    /// Whether the orders session is live.
    pub fn is_connected(&self) -> bool {
        self.orders.is_connected()
    }

    // =========================================================================
    // Order Commands
    // =========================================================================

    /// Send a market order.
    pub fn send_market_order(&self, order: &MarketOrder) -> bool {
        self.report("send_market_order", self.submit(OrderSpec::from(order)))
    }

    /// Send a limit order.
    pub fn send_limit_order(&self, order: &LimitOrder) -> bool {
        self.report("send_limit_order", self.submit(OrderSpec::from(order)))
    }

    /// Request cancellation of a tracked order.
    pub fn cancel_order(&self, local_id: &LocalOrderId) -> bool {
        let result = self
            .table
            .record_by_local_id(local_id)
            .ok_or_else(|| BridgeError::UnknownOrder {
                local_id: local_id.to_string(),
            })
            .and_then(|record| {
                self.orders.session().cancel_order(&record.handle)?;
                info!(local_id = %local_id, gateway_id = %record.gateway_id, "Cancel sent");
                Ok(())
            });
        self.report("cancel_order", result)
    }

    /// Answer a broker-raised locate offer on behalf of `owner`.
    pub fn respond_to_locate(
        &self,
        locate_id: &GatewayOrderId,
        owner: LocalOrderId,
        accept: bool,
    ) -> bool {
        let result = if self.orders.is_connected() {
            self.locates
                .respond(self.orders.session().as_ref(), locate_id, owner, accept)
                .map_err(BridgeError::from)
        } else {
            Err(BridgeError::NotConnected {
                channel: SessionChannel::Orders,
            })
        };
        self.report("respond_to_locate", result)
    }

    // =========================================================================
    // Market Data Commands
    // =========================================================================

    /// Subscribe to ticks for `symbol`.
    pub fn subscribe_ticks(&self, symbol: &Symbol) -> bool {
        match &self.market_data {
            Some(feed) => feed.subscribe_ticks(symbol),
            None => self.report("subscribe_ticks", Err(Self::no_market_data())),
        }
    }

    /// Drop a tick subscription for `symbol`.
    pub fn unsubscribe_ticks(&self, symbol: &Symbol) -> bool {
        match &self.market_data {
            Some(feed) => feed.unsubscribe_ticks(symbol),
            None => self.report("unsubscribe_ticks", Err(Self::no_market_data())),
        }
    }

    /// Ask for historic bars; the answer arrives as a `HistoricBars` event.
    pub fn request_historic_bars(&self, request: &HistoricBarRequest) -> bool {
        match &self.market_data {
            Some(feed) => feed.request_historic_bars(request),
            None => self.report("request_historic_bars", Err(Self::no_market_data())),
        }
    }

    // =========================================================================
    // Callbacks
    // =========================================================================

    /// Deliver one gateway callback.
    ///
    /// Safe to call concurrently from any number of gateway threads. Errors
    /// and panics inside the handler are logged and suppressed.
    pub fn dispatch(&self, callback: GatewayCallback) {
        let kind = callback.kind();
        metrics::record_callback_received(kind);

        match panic::catch_unwind(AssertUnwindSafe(|| self.route(callback))) {
            Ok(Ok(Reconciliation::Unresolved)) => {
                metrics::record_callback_dropped(kind, "unresolved");
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                metrics::record_callback_fault(kind);
                error!(component = "gateway_bridge", operation = kind, error = %err, "Callback handler failed");
            }
            Err(payload) => {
                metrics::record_callback_fault(kind);
                let err = BridgeError::HandlerPanicked {
                    message: panic_message(payload.as_ref()),
                };
                error!(component = "gateway_bridge", operation = kind, error = %err, "Callback handler panicked");
            }
        }
    }

    fn route(&self, callback: GatewayCallback) -> Result<Reconciliation, BridgeError> {
        if let Some(channel) = callback.channel() {
            let Some(session) = self.session_for(channel) else {
                debug!(channel = %channel, kind = callback.kind(), "No session for channel");
                return Ok(Reconciliation::Ignored);
            };
            if !session.accepts_callbacks() {
                debug!(channel = %channel, kind = callback.kind(), "Callback while unhooked");
                metrics::record_callback_dropped(callback.kind(), "unhooked");
                return Ok(Reconciliation::Ignored);
            }
        }

        match callback {
            GatewayCallback::ConnectionStatus(status) => {
                if let Some(session) = self.session_for(status.channel) {
                    session.on_connection_status(status.connected);
                }
                if status.connected
                    && status.channel == SessionChannel::MarketData
                    && let Some(feed) = &self.market_data
                {
                    feed.resubscribe_all();
                }
                Ok(Reconciliation::Emitted)
            }
            GatewayCallback::NetworkAvailability(network) => {
                self.orders.on_network_availability(network.available);
                if let Some(feed) = &self.market_data {
                    feed.session().on_network_availability(network.available);
                }
                Ok(Reconciliation::Emitted)
            }
            GatewayCallback::OrderUpdate(update) => Ok(self.reconciler.on_order_update(&update)),
            GatewayCallback::Execution(report) => Ok(self.reconciler.on_execution(&report)),
            GatewayCallback::Cancel(report) => Ok(self.reconciler.on_cancel(&report)),
            GatewayCallback::Reject(report) => self
                .reconciler
                .on_reject(&report, self.orders.session().as_ref()),
            GatewayCallback::Position(report) => Ok(self.reconciler.on_position(&report)),
            GatewayCallback::LocateRequired(handle) => {
                self.locates.on_locate_required(handle);
                Ok(Reconciliation::Emitted)
            }
            GatewayCallback::Quote(quote) => Ok(self
                .market_data
                .as_ref()
                .map_or(Reconciliation::Ignored, |feed| feed.on_quote(&quote))),
            GatewayCallback::Trade(trade) => Ok(self
                .market_data
                .as_ref()
                .map_or(Reconciliation::Ignored, |feed| feed.on_trade(&trade))),
            GatewayCallback::HistoricBars(report) => Ok(self
                .market_data
                .as_ref()
                .map_or(Reconciliation::Ignored, |feed| feed.on_historic_bars(report))),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Orders session manager.
    #[must_use]
    pub const fn orders_session(&self) -> &Arc<SessionManager> {
        &self.orders
    }

    /// Market-data feed, if configured.
    #[must_use]
    pub const fn market_data(&self) -> Option<&MarketDataFeed> {
        self.market_data.as_ref()
    }

    /// Identity table.
    #[must_use]
    pub const fn identity_table(&self) -> &Arc<OrderIdentityTable> {
        &self.table
    }

    /// Locate book.
    #[must_use]
    pub fn locate_book(&self) -> &Arc<LocateBook> {
        self.locates.book()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Create the native order, track it, then send it, so an acknowledgement
    /// can never arrive for an order the table does not know yet.
    fn submit(&self, spec: OrderSpec) -> Result<(), BridgeError> {
        if self.table.contains_local_id(&spec.local_id) {
            return Err(BridgeError::DuplicateOrder {
                local_id: spec.local_id.to_string(),
            });
        }

        let session = self.orders.session();
        let handle = session.create_order(&spec)?;

        if !self.table.register(
            spec.local_id.clone(),
            handle.client_order_id.clone(),
            handle.clone(),
        ) {
            return Err(BridgeError::DuplicateOrder {
                local_id: spec.local_id.to_string(),
            });
        }

        if let Err(err) = session.send_order(&handle) {
            self.table.remove_by_local_id(&spec.local_id);
            return Err(err.into());
        }

        metrics::set_tracked_orders(self.table.len());
        info!(
            local_id = %spec.local_id,
            client_order_id = %handle.client_order_id,
            symbol = %spec.symbol,
            side = %spec.side,
            quantity = spec.quantity,
            "Order sent"
        );
        Ok(())
    }

    fn session_for(&self, channel: SessionChannel) -> Option<&Arc<SessionManager>> {
        match channel {
            SessionChannel::Orders => Some(&self.orders),
            SessionChannel::MarketData => self.market_data.as_ref().map(MarketDataFeed::session),
        }
    }

    fn report(&self, operation: &'static str, result: Result<(), BridgeError>) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                error!(
                    component = "gateway_bridge",
                    operation,
                    provider = %self.options.provider,
                    error = %err,
                    "Command failed"
                );
                false
            }
        }
    }

    const fn no_market_data() -> BridgeError {
        BridgeError::NotConnected {
            channel: SessionChannel::MarketData,
        }
    }
}

impl std::fmt::Debug for GatewayBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayBridge")
            .field("orders", &self.orders)
            .field("market_data", &self.market_data)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::application::ports::{
        ConnectionStatus, FixedSessionFactory, GatewayError, GatewaySession, MockGatewaySession,
        OrderHandle, PositionReport, RecordingEventSink,
    };
    use crate::domain::events::GatewayEvent;
    use crate::domain::orders::OrderSide;
    use crate::domain::session::Credentials;

    fn params() -> ConnectionParams {
        ConnectionParams::new(Credentials::new("u", "p"), "127.0.0.1", 1, 2)
    }

    fn bridge_with(session: MockGatewaySession, sink: Arc<dyn EventSink>) -> GatewayBridge {
        let session: Arc<dyn GatewaySession> = Arc::new(session);
        GatewayBridge::new(
            params(),
            Arc::new(FixedSessionFactory::new(session)),
            sink,
            BridgeOptions::default(),
        )
    }

    fn echo_handle(spec: &OrderSpec) -> OrderHandle {
        OrderHandle {
            client_order_id: GatewayOrderId::new(format!("C-{}", spec.local_id)),
            symbol: spec.symbol.clone(),
            side: spec.side,
            quantity: spec.quantity,
            limit_price: spec.limit_price,
        }
    }

    fn logged_on(session: &mut MockGatewaySession) {
        session.expect_connect().returning(|_, _, _, _| Ok(()));
    }

    fn market_buy(local: &str) -> MarketOrder {
        MarketOrder::new(LocalOrderId::new(local), Symbol::new("ABC"), OrderSide::Buy, 100)
    }

    #[test]
    fn send_registers_before_sending() {
        let mut session = MockGatewaySession::new();
        session
            .expect_create_order()
            .returning(|spec| Ok(echo_handle(spec)));
        session.expect_send_order().times(1).returning(|_| Ok(()));
        let bridge = bridge_with(session, Arc::new(RecordingEventSink::new()));

        assert!(bridge.send_market_order(&market_buy("L1")));
        assert_eq!(
            bridge
                .identity_table()
                .resolve_by_gateway_id(&GatewayOrderId::new("C-L1")),
            Some(LocalOrderId::new("L1"))
        );
    }

    #[test]
    fn failed_send_rolls_back_registration() {
        let mut session = MockGatewaySession::new();
        session
            .expect_create_order()
            .returning(|spec| Ok(echo_handle(spec)));
        session.expect_send_order().returning(|_| {
            Err(GatewayError::CommandFailed {
                command: "send_order",
                message: "offline".to_string(),
            })
        });
        let bridge = bridge_with(session, Arc::new(RecordingEventSink::new()));

        assert!(!bridge.send_market_order(&market_buy("L1")));
        assert!(bridge.identity_table().is_empty());
    }

    #[test]
    fn duplicate_local_id_is_refused_before_gateway() {
        let mut session = MockGatewaySession::new();
        session
            .expect_create_order()
            .times(1)
            .returning(|spec| Ok(echo_handle(spec)));
        session.expect_send_order().times(1).returning(|_| Ok(()));
        let bridge = bridge_with(session, Arc::new(RecordingEventSink::new()));

        let order = LimitOrder::new(
            LocalOrderId::new("L1"),
            Symbol::new("ABC"),
            OrderSide::Sell,
            10,
            dec!(5.25),
        );
        assert!(bridge.send_limit_order(&order));
        assert!(!bridge.send_limit_order(&order));
        assert_eq!(bridge.identity_table().len(), 1);
    }

    #[test]
    fn cancel_uses_tracked_handle() {
        let mut session = MockGatewaySession::new();
        session
            .expect_create_order()
            .returning(|spec| Ok(echo_handle(spec)));
        session.expect_send_order().returning(|_| Ok(()));
        session
            .expect_cancel_order()
            .withf(|handle| handle.client_order_id.as_str() == "C-L1")
            .times(1)
            .returning(|_| Ok(()));
        let bridge = bridge_with(session, Arc::new(RecordingEventSink::new()));

        bridge.send_market_order(&market_buy("L1"));
        assert!(bridge.cancel_order(&LocalOrderId::new("L1")));
        assert!(!bridge.cancel_order(&LocalOrderId::new("L404")));
    }

    #[test]
    fn respond_to_locate_requires_connection() {
        let mut session = MockGatewaySession::new();
        session.expect_is_connected().returning(|_| Ok(false));
        session.expect_accept_locate().never();
        let bridge = bridge_with(session, Arc::new(RecordingEventSink::new()));

        assert!(!bridge.respond_to_locate(
            &GatewayOrderId::new("LC1"),
            LocalOrderId::new("S1"),
            true
        ));
    }

    #[test]
    fn respond_to_unknown_locate_fails() {
        let mut session = MockGatewaySession::new();
        session.expect_is_connected().returning(|_| Ok(true));
        let bridge = bridge_with(session, Arc::new(RecordingEventSink::new()));

        assert!(!bridge.respond_to_locate(
            &GatewayOrderId::new("LC1"),
            LocalOrderId::new("S1"),
            false
        ));
    }

    #[test]
    fn callbacks_before_start_are_dropped() {
        let sink = Arc::new(RecordingEventSink::new());
        let bridge = bridge_with(MockGatewaySession::new(), sink.clone());

        bridge.dispatch(GatewayCallback::Position(PositionReport {
            symbol: Symbol::new("ABC"),
            quantity: 10,
            price: dec!(1),
            avg_buy_price: dec!(1),
            avg_sell_price: dec!(0),
        }));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn subscribe_without_market_data_session_fails() {
        let bridge = bridge_with(MockGatewaySession::new(), Arc::new(RecordingEventSink::new()));
        assert!(!bridge.subscribe_ticks(&Symbol::new("ABC")));

        let now = chrono::Utc::now();
        let request = HistoricBarRequest::new(
            1,
            Symbol::new("ABC"),
            crate::domain::market::BarType::Daily,
            now,
            now,
            0,
        );
        assert!(!bridge.request_historic_bars(&request));
    }

    struct ExplodingSink;

    impl EventSink for ExplodingSink {
        fn publish(&self, event: GatewayEvent) {
            if matches!(event, GatewayEvent::PositionUpdate(_)) {
                panic!("subscriber exploded");
            }
        }
    }

    #[test]
    fn handler_panic_is_contained() {
        let mut session = MockGatewaySession::new();
        logged_on(&mut session);
        let bridge = bridge_with(session, Arc::new(ExplodingSink));
        assert!(bridge.start());

        bridge.dispatch(GatewayCallback::Position(PositionReport {
            symbol: Symbol::new("ABC"),
            quantity: 10,
            price: dec!(1),
            avg_buy_price: dec!(1),
            avg_sell_price: dec!(0),
        }));

        // The bridge keeps working after the fault.
        bridge.dispatch(GatewayCallback::ConnectionStatus(ConnectionStatus {
            channel: SessionChannel::Orders,
            connected: true,
        }));
        assert_eq!(
            bridge.orders_session().state(),
            crate::domain::session::SessionState::Connected
        );
    }

    #[test]
    fn panic_message_extracts_text() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
