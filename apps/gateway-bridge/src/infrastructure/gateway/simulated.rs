//! Simulated Gateway Session
//!
//! In-process [`GatewaySession`] for tests, demos and local runs. Commands
//! are recorded and answered with the callbacks a real gateway would raise;
//! those callbacks queue in an outbox until [`SimulatedGateway::pump`]
//! delivers them to a bridge.
//!
//! Behavior:
//! - `connect` logs the channel on (unless auto-logon is off)
//! - `send_order` acknowledges with a permanent id, or rejects short sales
//!   of symbols marked hard to borrow
//! - `request_locate` answers with a locate offer; `accept_locate` fills it
//! - Quotes and trades are only raised for subscribed symbols
//! - `request_historic_bars` answers with flat bars spanning the range
//!
//! Any command can be made to fail with [`SimulatedGateway::fail_command`].

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::application::ports::{
    CancelReport, ConnectionStatus, ExecutionReport, GatewayCallback, GatewayError,
    GatewayOrderStatus, GatewaySession, GatewaySessionFactory, HistoricBarsReport, LocateHandle,
    NetworkAvailability, OrderHandle, OrderSpec, OrderUpdate, PositionReport, QuoteReport,
    RejectReport, TradeReport,
};
use crate::application::services::GatewayBridge;
use crate::domain::market::{Bar, BarType, HistoricBarRequest};
use crate::domain::orders::{HARD_TO_BORROW_REASON, OrderSide};
use crate::domain::session::{Credentials, SessionChannel};
use crate::domain::shared::{GatewayOrderId, Symbol};

/// Upper bound on callbacks delivered by one [`SimulatedGateway::pump`].
const MAX_PUMPED: usize = 10_000;

/// Upper bound on bars in one historic answer.
const MAX_BARS: usize = 1_000;

/// A command the bridge issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Connect a channel.
    Connect {
        /// Channel.
        channel: SessionChannel,
        /// Normalized user name.
        username: String,
        /// Address.
        address: IpAddr,
        /// Port.
        port: u16,
    },
    /// Disconnect a channel.
    Disconnect {
        /// Channel.
        channel: SessionChannel,
    },
    /// Create a native order.
    CreateOrder {
        /// Assigned client id.
        client_order_id: GatewayOrderId,
    },
    /// Send a created order.
    SendOrder {
        /// Client id.
        client_order_id: GatewayOrderId,
    },
    /// Cancel an order.
    CancelOrder {
        /// Client id.
        client_order_id: GatewayOrderId,
    },
    /// Accept a locate offer.
    AcceptLocate {
        /// Locate id.
        locate_id: GatewayOrderId,
    },
    /// Ask for a locate.
    RequestLocate {
        /// Symbol.
        symbol: Symbol,
        /// Shares.
        quantity: u64,
    },
    /// Start ticks for a symbol.
    SubscribeTicks {
        /// Symbol.
        symbol: Symbol,
    },
    /// Stop ticks for a symbol.
    UnsubscribeTicks {
        /// Symbol.
        symbol: Symbol,
    },
    /// Ask for historic bars.
    RequestHistoricBars {
        /// Request id.
        request_id: u32,
        /// Symbol.
        symbol: Symbol,
        /// Bar granularity.
        bar_type: BarType,
    },
}

impl GatewayCommand {
    /// Command name, as used by [`SimulatedGateway::fail_command`].
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::CreateOrder { .. } => "create_order",
            Self::SendOrder { .. } => "send_order",
            Self::CancelOrder { .. } => "cancel_order",
            Self::AcceptLocate { .. } => "accept_locate",
            Self::RequestLocate { .. } => "request_locate",
            Self::SubscribeTicks { .. } => "subscribe_ticks",
            Self::UnsubscribeTicks { .. } => "unsubscribe_ticks",
            Self::RequestHistoricBars { .. } => "request_historic_bars",
        }
    }
}

#[derive(Debug, Clone)]
struct SimOrder {
    handle: OrderHandle,
    permanent_id: Option<GatewayOrderId>,
    filled: u64,
    notional: Decimal,
}

impl SimOrder {
    fn wire_id(&self) -> GatewayOrderId {
        self.permanent_id
            .clone()
            .unwrap_or_else(|| self.handle.client_order_id.clone())
    }
}

#[derive(Debug)]
struct SimState {
    auto_logon: bool,
    connected: HashSet<SessionChannel>,
    orders: HashMap<GatewayOrderId, SimOrder>,
    offers: HashMap<GatewayOrderId, LocateHandle>,
    hard_to_borrow: HashSet<Symbol>,
    subscriptions: BTreeSet<Symbol>,
    failing: HashSet<&'static str>,
    commands: Vec<GatewayCommand>,
    locate_price: Decimal,
    bar_price: Decimal,
    next_id: u64,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            auto_logon: true,
            connected: HashSet::new(),
            orders: HashMap::new(),
            offers: HashMap::new(),
            hard_to_borrow: HashSet::new(),
            subscriptions: BTreeSet::new(),
            failing: HashSet::new(),
            commands: Vec::new(),
            locate_price: Decimal::new(1, 2),
            bar_price: Decimal::new(1_000, 2),
            next_id: 0,
        }
    }
}

impl SimState {
    fn next_id(&mut self, prefix: &str) -> GatewayOrderId {
        self.next_id += 1;
        GatewayOrderId::new(format!("{prefix}-{}", self.next_id))
    }

    /// Record a command, failing it if fault injection says so.
    fn record(&mut self, command: GatewayCommand) -> Result<(), GatewayError> {
        let name = command.name();
        self.commands.push(command);
        if self.failing.contains(name) {
            return Err(GatewayError::CommandFailed {
                command: name,
                message: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

/// In-process gateway session.
#[derive(Debug, Default)]
pub struct SimulatedGateway {
    state: RwLock<SimState>,
    outbox: Mutex<VecDeque<GatewayCallback>>,
    sessions_created: AtomicUsize,
}

impl SimulatedGateway {
    /// Create a gateway with auto-logon enabled.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Factory handing out this gateway as every new session.
    #[must_use]
    pub fn factory(self: &Arc<Self>) -> Arc<dyn GatewaySessionFactory> {
        Arc::new(SimulatedGatewayFactory {
            gateway: Arc::clone(self),
        })
    }

    /// How many session objects the factory has handed out.
    #[must_use]
    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Behavior Knobs
    // =========================================================================

    /// Whether `connect` immediately logs the channel on.
    pub fn set_auto_logon(&self, enabled: bool) {
        self.state.write().auto_logon = enabled;
    }

    /// Make every future `command` fail.
    pub fn fail_command(&self, command: &'static str) {
        self.state.write().failing.insert(command);
    }

    /// Undo [`SimulatedGateway::fail_command`].
    pub fn restore_command(&self, command: &'static str) {
        self.state.write().failing.remove(command);
    }

    /// Short sales of `symbol` are rejected as hard to borrow.
    pub fn mark_hard_to_borrow(&self, symbol: Symbol) {
        self.state.write().hard_to_borrow.insert(symbol);
    }

    /// Per-share price on locate offers.
    pub fn set_locate_price(&self, price: Decimal) {
        self.state.write().locate_price = price;
    }

    /// Open, high, low and close of every simulated historic bar.
    pub fn set_bar_price(&self, price: Decimal) {
        self.state.write().bar_price = price;
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Commands issued so far, oldest first.
    #[must_use]
    pub fn commands(&self) -> Vec<GatewayCommand> {
        self.state.read().commands.clone()
    }

    /// How many times `command` was issued.
    #[must_use]
    pub fn command_count(&self, command: &str) -> usize {
        self.state
            .read()
            .commands
            .iter()
            .filter(|issued| issued.name() == command)
            .count()
    }

    /// Symbols with an upstream tick subscription.
    #[must_use]
    pub fn subscribed_symbols(&self) -> Vec<Symbol> {
        self.state.read().subscriptions.iter().cloned().collect()
    }

    /// Permanent id assigned to an order, once acknowledged.
    #[must_use]
    pub fn permanent_id(&self, client_order_id: &GatewayOrderId) -> Option<GatewayOrderId> {
        self.state
            .read()
            .orders
            .get(client_order_id)
            .and_then(|order| order.permanent_id.clone())
    }

    /// Client id of the most recently created order.
    #[must_use]
    pub fn last_client_order_id(&self) -> Option<GatewayOrderId> {
        self.state
            .read()
            .commands
            .iter()
            .rev()
            .find_map(|command| match command {
                GatewayCommand::CreateOrder { client_order_id } => Some(client_order_id.clone()),
                _ => None,
            })
    }

    /// Callbacks waiting for delivery.
    #[must_use]
    pub fn pending_callbacks(&self) -> usize {
        self.outbox.lock().len()
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Take every queued callback without delivering it.
    pub fn drain(&self) -> Vec<GatewayCallback> {
        self.outbox.lock().drain(..).collect()
    }

    /// Deliver queued callbacks to `bridge` until the outbox is empty,
    /// including callbacks queued by commands issued during delivery.
    pub fn pump(&self, bridge: &GatewayBridge) -> usize {
        let mut delivered = 0;
        while let Some(callback) = self.next_callback() {
            bridge.dispatch(callback);
            delivered += 1;
            if delivered >= MAX_PUMPED {
                warn!(delivered, "Callback pump limit reached");
                break;
            }
        }
        delivered
    }

    fn next_callback(&self) -> Option<GatewayCallback> {
        self.outbox.lock().pop_front()
    }

    fn raise(&self, callback: GatewayCallback) {
        debug!(kind = callback.kind(), "Simulated callback queued");
        self.outbox.lock().push_back(callback);
    }

    // =========================================================================
    // Scenario Drivers
    // =========================================================================

    /// Inject a raw callback.
    pub fn inject(&self, callback: GatewayCallback) {
        self.raise(callback);
    }

    /// Gateway drops a channel on its own.
    pub fn drop_connection(&self, channel: SessionChannel) {
        self.state.write().connected.remove(&channel);
        self.raise(GatewayCallback::ConnectionStatus(ConnectionStatus {
            channel,
            connected: false,
        }));
    }

    /// Machine network goes down or comes back.
    pub fn set_network(&self, available: bool) {
        if !available {
            self.state.write().connected.clear();
        }
        self.raise(GatewayCallback::NetworkAvailability(NetworkAvailability {
            available,
        }));
    }

    /// Fill `size` shares of an order at `price`. Returns `false` for an
    /// unknown order.
    pub fn fill(&self, client_order_id: &GatewayOrderId, size: u64, price: Decimal) -> bool {
        let report = {
            let mut state = self.state.write();
            let execution_id = state.next_id("EXEC");
            let Some(order) = state.orders.get_mut(client_order_id) else {
                return false;
            };
            let size = size.min(order.handle.quantity.saturating_sub(order.filled));
            order.filled += size;
            order.notional += price * Decimal::from(size);
            let average_price = if order.filled == 0 {
                price
            } else {
                order.notional / Decimal::from(order.filled)
            };

            ExecutionReport {
                order_id: order.wire_id(),
                execution_id: execution_id.into_inner(),
                symbol: order.handle.symbol.clone(),
                side: order.handle.side,
                price,
                size,
                average_price,
                leaves_quantity: order.handle.quantity - order.filled,
                order_size: order.handle.quantity,
            }
        };
        self.raise(GatewayCallback::Execution(report));
        true
    }

    /// Confirm a cancel the gateway decided on. Returns `false` for an
    /// unknown order.
    pub fn confirm_cancel(&self, client_order_id: &GatewayOrderId) -> bool {
        let Some(report) = self.state.read().orders.get(client_order_id).map(|order| CancelReport {
            order_id: order.wire_id(),
            symbol: order.handle.symbol.clone(),
            side: order.handle.side,
        }) else {
            return false;
        };
        self.raise(GatewayCallback::Cancel(report));
        true
    }

    /// Offer a locate without being asked. Returns the locate id.
    pub fn offer_locate(&self, symbol: Symbol, quantity: u64, price: Decimal) -> GatewayOrderId {
        let handle = {
            let mut state = self.state.write();
            let handle = LocateHandle {
                locate_id: state.next_id("LOC"),
                symbol,
                quantity,
                price,
            };
            state.offers.insert(handle.locate_id.clone(), handle.clone());
            handle
        };
        let locate_id = handle.locate_id.clone();
        self.raise(GatewayCallback::LocateRequired(handle));
        locate_id
    }

    /// Position snapshot.
    pub fn position(&self, symbol: Symbol, quantity: i64, price: Decimal) {
        self.raise(GatewayCallback::Position(PositionReport {
            symbol,
            quantity,
            price,
            avg_buy_price: if quantity > 0 { price } else { Decimal::ZERO },
            avg_sell_price: if quantity < 0 { price } else { Decimal::ZERO },
        }));
    }

    /// Level-1 quote; only raised while `symbol` is subscribed.
    pub fn quote(&self, symbol: Symbol, bid: Decimal, ask: Decimal, size: Decimal) -> bool {
        if !self.state.read().subscriptions.contains(&symbol) {
            return false;
        }
        self.raise(GatewayCallback::Quote(QuoteReport {
            symbol,
            bid_price: bid,
            bid_size: size,
            ask_price: ask,
            ask_size: size,
            timestamp: Utc::now(),
        }));
        true
    }

    /// Time-and-sales print; only raised while `symbol` is subscribed.
    pub fn trade(&self, symbol: Symbol, price: Decimal, size: Decimal) -> bool {
        if !self.state.read().subscriptions.contains(&symbol) {
            return false;
        }
        self.raise(GatewayCallback::Trade(TradeReport {
            symbol,
            price,
            size,
            timestamp: Utc::now(),
        }));
        true
    }
}

impl GatewaySession for SimulatedGateway {
    fn connect(
        &self,
        channel: SessionChannel,
        credentials: &Credentials,
        address: IpAddr,
        port: u16,
    ) -> Result<(), GatewayError> {
        let logon = {
            let mut state = self.state.write();
            state
                .record(GatewayCommand::Connect {
                    channel,
                    username: credentials.username().to_string(),
                    address,
                    port,
                })
                .map_err(|err| GatewayError::ConnectionError {
                    message: err.to_string(),
                })?;
            if state.auto_logon {
                state.connected.insert(channel);
            }
            state.auto_logon
        };
        if logon {
            self.raise(GatewayCallback::ConnectionStatus(ConnectionStatus {
                channel,
                connected: true,
            }));
        }
        Ok(())
    }

    fn disconnect(&self, channel: SessionChannel) -> Result<(), GatewayError> {
        let was_connected = {
            let mut state = self.state.write();
            state.record(GatewayCommand::Disconnect { channel })?;
            state.connected.remove(&channel)
        };
        if was_connected {
            self.raise(GatewayCallback::ConnectionStatus(ConnectionStatus {
                channel,
                connected: false,
            }));
        }
        Ok(())
    }

    fn is_connected(&self, channel: SessionChannel) -> Result<bool, GatewayError> {
        Ok(self.state.read().connected.contains(&channel))
    }

    fn create_order(&self, spec: &OrderSpec) -> Result<OrderHandle, GatewayError> {
        let mut state = self.state.write();
        let client_order_id = state.next_id("SIM");
        state.record(GatewayCommand::CreateOrder {
            client_order_id: client_order_id.clone(),
        })?;

        let handle = OrderHandle {
            client_order_id: client_order_id.clone(),
            symbol: spec.symbol.clone(),
            side: spec.side,
            quantity: spec.quantity,
            limit_price: spec.limit_price,
        };
        state.orders.insert(
            client_order_id,
            SimOrder {
                handle: handle.clone(),
                permanent_id: None,
                filled: 0,
                notional: Decimal::ZERO,
            },
        );
        Ok(handle)
    }

    fn send_order(&self, handle: &OrderHandle) -> Result<(), GatewayError> {
        let callback = {
            let mut state = self.state.write();
            state.record(GatewayCommand::SendOrder {
                client_order_id: handle.client_order_id.clone(),
            })?;
            if !state.connected.contains(&SessionChannel::Orders) {
                return Err(GatewayError::SessionUnavailable);
            }

            if !state.orders.contains_key(&handle.client_order_id) {
                return Err(GatewayError::UnknownHandle {
                    client_order_id: handle.client_order_id.to_string(),
                });
            }

            if handle.side.is_short_sale() && state.hard_to_borrow.contains(&handle.symbol) {
                state.orders.remove(&handle.client_order_id);
                GatewayCallback::Reject(RejectReport {
                    client_order_id: handle.client_order_id.clone(),
                    order_id: None,
                    symbol: handle.symbol.clone(),
                    side: handle.side,
                    quantity: handle.quantity,
                    reason: HARD_TO_BORROW_REASON.to_string(),
                })
            } else {
                let permanent_id = state.next_id("ORD");
                if let Some(order) = state.orders.get_mut(&handle.client_order_id) {
                    order.permanent_id = Some(permanent_id.clone());
                }
                GatewayCallback::OrderUpdate(OrderUpdate {
                    client_order_id: handle.client_order_id.clone(),
                    order_id: permanent_id,
                    symbol: handle.symbol.clone(),
                    side: handle.side,
                    quantity: handle.quantity,
                    status: GatewayOrderStatus::Live,
                    placed_at: Some(Utc::now()),
                })
            }
        };
        self.raise(callback);
        Ok(())
    }

    fn cancel_order(&self, handle: &OrderHandle) -> Result<(), GatewayError> {
        let report = {
            let mut state = self.state.write();
            state.record(GatewayCommand::CancelOrder {
                client_order_id: handle.client_order_id.clone(),
            })?;
            let Some(order) = state.orders.remove(&handle.client_order_id) else {
                return Err(GatewayError::UnknownHandle {
                    client_order_id: handle.client_order_id.to_string(),
                });
            };
            CancelReport {
                order_id: order.wire_id(),
                symbol: order.handle.symbol,
                side: order.handle.side,
            }
        };
        self.raise(GatewayCallback::Cancel(report));
        Ok(())
    }

    fn accept_locate(&self, handle: &LocateHandle) -> Result<(), GatewayError> {
        let report = {
            let mut state = self.state.write();
            state.record(GatewayCommand::AcceptLocate {
                locate_id: handle.locate_id.clone(),
            })?;
            if state.offers.remove(&handle.locate_id).is_none() {
                return Err(GatewayError::UnknownHandle {
                    client_order_id: handle.locate_id.to_string(),
                });
            }
            ExecutionReport {
                order_id: handle.locate_id.clone(),
                execution_id: state.next_id("EXEC").into_inner(),
                symbol: handle.symbol.clone(),
                side: OrderSide::Short,
                price: handle.price,
                size: handle.quantity,
                average_price: handle.price,
                leaves_quantity: 0,
                order_size: handle.quantity,
            }
        };
        self.raise(GatewayCallback::Execution(report));
        Ok(())
    }

    fn request_locate(&self, symbol: &Symbol, quantity: u64) -> Result<(), GatewayError> {
        let price = {
            let mut state = self.state.write();
            state.record(GatewayCommand::RequestLocate {
                symbol: symbol.clone(),
                quantity,
            })?;
            state.locate_price
        };
        self.offer_locate(symbol.clone(), quantity, price);
        Ok(())
    }

    fn subscribe_ticks(&self, symbol: &Symbol) -> Result<(), GatewayError> {
        let mut state = self.state.write();
        state.record(GatewayCommand::SubscribeTicks {
            symbol: symbol.clone(),
        })?;
        state.subscriptions.insert(symbol.clone());
        Ok(())
    }

    fn unsubscribe_ticks(&self, symbol: &Symbol) -> Result<(), GatewayError> {
        let mut state = self.state.write();
        state.record(GatewayCommand::UnsubscribeTicks {
            symbol: symbol.clone(),
        })?;
        state.subscriptions.remove(symbol);
        Ok(())
    }

    fn request_historic_bars(&self, request: &HistoricBarRequest) -> Result<(), GatewayError> {
        let price = {
            let mut state = self.state.write();
            state.record(GatewayCommand::RequestHistoricBars {
                request_id: request.request_id,
                symbol: request.symbol.clone(),
                bar_type: request.bar_type,
            })?;
            if !state.connected.contains(&SessionChannel::MarketData) {
                return Err(GatewayError::SessionUnavailable);
            }
            state.bar_price
        };

        let step = bar_step(request.bar_type, request.interval);
        let mut bars = Vec::new();
        let mut timestamp = request.start;
        while timestamp <= request.end && bars.len() < MAX_BARS {
            bars.push(Bar {
                timestamp,
                open: price,
                high: price,
                low: price,
                close: price,
                volume: 100,
            });
            timestamp += step;
        }
        debug!(request_id = request.request_id, bars = bars.len(), "Simulated historic bars");

        self.raise(GatewayCallback::HistoricBars(HistoricBarsReport {
            request_id: request.request_id,
            symbol: request.symbol.clone(),
            bars,
        }));
        Ok(())
    }
}

/// Spacing between simulated bars. Intraday and tick bars use `interval`
/// seconds, at least one.
fn bar_step(bar_type: BarType, interval: u32) -> TimeDelta {
    match bar_type {
        BarType::Intraday | BarType::Tick => TimeDelta::seconds(i64::from(interval.max(1))),
        BarType::Daily => TimeDelta::days(1),
        BarType::Weekly => TimeDelta::weeks(1),
        BarType::Monthly => TimeDelta::days(30),
    }
}

/// Factory over a shared [`SimulatedGateway`] that counts rebuilds.
#[derive(Debug)]
pub struct SimulatedGatewayFactory {
    gateway: Arc<SimulatedGateway>,
}

impl GatewaySessionFactory for SimulatedGatewayFactory {
    fn create(&self) -> Arc<dyn GatewaySession> {
        self.gateway.sessions_created.fetch_add(1, Ordering::SeqCst);
        Arc::clone(&self.gateway) as Arc<dyn GatewaySession>
    }
}
