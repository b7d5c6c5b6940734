//! Market Data Feed
//!
//! Tick subscriptions on the market-data channel, normalization of quote
//! and trade callbacks into [`Tick`] events, and historic bar requests.
//!
//! Subscriptions are reference counted: the gateway sees one subscribe when
//! a symbol's count goes 0→1 and one unsubscribe when it returns to 0. The
//! set survives disconnects and is replayed after every logon.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::reconciler::Reconciliation;
use super::session::SessionManager;
use crate::application::ports::{EventSink, HistoricBarsReport, QuoteReport, TradeReport};
use crate::domain::events::GatewayEvent;
use crate::domain::market::{HistoricBarRequest, HistoricBars, Tick};
use crate::domain::session::SessionState;
use crate::domain::shared::Symbol;

/// Tick subscriptions and normalization for one market-data session.
pub struct MarketDataFeed {
    session: Arc<SessionManager>,
    subscriptions: RwLock<BTreeMap<Symbol, usize>>,
    sink: Arc<dyn EventSink>,
}

impl MarketDataFeed {
    /// Create a feed over a market-data session.
    #[must_use]
    pub fn new(session: Arc<SessionManager>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            session,
            subscriptions: RwLock::new(BTreeMap::new()),
            sink,
        }
    }

    /// The market-data session.
    #[must_use]
    pub const fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Subscribe to ticks for `symbol`.
    ///
    /// While logged off the subscription is only recorded; it goes to the
    /// gateway on the next logon. Returns `false` if the gateway refused it.
    pub fn subscribe_ticks(&self, symbol: &Symbol) -> bool {
        let first = {
            let mut subscriptions = self.subscriptions.write();
            let count = subscriptions.entry(symbol.clone()).or_insert(0);
            *count += 1;
            *count == 1
        };

        if !first || self.session.state() != SessionState::Connected {
            debug!(symbol = %symbol, "Tick subscription recorded");
            return true;
        }

        match self.session.session().subscribe_ticks(symbol) {
            Ok(()) => {
                info!(symbol = %symbol, "Subscribed to ticks");
                true
            }
            Err(err) => {
                error!(symbol = %symbol, error = %err, "Tick subscribe failed");
                self.release(symbol);
                false
            }
        }
    }

    /// Drop one subscription to `symbol`.
    ///
    /// Returns `false` if there was none, or the gateway refused the
    /// unsubscribe.
    pub fn unsubscribe_ticks(&self, symbol: &Symbol) -> bool {
        let Some(last) = self.release(symbol) else {
            debug!(symbol = %symbol, "Unsubscribe for symbol with no subscription");
            return false;
        };

        if !last || self.session.state() != SessionState::Connected {
            return true;
        }

        match self.session.session().unsubscribe_ticks(symbol) {
            Ok(()) => {
                info!(symbol = %symbol, "Unsubscribed from ticks");
                true
            }
            Err(err) => {
                error!(symbol = %symbol, error = %err, "Tick unsubscribe failed");
                false
            }
        }
    }

    /// Send every recorded subscription to the gateway. Returns how many were
    /// accepted.
    pub fn resubscribe_all(&self) -> usize {
        let symbols = self.subscribed_symbols();
        let session = self.session.session();

        let accepted = symbols
            .iter()
            .filter(|symbol| match session.subscribe_ticks(symbol) {
                Ok(()) => true,
                Err(err) => {
                    error!(symbol = %symbol, error = %err, "Tick resubscribe failed");
                    false
                }
            })
            .count();

        if !symbols.is_empty() {
            info!(accepted, total = symbols.len(), "Tick subscriptions replayed");
        }
        accepted
    }

    /// Symbols with at least one subscription, in order.
    #[must_use]
    pub fn subscribed_symbols(&self) -> Vec<Symbol> {
        self.subscriptions.read().keys().cloned().collect()
    }

    /// Quote callback.
    pub fn on_quote(&self, quote: &QuoteReport) -> Reconciliation {
        if !self.is_subscribed(&quote.symbol) {
            return Reconciliation::Ignored;
        }
        self.sink.publish(GatewayEvent::Tick(Tick {
            symbol: quote.symbol.clone(),
            provider: self.session.provider().to_string(),
            timestamp: quote.timestamp,
            bid_price: Some(quote.bid_price),
            bid_size: Some(quote.bid_size),
            ask_price: Some(quote.ask_price),
            ask_size: Some(quote.ask_size),
            last_price: None,
            last_size: None,
        }));
        Reconciliation::Emitted
    }

    /// Trade callback.
    pub fn on_trade(&self, trade: &TradeReport) -> Reconciliation {
        if !self.is_subscribed(&trade.symbol) {
            return Reconciliation::Ignored;
        }
        self.sink.publish(GatewayEvent::Tick(Tick {
            symbol: trade.symbol.clone(),
            provider: self.session.provider().to_string(),
            timestamp: trade.timestamp,
            bid_price: None,
            bid_size: None,
            ask_price: None,
            ask_size: None,
            last_price: Some(trade.price),
            last_size: Some(trade.size),
        }));
        Reconciliation::Emitted
    }

    /// Ask the gateway for a range of bars; they arrive as a
    /// [`GatewayEvent::HistoricBars`] carrying the same request id.
    ///
    /// Unlike tick subscriptions nothing is deferred: the request is refused
    /// while logged off, and when `start` is after `end`.
    pub fn request_historic_bars(&self, request: &HistoricBarRequest) -> bool {
        if request.start > request.end {
            warn!(
                request_id = request.request_id,
                symbol = %request.symbol,
                start = %request.start,
                end = %request.end,
                "Historic request with start after end"
            );
            return false;
        }
        if self.session.state() != SessionState::Connected {
            warn!(request_id = request.request_id, symbol = %request.symbol, "Historic request while logged off");
            return false;
        }

        match self.session.session().request_historic_bars(request) {
            Ok(()) => {
                info!(
                    request_id = request.request_id,
                    symbol = %request.symbol,
                    bar_type = %request.bar_type,
                    interval = request.interval,
                    "Historic bars requested"
                );
                true
            }
            Err(err) => {
                error!(request_id = request.request_id, symbol = %request.symbol, error = %err, "Historic request failed");
                false
            }
        }
    }

    /// Historic bars callback.
    pub fn on_historic_bars(&self, report: HistoricBarsReport) -> Reconciliation {
        debug!(
            request_id = report.request_id,
            symbol = %report.symbol,
            bars = report.bars.len(),
            "Historic bars received"
        );
        self.sink.publish(GatewayEvent::HistoricBars(HistoricBars {
            request_id: report.request_id,
            symbol: report.symbol,
            provider: self.session.provider().to_string(),
            bars: report.bars,
            received_at: Utc::now(),
        }));
        Reconciliation::Emitted
    }

    fn is_subscribed(&self, symbol: &Symbol) -> bool {
        self.subscriptions.read().contains_key(symbol)
    }

    /// Decrement a symbol's count. `Some(true)` when it reached zero.
    fn release(&self, symbol: &Symbol) -> Option<bool> {
        let mut subscriptions = self.subscriptions.write();
        let count = subscriptions.get_mut(symbol)?;
        *count -= 1;
        if *count == 0 {
            subscriptions.remove(symbol);
            Some(true)
        } else {
            Some(false)
        }
    }
}

impl std::fmt::Debug for MarketDataFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataFeed")
            .field("subscriptions", &*self.subscriptions.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::application::ports::{
        FixedSessionFactory, GatewayError, GatewaySession, MockGatewaySession, RecordingEventSink,
    };
    use crate::domain::market::{Bar, BarType};
    use crate::domain::session::{ConnectionParams, Credentials, SessionChannel};

    fn feed(session: MockGatewaySession) -> (MarketDataFeed, Arc<RecordingEventSink>) {
        let session: Arc<dyn GatewaySession> = Arc::new(session);
        let sink = Arc::new(RecordingEventSink::new());
        let manager = SessionManager::new(
            SessionChannel::MarketData,
            ConnectionParams::new(Credentials::new("u", "p"), "127.0.0.1", 1, 2),
            Arc::new(FixedSessionFactory::new(session)),
            sink.clone(),
        );
        (MarketDataFeed::new(manager, sink.clone()), sink)
    }

    fn logged_on(feed: &MarketDataFeed) {
        feed.session().on_connection_status(true);
    }

    #[test]
    fn subscribe_while_logged_off_is_deferred() {
        let mut session = MockGatewaySession::new();
        session.expect_subscribe_ticks().never();
        let (feed, _sink) = feed(session);

        assert!(feed.subscribe_ticks(&Symbol::new("ABC")));
        assert_eq!(feed.subscribed_symbols(), vec![Symbol::new("ABC")]);
    }

    #[test]
    fn second_subscriber_does_not_resubscribe_upstream() {
        let mut session = MockGatewaySession::new();
        session.expect_subscribe_ticks().times(1).returning(|_| Ok(()));
        session.expect_unsubscribe_ticks().times(1).returning(|_| Ok(()));
        let (feed, _sink) = feed(session);
        logged_on(&feed);

        let abc = Symbol::new("ABC");
        assert!(feed.subscribe_ticks(&abc));
        assert!(feed.subscribe_ticks(&abc));
        assert!(feed.unsubscribe_ticks(&abc));
        assert!(feed.unsubscribe_ticks(&abc));
        assert!(!feed.unsubscribe_ticks(&abc));
        assert!(feed.subscribed_symbols().is_empty());
    }

    #[test]
    fn refused_subscribe_is_rolled_back() {
        let mut session = MockGatewaySession::new();
        session
            .expect_subscribe_ticks()
            .returning(|_| Err(GatewayError::SessionUnavailable));
        let (feed, _sink) = feed(session);
        logged_on(&feed);

        assert!(!feed.subscribe_ticks(&Symbol::new("ABC")));
        assert!(feed.subscribed_symbols().is_empty());
    }

    #[test]
    fn resubscribe_replays_every_symbol() {
        let mut session = MockGatewaySession::new();
        session.expect_subscribe_ticks().times(2).returning(|_| Ok(()));
        let (feed, _sink) = feed(session);

        feed.subscribe_ticks(&Symbol::new("ABC"));
        feed.subscribe_ticks(&Symbol::new("XYZ"));
        assert_eq!(feed.resubscribe_all(), 2);
    }

    #[test]
    fn quotes_and_trades_become_ticks() {
        let (feed, sink) = feed(MockGatewaySession::new());
        feed.subscribe_ticks(&Symbol::new("ABC"));

        feed.on_quote(&QuoteReport {
            symbol: Symbol::new("ABC"),
            bid_price: dec!(10.00),
            bid_size: dec!(300),
            ask_price: dec!(10.02),
            ask_size: dec!(100),
            timestamp: Utc::now(),
        });
        feed.on_trade(&TradeReport {
            symbol: Symbol::new("ABC"),
            price: dec!(10.01),
            size: dec!(50),
            timestamp: Utc::now(),
        });
        let ignored = feed.on_trade(&TradeReport {
            symbol: Symbol::new("NOPE"),
            price: dec!(1),
            size: dec!(1),
            timestamp: Utc::now(),
        });

        assert_eq!(ignored, Reconciliation::Ignored);
        let ticks: Vec<Tick> = sink
            .events()
            .into_iter()
            .filter_map(|event| match event {
                GatewayEvent::Tick(tick) => Some(tick),
                _ => None,
            })
            .collect();
        assert_eq!(ticks.len(), 2);
        assert!(ticks[0].has_quote() && !ticks[0].has_trade());
        assert!(ticks[1].has_trade() && !ticks[1].has_quote());
        assert_eq!(ticks[1].last_price, Some(dec!(10.01)));
    }

    fn daily_request(start_offset_days: i64) -> HistoricBarRequest {
        let end = Utc::now();
        HistoricBarRequest::new(
            42,
            Symbol::new("ABC"),
            BarType::Daily,
            end - TimeDelta::days(start_offset_days),
            end,
            0,
        )
    }

    #[test]
    fn historic_request_goes_to_the_gateway_when_logged_on() {
        let mut session = MockGatewaySession::new();
        session
            .expect_request_historic_bars()
            .withf(|request| request.request_id == 42 && request.bar_type == BarType::Daily)
            .times(1)
            .returning(|_| Ok(()));
        let (feed, _sink) = feed(session);
        logged_on(&feed);

        assert!(feed.request_historic_bars(&daily_request(5)));
    }

    #[test]
    fn historic_request_is_refused_while_logged_off() {
        let mut session = MockGatewaySession::new();
        session.expect_request_historic_bars().never();
        let (feed, _sink) = feed(session);

        assert!(!feed.request_historic_bars(&daily_request(5)));
    }

    #[test]
    fn inverted_range_is_refused() {
        let mut session = MockGatewaySession::new();
        session.expect_request_historic_bars().never();
        let (feed, _sink) = feed(session);
        logged_on(&feed);

        assert!(!feed.request_historic_bars(&daily_request(-1)));
    }

    #[test]
    fn gateway_fault_on_historic_request_reads_false() {
        let mut session = MockGatewaySession::new();
        session
            .expect_request_historic_bars()
            .returning(|_| Err(GatewayError::SessionUnavailable));
        let (feed, _sink) = feed(session);
        logged_on(&feed);

        assert!(!feed.request_historic_bars(&daily_request(1)));
    }

    #[test]
    fn historic_answer_becomes_an_event() {
        let (feed, sink) = feed(MockGatewaySession::new());
        let timestamp = Utc::now();
        let bar = Bar {
            timestamp,
            open: dec!(10),
            high: dec!(11),
            low: dec!(9.5),
            close: dec!(10.5),
            volume: 1_000,
        };

        let outcome = feed.on_historic_bars(HistoricBarsReport {
            request_id: 42,
            symbol: Symbol::new("ABC"),
            bars: vec![bar.clone()],
        });

        assert_eq!(outcome, Reconciliation::Emitted);
        let events = sink.drain();
        let [GatewayEvent::HistoricBars(answer)] = events.as_slice() else {
            panic!("expected historic bars, got {events:?}");
        };
        assert_eq!(answer.request_id, 42);
        assert_eq!(answer.provider, "Blackwood");
        assert_eq!(answer.bars, vec![bar]);
        assert!(events[0].is_market_data_event());
    }
}
