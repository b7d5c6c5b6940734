//! Locate Workflow
//!
//! Hard-to-borrow locates run beside the order flow and are keyed by symbol:
//!
//! - the broker raises a locate offer; the application accepts or declines it
//! - an accepted offer attributes the symbol to an application order, so an
//!   execution that matches no known order id can still be routed
//! - a hard-to-borrow rejection triggers an application-side locate request

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::session::SessionScopedState;
use crate::application::ports::{EventSink, GatewayError, GatewaySession, LocateHandle};
use crate::domain::events::GatewayEvent;
use crate::domain::orders::{LimitOrder, OrderSide};
use crate::domain::shared::{GatewayOrderId, LocalOrderId, Symbol};
use crate::infrastructure::metrics;

/// Failure while answering or requesting a locate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocateError {
    /// No pending offer with that id.
    #[error("Unknown locate: {locate_id}")]
    UnknownLocate {
        /// The locate id.
        locate_id: String,
    },

    /// Gateway refused the command.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Default)]
struct LocateIndices {
    pending: HashMap<GatewayOrderId, LocateHandle>,
    attribution: HashMap<Symbol, LocalOrderId>,
}

/// Pending locate offers plus the symbol attribution index.
#[derive(Debug, Default)]
pub struct LocateBook {
    inner: RwLock<LocateIndices>,
}

impl LocateBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a broker-raised offer. A repeated id replaces the earlier terms.
    pub fn insert_pending(&self, handle: LocateHandle) {
        self.inner
            .write()
            .pending
            .insert(handle.locate_id.clone(), handle);
    }

    /// Remove and return a pending offer.
    pub fn take_pending(&self, locate_id: &GatewayOrderId) -> Option<LocateHandle> {
        self.inner.write().pending.remove(locate_id)
    }

    /// Attribute future unmatched executions for `symbol` to `local_id`.
    ///
    /// The most recent attribution for a symbol wins; the one it replaced
    /// is returned.
    pub fn attribute(&self, symbol: Symbol, local_id: LocalOrderId) -> Option<LocalOrderId> {
        self.inner.write().attribution.insert(symbol, local_id)
    }

    /// Look at the attribution for `symbol` without consuming it.
    #[must_use]
    pub fn attribution(&self, symbol: &Symbol) -> Option<LocalOrderId> {
        self.inner.read().attribution.get(symbol).cloned()
    }

    /// Consume the attribution for `symbol`.
    pub fn take_attribution(&self, symbol: &Symbol) -> Option<LocalOrderId> {
        self.inner.write().attribution.remove(symbol)
    }

    /// Number of offers awaiting an answer.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.read().pending.len()
    }

    /// Number of symbols with an attribution.
    #[must_use]
    pub fn attribution_len(&self) -> usize {
        self.inner.read().attribution.len()
    }
}

impl SessionScopedState for LocateBook {
    fn name(&self) -> &'static str {
        "locates"
    }

    fn reset(&self) -> usize {
        let mut inner = self.inner.write();
        let dropped = inner.pending.len() + inner.attribution.len();
        inner.pending.clear();
        inner.attribution.clear();
        metrics::set_pending_locates(0);
        dropped
    }
}

/// Drives the locate workflow against the book and the gateway.
pub struct LocateCoordinator {
    book: Arc<LocateBook>,
    sink: Arc<dyn EventSink>,
    provider: String,
}

impl LocateCoordinator {
    /// Create a coordinator over `book`.
    #[must_use]
    pub fn new(book: Arc<LocateBook>, sink: Arc<dyn EventSink>, provider: impl Into<String>) -> Self {
        Self {
            book,
            sink,
            provider: provider.into(),
        }
    }

    /// The book this coordinator writes to.
    #[must_use]
    pub const fn book(&self) -> &Arc<LocateBook> {
        &self.book
    }

    /// Broker raised a locate offer: record it and ask the application.
    pub fn on_locate_required(&self, handle: LocateHandle) {
        info!(
            locate_id = %handle.locate_id,
            symbol = %handle.symbol,
            quantity = handle.quantity,
            price = %handle.price,
            "Locate offer received"
        );

        let order = LimitOrder::new(
            LocalOrderId::new(handle.locate_id.as_str()),
            handle.symbol.clone(),
            OrderSide::Short,
            handle.quantity,
            handle.price,
        )
        .with_provider(self.provider.clone());

        self.book.insert_pending(handle);
        metrics::set_pending_locates(self.book.pending_len());
        self.sink.publish(GatewayEvent::LocateRequested { order });
    }

    /// Answer a pending offer on behalf of `owner`.
    ///
    /// The offer is removed whether accepted or declined. On accept the
    /// symbol is attributed to `owner` before the gateway is told, so an
    /// execution racing the accept command still finds its order.
    pub fn respond(
        &self,
        session: &dyn GatewaySession,
        locate_id: &GatewayOrderId,
        owner: LocalOrderId,
        accept: bool,
    ) -> Result<(), LocateError> {
        let handle = self
            .book
            .take_pending(locate_id)
            .ok_or_else(|| LocateError::UnknownLocate {
                locate_id: locate_id.to_string(),
            })?;
        metrics::set_pending_locates(self.book.pending_len());

        if !accept {
            info!(locate_id = %locate_id, symbol = %handle.symbol, "Locate declined");
            return Ok(());
        }

        info!(
            locate_id = %locate_id,
            symbol = %handle.symbol,
            owner = %owner,
            "Locate accepted"
        );
        let replaced = self.book.attribute(handle.symbol.clone(), owner);
        if let Err(err) = session.accept_locate(&handle) {
            warn!(locate_id = %locate_id, error = %err, "Locate accept failed, attribution withdrawn");
            match replaced {
                Some(previous) => {
                    self.book.attribute(handle.symbol.clone(), previous);
                }
                None => {
                    self.book.take_attribution(&handle.symbol);
                }
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Ask the broker to locate shares after a hard-to-borrow rejection.
    pub fn request_locate(
        &self,
        session: &dyn GatewaySession,
        symbol: &Symbol,
        quantity: u64,
    ) -> Result<(), LocateError> {
        info!(symbol = %symbol, quantity, "Requesting locate for hard-to-borrow short");
        session.request_locate(symbol, quantity)?;
        Ok(())
    }

    /// Owner of an execution that matched no tracked order.
    ///
    /// A partial fill leaves the attribution in place for the fills still to
    /// come; the completing fill consumes it.
    pub fn attribute_execution(&self, symbol: &Symbol, completes: bool) -> Option<LocalOrderId> {
        let owner = if completes {
            self.book.take_attribution(symbol)
        } else {
            self.book.attribution(symbol)
        };
        if owner.is_none() {
            debug!(symbol = %symbol, "No locate attribution for symbol");
        }
        owner
    }
}

impl std::fmt::Debug for LocateCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocateCoordinator")
            .field("book", &self.book)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::application::ports::{MockGatewaySession, RecordingEventSink};

    fn offer(id: &str, symbol: &str, quantity: u64) -> LocateHandle {
        LocateHandle {
            locate_id: GatewayOrderId::new(id),
            symbol: Symbol::new(symbol),
            quantity,
            price: dec!(0.05),
        }
    }

    fn coordinator() -> (LocateCoordinator, Arc<RecordingEventSink>) {
        let sink = Arc::new(RecordingEventSink::new());
        let coordinator =
            LocateCoordinator::new(Arc::new(LocateBook::new()), sink.clone(), "Blackwood");
        (coordinator, sink)
    }

    #[test]
    fn offer_is_recorded_and_announced() {
        let (coordinator, sink) = coordinator();
        coordinator.on_locate_required(offer("LC1", "ABC", 100));

        assert_eq!(coordinator.book().pending_len(), 1);
        let events = sink.events();
        assert_eq!(events.len(), 1);
        let GatewayEvent::LocateRequested { order } = &events[0] else {
            panic!("expected locate request, got {:?}", events[0]);
        };
        assert_eq!(order.local_id.as_str(), "LC1");
        assert_eq!(order.symbol.as_str(), "ABC");
        assert_eq!(order.quantity, 100);
        assert_eq!(order.limit_price, dec!(0.05));
        assert_eq!(order.provider, "Blackwood");
    }

    #[test]
    fn accept_attributes_symbol_and_forwards() {
        let (coordinator, _sink) = coordinator();
        coordinator.on_locate_required(offer("LC1", "ABC", 100));

        let mut session = MockGatewaySession::new();
        session
            .expect_accept_locate()
            .withf(|handle| handle.locate_id.as_str() == "LC1")
            .times(1)
            .returning(|_| Ok(()));

        coordinator
            .respond(&session, &GatewayOrderId::new("LC1"), LocalOrderId::new("S1"), true)
            .unwrap();

        assert_eq!(coordinator.book().pending_len(), 0);
        assert_eq!(
            coordinator.attribute_execution(&Symbol::new("ABC"), false),
            Some(LocalOrderId::new("S1"))
        );
        assert_eq!(
            coordinator.attribute_execution(&Symbol::new("ABC"), true),
            Some(LocalOrderId::new("S1"))
        );
        assert_eq!(coordinator.attribute_execution(&Symbol::new("ABC"), true), None);
    }

    #[test]
    fn failed_accept_withdraws_attribution() {
        let (coordinator, _sink) = coordinator();
        coordinator.on_locate_required(offer("LC1", "ABC", 100));

        let mut session = MockGatewaySession::new();
        session
            .expect_accept_locate()
            .times(1)
            .returning(|_| Err(GatewayError::SessionUnavailable));

        let result =
            coordinator.respond(&session, &GatewayOrderId::new("LC1"), LocalOrderId::new("S1"), true);

        assert!(matches!(
            result,
            Err(LocateError::Gateway(GatewayError::SessionUnavailable))
        ));
        assert_eq!(coordinator.book().pending_len(), 0);
        assert_eq!(coordinator.book().attribution_len(), 0);
        assert_eq!(coordinator.attribute_execution(&Symbol::new("ABC"), true), None);
    }

    #[test]
    fn failed_accept_restores_earlier_attribution() {
        let (coordinator, _sink) = coordinator();
        coordinator
            .book()
            .attribute(Symbol::new("ABC"), LocalOrderId::new("S0"));
        coordinator.on_locate_required(offer("LC2", "ABC", 100));

        let mut session = MockGatewaySession::new();
        session
            .expect_accept_locate()
            .returning(|_| Err(GatewayError::SessionUnavailable));

        assert!(
            coordinator
                .respond(&session, &GatewayOrderId::new("LC2"), LocalOrderId::new("S1"), true)
                .is_err()
        );
        assert_eq!(
            coordinator.book().attribution(&Symbol::new("ABC")),
            Some(LocalOrderId::new("S0"))
        );
    }

    #[test]
    fn decline_drops_offer_without_gateway_call() {
        let (coordinator, _sink) = coordinator();
        coordinator.on_locate_required(offer("LC1", "ABC", 100));

        let mut session = MockGatewaySession::new();
        session.expect_accept_locate().never();

        coordinator
            .respond(&session, &GatewayOrderId::new("LC1"), LocalOrderId::new("S1"), false)
            .unwrap();

        assert_eq!(coordinator.book().pending_len(), 0);
        assert_eq!(coordinator.book().attribution_len(), 0);
    }

    #[test]
    fn unknown_locate_is_an_error() {
        let (coordinator, _sink) = coordinator();
        let session = MockGatewaySession::new();

        let result =
            coordinator.respond(&session, &GatewayOrderId::new("nope"), LocalOrderId::new("S1"), true);
        assert!(matches!(result, Err(LocateError::UnknownLocate { .. })));
    }

    #[test]
    fn latest_attribution_wins() {
        let book = LocateBook::new();
        book.attribute(Symbol::new("ABC"), LocalOrderId::new("S1"));
        book.attribute(Symbol::new("ABC"), LocalOrderId::new("S2"));

        assert_eq!(book.take_attribution(&Symbol::new("ABC")), Some(LocalOrderId::new("S2")));
    }

    #[test]
    fn reset_clears_offers_and_attributions() {
        let book = LocateBook::new();
        book.insert_pending(offer("LC1", "ABC", 100));
        book.attribute(Symbol::new("XYZ"), LocalOrderId::new("S1"));

        assert_eq!(book.reset(), 2);
        assert_eq!(book.pending_len(), 0);
        assert_eq!(book.take_attribution(&Symbol::new("XYZ")), None);
    }

    #[test]
    fn reset_zeroes_pending_gauge() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let (coordinator, _sink) = coordinator();

        ::metrics::with_local_recorder(&recorder, || {
            coordinator.on_locate_required(offer("LC1", "ABC", 100));
            coordinator.on_locate_required(offer("LC2", "XYZ", 100));
            assert_eq!(
                metrics::rendered_gauge(&handle, "gateway_bridge_pending_locates"),
                Some(2.0)
            );
            coordinator.book().reset();
        });

        assert_eq!(
            metrics::rendered_gauge(&handle, "gateway_bridge_pending_locates"),
            Some(0.0)
        );
    }

    #[test]
    fn request_locate_forwards_symbol_and_size() {
        let (coordinator, _sink) = coordinator();
        let mut session = MockGatewaySession::new();
        session
            .expect_request_locate()
            .withf(|symbol, quantity| symbol.as_str() == "ABC" && *quantity == 300)
            .times(1)
            .returning(|_, _| Ok(()));

        coordinator
            .request_locate(&session, &Symbol::new("ABC"), 300)
            .unwrap();
    }
}
