//! Order Identity Table
//!
//! Bidirectional mapping between application order ids and gateway order ids
//! for every in-flight order.
//!
//! Both indices sit behind one `RwLock`, so a reader can never see the
//! gateway index pointing at a record the local index has already dropped.
//! Order throughput is low next to tick throughput; a single lock is enough.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::session::SessionScopedState;
use crate::application::ports::OrderHandle;
use crate::domain::shared::{GatewayOrderId, LocalOrderId};
use crate::infrastructure::metrics;

/// One in-flight order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    /// Application order ID.
    pub local_id: LocalOrderId,
    /// Current gateway ID (client-assigned, then permanent).
    pub gateway_id: GatewayOrderId,
    /// Native order handle.
    pub handle: OrderHandle,
    /// Whether the gateway has acknowledged the order as live.
    pub acknowledged: bool,
}

#[derive(Debug, Default)]
struct Indices {
    by_local: HashMap<LocalOrderId, OrderRecord>,
    by_gateway: HashMap<GatewayOrderId, LocalOrderId>,
}

impl Indices {
    fn take_local(&mut self, local_id: &LocalOrderId) -> Option<OrderRecord> {
        let record = self.by_local.remove(local_id)?;
        self.by_gateway.remove(&record.gateway_id);
        Some(record)
    }
}

/// Thread-safe identity table shared by the bridge's components.
#[derive(Debug, Default)]
pub struct OrderIdentityTable {
    inner: RwLock<Indices>,
}

impl OrderIdentityTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record under both keys.
    ///
    /// Returns `false` (and changes nothing) if the local id is already
    /// tracked or the gateway id already belongs to another order.
    pub fn register(
        &self,
        local_id: LocalOrderId,
        gateway_id: GatewayOrderId,
        handle: OrderHandle,
    ) -> bool {
        let mut inner = self.inner.write();

        if inner.by_local.contains_key(&local_id) {
            warn!(local_id = %local_id, "Order already registered, ignoring");
            return false;
        }
        if inner.by_gateway.contains_key(&gateway_id) {
            warn!(
                local_id = %local_id,
                gateway_id = %gateway_id,
                "Gateway id already mapped to another order, ignoring"
            );
            return false;
        }

        inner.by_gateway.insert(gateway_id.clone(), local_id.clone());
        inner.by_local.insert(
            local_id.clone(),
            OrderRecord {
                local_id,
                gateway_id,
                handle,
                acknowledged: false,
            },
        );
        true
    }

    /// Re-key the gateway index from `old` to `new` and mark the order
    /// acknowledged.
    ///
    /// Returns the local id that now resolves through `new`, or `None` if
    /// `old` is unknown, the order was already promoted, or `new` already
    /// belongs to a different order.
    pub fn promote_id(&self, old: &GatewayOrderId, new: GatewayOrderId) -> Option<LocalOrderId> {
        let mut inner = self.inner.write();

        let Some(local_id) = inner.by_gateway.get(old).cloned() else {
            debug!(gateway_id = %old, "Promotion for unknown gateway id");
            return None;
        };
        if inner.by_local.get(&local_id).is_none_or(|record| record.acknowledged) {
            debug!(local_id = %local_id, gateway_id = %old, "Order already promoted");
            return None;
        }
        if let Some(existing) = inner.by_gateway.get(&new)
            && *existing != local_id
        {
            warn!(
                old = %old,
                new = %new,
                owner = %existing,
                "Permanent id already mapped to another order, not promoting"
            );
            return None;
        }

        inner.by_gateway.remove(old);
        inner.by_gateway.insert(new.clone(), local_id.clone());
        if let Some(record) = inner.by_local.get_mut(&local_id) {
            record.gateway_id = new;
            record.acknowledged = true;
        }
        Some(local_id)
    }

    /// Look up the local id for a gateway id.
    #[must_use]
    pub fn resolve_by_gateway_id(&self, gateway_id: &GatewayOrderId) -> Option<LocalOrderId> {
        self.inner.read().by_gateway.get(gateway_id).cloned()
    }

    /// Copy of the record for a gateway id.
    #[must_use]
    pub fn record_by_gateway_id(&self, gateway_id: &GatewayOrderId) -> Option<OrderRecord> {
        let inner = self.inner.read();
        let local_id = inner.by_gateway.get(gateway_id)?;
        inner.by_local.get(local_id).cloned()
    }

    /// Copy of the record for a local id.
    #[must_use]
    pub fn record_by_local_id(&self, local_id: &LocalOrderId) -> Option<OrderRecord> {
        self.inner.read().by_local.get(local_id).cloned()
    }

    /// Remove an order by local id, returning the record if it was tracked.
    ///
    /// Removing an absent id is a no-op.
    pub fn remove_by_local_id(&self, local_id: &LocalOrderId) -> Option<OrderRecord> {
        self.inner.write().take_local(local_id)
    }

    /// Remove an order by gateway id, returning the record if it was tracked.
    ///
    /// The check and the removal happen under one write lock, so of two
    /// concurrent terminal callbacks for the same order exactly one gets the
    /// record.
    pub fn remove_by_gateway_id(&self, gateway_id: &GatewayOrderId) -> Option<OrderRecord> {
        let mut inner = self.inner.write();
        let local_id = inner.by_gateway.get(gateway_id)?.clone();
        inner.take_local(&local_id)
    }

    /// Drop every record. Returns how many were dropped.
    pub fn clear_all(&self) -> usize {
        let mut inner = self.inner.write();
        let dropped = inner.by_local.len();
        inner.by_local.clear();
        inner.by_gateway.clear();
        dropped
    }

    /// Number of tracked orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_local.len()
    }

    /// Check whether no orders are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_local.is_empty()
    }

    /// Check whether a local id is tracked.
    #[must_use]
    pub fn contains_local_id(&self, local_id: &LocalOrderId) -> bool {
        self.inner.read().by_local.contains_key(local_id)
    }
}

impl SessionScopedState for OrderIdentityTable {
    fn name(&self) -> &'static str {
        "order_identity"
    }

    fn reset(&self) -> usize {
        let dropped = self.clear_all();
        metrics::set_tracked_orders(0);
        dropped
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;

    use metrics_exporter_prometheus::PrometheusBuilder;
    use proptest::prelude::*;

    use super::*;
    use crate::domain::orders::OrderSide;
    use crate::domain::shared::Symbol;

    fn handle(client_id: &str) -> OrderHandle {
        OrderHandle {
            client_order_id: GatewayOrderId::new(client_id),
            symbol: Symbol::new("ABC"),
            side: OrderSide::Buy,
            quantity: 100,
            limit_price: None,
        }
    }

    fn register(table: &OrderIdentityTable, local: &str, client: &str) -> bool {
        table.register(
            LocalOrderId::new(local),
            GatewayOrderId::new(client),
            handle(client),
        )
    }

    #[test]
    fn register_and_resolve() {
        let table = OrderIdentityTable::new();
        assert!(register(&table, "L1", "C1"));

        assert_eq!(
            table.resolve_by_gateway_id(&GatewayOrderId::new("C1")),
            Some(LocalOrderId::new("L1"))
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn duplicate_local_id_is_rejected() {
        let table = OrderIdentityTable::new();
        assert!(register(&table, "L1", "C1"));
        assert!(!register(&table, "L1", "C2"));

        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve_by_gateway_id(&GatewayOrderId::new("C2")), None);
    }

    #[test]
    fn duplicate_gateway_id_is_rejected() {
        let table = OrderIdentityTable::new();
        assert!(register(&table, "L1", "C1"));
        assert!(!register(&table, "L2", "C1"));

        assert_eq!(
            table.resolve_by_gateway_id(&GatewayOrderId::new("C1")),
            Some(LocalOrderId::new("L1"))
        );
    }

    #[test]
    fn promote_rekeys_gateway_index() {
        let table = OrderIdentityTable::new();
        register(&table, "L1", "C1");

        let promoted = table.promote_id(&GatewayOrderId::new("C1"), GatewayOrderId::new("G1"));
        assert_eq!(promoted, Some(LocalOrderId::new("L1")));

        assert_eq!(table.resolve_by_gateway_id(&GatewayOrderId::new("C1")), None);
        assert_eq!(
            table.resolve_by_gateway_id(&GatewayOrderId::new("G1")),
            Some(LocalOrderId::new("L1"))
        );
        let record = table.record_by_local_id(&LocalOrderId::new("L1")).unwrap();
        assert_eq!(record.gateway_id, GatewayOrderId::new("G1"));
        assert_eq!(record.handle.client_order_id, GatewayOrderId::new("C1"));
    }

    #[test]
    fn promote_happens_once() {
        let table = OrderIdentityTable::new();
        register(&table, "L1", "X1");

        let first = table.promote_id(&GatewayOrderId::new("X1"), GatewayOrderId::new("X1"));
        assert_eq!(first, Some(LocalOrderId::new("L1")));
        let second = table.promote_id(&GatewayOrderId::new("X1"), GatewayOrderId::new("X1"));
        assert_eq!(second, None);
        assert!(table.record_by_local_id(&LocalOrderId::new("L1")).unwrap().acknowledged);
    }

    #[test]
    fn promote_unknown_is_none() {
        let table = OrderIdentityTable::new();
        assert_eq!(
            table.promote_id(&GatewayOrderId::new("C9"), GatewayOrderId::new("G9")),
            None
        );
        assert!(table.is_empty());
    }

    #[test]
    fn promote_onto_foreign_id_is_refused() {
        let table = OrderIdentityTable::new();
        register(&table, "L1", "C1");
        register(&table, "L2", "C2");

        assert_eq!(
            table.promote_id(&GatewayOrderId::new("C1"), GatewayOrderId::new("C2")),
            None
        );
        assert_eq!(
            table.resolve_by_gateway_id(&GatewayOrderId::new("C1")),
            Some(LocalOrderId::new("L1"))
        );
        assert_eq!(
            table.resolve_by_gateway_id(&GatewayOrderId::new("C2")),
            Some(LocalOrderId::new("L2"))
        );
    }

    #[test]
    fn remove_by_gateway_clears_both_indices() {
        let table = OrderIdentityTable::new();
        register(&table, "L1", "C1");
        table.promote_id(&GatewayOrderId::new("C1"), GatewayOrderId::new("G1"));

        let record = table.remove_by_gateway_id(&GatewayOrderId::new("G1")).unwrap();
        assert_eq!(record.local_id, LocalOrderId::new("L1"));

        assert!(!table.contains_local_id(&LocalOrderId::new("L1")));
        assert_eq!(table.resolve_by_gateway_id(&GatewayOrderId::new("G1")), None);
        assert!(table.remove_by_gateway_id(&GatewayOrderId::new("G1")).is_none());
    }

    #[test]
    fn remove_by_local_is_idempotent() {
        let table = OrderIdentityTable::new();
        register(&table, "L1", "C1");

        assert!(table.remove_by_local_id(&LocalOrderId::new("L1")).is_some());
        assert!(table.remove_by_local_id(&LocalOrderId::new("L1")).is_none());
        assert_eq!(table.resolve_by_gateway_id(&GatewayOrderId::new("C1")), None);
    }

    #[test]
    fn clear_all_drops_everything() {
        let table = OrderIdentityTable::new();
        register(&table, "L1", "C1");
        register(&table, "L2", "C2");

        assert_eq!(table.reset(), 2);
        assert!(table.is_empty());
        assert_eq!(table.resolve_by_gateway_id(&GatewayOrderId::new("C2")), None);
    }

    #[test]
    fn concurrent_terminal_removal_yields_one_record() {
        let table = Arc::new(OrderIdentityTable::new());
        for i in 0..200 {
            register(&table, &format!("L{i}"), &format!("C{i}"));
        }

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    (0..200)
                        .filter(|i| {
                            table
                                .remove_by_gateway_id(&GatewayOrderId::new(format!("C{i}")))
                                .is_some()
                        })
                        .count()
                })
            })
            .collect();

        let removed: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(removed, 200);
        assert!(table.is_empty());
    }

    #[test]
    fn concurrent_promote_and_resolve_never_dangles() {
        let table = Arc::new(OrderIdentityTable::new());
        for i in 0..500 {
            register(&table, &format!("L{i}"), &format!("C{i}"));
        }

        let writer = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..500 {
                    table.promote_id(
                        &GatewayOrderId::new(format!("C{i}")),
                        GatewayOrderId::new(format!("G{i}")),
                    );
                }
            })
        };
        let reader = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..500 {
                    let client = GatewayOrderId::new(format!("C{i}"));
                    let permanent = GatewayOrderId::new(format!("G{i}"));

                    let record = table
                        .record_by_local_id(&LocalOrderId::new(format!("L{i}")))
                        .unwrap();
                    assert!(record.gateway_id == client || record.gateway_id == permanent);

                    if let Some(found) = table.record_by_gateway_id(&client) {
                        assert_eq!(found.gateway_id, client);
                    }
                    if let Some(found) = table.record_by_gateway_id(&permanent) {
                        assert_eq!(found.gateway_id, permanent);
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(table.len(), 500);
    }

    #[test]
    fn session_reset_zeroes_tracked_gauge() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let table = OrderIdentityTable::new();
        register(&table, "L1", "C1");
        register(&table, "L2", "C2");

        ::metrics::with_local_recorder(&recorder, || {
            metrics::set_tracked_orders(table.len());
            assert_eq!(table.reset(), 2);
        });

        assert!(table.is_empty());
        assert_eq!(
            metrics::rendered_gauge(&handle, "gateway_bridge_tracked_orders"),
            Some(0.0)
        );
    }

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Promote,
        RemoveByGateway,
        RemoveByLocal,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Promote),
            Just(Step::RemoveByGateway),
            Just(Step::RemoveByLocal),
        ]
    }

    fn client_of(local: &str) -> GatewayOrderId {
        GatewayOrderId::new(format!("C-{local}"))
    }

    fn permanent_of(local: &str) -> GatewayOrderId {
        GatewayOrderId::new(format!("P-{local}"))
    }

    proptest! {
        #[test]
        fn promoted_ids_resolve_to_their_order(
            locals in prop::collection::hash_set("[A-Za-z0-9]{1,8}", 1..40),
        ) {
            let table = OrderIdentityTable::new();
            for local in &locals {
                let registered = register(&table, local, client_of(local).as_str());
                prop_assert!(registered);
            }
            for local in &locals {
                let promoted = table.promote_id(&client_of(local), permanent_of(local));
                prop_assert_eq!(promoted, Some(LocalOrderId::new(local.as_str())));
            }
            for local in &locals {
                let by_permanent = table.resolve_by_gateway_id(&permanent_of(local));
                let by_client = table.resolve_by_gateway_id(&client_of(local));
                prop_assert_eq!(by_permanent, Some(LocalOrderId::new(local.as_str())));
                prop_assert_eq!(by_client, None);
            }
        }

        #[test]
        fn table_tracks_a_reference_map_under_mixed_steps(
            locals in prop::collection::hash_set("[A-Za-z0-9]{1,8}", 1..24),
            steps in prop::collection::vec((any::<prop::sample::Index>(), step()), 0..64),
        ) {
            let locals: Vec<String> = locals.into_iter().collect();
            let table = OrderIdentityTable::new();
            // local id -> (current gateway id, promoted)
            let mut expected: HashMap<String, (GatewayOrderId, bool)> = HashMap::new();

            for local in &locals {
                let registered = register(&table, local, client_of(local).as_str());
                prop_assert!(registered);
                expected.insert(local.clone(), (client_of(local), false));
            }

            for (index, step) in steps {
                let local = index.get(locals.as_slice());
                let local_id = LocalOrderId::new(local.as_str());

                match step {
                    Step::Promote => {
                        let promoted = table.promote_id(&client_of(local), permanent_of(local));
                        let want = match expected.get_mut(local) {
                            Some(entry) if !entry.1 => {
                                *entry = (permanent_of(local), true);
                                Some(local_id.clone())
                            }
                            _ => None,
                        };
                        prop_assert_eq!(promoted, want);
                    }
                    Step::RemoveByGateway => {
                        let current = expected
                            .get(local)
                            .map_or_else(|| client_of(local), |entry| entry.0.clone());
                        let removed = table.remove_by_gateway_id(&current).map(|r| r.local_id);
                        let want = expected.remove(local).map(|_| local_id.clone());
                        prop_assert_eq!(removed, want);
                    }
                    Step::RemoveByLocal => {
                        let removed = table.remove_by_local_id(&local_id).map(|r| r.local_id);
                        let want = expected.remove(local).map(|_| local_id.clone());
                        prop_assert_eq!(removed, want);
                    }
                }

                prop_assert_eq!(table.len(), expected.len());
                for (tracked, (gateway_id, promoted)) in &expected {
                    let resolved = table.resolve_by_gateway_id(gateway_id);
                    prop_assert_eq!(resolved, Some(LocalOrderId::new(tracked.as_str())));
                    if *promoted {
                        let stale = table.resolve_by_gateway_id(&client_of(tracked));
                        prop_assert_eq!(stale, None);
                    }
                }
            }

            for local in locals.iter().filter(|local| !expected.contains_key(*local)) {
                let tracked = table.contains_local_id(&LocalOrderId::new(local.as_str()));
                let by_client = table.resolve_by_gateway_id(&client_of(local));
                let by_permanent = table.resolve_by_gateway_id(&permanent_of(local));
                prop_assert!(!tracked);
                prop_assert_eq!(by_client, None);
                prop_assert_eq!(by_permanent, None);
            }
        }
    }
}
