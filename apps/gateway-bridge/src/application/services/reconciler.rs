//! Order Event Reconciler
//!
//! Resolves raw order callbacks against the identity table and emits exactly
//! one normalized event per resolved callback.
//!
//! | Callback     | Key                              | Terminal      |
//! |--------------|----------------------------------|---------------|
//! | order update | client id                        | no            |
//! | execution    | gateway id, else locate symbol   | leaves == 0   |
//! | cancel       | gateway id                       | yes           |
//! | reject       | client id, else permanent id     | yes           |
//! | position     | none                             | n/a           |
//!
//! Terminal callbacks take the record out of the table before the event is
//! published, so a duplicate finds nothing. Unresolved callbacks are normal
//! after a disconnect cleared the table and are dropped at debug level.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::error::BridgeError;
use super::identity_table::{OrderIdentityTable, OrderRecord};
use super::locate::LocateCoordinator;
use crate::application::ports::{
    CancelReport, EventSink, ExecutionReport, GatewayOrderStatus, GatewaySession, OrderUpdate,
    PositionReport, RejectReport,
};
use crate::domain::events::GatewayEvent;
use crate::domain::market::{Position, PositionKind};
use crate::domain::orders::{Execution, ExecutionKind, Fill, Order, RejectReason, Rejection};
use crate::infrastructure::metrics;

/// What happened to a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// One event was published.
    Emitted,
    /// Callback was valid but carries nothing to report.
    Ignored,
    /// No tracked order matched.
    Unresolved,
}

/// Turns order callbacks into application events.
pub struct OrderEventReconciler {
    table: Arc<OrderIdentityTable>,
    locates: Arc<LocateCoordinator>,
    sink: Arc<dyn EventSink>,
    provider: String,
}

impl OrderEventReconciler {
    /// Create a reconciler.
    #[must_use]
    pub fn new(
        table: Arc<OrderIdentityTable>,
        locates: Arc<LocateCoordinator>,
        sink: Arc<dyn EventSink>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            table,
            locates,
            sink,
            provider: provider.into(),
        }
    }

    /// The identity table.
    #[must_use]
    pub const fn table(&self) -> &Arc<OrderIdentityTable> {
        &self.table
    }

    /// First live update promotes the order to its permanent id.
    pub fn on_order_update(&self, update: &OrderUpdate) -> Reconciliation {
        if update.status != GatewayOrderStatus::Live || update.order_id.is_empty() {
            debug!(
                client_order_id = %update.client_order_id,
                status = ?update.status,
                "Order update is not an acknowledgement"
            );
            return Reconciliation::Ignored;
        }

        if self
            .table
            .promote_id(&update.client_order_id, update.order_id.clone())
            .is_none()
        {
            if self.table.resolve_by_gateway_id(&update.order_id).is_some() {
                return Reconciliation::Ignored;
            }
            debug!(
                client_order_id = %update.client_order_id,
                gateway_id = %update.order_id,
                "Acknowledgement for untracked order"
            );
            return Reconciliation::Unresolved;
        }

        let Some(record) = self.table.record_by_gateway_id(&update.order_id) else {
            // Terminal callback won the race after promotion.
            return Reconciliation::Unresolved;
        };

        info!(
            local_id = %record.local_id,
            gateway_id = %update.order_id,
            "Order accepted"
        );
        let order = self.order_snapshot(&record, update.placed_at);
        self.sink.publish(GatewayEvent::OrderAccepted { order });
        Reconciliation::Emitted
    }

    /// Fill or partial fill.
    pub fn on_execution(&self, report: &ExecutionReport) -> Reconciliation {
        let kind = if report.leaves_quantity == 0 {
            ExecutionKind::Full
        } else {
            ExecutionKind::Partial
        };

        let tracked = match kind {
            ExecutionKind::Full => self.table.remove_by_gateway_id(&report.order_id),
            ExecutionKind::Partial => self.table.record_by_gateway_id(&report.order_id),
        };

        let order = match tracked {
            Some(record) => {
                metrics::set_tracked_orders(self.table.len());
                self.order_snapshot(&record, None)
            }
            None => {
                let Some(local_id) = self
                    .locates
                    .attribute_execution(&report.symbol, kind == ExecutionKind::Full)
                else {
                    debug!(
                        gateway_id = %report.order_id,
                        symbol = %report.symbol,
                        "Execution for untracked order"
                    );
                    return Reconciliation::Unresolved;
                };
                debug!(local_id = %local_id, symbol = %report.symbol, "Execution attributed via locate");
                Order {
                    local_id,
                    broker_order_id: (!report.order_id.is_empty()).then(|| report.order_id.clone()),
                    symbol: report.symbol.clone(),
                    side: report.side,
                    quantity: report.order_size,
                    provider: self.provider.clone(),
                    placed_at: None,
                }
            }
        };

        let order_size = if report.order_size > 0 {
            report.order_size
        } else {
            order.quantity
        };
        let fill = Fill {
            local_id: order.local_id.clone(),
            execution_id: report.execution_id.clone(),
            symbol: report.symbol.clone(),
            side: report.side,
            price: report.price,
            size: report.size,
            average_price: report.average_price,
            leaves_quantity: report.leaves_quantity,
            cumulative_quantity: order_size.saturating_sub(report.leaves_quantity),
            kind,
            provider: self.provider.clone(),
            executed_at: Utc::now(),
        };

        info!(
            local_id = %fill.local_id,
            execution_id = %fill.execution_id,
            price = %fill.price,
            size = fill.size,
            leaves = fill.leaves_quantity,
            "Execution"
        );
        self.sink
            .publish(GatewayEvent::Execution(Execution { fill, order }));
        Reconciliation::Emitted
    }

    /// Cancel confirmed.
    pub fn on_cancel(&self, report: &CancelReport) -> Reconciliation {
        let Some(record) = self.table.remove_by_gateway_id(&report.order_id) else {
            debug!(gateway_id = %report.order_id, "Cancel for untracked order");
            return Reconciliation::Unresolved;
        };
        metrics::set_tracked_orders(self.table.len());

        info!(local_id = %record.local_id, gateway_id = %report.order_id, "Order cancelled");
        let order = self.order_snapshot(&record, None);
        self.sink.publish(GatewayEvent::OrderCancelled { order });
        Reconciliation::Emitted
    }

    /// Order rejected. A hard-to-borrow reason also requests a locate for the
    /// rejected order's symbol and size.
    pub fn on_reject(
        &self,
        report: &RejectReport,
        session: &dyn GatewaySession,
    ) -> Result<Reconciliation, BridgeError> {
        let Some(record) = self.take_rejected(report) else {
            debug!(client_order_id = %report.client_order_id, "Reject for untracked order");
            return Ok(Reconciliation::Unresolved);
        };
        metrics::set_tracked_orders(self.table.len());

        let reason = RejectReason::from_gateway_text(&report.reason);
        info!(local_id = %record.local_id, reason = %reason, "Order rejected");

        let needs_locate = reason.requires_locate();
        self.sink.publish(GatewayEvent::OrderRejected(Rejection {
            local_id: record.local_id.clone(),
            symbol: record.handle.symbol.clone(),
            reason,
            provider: self.provider.clone(),
            rejected_at: Utc::now(),
        }));

        if needs_locate {
            self.locates
                .request_locate(session, &record.handle.symbol, record.handle.quantity)?;
        }
        Ok(Reconciliation::Emitted)
    }

    /// Position snapshot; not order-keyed.
    pub fn on_position(&self, report: &PositionReport) -> Reconciliation {
        self.sink.publish(GatewayEvent::PositionUpdate(Position {
            symbol: report.symbol.clone(),
            quantity: report.quantity,
            price: report.price,
            avg_buy_price: report.avg_buy_price,
            avg_sell_price: report.avg_sell_price,
            kind: PositionKind::from_quantity(report.quantity),
            is_open: true,
            provider: self.provider.clone(),
        }));
        Reconciliation::Emitted
    }

    fn take_rejected(&self, report: &RejectReport) -> Option<OrderRecord> {
        self.table
            .remove_by_gateway_id(&report.client_order_id)
            .or_else(|| {
                report
                    .order_id
                    .as_ref()
                    .filter(|id| !id.is_empty())
                    .and_then(|id| self.table.remove_by_gateway_id(id))
            })
    }

    fn order_snapshot(&self, record: &OrderRecord, placed_at: Option<DateTime<Utc>>) -> Order {
        Order {
            local_id: record.local_id.clone(),
            broker_order_id: Some(record.gateway_id.clone()),
            symbol: record.handle.symbol.clone(),
            side: record.handle.side,
            quantity: record.handle.quantity,
            provider: self.provider.clone(),
            placed_at,
        }
    }
}

impl std::fmt::Debug for OrderEventReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderEventReconciler")
            .field("table", &self.table)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}
