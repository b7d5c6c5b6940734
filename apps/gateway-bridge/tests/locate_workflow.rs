//! Locate Workflow Integration Tests
//!
//! Hard-to-borrow short → reject → locate request → offer → accept →
//! execution attributed back to the order that needed the shares.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use rust_decimal_macros::dec;

use gateway_bridge::{
    BridgeOptions, ConnectionParams, Credentials, ExecutionKind, GatewayBridge, GatewayEvent,
    GatewayOrderId, LocalOrderId, MarketOrder, OrderSide, RejectReason, RecordingEventSink,
    SessionChannel, SimulatedGateway, Symbol,
};

fn connected_bridge() -> (Arc<SimulatedGateway>, GatewayBridge, Arc<RecordingEventSink>) {
    let gateway = SimulatedGateway::new();
    let sink = Arc::new(RecordingEventSink::new());
    let bridge = GatewayBridge::new(
        ConnectionParams::new(Credentials::new("trader", "secret"), "127.0.0.1", 9000, 9001),
        gateway.factory(),
        sink.clone(),
        BridgeOptions::default(),
    );
    bridge.start();
    gateway.pump(&bridge);
    sink.drain();
    (gateway, bridge, sink)
}

fn short(local_id: &str, symbol: &str, quantity: u64) -> MarketOrder {
    MarketOrder::new(
        LocalOrderId::new(local_id),
        Symbol::new(symbol),
        OrderSide::Short,
        quantity,
    )
}

/// Send a hard-to-borrow short and return the locate id the gateway offers.
fn rejected_short(
    gateway: &SimulatedGateway,
    bridge: &GatewayBridge,
    sink: &RecordingEventSink,
) -> GatewayOrderId {
    gateway.mark_hard_to_borrow(Symbol::new("HTB"));
    gateway.set_locate_price(dec!(0.02));

    assert!(bridge.send_market_order(&short("L9", "HTB", 300)));
    gateway.pump(&bridge);

    let events = sink.drain();
    let [GatewayEvent::OrderRejected(rejection), GatewayEvent::LocateRequested { order }] =
        events.as_slice()
    else {
        panic!("expected reject then locate offer, got {events:?}");
    };
    assert_eq!(rejection.local_id, LocalOrderId::new("L9"));
    assert_eq!(rejection.reason, RejectReason::HardToBorrow);
    assert_eq!(order.symbol, Symbol::new("HTB"));
    assert_eq!(order.quantity, 300);
    assert_eq!(order.limit_price, dec!(0.02));
    assert_eq!(order.side, OrderSide::Short);

    GatewayOrderId::new(order.local_id.as_str())
}

#[test]
fn accepted_locate_fill_is_attributed_to_the_rejected_order() {
    let (gateway, bridge, sink) = connected_bridge();
    let locate_id = rejected_short(&gateway, &bridge, &sink);

    assert!(bridge.identity_table().is_empty());
    assert_eq!(gateway.command_count("request_locate"), 1);
    assert_eq!(bridge.locate_book().pending_len(), 1);

    assert!(bridge.respond_to_locate(&locate_id, LocalOrderId::new("L9"), true));
    assert_eq!(gateway.command_count("accept_locate"), 1);
    gateway.pump(&bridge);

    let events = sink.drain();
    let [GatewayEvent::Execution(execution)] = events.as_slice() else {
        panic!("expected a single execution, got {events:?}");
    };
    assert_eq!(execution.fill.local_id, LocalOrderId::new("L9"));
    assert_eq!(execution.fill.kind, ExecutionKind::Full);
    assert_eq!(execution.fill.size, 300);
    assert_eq!(execution.order.broker_order_id.as_ref(), Some(&locate_id));

    assert_eq!(bridge.locate_book().pending_len(), 0);
    assert_eq!(bridge.locate_book().attribution_len(), 0);
}

#[test]
fn declined_locate_sends_nothing() {
    let (gateway, bridge, sink) = connected_bridge();
    let locate_id = rejected_short(&gateway, &bridge, &sink);

    assert!(bridge.respond_to_locate(&locate_id, LocalOrderId::new("L9"), false));
    gateway.pump(&bridge);

    assert_eq!(gateway.command_count("accept_locate"), 0);
    assert!(sink.events().is_empty());
    assert_eq!(bridge.locate_book().pending_len(), 0);

    // The offer is gone once answered.
    assert!(!bridge.respond_to_locate(&locate_id, LocalOrderId::new("L9"), true));
}

#[test]
fn unsolicited_offer_is_surfaced() {
    let (gateway, bridge, sink) = connected_bridge();

    let locate_id = gateway.offer_locate(Symbol::new("XYZ"), 500, dec!(0.05));
    gateway.pump(&bridge);

    let events = sink.drain();
    let [GatewayEvent::LocateRequested { order }] = events.as_slice() else {
        panic!("expected a locate offer, got {events:?}");
    };
    assert_eq!(order.local_id.as_str(), locate_id.as_str());
    assert_eq!(order.provider, "Blackwood");
    assert_eq!(gateway.command_count("request_locate"), 0);
}

#[test]
fn other_rejects_do_not_request_locates() {
    let (gateway, bridge, sink) = connected_bridge();

    assert!(bridge.send_market_order(&short("L1", "ABC", 100)));
    let client_id = gateway.last_client_order_id().unwrap();
    gateway.drain();

    bridge.dispatch(gateway_bridge::GatewayCallback::Reject(
        gateway_bridge::application::ports::RejectReport {
            client_order_id: client_id,
            order_id: None,
            symbol: Symbol::new("ABC"),
            side: OrderSide::Short,
            quantity: 100,
            reason: "Price out of range".to_string(),
        },
    ));

    let events = sink.drain();
    let [GatewayEvent::OrderRejected(rejection)] = events.as_slice() else {
        panic!("expected a single reject, got {events:?}");
    };
    assert_eq!(rejection.reason, RejectReason::Other("Price out of range".to_string()));
    assert_eq!(gateway.command_count("request_locate"), 0);
}

#[test]
fn answering_while_disconnected_is_refused() {
    let (gateway, bridge, sink) = connected_bridge();
    let locate_id = rejected_short(&gateway, &bridge, &sink);

    gateway.set_auto_logon(false);
    gateway.drop_connection(SessionChannel::Orders);
    gateway.pump(&bridge);

    assert!(!bridge.respond_to_locate(&locate_id, LocalOrderId::new("L9"), true));
    assert_eq!(gateway.command_count("accept_locate"), 0);
}

#[test]
fn lost_session_discards_pending_offers() {
    let (gateway, bridge, sink) = connected_bridge();
    let locate_id = rejected_short(&gateway, &bridge, &sink);

    gateway.drop_connection(SessionChannel::Orders);
    gateway.pump(&bridge);
    assert!(bridge.is_connected());
    assert_eq!(bridge.locate_book().pending_len(), 0);

    assert!(!bridge.respond_to_locate(&locate_id, LocalOrderId::new("L9"), true));
    assert_eq!(gateway.command_count("accept_locate"), 0);
}
