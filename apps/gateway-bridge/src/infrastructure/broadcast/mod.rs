//! Broadcast Event Hub
//!
//! Fans normalized [`GatewayEvent`]s out to any number of application
//! consumers over tokio broadcast channels. Events are split by concern so a
//! slow tick consumer cannot make an order consumer lag:
//!
//! - **session**: logon, logout, reconnect abandoned
//! - **orders**: acceptances, fills, cancels, rejects, locates, positions
//! - **market data**: ticks
//!
//! Publishing never blocks and never fails; with no receivers the event is
//! simply dropped.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use super::config::EventHubSettings;
use crate::application::ports::EventSink;
use crate::domain::events::GatewayEvent;
use crate::infrastructure::metrics;

/// Configuration for broadcast channel capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHubConfig {
    /// Capacity for the session channel.
    pub session_capacity: usize,
    /// Capacity for the order channel.
    pub orders_capacity: usize,
    /// Capacity for the market-data channel.
    pub market_data_capacity: usize,
}

impl Default for EventHubConfig {
    fn default() -> Self {
        EventHubSettings::default().into()
    }
}

impl From<EventHubSettings> for EventHubConfig {
    fn from(settings: EventHubSettings) -> Self {
        Self {
            session_capacity: settings.session_capacity,
            orders_capacity: settings.orders_capacity,
            market_data_capacity: settings.market_data_capacity,
        }
    }
}

/// Central hub for normalized gateway events.
#[derive(Debug)]
#[allow(clippy::struct_field_names)]
pub struct EventHub {
    session_tx: broadcast::Sender<GatewayEvent>,
    orders_tx: broadcast::Sender<GatewayEvent>,
    market_data_tx: broadcast::Sender<GatewayEvent>,
}

impl EventHub {
    /// Create a hub with the given capacities.
    #[must_use]
    pub fn new(config: EventHubConfig) -> Self {
        Self {
            session_tx: broadcast::channel(config.session_capacity.max(1)).0,
            orders_tx: broadcast::channel(config.orders_capacity.max(1)).0,
            market_data_tx: broadcast::channel(config.market_data_capacity.max(1)).0,
        }
    }

    /// Create a hub with default capacities.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(EventHubConfig::default())
    }

    /// Send an event to the channel for its concern.
    ///
    /// Returns the number of receivers, or `None` if nobody is listening.
    pub fn send(&self, event: GatewayEvent) -> Option<usize> {
        let tx = if event.is_session_event() {
            &self.session_tx
        } else if event.is_market_data_event() {
            &self.market_data_tx
        } else {
            &self.orders_tx
        };
        tx.send(event).ok()
    }

    // =========================================================================
    // Receivers
    // =========================================================================

    /// New receiver for session events.
    #[must_use]
    pub fn session_rx(&self) -> broadcast::Receiver<GatewayEvent> {
        self.session_tx.subscribe()
    }

    /// New receiver for order events.
    #[must_use]
    pub fn orders_rx(&self) -> broadcast::Receiver<GatewayEvent> {
        self.orders_tx.subscribe()
    }

    /// New receiver for market-data events.
    #[must_use]
    pub fn market_data_rx(&self) -> broadcast::Receiver<GatewayEvent> {
        self.market_data_tx.subscribe()
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Get statistics about all channels.
    #[must_use]
    pub fn stats(&self) -> EventHubStats {
        EventHubStats {
            session_receivers: self.session_tx.receiver_count(),
            orders_receivers: self.orders_tx.receiver_count(),
            market_data_receivers: self.market_data_tx.receiver_count(),
        }
    }
}

impl EventSink for EventHub {
    fn publish(&self, event: GatewayEvent) {
        let kind = event.kind();
        metrics::record_event_emitted(kind);
        if self.send(event).is_none() {
            trace!(kind, "No receivers for event");
        }
    }
}

/// Shared event hub reference.
pub type SharedEventHub = Arc<EventHub>;

/// Receiver counts per channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventHubStats {
    /// Session channel receivers.
    pub session_receivers: usize,
    /// Order channel receivers.
    pub orders_receivers: usize,
    /// Market-data channel receivers.
    pub market_data_receivers: usize,
}

impl EventHubStats {
    /// Total receivers across all channels.
    #[must_use]
    pub const fn total_receivers(&self) -> usize {
        self.session_receivers + self.orders_receivers + self.market_data_receivers
    }
}
