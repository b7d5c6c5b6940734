//! Bridge Settings
//!
//! Ambient knobs loaded from environment variables. Unset or unparsable
//! values fall back to defaults.

use std::time::Duration;

use crate::application::services::ReconnectConfig;

/// Default provider name stamped on events.
pub const DEFAULT_PROVIDER: &str = "Blackwood";

/// Reconnection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectSettings {
    /// Delay before the first reconnect attempt.
    pub delay_initial: Duration,
    /// Maximum delay between attempts.
    pub delay_max: Duration,
    /// Backoff multiplier.
    pub delay_multiplier: f64,
    /// Jitter fraction applied to every delay.
    pub jitter_factor: f64,
    /// Attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        let config = ReconnectConfig::default();
        Self {
            delay_initial: config.initial_delay,
            delay_max: config.max_delay,
            delay_multiplier: config.multiplier,
            jitter_factor: config.jitter_factor,
            max_attempts: config.max_attempts,
        }
    }
}

impl From<ReconnectSettings> for ReconnectConfig {
    fn from(settings: ReconnectSettings) -> Self {
        Self::new(
            settings.delay_initial,
            settings.delay_max,
            settings.delay_multiplier,
            settings.jitter_factor,
            settings.max_attempts,
        )
    }
}

/// Event channel settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHubSettings {
    /// Capacity of the session event channel.
    pub session_capacity: usize,
    /// Capacity of the order event channel.
    pub orders_capacity: usize,
    /// Capacity of the market-data event channel.
    pub market_data_capacity: usize,
}

impl Default for EventHubSettings {
    fn default() -> Self {
        Self {
            session_capacity: 256,
            orders_capacity: 4_096,
            market_data_capacity: 10_000,
        }
    }
}

/// Complete bridge settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    /// Provider name.
    pub provider: String,
    /// Event channel capacities.
    pub events: EventHubSettings,
    /// Reconnect policy.
    pub reconnect: ReconnectSettings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            events: EventHubSettings::default(),
            reconnect: ReconnectSettings::default(),
        }
    }
}

impl BridgeSettings {
    /// Load settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let provider = lookup("GATEWAY_PROVIDER")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.provider);

        let events = EventHubSettings {
            session_capacity: parse(&lookup, "GATEWAY_SESSION_EVENTS_CAPACITY")
                .unwrap_or(defaults.events.session_capacity),
            orders_capacity: parse(&lookup, "GATEWAY_ORDER_EVENTS_CAPACITY")
                .unwrap_or(defaults.events.orders_capacity),
            market_data_capacity: parse(&lookup, "GATEWAY_MARKET_DATA_EVENTS_CAPACITY")
                .unwrap_or(defaults.events.market_data_capacity),
        };

        let reconnect = ReconnectSettings {
            delay_initial: parse(&lookup, "GATEWAY_RECONNECT_DELAY_INITIAL_MS")
                .map_or(defaults.reconnect.delay_initial, Duration::from_millis),
            delay_max: parse(&lookup, "GATEWAY_RECONNECT_DELAY_MAX_SECS")
                .map_or(defaults.reconnect.delay_max, Duration::from_secs),
            delay_multiplier: parse(&lookup, "GATEWAY_RECONNECT_MULTIPLIER")
                .unwrap_or(defaults.reconnect.delay_multiplier),
            jitter_factor: parse(&lookup, "GATEWAY_RECONNECT_JITTER")
                .unwrap_or(defaults.reconnect.jitter_factor),
            max_attempts: parse(&lookup, "GATEWAY_MAX_RECONNECT_ATTEMPTS")
                .unwrap_or(defaults.reconnect.max_attempts),
        };

        Self {
            provider,
            events,
            reconnect,
        }
    }
}

fn parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}
