//! Positions, market-data ticks and historic bars.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::shared::Symbol;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionKind {
    /// Positive quantity.
    Long,
    /// Negative quantity.
    Short,
    /// Zero quantity.
    Flat,
}

impl PositionKind {
    /// Classify a signed quantity.
    #[must_use]
    pub const fn from_quantity(quantity: i64) -> Self {
        if quantity > 0 {
            Self::Long
        } else if quantity < 0 {
            Self::Short
        } else {
            Self::Flat
        }
    }
}

/// Position snapshot reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Symbol.
    pub symbol: Symbol,
    /// Signed quantity: +long, -short.
    pub quantity: i64,
    /// Last price.
    pub price: Decimal,
    /// Average price of buys.
    pub avg_buy_price: Decimal,
    /// Average price of sells.
    pub avg_sell_price: Decimal,
    /// Long, short or flat.
    pub kind: PositionKind,
    /// Snapshots from the gateway are always open positions.
    pub is_open: bool,
    /// Provider name.
    pub provider: String,
}

/// Market-data tick. Quote ticks carry bid/ask, trade ticks carry last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Symbol.
    pub symbol: Symbol,
    /// Provider name.
    pub provider: String,
    /// Tick time.
    pub timestamp: DateTime<Utc>,
    /// Best bid price.
    pub bid_price: Option<Decimal>,
    /// Best bid size.
    pub bid_size: Option<Decimal>,
    /// Best ask price.
    pub ask_price: Option<Decimal>,
    /// Best ask size.
    pub ask_size: Option<Decimal>,
    /// Last trade price.
    pub last_price: Option<Decimal>,
    /// Last trade size.
    pub last_size: Option<Decimal>,
}

impl Tick {
    /// Check whether this tick carries a level-1 quote.
    #[must_use]
    pub const fn has_quote(&self) -> bool {
        self.bid_price.is_some() || self.ask_price.is_some()
    }

    /// Check whether this tick carries a trade.
    #[must_use]
    pub const fn has_trade(&self) -> bool {
        self.last_price.is_some()
    }
}

/// Bar granularity of a historic request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarType {
    /// Bars of `interval` seconds within a session.
    #[default]
    Intraday,
    /// One bar per trading day.
    Daily,
    /// One bar per week.
    Weekly,
    /// One bar per month.
    Monthly,
    /// Tick-built bars.
    Tick,
}

impl BarType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Intraday => "INTRADAY",
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Tick => "TICK",
        }
    }

    /// Lenient lookup: any name the gateway does not know is intraday.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

impl std::fmt::Display for BarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BarType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INTRADAY" => Ok(Self::Intraday),
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            "MONTHLY" => Ok(Self::Monthly),
            "TICK" => Ok(Self::Tick),
            _ => Err(format!("Invalid bar type: {s}")),
        }
    }
}

/// OHLCV bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time.
    pub timestamp: DateTime<Utc>,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Shares traded.
    pub volume: u64,
}

/// Request for a range of historic bars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricBarRequest {
    /// Correlates the answer with this request.
    pub request_id: u32,
    /// Symbol.
    pub symbol: Symbol,
    /// Bar granularity.
    pub bar_type: BarType,
    /// First bar time, inclusive.
    pub start: DateTime<Utc>,
    /// Last bar time, inclusive.
    pub end: DateTime<Utc>,
    /// Seconds per intraday bar; ignored by the other bar types.
    pub interval: u32,
}

impl HistoricBarRequest {
    /// Create a request.
    #[must_use]
    pub const fn new(
        request_id: u32,
        symbol: Symbol,
        bar_type: BarType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: u32,
    ) -> Self {
        Self {
            request_id,
            symbol,
            bar_type,
            start,
            end,
            interval,
        }
    }
}

/// Bars answering one historic request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricBars {
    /// Id of the request being answered.
    pub request_id: u32,
    /// Symbol.
    pub symbol: Symbol,
    /// Provider name.
    pub provider: String,
    /// Bars in gateway order.
    pub bars: Vec<Bar>,
    /// When the answer arrived.
    pub received_at: DateTime<Utc>,
}
