//! Order value objects: side, time in force, order type, reject reasons.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side, including the short-sale variants the gateway distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy to open or add to a long position.
    Buy,
    /// Sell out of a long position.
    Sell,
    /// Sell short (may require a locate).
    Short,
    /// Buy to cover a short position.
    Cover,
}

impl OrderSide {
    /// Returns true for sides that open or increase a short position.
    #[must_use]
    pub const fn is_short_sale(&self) -> bool {
        matches!(self, Self::Short)
    }

    /// Returns the sign for position calculations.
    ///
    /// Buy/Cover = +1, Sell/Short = -1
    #[must_use]
    pub const fn sign(&self) -> i64 {
        match self {
            Self::Buy | Self::Cover => 1,
            Self::Sell | Self::Short => -1,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Short => write!(f, "SHORT"),
            Self::Cover => write!(f, "COVER"),
        }
    }
}

/// Time in force specifying order validity duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Valid for current trading day only.
    #[default]
    Day,
    /// Good-til-canceled.
    Gtc,
    /// Good-til-crossing (day plus extended session).
    Gtx,
    /// Immediate-or-cancel.
    Ioc,
    /// Execute at market open only.
    Opg,
    /// Execute at market close only.
    MarketClose,
}

impl TimeInForce {
    /// Returns true if the order targets an auction (open/close).
    #[must_use]
    pub const fn is_auction(&self) -> bool {
        matches!(self, Self::Opg | Self::MarketClose)
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day => write!(f, "DAY"),
            Self::Gtc => write!(f, "GTC"),
            Self::Gtx => write!(f, "GTX"),
            Self::Ioc => write!(f, "IOC"),
            Self::Opg => write!(f, "OPG"),
            Self::MarketClose => write!(f, "MARKET_CLOSE"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Execute at the prevailing price.
    Market,
    /// Execute at the limit price or better.
    Limit,
}

/// Exact text the gateway uses when a short sale needs a locate first.
pub const HARD_TO_BORROW_REASON: &str = "Not Shortable - Hard To Borrow";

/// Structured reason carried by a rejection.
///
/// The gateway only sends free text; [`RejectReason::from_gateway_text`] is
/// the single place that text is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "code", content = "text", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    /// Short sale refused until a locate is obtained.
    HardToBorrow,
    /// Any other gateway reason, kept verbatim.
    Other(String),
}

impl RejectReason {
    /// Translate raw gateway reject text into a reason code.
    #[must_use]
    pub fn from_gateway_text(text: &str) -> Self {
        if text == HARD_TO_BORROW_REASON {
            Self::HardToBorrow
        } else {
            Self::Other(text.to_string())
        }
    }

    /// Returns true if a locate request should follow this rejection.
    #[must_use]
    pub const fn requires_locate(&self) -> bool {
        matches!(self, Self::HardToBorrow)
    }

    /// Human-readable reason text.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::HardToBorrow => HARD_TO_BORROW_REASON,
            Self::Other(text) => text,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}
