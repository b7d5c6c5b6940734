//! Application Services
//!
//! The four cooperating components of the bridge plus the facade that wires
//! them to gateway callbacks:
//!
//! - `session`: connect, disconnect, automatic re-logon
//! - `identity_table`: local order id to gateway order id mapping
//! - `reconciler`: order callbacks to normalized events
//! - `locate`: hard-to-borrow locate offers and attribution
//! - `market_data`: tick subscriptions and quote/trade normalization
//! - `bridge`: [`GatewayBridge`] facade and callback dispatch

mod bridge;
mod error;
mod identity_table;
mod locate;
mod market_data;
mod reconciler;
mod reconnect;
mod session;

pub use bridge::{BridgeOptions, GatewayBridge};
pub use error::BridgeError;
pub use identity_table::{OrderIdentityTable, OrderRecord};
pub use locate::{LocateBook, LocateCoordinator, LocateError};
pub use market_data::MarketDataFeed;
pub use reconciler::{OrderEventReconciler, Reconciliation};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use session::{SessionManager, SessionOptions, SessionScopedState};
