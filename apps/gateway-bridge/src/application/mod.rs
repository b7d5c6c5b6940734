//! Application Layer
//!
//! - **Ports**: the gateway session boundary and the event sink
//! - **Services**: session lifecycle, identity tracking, reconciliation,
//!   locates, and the bridge facade

pub mod ports;
pub mod services;

pub use ports::*;
pub use services::*;
