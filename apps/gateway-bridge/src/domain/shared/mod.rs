//! Shared kernel: identifiers used across every bounded context.

mod identifiers;

pub use identifiers::{GatewayOrderId, LocalOrderId, Symbol};
