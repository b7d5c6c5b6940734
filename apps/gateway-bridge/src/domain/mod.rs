//! Domain Layer - Order, market and session types.
//!
//! Pure types with serialization support and no I/O.

/// Normalized application events.
pub mod events;

/// Positions and ticks.
pub mod market;

/// Order requests, fills, rejections.
pub mod orders;

/// Session channel, state and connection parameters.
pub mod session;

/// Identifiers shared by every module.
pub mod shared;
