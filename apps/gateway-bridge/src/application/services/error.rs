//! Faults raised inside the bridge. None of these cross the public command
//! boundary; they are logged and turned into `false` or a dropped callback.

use super::locate::LocateError;
use crate::application::ports::GatewayError;
use crate::domain::session::SessionChannel;

/// Bridge error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Gateway refused a command.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Locate workflow failure.
    #[error(transparent)]
    Locate(#[from] LocateError),

    /// Command needs a logged-on session.
    #[error("{channel} session is not connected")]
    NotConnected {
        /// The channel.
        channel: SessionChannel,
    },

    /// No tracked order with this local id.
    #[error("Unknown order: {local_id}")]
    UnknownOrder {
        /// The local id.
        local_id: String,
    },

    /// An order with this local id is already in flight.
    #[error("Order already tracked: {local_id}")]
    DuplicateOrder {
        /// The local id.
        local_id: String,
    },

    /// A callback handler panicked.
    #[error("Callback handler panicked: {message}")]
    HandlerPanicked {
        /// Panic payload, if it was a string.
        message: String,
    },
}
