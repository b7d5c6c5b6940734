//! Session value objects: which gateway channel, its state, and how to log on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Gateway channel a session manager drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionChannel {
    /// Order routing.
    Orders,
    /// Live market data.
    MarketData,
}

impl SessionChannel {
    /// Channel name for logs and metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Orders => "orders",
            Self::MarketData => "market_data",
        }
    }
}

impl fmt::Display for SessionChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of one gateway channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// No session, or the gateway reported it lost.
    #[default]
    Disconnected,
    /// Connect command issued, waiting for the gateway's verdict.
    Connecting,
    /// Gateway confirmed the logon.
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
        }
    }
}

/// Gateway login credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Create new credentials. The gateway expects upper-case user names.
    #[must_use]
    pub fn new(username: &str, password: impl Into<String>) -> Self {
        Self {
            username: username.trim().to_uppercase(),
            password: password.into(),
        }
    }

    /// Get the user name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Get the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Everything needed to issue a connect command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Login credentials.
    pub credentials: Credentials,
    /// Gateway address as configured. Parsed on every connect attempt.
    pub ip: String,
    /// Gateway port for orders and live data.
    pub port: u16,
    /// Client-side port (historic data channel).
    pub client_port: u16,
}

impl ConnectionParams {
    /// Create connection parameters.
    #[must_use]
    pub fn new(credentials: Credentials, ip: impl Into<String>, port: u16, client_port: u16) -> Self {
        Self {
            credentials,
            ip: ip.into(),
            port,
            client_port,
        }
    }
}
