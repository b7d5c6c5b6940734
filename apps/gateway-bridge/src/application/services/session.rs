//! Session Lifecycle Manager
//!
//! Owns one gateway channel's connect/disconnect/reconnect policy:
//!
//! ```text
//! Disconnected --start()--> Connecting --logon--> Connected
//!      ^                                              |
//!      +---------- disconnect / network loss ---------+
//! ```
//!
//! A disconnect that was not caused by [`SessionManager::stop`] restarts the
//! session through the [`ReconnectPolicy`]. Network loss additionally
//! discards the session object; it is rebuilt from the factory when the
//! network returns. This manager is the only writer of the session handle.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{EventSink, GatewayError, GatewaySession, GatewaySessionFactory};
use crate::domain::events::GatewayEvent;
use crate::domain::session::{ConnectionParams, SessionChannel, SessionState};
use crate::infrastructure::metrics;

/// In-flight state that becomes meaningless once the session drops.
pub trait SessionScopedState: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &'static str;

    /// Drop everything. Returns how many entries were dropped.
    fn reset(&self) -> usize;
}

/// Optional knobs for a [`SessionManager`].
#[derive(Clone)]
pub struct SessionOptions {
    /// Provider name carried on logon/logout events.
    pub provider: String,
    /// Automatic reconnect policy.
    pub reconnect: ReconnectConfig,
    /// State cleared on every disconnect.
    pub scoped_state: Vec<Arc<dyn SessionScopedState>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            provider: "Blackwood".to_string(),
            reconnect: ReconnectConfig::default(),
            scoped_state: Vec::new(),
        }
    }
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("provider", &self.provider)
            .field("reconnect", &self.reconnect)
            .field(
                "scoped_state",
                &self.scoped_state.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Lifecycle manager for one gateway channel.
pub struct SessionManager {
    channel: SessionChannel,
    provider: String,
    params: ConnectionParams,
    factory: Arc<dyn GatewaySessionFactory>,
    session: RwLock<Arc<dyn GatewaySession>>,
    state: Mutex<SessionState>,
    user_logout: AtomicBool,
    hooked: AtomicBool,
    network_lost: AtomicBool,
    reconnect: Mutex<ReconnectPolicy>,
    scoped_state: Vec<Arc<dyn SessionScopedState>>,
    sink: Arc<dyn EventSink>,
    weak_self: Weak<Self>,
}

impl SessionManager {
    /// Create a manager with default options.
    #[must_use]
    pub fn new(
        channel: SessionChannel,
        params: ConnectionParams,
        factory: Arc<dyn GatewaySessionFactory>,
        sink: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        Self::with_options(channel, params, factory, sink, SessionOptions::default())
    }

    /// Create a manager. The first session object is built immediately.
    #[must_use]
    pub fn with_options(
        channel: SessionChannel,
        params: ConnectionParams,
        factory: Arc<dyn GatewaySessionFactory>,
        sink: Arc<dyn EventSink>,
        options: SessionOptions,
    ) -> Arc<Self> {
        let session = factory.create();
        Arc::new_cyclic(|weak_self| Self {
            channel,
            provider: options.provider,
            params,
            factory,
            session: RwLock::new(session),
            state: Mutex::new(SessionState::Disconnected),
            user_logout: AtomicBool::new(false),
            hooked: AtomicBool::new(false),
            network_lost: AtomicBool::new(false),
            reconnect: Mutex::new(ReconnectPolicy::new(options.reconnect)),
            scoped_state: options.scoped_state,
            sink,
            weak_self: weak_self.clone(),
        })
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Hook callbacks and issue a logon.
    ///
    /// Returns whether the connect command was issued; the logon result
    /// arrives later as a connection-status callback.
    pub fn start(&self) -> bool {
        self.user_logout.store(false, Ordering::SeqCst);

        let address: IpAddr = match self.params.ip.trim().parse() {
            Ok(address) => address,
            Err(_) => {
                let err = GatewayError::InvalidAddress {
                    address: self.params.ip.clone(),
                };
                error!(channel = %self.channel, error = %err, "Start failed");
                return false;
            }
        };
        self.hooked.store(true, Ordering::SeqCst);

        let previous = self.set_state(SessionState::Connecting);
        info!(
            channel = %self.channel,
            from = %previous,
            address = %address,
            port = self.params.port,
            "Connecting to gateway"
        );

        let session = self.session();
        match session.connect(
            self.channel,
            &self.params.credentials,
            address,
            self.params.port,
        ) {
            Ok(()) => true,
            Err(err) => {
                self.set_state(SessionState::Disconnected);
                error!(channel = %self.channel, error = %err, "Connect command failed");
                false
            }
        }
    }

    /// Mark the logout as user-initiated and issue a disconnect.
    ///
    /// Succeeds without an active session; fails only if the disconnect
    /// command itself fails.
    pub fn stop(&self) -> bool {
        self.user_logout.store(true, Ordering::SeqCst);

        if self.state() == SessionState::Disconnected {
            info!(channel = %self.channel, "Stop requested with no active session");
        }

        match self.session().disconnect(self.channel) {
            Ok(()) => {
                info!(channel = %self.channel, "Disconnect issued");
                true
            }
            Err(err) => {
                error!(channel = %self.channel, error = %err, "Disconnect command failed");
                false
            }
        }
    }

    /// Query the gateway for live connection state. Any fault reads as `false`.
    pub fn is_connected(&self) -> bool {
        match self.session().is_connected(self.channel) {
            Ok(connected) => connected,
            Err(err) => {
                warn!(channel = %self.channel, error = %err, "Connection query failed");
                false
            }
        }
    }

    // =========================================================================
    // Gateway Notifications
    // =========================================================================

    /// Gateway reported a logon or logoff.
    pub fn on_connection_status(&self, connected: bool) {
        if connected {
            let previous = self.set_state(SessionState::Connected);
            self.reconnect.lock().reset();
            info!(channel = %self.channel, from = %previous, "Logged on");
            self.sink.publish(GatewayEvent::Logon {
                provider: self.provider.clone(),
                channel: self.channel,
            });
            return;
        }

        let previous = self.set_state(SessionState::Disconnected);
        info!(channel = %self.channel, from = %previous, "Logged off");
        self.drop_session_state();

        if self.user_logout.load(Ordering::SeqCst) {
            info!(channel = %self.channel, "User-initiated logout, not reconnecting");
        } else {
            self.schedule_reconnect();
        }
    }

    /// Network interface went down or came back.
    pub fn on_network_availability(&self, available: bool) {
        if !available {
            if !self.hooked.load(Ordering::SeqCst) {
                debug!(channel = %self.channel, "Network lost while already unhooked");
                return;
            }
            self.network_lost.store(true, Ordering::SeqCst);
            let previous = self.set_state(SessionState::Disconnected);
            warn!(channel = %self.channel, from = %previous, "Network lost");
            self.drop_session_state();
            return;
        }

        // Only a loss taken while hooked is recovered.
        let lost = self.network_lost.swap(false, Ordering::SeqCst);
        if self.user_logout.load(Ordering::SeqCst) {
            info!(channel = %self.channel, "Network back after user logout, staying down");
            return;
        }
        if !lost {
            debug!(channel = %self.channel, "Network back with no lost session to recover");
            return;
        }
        if self.state() != SessionState::Disconnected {
            debug!(channel = %self.channel, state = %self.state(), "Network back, session unaffected");
            return;
        }

        info!(channel = %self.channel, "Network back, rebuilding session");
        *self.session.write() = self.factory.create();
        self.schedule_reconnect();
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current session object, for issuing commands.
    #[must_use]
    pub fn session(&self) -> Arc<dyn GatewaySession> {
        self.session.read().clone()
    }

    /// Channel this manager drives.
    #[must_use]
    pub const fn channel(&self) -> SessionChannel {
        self.channel
    }

    /// Provider name.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Last known state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Check whether callbacks for this channel should be processed.
    #[must_use]
    pub fn accepts_callbacks(&self) -> bool {
        self.hooked.load(Ordering::SeqCst)
    }

    /// Check whether the last logout was user-initiated.
    #[must_use]
    pub fn is_user_logout(&self) -> bool {
        self.user_logout.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn set_state(&self, next: SessionState) -> SessionState {
        let previous = std::mem::replace(&mut *self.state.lock(), next);
        metrics::set_session_connected(self.channel, next == SessionState::Connected);
        previous
    }

    /// Logout, clear in-flight state, unhook. Listeners go before the event
    /// so a late callback racing the logout is dropped, not reconciled.
    fn drop_session_state(&self) {
        self.hooked.store(false, Ordering::SeqCst);

        for state in &self.scoped_state {
            let dropped = state.reset();
            if dropped > 0 {
                info!(channel = %self.channel, state = state.name(), dropped, "Cleared session state");
            }
        }

        self.sink.publish(GatewayEvent::Logout {
            provider: self.provider.clone(),
            channel: self.channel,
        });
    }

    fn schedule_reconnect(&self) {
        let (delay, attempts) = {
            let mut policy = self.reconnect.lock();
            (policy.next_delay(), policy.attempt_count())
        };

        let Some(delay) = delay else {
            error!(channel = %self.channel, attempts, "Reconnect attempts exhausted, giving up");
            self.sink.publish(GatewayEvent::ReconnectAbandoned {
                provider: self.provider.clone(),
                channel: self.channel,
                attempts,
            });
            return;
        };

        metrics::record_reconnect(self.channel);

        if delay.is_zero() {
            info!(channel = %self.channel, attempt = attempts, "Reconnecting");
            self.start();
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(channel = %self.channel, "No async runtime, reconnecting without delay");
            self.start();
            return;
        };

        info!(channel = %self.channel, attempt = attempts, ?delay, "Reconnect scheduled");
        let weak = self.weak_self.clone();
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(manager) = weak.upgrade() else {
                return;
            };
            if manager.is_user_logout() {
                info!(channel = %manager.channel, "Reconnect cancelled by user logout");
                return;
            }
            if !manager.start() {
                manager.schedule_reconnect();
            }
        });
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("channel", &self.channel)
            .field("provider", &self.provider)
            .field("params", &self.params)
            .field("state", &self.state())
            .field("user_logout", &self.is_user_logout())
            .field("hooked", &self.accepts_callbacks())
            .finish_non_exhaustive()
    }
}
