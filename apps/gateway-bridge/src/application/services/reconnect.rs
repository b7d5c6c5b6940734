//! Re-logon Pacing
//!
//! Decides how long a session waits before re-issuing `start()` after an
//! involuntary logoff, and when it stops trying. The default re-logs on
//! immediately with no ceiling; a positive initial delay grows by
//! `multiplier` per attempt up to `max_delay`.

use std::time::Duration;

use rand::Rng;

/// How a dropped session paces its re-logon attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Wait before the first attempt after a logoff.
    pub initial_delay: Duration,
    /// Upper bound on any single wait.
    pub max_delay: Duration,
    /// Growth factor applied to the wait after each attempt.
    pub multiplier: f64,
    /// Fractional spread applied to each wait (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Attempts allowed between logons (0 = no ceiling).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::immediate()
    }
}

impl ReconnectConfig {
    /// Fully specified pacing.
    #[must_use]
    pub const fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter_factor: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor,
            max_attempts,
        }
    }

    /// Re-logon on every logoff without waiting, forever.
    #[must_use]
    pub const fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::from_secs(64), 2.0, 0.0, 0)
    }

    /// Doubling waits from `initial_delay` to `max_delay` with ±10% spread.
    #[must_use]
    pub const fn backoff(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self::new(initial_delay, max_delay, 2.0, 0.1, max_attempts)
    }

    const fn is_bounded(&self) -> bool {
        self.max_attempts > 0
    }
}

/// Attempt counter and current wait for one session.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    wait: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Fresh policy with no attempts spent.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let wait = config.initial_delay;
        Self {
            config,
            wait,
            attempts: 0,
        }
    }

    /// Spend one attempt and return how long to wait before it, or `None`
    /// once the ceiling is reached.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempts = self.attempts.saturating_add(1);

        let delay = jittered(self.wait, self.config.jitter_factor);
        self.wait = grown(self.wait, self.config.multiplier).min(self.config.max_delay);
        Some(delay)
    }

    /// Logon succeeded; the next logoff starts from scratch.
    pub const fn reset(&mut self) {
        self.wait = self.config.initial_delay;
        self.attempts = 0;
    }

    /// Attempts spent since the last logon.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }

    /// Check whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        !self.config.is_bounded() || self.attempts < self.config.max_attempts
    }

    /// Pacing this policy follows.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}

/// `wait * multiplier`, rounded to whole milliseconds. Non-finite or
/// non-positive results collapse to zero.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn grown(wait: Duration, multiplier: f64) -> Duration {
    let millis = (wait.as_millis() as f64 * multiplier).round();
    if !millis.is_finite() || millis <= 0.0 {
        return Duration::ZERO;
    }
    // Saturating float-to-int cast.
    Duration::from_millis(millis as u64)
}

/// Spread `wait` uniformly by `±factor`, never below 1ms. A zero wait stays
/// zero so an immediate re-logon is never delayed.
fn jittered(wait: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || wait.is_zero() {
        return wait;
    }
    let spread = factor.min(1.0);
    let scale = rand::rng().random_range((1.0 - spread)..=(1.0 + spread));
    wait.mul_f64(scale).max(Duration::from_millis(1))
}
