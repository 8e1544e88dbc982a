//! Bounded automatic reconnection

use std::time::Duration;

use crate::config::ClientConfig;

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, delay: Duration::from_millis(2_000) }
    }
}

impl From<&ClientConfig> for ReconnectPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self { max_attempts: config.max_reconnect_attempts, delay: config.reconnect_delay() }
    }
}

/// What to do after the connection was lost or an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Try again after `delay`; `attempt` is 1-based.
    Retry { attempt: u32, delay: Duration },
    /// The budget just ran out. Reported once.
    Exhausted { attempts: u32 },
    /// A manual disconnect, an earlier exhaustion or an attempt already in
    /// flight rules out another one.
    Suppressed,
}

/// Attempt bookkeeping for one client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconnectState {
    attempts: u32,
    manual_disconnect: bool,
    reconnecting: bool,
    exhausted: bool,
}

impl ReconnectState {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_suppressed(&self) -> bool {
        self.manual_disconnect
    }

    /// The link closed without a local `disconnect()`.
    pub fn on_unexpected_close(&mut self, policy: &ReconnectPolicy) -> ReconnectDecision {
        if self.manual_disconnect || self.reconnecting || self.exhausted {
            return ReconnectDecision::Suppressed;
        }
        if self.attempts < policy.max_attempts {
            self.attempts += 1;
            self.reconnecting = true;
            ReconnectDecision::Retry { attempt: self.attempts, delay: policy.delay }
        } else {
            self.exhausted = true;
            ReconnectDecision::Exhausted { attempts: self.attempts }
        }
    }

    /// A scheduled attempt failed; counts like another unexpected close.
    pub fn on_attempt_failed(&mut self, policy: &ReconnectPolicy) -> ReconnectDecision {
        self.reconnecting = false;
        self.on_unexpected_close(policy)
    }

    pub fn on_connected(&mut self) {
        *self = Self::default();
    }

    /// `connect()` from the application re-enables automatic reconnection
    /// without touching the attempt count.
    pub fn on_connect_requested(&mut self) {
        self.manual_disconnect = false;
        self.reconnecting = false;
    }

    pub fn on_manual_disconnect(&mut self) {
        self.manual_disconnect = true;
        self.reconnecting = false;
    }

    /// `reconnect()` from the application starts from a fresh budget.
    pub fn on_manual_reconnect(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::default()
    }

    #[test]
    fn three_attempts_then_exhausted_once() {
        let mut state = ReconnectState::default();
        let delay = Duration::from_secs(2);

        assert_eq!(state.on_unexpected_close(&policy()), ReconnectDecision::Retry { attempt: 1, delay });
        assert_eq!(state.on_attempt_failed(&policy()), ReconnectDecision::Retry { attempt: 2, delay });
        assert_eq!(state.on_attempt_failed(&policy()), ReconnectDecision::Retry { attempt: 3, delay });
        assert_eq!(state.on_attempt_failed(&policy()), ReconnectDecision::Exhausted { attempts: 3 });
        assert_eq!(state.on_attempt_failed(&policy()), ReconnectDecision::Suppressed);
        assert_eq!(state.on_unexpected_close(&policy()), ReconnectDecision::Suppressed);
    }

    #[test]
    fn second_close_while_reconnecting_is_ignored() {
        let mut state = ReconnectState::default();
        assert!(matches!(state.on_unexpected_close(&policy()), ReconnectDecision::Retry { .. }));
        assert_eq!(state.on_unexpected_close(&policy()), ReconnectDecision::Suppressed);
        assert_eq!(state.attempts(), 1);
    }

    #[test]
    fn manual_disconnect_suppresses_until_connect() {
        let mut state = ReconnectState::default();
        state.on_manual_disconnect();
        assert_eq!(state.on_unexpected_close(&policy()), ReconnectDecision::Suppressed);

        state.on_connect_requested();
        assert!(matches!(state.on_unexpected_close(&policy()), ReconnectDecision::Retry { .. }));
    }

    #[test]
    fn success_and_manual_reconnect_reset_the_budget() {
        let mut state = ReconnectState::default();
        for _ in 0..4 {
            state.on_attempt_failed(&policy());
        }
        assert!(state.is_exhausted());

        state.on_manual_reconnect();
        assert_eq!(state.attempts(), 0);
        assert!(!state.is_exhausted());

        state.on_unexpected_close(&policy());
        state.on_connected();
        assert_eq!(state, ReconnectState::default());
    }

    #[test]
    fn zero_budget_is_exhausted_immediately() {
        let mut state = ReconnectState::default();
        let none = ReconnectPolicy { max_attempts: 0, delay: Duration::ZERO };
        assert_eq!(state.on_unexpected_close(&none), ReconnectDecision::Exhausted { attempts: 0 });
    }
}
