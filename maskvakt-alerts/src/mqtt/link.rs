//! Reconnect state machine.
//!
//! `Disconnected -> Connecting -> Connected`; each failed attempt goes back to
//! `Disconnected` with an exponentially growing delay until the attempt cap,
//! then `GaveUp`, which is terminal and reported as unhealthy.

use std::time::Duration;

use maskvakt_config::ReconnectConfig;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    GaveUp,
}

#[derive(Debug, Clone)]
pub struct LinkMachine {
    state: LinkState,
    failures: u32,
    base: Duration,
    max: Duration,
    max_attempts: u32,
}

impl LinkMachine {
    pub fn new(policy: &ReconnectConfig) -> Self {
        Self {
            state: LinkState::Disconnected,
            failures: 0,
            base: Duration::from_millis(policy.base_delay_ms),
            max: Duration::from_millis(policy.max_delay_ms),
            max_attempts: policy.max_attempts,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Consecutive failed attempts since the last successful connect.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_healthy(&self) -> bool {
        self.state != LinkState::GaveUp
    }

    pub fn connecting(&mut self) {
        if self.state == LinkState::Disconnected {
            self.state = LinkState::Connecting;
        }
    }

    pub fn connected(&mut self) {
        if self.state != LinkState::GaveUp {
            self.state = LinkState::Connected;
            self.failures = 0;
        }
    }

    /// Records a failed attempt or a dropped connection. Returns the delay
    /// before the next attempt, or `None` once the link has given up.
    pub fn failed(&mut self) -> Option<Duration> {
        if self.state == LinkState::GaveUp {
            return None;
        }
        self.failures += 1;
        if self.failures >= self.max_attempts {
            self.state = LinkState::GaveUp;
            return None;
        }
        self.state = LinkState::Disconnected;
        Some(self.delay_for(self.failures))
    }

    /// `base * 2^(n-1)`, capped at the max delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exp)
            .map_or(self.max, |d| d.min(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn machine(max_attempts: u32) -> LinkMachine {
        LinkMachine::new(&ReconnectConfig {
            base_delay_ms: 100,
            max_delay_ms: 1000,
            max_attempts,
        })
    }

    #[test]
    fn connect_cycle() {
        let mut link = machine(3);
        assert_eq!(link.state(), LinkState::Disconnected);
        link.connecting();
        assert_eq!(link.state(), LinkState::Connecting);
        link.connected();
        assert_eq!(link.state(), LinkState::Connected);
        assert!(link.is_healthy());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut link = machine(10);
        let delays: Vec<u64> = (0..6)
            .map(|_| {
                link.connecting();
                link.failed().unwrap().as_millis() as u64
            })
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut link = machine(3);
        assert!(link.failed().is_some());
        assert!(link.failed().is_some());
        assert!(link.failed().is_none());
        assert_eq!(link.state(), LinkState::GaveUp);
        assert!(!link.is_healthy());

        // Terminal.
        link.connecting();
        link.connected();
        assert_eq!(link.state(), LinkState::GaveUp);
    }

    #[test]
    fn success_resets_the_attempt_count() {
        let mut link = machine(3);
        link.failed();
        link.failed();
        link.connected();
        assert_eq!(link.failures(), 0);
        assert_eq!(link.failed(), Some(Duration::from_millis(100)));
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_cap(attempt in 0u32..100) {
            let link = machine(100);
            prop_assert!(link.delay_for(attempt) <= Duration::from_millis(1000));
            prop_assert!(link.delay_for(attempt) >= Duration::from_millis(100));
        }
    }
}
