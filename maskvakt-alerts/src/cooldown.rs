//! ## maskvakt-alerts::cooldown
//! **Per-(source, kind) alert suppression**
//!
//! A key is reserved before the notifiers are called and released after, so
//! two workers racing on the same key cannot both dispatch. On a successful
//! hand-off the key is stamped with the time of the check, so a slow notifier
//! never stretches the window; a failed one leaves the key eligible.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use maskvakt_core::alert::AlertKind;
use maskvakt_core::clock::Clock;
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub source_id: String,
    pub kind: AlertKind,
}

impl CooldownKey {
    pub fn new(source_id: impl Into<String>, kind: AlertKind) -> Self {
        Self {
            source_id: source_id.into(),
            kind,
        }
    }
}

#[derive(Debug, Default)]
struct CooldownEntry {
    last_sent: Option<Instant>,
    /// Check time of the outstanding reservation.
    reserved_at: Option<Instant>,
}

/// Result of asking for permission to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The caller owns the key until it calls [`CooldownTracker::release`].
    Granted,
    /// The last successful dispatch is younger than the window.
    Cooling { remaining: Duration },
    /// Another thread is dispatching for this key right now.
    InFlight,
}

pub struct CooldownTracker {
    window: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<CooldownKey, CooldownEntry>>,
}

impl CooldownTracker {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn try_reserve(&self, key: &CooldownKey) -> Reservation {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.clone()).or_default();

        if entry.reserved_at.is_some() {
            return Reservation::InFlight;
        }
        if let Some(last) = entry.last_sent {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.window {
                return Reservation::Cooling {
                    remaining: self.window - elapsed,
                };
            }
        }
        entry.reserved_at = Some(now);
        Reservation::Granted
    }

    /// Ends a granted reservation. `delivered` stamps the key with the time
    /// the reservation was granted.
    pub fn release(&self, key: &CooldownKey, delivered: bool) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            let reserved_at = entry.reserved_at.take();
            if delivered {
                entry.last_sent = reserved_at.or(entry.last_sent);
            }
        }
    }

    /// Time since the last successful dispatch for `key`.
    pub fn since_last_sent(&self, key: &CooldownKey) -> Option<Duration> {
        let now = self.clock.now();
        self.entries
            .lock()
            .get(key)
            .and_then(|e| e.last_sent)
            .map(|last| now.saturating_duration_since(last))
    }

    /// Number of keys that have dispatched at least once.
    pub fn tracked(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|e| e.last_sent.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use maskvakt_core::clock::ManualClock;

    fn tracker(window_secs: u64) -> (CooldownTracker, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let tracker = CooldownTracker::new(Duration::from_secs(window_secs), Arc::new(clock.clone()));
        (tracker, clock)
    }

    #[test]
    fn first_alert_for_a_key_is_granted() {
        let (tracker, _) = tracker(60);
        let key = CooldownKey::new("cam1", AlertKind::Violation);
        assert_eq!(tracker.try_reserve(&key), Reservation::Granted);
    }

    #[test]
    fn window_is_measured_from_last_success() {
        let (tracker, clock) = tracker(60);
        let key = CooldownKey::new("cam1", AlertKind::Violation);

        assert_eq!(tracker.try_reserve(&key), Reservation::Granted);
        tracker.release(&key, true);

        clock.advance(Duration::from_secs(59));
        assert_eq!(
            tracker.try_reserve(&key),
            Reservation::Cooling {
                remaining: Duration::from_secs(1)
            }
        );

        clock.advance(Duration::from_secs(1));
        assert_eq!(tracker.try_reserve(&key), Reservation::Granted);
    }

    #[test]
    fn slow_hand_off_does_not_move_the_window() {
        let (tracker, clock) = tracker(60);
        let key = CooldownKey::new("cam1", AlertKind::Violation);

        assert_eq!(tracker.try_reserve(&key), Reservation::Granted);
        clock.advance(Duration::from_secs(10));
        tracker.release(&key, true);
        assert_eq!(tracker.since_last_sent(&key), Some(Duration::from_secs(10)));

        clock.advance(Duration::from_secs(50));
        assert_eq!(tracker.try_reserve(&key), Reservation::Granted);
    }

    #[test]
    fn failed_release_keeps_key_eligible() {
        let (tracker, _) = tracker(60);
        let key = CooldownKey::new("cam1", AlertKind::Camera);

        assert_eq!(tracker.try_reserve(&key), Reservation::Granted);
        tracker.release(&key, false);
        assert_eq!(tracker.try_reserve(&key), Reservation::Granted);
        assert_eq!(tracker.since_last_sent(&key), None);
    }

    #[test]
    fn concurrent_reservation_is_refused() {
        let (tracker, _) = tracker(60);
        let key = CooldownKey::new("cam1", AlertKind::Violation);
        assert_eq!(tracker.try_reserve(&key), Reservation::Granted);
        assert_eq!(tracker.try_reserve(&key), Reservation::InFlight);
    }

    #[test]
    fn keys_are_independent() {
        let (tracker, _) = tracker(60);
        let violation = CooldownKey::new("cam1", AlertKind::Violation);
        let camera = CooldownKey::new("cam1", AlertKind::Camera);
        let other = CooldownKey::new("cam2", AlertKind::Violation);

        for key in [&violation, &camera, &other] {
            assert_eq!(tracker.try_reserve(key), Reservation::Granted);
            tracker.release(key, true);
        }
        assert_eq!(tracker.tracked(), 3);
    }
}
