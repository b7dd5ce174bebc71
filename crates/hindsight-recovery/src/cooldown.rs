//! Per-(tool, action) cooldown after repeated recent failures.
//!
//! State is a handful of timestamps per key, evaluated lazily when a key is
//! checked; nothing runs on a timer. Keys with no failures left in the window
//! and no running cooldown are dropped.

use std::{
  collections::{HashMap, VecDeque},
  time::{Duration, Instant},
};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
  /// Failures within `window` that trip the cooldown.
  pub threshold: usize,
  pub window:    Duration,
  /// How long a tripped key is skipped.
  pub cooldown:  Duration,
}

impl Default for CooldownPolicy {
  fn default() -> Self {
    Self {
      threshold: 3,
      window:    Duration::from_secs(10 * 60),
      cooldown:  Duration::from_secs(5 * 60),
    }
  }
}

#[derive(Debug, Default)]
struct KeyState {
  failures:      VecDeque<Instant>,
  cooling_until: Option<Instant>,
}

impl KeyState {
  /// Drop failures outside the window and an elapsed cooldown. Returns
  /// whether anything is left to track.
  fn expire(&mut self, now: Instant, window: Duration) -> bool {
    prune_window(&mut self.failures, now, window);
    if self.cooling_until.is_some_and(|until| now >= until) {
      self.cooling_until = None;
    }
    !self.failures.is_empty() || self.cooling_until.is_some()
  }
}

type Key = (String, String);

/// Tracks recent failures and cooldown expiry per (tool, action).
#[derive(Debug, Default)]
pub struct CooldownTracker {
  policy: CooldownPolicy,
  keys:   Mutex<HashMap<Key, KeyState>>,
}

impl CooldownTracker {
  pub fn new(policy: CooldownPolicy) -> Self { Self { policy, keys: Mutex::default() } }

  /// Whether `tool.action` should be skipped, with the reason. Trips (or
  /// re-trips) the cooldown when enough failures fall inside the window.
  pub fn check(&self, tool: &str, action: &str) -> Option<String> {
    self.check_at(tool, action, Instant::now())
  }

  pub fn record_failure(&self, tool: &str, action: &str) {
    self.record_failure_at(tool, action, Instant::now());
  }

  pub(crate) fn check_at(&self, tool: &str, action: &str, now: Instant) -> Option<String> {
    let key = (tool.to_owned(), action.to_owned());
    let mut keys = self.keys.lock();
    let state = keys.get_mut(&key)?;

    if let Some(until) = state.cooling_until
      && now < until
    {
      let remaining = until - now;
      tracing::info!(tool, action, remaining_secs = remaining.as_secs(), "on cooldown");
      return Some("Tool is on cooldown due to repeated failures".to_owned());
    }

    if !state.expire(now, self.policy.window) {
      keys.remove(&key);
      return None;
    }
    let recent = state.failures.len();
    if recent >= self.policy.threshold {
      state.cooling_until = Some(now + self.policy.cooldown);
      tracing::info!(tool, action, recent, "setting cooldown after repeated failures");
      return Some(format!(
        "Too many recent failures ({recent} in {} min), cooling down",
        self.policy.window.as_secs() / 60
      ));
    }
    None
  }

  pub(crate) fn record_failure_at(&self, tool: &str, action: &str, now: Instant) {
    let mut keys = self.keys.lock();
    keys.retain(|_, state| state.expire(now, self.policy.window));
    keys.entry((tool.to_owned(), action.to_owned())).or_default().failures.push_back(now);
  }

  #[cfg(test)]
  pub(crate) fn tracked_keys(&self) -> usize { self.keys.lock().len() }
}

fn prune_window(failures: &mut VecDeque<Instant>, now: Instant, window: Duration) {
  while failures.front().is_some_and(|at| now.saturating_duration_since(*at) > window) {
    failures.pop_front();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn trips_after_threshold_and_expires() {
    let tracker = CooldownTracker::new(CooldownPolicy::default());
    let start = Instant::now();
    for i in 0..2 {
      tracker.record_failure_at("x", "y", start + Duration::from_secs(i));
    }
    assert!(tracker.check_at("x", "y", start + Duration::from_secs(5)).is_none());

    tracker.record_failure_at("x", "y", start + Duration::from_secs(6));
    let reason = tracker.check_at("x", "y", start + Duration::from_secs(7)).unwrap();
    assert!(reason.contains("3 in 10 min"), "{reason}");
    // Other keys are unaffected.
    assert!(tracker.check_at("x", "z", start + Duration::from_secs(7)).is_none());

    // Still cooling four minutes later.
    assert!(tracker.check_at("x", "y", start + Duration::from_secs(247)).is_some());
    // Past the cooldown the failures have also left the window.
    assert!(tracker.check_at("x", "y", start + Duration::from_secs(20 * 60)).is_none());
  }

  #[test]
  fn old_failures_leave_the_window() {
    let tracker = CooldownTracker::new(CooldownPolicy::default());
    let start = Instant::now();
    tracker.record_failure_at("x", "y", start);
    tracker.record_failure_at("x", "y", start + Duration::from_secs(60));
    tracker.record_failure_at("x", "y", start + Duration::from_secs(11 * 60));
    assert!(tracker.check_at("x", "y", start + Duration::from_secs(11 * 60)).is_none());
  }

  #[test]
  fn idle_keys_are_forgotten() {
    let tracker = CooldownTracker::new(CooldownPolicy::default());
    let start = Instant::now();
    for i in 0..50 {
      tracker.record_failure_at("tool", &format!("action{i}"), start);
    }
    assert_eq!(tracker.tracked_keys(), 50);

    // A failure long after the others sweeps them out.
    tracker.record_failure_at("tool", "late", start + Duration::from_secs(15 * 60));
    assert_eq!(tracker.tracked_keys(), 1);

    // Checking an idle key drops it as well.
    let later = start + Duration::from_secs(30 * 60);
    assert!(tracker.check_at("tool", "late", later).is_none());
    assert_eq!(tracker.tracked_keys(), 0);
  }

  #[test]
  fn cooling_keys_survive_the_sweep() {
    let tracker = CooldownTracker::new(CooldownPolicy::default());
    let start = Instant::now();
    for i in 0..3 {
      tracker.record_failure_at("x", "y", start + Duration::from_secs(i));
    }
    assert!(tracker.check_at("x", "y", start + Duration::from_secs(9 * 60)).is_some());

    // Failures have left the window but the cooldown is still running.
    tracker.record_failure_at("a", "b", start + Duration::from_secs(11 * 60));
    assert_eq!(tracker.tracked_keys(), 2);
    assert!(tracker.check_at("x", "y", start + Duration::from_secs(12 * 60)).is_some());
  }
}
