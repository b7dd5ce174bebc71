//! Retry policies per error category.

use std::{collections::HashMap, time::Duration};

use rand::Rng as _;

use crate::{category::ErrorCategory, cooldown::CooldownPolicy};

/// Configuration for retry behavior of one category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
  /// Executor invocations after the original failure. Zero disables retry.
  pub max_retries:    u32,
  /// Delay before the first retry.
  pub base_delay:     Duration,
  /// Maximum delay between retries, before jitter.
  pub max_delay:      Duration,
  /// Multiplier for each subsequent delay.
  pub backoff_factor: f64,
  /// Scale each delay by a uniform factor in `[0.5, 1.5)`.
  pub jitter:         bool,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries:    3,
      base_delay:     Duration::from_secs(1),
      max_delay:      Duration::from_secs(30),
      backoff_factor: 2.0,
      jitter:         true,
    }
  }
}

impl RetryPolicy {
  pub fn never() -> Self { Self { max_retries: 0, ..Self::default() } }

  pub fn retries(max_retries: u32, base_delay: Duration) -> Self {
    Self { max_retries, base_delay, ..Self::default() }
  }

  pub fn max_delay(mut self, max_delay: Duration) -> Self {
    self.max_delay = max_delay;
    self
  }

  pub fn jitter(mut self, jitter: bool) -> Self {
    self.jitter = jitter;
    self
  }

  /// Default policy for `category`.
  pub fn for_category(category: ErrorCategory) -> Self {
    match category {
      ErrorCategory::Transient => Self::retries(3, Duration::from_millis(1000)),
      ErrorCategory::RateLimit => {
        Self::retries(5, Duration::from_millis(5000)).max_delay(Duration::from_secs(60))
      }
      ErrorCategory::NotFound => Self::retries(1, Duration::from_millis(500)),
      ErrorCategory::Unknown => Self::retries(1, Duration::from_millis(2000)),
      ErrorCategory::Permission | ErrorCategory::InvalidInput | ErrorCategory::Permanent => {
        Self::never()
      }
    }
  }

  /// Backoff before retry number `attempt` (zero-based), without jitter.
  pub fn backoff(&self, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let scaled = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
    if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
      self.max_delay
    } else {
      Duration::from_secs_f64(scaled.max(0.0))
    }
  }

  /// Backoff before retry number `attempt`, with jitter when enabled.
  pub fn delay(&self, attempt: u32) -> Duration {
    let backoff = self.backoff(attempt);
    if self.jitter {
      backoff.mul_f64(rand::rng().random_range(0.5..1.5))
    } else {
      backoff
    }
  }
}

/// Tunables for [`RecoveryEngine`](crate::RecoveryEngine).
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryConfig {
  pub policies: HashMap<ErrorCategory, RetryPolicy>,
  pub cooldown: CooldownPolicy,
}

impl Default for RecoveryConfig {
  fn default() -> Self {
    use strum::IntoEnumIterator as _;
    Self {
      policies: ErrorCategory::iter().map(|c| (c, RetryPolicy::for_category(c))).collect(),
      cooldown: CooldownPolicy::default(),
    }
  }
}

impl RecoveryConfig {
  /// The policy for `category`; categories without one are never retried.
  pub fn policy(&self, category: ErrorCategory) -> RetryPolicy {
    self.policies.get(&category).copied().unwrap_or_else(RetryPolicy::never)
  }

  pub fn with_policy(mut self, category: ErrorCategory, policy: RetryPolicy) -> Self {
    self.policies.insert(category, policy);
    self
  }

  pub fn with_cooldown(mut self, cooldown: CooldownPolicy) -> Self {
    self.cooldown = cooldown;
    self
  }
}
