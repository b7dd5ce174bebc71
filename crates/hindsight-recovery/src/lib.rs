//! Failure recovery for tool invocations.
//!
//! A failed call is categorized from its error text, then either retried
//! with capped exponential backoff through a caller-supplied executor or
//! answered with guidance the assistant can relay to the user.

pub mod category;
pub mod cooldown;
pub mod engine;
pub mod guidance;
pub mod policy;

pub use category::{ErrorCategorizer, ErrorCategory};
pub use cooldown::{CooldownPolicy, CooldownTracker};
pub use engine::{ErrorStats, RecoveryAction, RecoveryEngine, RecoveryRequest, RecoveryResult};
pub use policy::{RecoveryConfig, RetryPolicy};
