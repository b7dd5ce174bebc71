//! Adaptive memory for a tool-using assistant.
//!
//! [`Hindsight`] wires the SQLite-backed memory store, the correction
//! learning engine, the feedback classifier and the recovery engine behind
//! the handful of calls a tool dispatcher and conversation manager make.

pub mod config;
pub mod error;
pub mod fallback;
pub mod service;

pub use config::MemoryConfig;
pub use error::{Error, Result};
pub use service::{FeedbackOutcome, Hindsight, ToolCall, ToolInsights};

pub use hindsight_core as core;
pub use hindsight_learn as learn;
pub use hindsight_recovery as recovery;
pub use hindsight_store_sqlite as store;
