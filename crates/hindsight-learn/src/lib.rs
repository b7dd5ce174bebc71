//! Feedback classification and correction learning.
//!
//! [`FeedbackClassifier`] is stateless and never touches storage; callers
//! feed its output to [`CorrectionEngine`], which owns the confidence-weighted
//! trigger → behavior mappings kept in a [`MemoryStore`](hindsight_core::store::MemoryStore).

pub mod arguments;
pub mod classifier;
pub mod corrections;

pub use arguments::LearnedArguments;
pub use classifier::{Classification, FeedbackClassifier, FeedbackType, UtteranceKind};
pub use corrections::CorrectionEngine;

#[cfg(test)]
mod tests;
