//! Completion-service plumbing: the client seam, retry, and cost tracking.
//!
//! - [`completion`] — [`CompletionClient`] trait, [`StageRequest`], and
//!   [`Completion`]. The pipeline depends only on this.
//! - [`retry`] — transient-error backoff applied around each stage call.
//!   Off by default.
//! - [`tracing`] — trace/span IDs, per-model pricing, and [`CostTracker`].

pub mod completion;
pub mod retry;
pub mod tracing;

pub use completion::{Completion, CompletionClient, CompletionFuture, StageRequest};
pub use retry::RetryConfig;
pub use tracing::{CostTracker, generate_trace_id, pricing_for_model};
