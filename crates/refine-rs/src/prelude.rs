//! Convenience re-exports for common `refine-rs` types.
//!
//! ```ignore
//! use refine_rs::prelude::*;
//! ```
//!
//! Covers the client, configuration, the pipeline and its events, artifact
//! writing, and the error types. Wire types (`ChatRequest`, `Message`) and
//! retry internals stay in their modules.

// ── Client and configuration ────────────────────────────────────────
pub use crate::OpenRouterClient;
pub use crate::api::{Completion, CompletionClient, CompletionFuture, RetryConfig, StageRequest};
pub use crate::config::{ClientConfig, RefineConfig};

// ── Pipeline ────────────────────────────────────────────────────────
pub use crate::pipeline::{
    ArtifactWriter, CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler,
    NoopHandler, RefineEvent, RefineOutcome, RefinePipeline, Session, SessionState, Stage,
    parse_artifact,
};

// ── Errors ──────────────────────────────────────────────────────────
pub use crate::error::{
    ArtifactError, CompletionError, ConfigError, PipelineError, RefineError, RefineFailure,
};
