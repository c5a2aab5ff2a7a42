//! Events emitted by a [`RefinePipeline`](super::RefinePipeline) run.
//!
//! Callers implement [`EventHandler`] to observe stage progress for console
//! output, logging, or metrics. Handlers are observers only; they cannot
//! alter the run.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or silent runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures |
//! | [`CompositeEventHandler`] | Fan out to several handlers |
//! | Custom `impl EventHandler` | Progress output, metrics |

use std::time::Duration;

use tracing::{debug, info, warn};

use super::session::{Session, Stage};
use crate::UsageInfo;
use crate::error::CompletionError;

/// Lifecycle events of one refine run.
#[derive(Debug)]
pub enum RefineEvent<'a> {
    /// A stage is about to call the completion service.
    StageStarted { stage: Stage, model: &'a str },
    /// A transient failure will be retried after `delay`.
    StageRetrying {
        stage: Stage,
        attempt: u32,
        max_retries: u32,
        delay: Duration,
        error: &'a CompletionError,
    },
    /// A stage produced its output.
    StageCompleted {
        stage: Stage,
        output: &'a str,
        usage: Option<&'a UsageInfo>,
        elapsed: Duration,
    },
    /// A stage failed; no later stage will run.
    StageFailed {
        stage: Stage,
        error: &'a CompletionError,
    },
    /// All three stages completed.
    Finished { session: &'a Session },
}

/// Observer for [`RefineEvent`]s.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &RefineEvent<'_>);
}

/// Ignores every event.
pub struct NoopHandler;

impl EventHandler for NoopHandler {
    fn on_event(&self, _event: &RefineEvent<'_>) {}
}

/// Logs every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &RefineEvent<'_>) {
        match event {
            RefineEvent::StageStarted { stage, model } => {
                info!("{stage} stage started (model={model})");
            }
            RefineEvent::StageRetrying {
                stage,
                attempt,
                max_retries,
                delay,
                error,
            } => {
                warn!("{stage} stage retry {attempt}/{max_retries} in {delay:?}: {error}");
            }
            RefineEvent::StageCompleted {
                stage,
                output,
                usage,
                elapsed,
            } => {
                info!(
                    "{stage} stage completed in {:.1}s ({} chars)",
                    elapsed.as_secs_f64(),
                    output.len()
                );
                if let Some(u) = usage {
                    debug!(
                        "{stage} usage: prompt={}, completion={}",
                        u.prompt_tokens.unwrap_or(0),
                        u.completion_tokens.unwrap_or(0)
                    );
                }
            }
            RefineEvent::StageFailed { stage, error } => {
                warn!("{stage} stage failed: {error}");
            }
            RefineEvent::Finished { session } => {
                info!(
                    "Session {} finished: {}",
                    session.trace_id(),
                    session.usage().summary()
                );
            }
        }
    }
}

/// Wraps a closure as an [`EventHandler`].
///
/// ```
/// use refine_rs::pipeline::events::{FnEventHandler, RefineEvent};
///
/// let handler = FnEventHandler::new(|event| {
///     if let RefineEvent::StageStarted { stage, .. } = event {
///         eprintln!("running {stage}");
///     }
/// });
/// # let _ = handler;
/// ```
pub struct FnEventHandler<F>
where
    F: Fn(&RefineEvent<'_>) + Send + Sync,
{
    f: F,
}

impl<F> FnEventHandler<F>
where
    F: Fn(&RefineEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&RefineEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &RefineEvent<'_>) {
        (self.f)(event);
    }
}

/// Dispatches every event to several handlers, in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(!quiet, ProgressHandler);
/// ```
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add `handler` only when `condition` holds.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &RefineEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}
