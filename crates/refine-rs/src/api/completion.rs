//! The completion-service boundary.
//!
//! [`CompletionClient`] is the seam between the pipeline and whatever serves
//! completions. [`OpenRouterClient`](crate::OpenRouterClient) is the HTTP
//! implementation; tests substitute scripted clients.

use std::future::Future;
use std::pin::Pin;

use crate::UsageInfo;
use crate::error::CompletionError;
use crate::pipeline::session::Stage;

/// Boxed future returned by [`CompletionClient::complete`].
pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Completion, CompletionError>> + Send + 'a>>;

/// One (system, user) exchange to send to the service. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRequest {
    /// Which stage issued the request. Used for logging only.
    pub stage: Stage,
    /// Model id to run the request on.
    pub model: String,
    /// System-role instruction.
    pub system: String,
    /// User-role content.
    pub user: String,
}

/// Text of the first choice plus any usage the service reported.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Option<UsageInfo>,
}

impl Completion {
    /// A completion without usage information.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// A service that turns a [`StageRequest`] into text.
///
/// Implementations send exactly one request per call and keep no state
/// between calls. Retrying is left to the caller.
///
/// # Implementing
///
/// ```ignore
/// use refine_rs::api::completion::{Completion, CompletionClient, CompletionFuture, StageRequest};
///
/// struct Echo;
///
/// impl CompletionClient for Echo {
///     fn complete<'a>(&'a self, request: &'a StageRequest) -> CompletionFuture<'a> {
///         Box::pin(async move { Ok(Completion::text(request.user.clone())) })
///     }
/// }
/// ```
pub trait CompletionClient: Send + Sync {
    fn complete<'a>(&'a self, request: &'a StageRequest) -> CompletionFuture<'a>;
}

impl<C: CompletionClient + ?Sized> CompletionClient for &C {
    fn complete<'a>(&'a self, request: &'a StageRequest) -> CompletionFuture<'a> {
        (**self).complete(request)
    }
}

impl<C: CompletionClient + ?Sized> CompletionClient for std::sync::Arc<C> {
    fn complete<'a>(&'a self, request: &'a StageRequest) -> CompletionFuture<'a> {
        (**self).complete(request)
    }
}
