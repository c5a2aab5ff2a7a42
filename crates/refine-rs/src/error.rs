//! Error types for every layer of the refine pipeline.
//!
//! Completion failures, session ordering violations, artifact persistence,
//! and configuration are kept as separate enums so callers can tell *where*
//! a run went wrong. [`RefineError`] unions them for the CLI.

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::session::{Session, SessionState, Stage};

/// Failure of a single call to the completion service.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The service rejected the credentials.
    #[error("completion service rejected credentials (HTTP {status}): {body}")]
    Auth { status: u16, body: String },

    /// The service could not be reached, or the response body could not be read.
    #[error("request failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status or an error payload.
    #[error("completion service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered, but without the expected content.
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
}

impl CompletionError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Transport failures and 429/5xx statuses are transient. Auth failures
    /// and malformed responses never are.
    pub fn is_transient(&self) -> bool {
        match self {
            CompletionError::Transport(_) => true,
            CompletionError::Status { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            CompletionError::Auth { .. } | CompletionError::MalformedResponse(_) => false,
        }
    }
}

/// A stage result was recorded out of the Draft → Critique → Revise order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot record {stage} output while session is {state}")]
    OutOfOrder { stage: Stage, state: SessionState },
}

/// Why a pipeline run stopped.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage failed: {source}")]
    Completion {
        stage: Stage,
        #[source]
        source: CompletionError,
    },

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl PipelineError {
    /// The stage that failed, if the failure came from a completion call.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Completion { stage, .. } => Some(*stage),
            PipelineError::Session(SessionError::OutOfOrder { stage, .. }) => Some(*stage),
        }
    }
}

/// A failed run, carrying whatever stages completed before the failure.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RefineFailure {
    #[source]
    pub error: PipelineError,
    /// Session state at the moment of failure. Never persisted.
    pub partial: Box<Session>,
}

impl RefineFailure {
    pub fn stage(&self) -> Option<Stage> {
        self.error.stage()
    }
}

/// Failure to persist or read back an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Only fully revised sessions are written.
    #[error("session is {0}, only revised sessions can be written")]
    Incomplete(SessionState),

    #[error("failed to write artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse artifact: {0}")]
    Parse(String),
}

/// Configuration could not be assembled.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no API key: pass --key-file or set {0}")]
    MissingApiKey(&'static str),

    #[error("failed to read key file {}: {source}", path.display())]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("key file {} contains no key", .0.display())]
    EmptyKeyFile(PathBuf),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Top-level error for callers that drive a whole run.
#[derive(Debug, Error)]
pub enum RefineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Run(#[from] RefineFailure),

    #[error("response generated but not saved: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("{0}")]
    Input(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CompletionError::Transport("connection reset".into()).is_transient());
        assert!(
            CompletionError::Status {
                status: 429,
                body: "rate limited".into()
            }
            .is_transient()
        );
        assert!(
            CompletionError::Status {
                status: 502,
                body: String::new()
            }
            .is_transient()
        );
    }

    #[test]
    fn permanent_classification() {
        assert!(
            !CompletionError::Auth {
                status: 401,
                body: "bad key".into()
            }
            .is_transient()
        );
        assert!(
            !CompletionError::Status {
                status: 400,
                body: "bad request".into()
            }
            .is_transient()
        );
        assert!(!CompletionError::MalformedResponse("no choices".into()).is_transient());
    }

    #[test]
    fn pipeline_error_names_stage() {
        let err = PipelineError::Completion {
            stage: Stage::Critique,
            source: CompletionError::Transport("timed out".into()),
        };
        assert_eq!(err.stage(), Some(Stage::Critique));
        assert_eq!(
            err.to_string(),
            "Critique stage failed: request failed: timed out"
        );
    }
}
