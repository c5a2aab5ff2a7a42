//! Configuration for the completion client and the refine pipeline.
//!
//! Both types are built once, up front, and never change afterwards. The
//! client copies what it needs out of [`ClientConfig`] at construction;
//! nothing reloads credentials mid-run.
//!
//! # Examples
//!
//! ```ignore
//! let key = ClientConfig::load_api_key(None)?;
//! let client = OpenRouterClient::new(ClientConfig::new(key).with_max_tokens(800))?;
//!
//! let config = RefineConfig::new("openai/gpt-4o")
//!     .with_editor_model("anthropic/claude-sonnet-4")
//!     .with_retries(2);
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::api::retry::RetryConfig;
use crate::error::ConfigError;
use crate::pipeline::session::Stage;
use crate::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL, OPENROUTER_URL};

/// Environment variable consulted when no key file is given.
pub const API_KEY_ENV: &str = "OPENROUTER_KEY";

// ── ClientConfig ───────────────────────────────────────────────────

/// Credentials and transport settings for [`OpenRouterClient`](crate::OpenRouterClient).
#[derive(Clone)]
pub struct ClientConfig {
    /// Bearer token for the completion service.
    pub api_key: String,
    /// Chat-completions endpoint. Default: [`OPENROUTER_URL`].
    pub endpoint: String,
    /// `HTTP-Referer` header.
    pub referer: String,
    /// `X-Title` header.
    pub title: String,
    /// Whole-request timeout. Default: 120 s.
    pub timeout: Duration,
    /// Response-length hint sent with every request. Default: 1000.
    pub max_tokens: u32,
    /// Sampling temperature. Default: 0.7.
    pub temperature: f32,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: OPENROUTER_URL.to_string(),
            referer: "https://github.com/refine-rs/refine-rs".to_string(),
            title: "refine-rs".to_string(),
            timeout: Duration::from_secs(120),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.7,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_headers(mut self, referer: impl Into<String>, title: impl Into<String>) -> Self {
        self.referer = referer.into();
        self.title = title.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Load the API key from `key_file`, or from [`API_KEY_ENV`] if no file is given.
    pub fn load_api_key(key_file: Option<&Path>) -> Result<String, ConfigError> {
        resolve_api_key(key_file, std::env::var(API_KEY_ENV).ok())
    }
}

// The key never appears in logs or panic messages.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("referer", &self.referer)
            .field("title", &self.title)
            .field("timeout", &self.timeout)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Pick the key from a file (first non-empty line) or the environment value.
///
/// An explicit key file wins; its absence or emptiness is an error rather
/// than a silent fallback.
pub(crate) fn resolve_api_key(
    key_file: Option<&Path>,
    env_value: Option<String>,
) -> Result<String, ConfigError> {
    if let Some(path) = key_file {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::KeyFile {
            path: path.to_path_buf(),
            source,
        })?;
        return content
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ConfigError::EmptyKeyFile(path.to_path_buf()));
    }

    env_value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingApiKey(API_KEY_ENV))
}

// ── RefineConfig ───────────────────────────────────────────────────

/// Model roles and retry policy for a [`RefinePipeline`](crate::pipeline::RefinePipeline).
#[derive(Debug, Clone)]
pub struct RefineConfig {
    /// Model that writes the draft and the revision.
    pub writer_model: String,
    /// Model that critiques the draft. Defaults to `writer_model`.
    pub editor_model: Option<String>,
    /// Backoff applied around each stage call. Default: no retries.
    pub retry: RetryConfig,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

impl RefineConfig {
    pub fn new(writer_model: impl Into<String>) -> Self {
        Self {
            writer_model: writer_model.into(),
            editor_model: None,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_editor_model(mut self, model: impl Into<String>) -> Self {
        self.editor_model = Some(model.into());
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry = RetryConfig::with_retries(retries);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The model a given stage runs on.
    pub fn model_for(&self, stage: Stage) -> &str {
        match stage {
            Stage::Critique => self.editor_model.as_deref().unwrap_or(&self.writer_model),
            Stage::Draft | Stage::Revise => &self.writer_model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn client_defaults() {
        let config = ClientConfig::new("sk-test");
        assert_eq!(config.endpoint, OPENROUTER_URL);
        assert_eq!(config.max_tokens, 1000);
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn debug_redacts_key() {
        let rendered = format!("{:?}", ClientConfig::new("sk-secret-123"));
        assert!(!rendered.contains("sk-secret-123"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn key_file_first_nonempty_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "\n  sk-first  \nsk-second").unwrap();
        let key = resolve_api_key(Some(file.path()), Some("sk-env".into())).unwrap();
        assert_eq!(key, "sk-first");
    }

    #[test]
    fn empty_key_file_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = resolve_api_key(Some(file.path()), Some("sk-env".into())).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyKeyFile(_)));
    }

    #[test]
    fn missing_key_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_api_key(Some(&dir.path().join("keys.txt")), None).unwrap_err();
        assert!(matches!(err, ConfigError::KeyFile { .. }));
    }

    #[test]
    fn env_key_used_without_file() {
        assert_eq!(
            resolve_api_key(None, Some(" sk-env\n".into())).unwrap(),
            "sk-env"
        );
        assert!(matches!(
            resolve_api_key(None, Some("  ".into())),
            Err(ConfigError::MissingApiKey(API_KEY_ENV))
        ));
        assert!(resolve_api_key(None, None).is_err());
    }

    #[test]
    fn editor_model_defaults_to_writer() {
        let config = RefineConfig::new("openai/gpt-4o");
        for stage in Stage::ALL {
            assert_eq!(config.model_for(stage), "openai/gpt-4o");
        }

        let config = config.with_editor_model("anthropic/claude-sonnet-4");
        assert_eq!(config.model_for(Stage::Draft), "openai/gpt-4o");
        assert_eq!(config.model_for(Stage::Critique), "anthropic/claude-sonnet-4");
        assert_eq!(config.model_for(Stage::Revise), "openai/gpt-4o");
    }

    #[test]
    fn retries_off_by_default() {
        assert_eq!(RefineConfig::default().retry.max_retries, 0);
        assert_eq!(RefineConfig::default().with_retries(3).retry.max_retries, 3);
    }
}
