//! The `LlmProvider` trait: one HTTP-backed language/vision model backend.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider {0} is not configured (missing API key)")]
    NotConfigured(String),

    #[error("provider {engine} request failed: {message}")]
    RequestFailed { engine: String, message: String },

    #[error("provider {engine} returned a response that failed validation: {message}")]
    InvalidResponse { engine: String, message: String },

    #[error("provider {0} timed out")]
    Timeout(String),
}

/// One configured language/vision model backend.
///
/// Implementations construct their HTTP client lazily, on first use, so
/// that an unconfigured (no API key) provider costs nothing at startup.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this provider has the credentials it needs to run.
    fn is_configured(&self) -> bool;

    /// Send a prompt plus an image and return the raw text response.
    async fn invoke_vision(&self, prompt: &str, image_bytes: &[u8]) -> Result<String, LlmError>;

    /// Send a chat-style list of `(role, content)` messages and return the
    /// raw text response.
    async fn invoke_text(&self, messages: &[(String, String)]) -> Result<String, LlmError>;
}
