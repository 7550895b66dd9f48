//! LLM provider access: a generic HTTP-JSON chat adapter, assembled per
//! configured provider, wrapped in a fallback runner that tries each in
//! order and caches the first success.
//!
//! # Architecture
//! ```text
//! ┌───────────────────┐
//! │  FallbackRunner    │  ← tries providers in order, caches first success
//! └─────────┬──────────┘
//!           │
//!      ┌────┴────┐
//!      ▼         ▼
//! ┌─────────┐ ┌─────────┐
//! │Provider │ │Provider │  ← LlmProvider trait objects
//! │   #1    │ │   #2    │
//! └─────────┘ └─────────┘
//! ```

pub mod fallback_runner;
pub mod provider;
pub mod providers;

pub use fallback_runner::{AllProvidersFailed, EngineError, FallbackRunner};
pub use provider::{LlmError, LlmProvider};
pub use providers::OpenAiCompatibleProvider;

use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;

/// Build one provider trait object per `[[llm.providers]]` entry.
/// `kind` currently only distinguishes the generic OpenAI-compatible
/// adapter; any other value falls back to it too, since this crate
/// deliberately ships one HTTP-JSON client rather than a binding per
/// vendor SDK.
pub fn build_providers(config: &LlmConfig) -> Vec<Arc<dyn LlmProvider>> {
    config
        .providers
        .iter()
        .map(|provider_config| {
            // The client-level timeout must cover whichever call (text or
            // vision) takes longer; the fallback runner applies its own
            // per-call timeout on top of this.
            let timeout =
                Duration::from_secs(config.text_timeout_secs.max(config.vision_timeout_secs));
            Arc::new(OpenAiCompatibleProvider::new(provider_config, timeout, config.temperature))
                as Arc<dyn LlmProvider>
        })
        .collect()
}
