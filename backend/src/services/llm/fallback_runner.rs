//! Runs a prompt against an ordered list of providers, falling back to
//! the next one whenever a provider is unconfigured, errors, or times
//! out. The first successful response is cached; if every provider
//! fails, every failure is reported together rather than just the last.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::services::cache::CacheBackend;
use crate::services::llm::provider::{LlmError, LlmProvider};

#[derive(Debug, Clone)]
pub struct EngineError {
    pub engine: String,
    pub message: String,
}

#[derive(Debug)]
pub struct AllProvidersFailed {
    pub engine_errors: Vec<EngineError>,
}

impl std::fmt::Display for AllProvidersFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let details: Vec<String> =
            self.engine_errors.iter().map(|e| format!("{}: {}", e.engine, e.message)).collect();
        write!(f, "{}", details.join("; "))
    }
}

impl std::error::Error for AllProvidersFailed {}

pub struct FallbackRunner {
    providers: Vec<Arc<dyn LlmProvider>>,
    cache: Arc<dyn CacheBackend>,
    cache_ttl_secs: u64,
    vision_timeout: Duration,
    text_timeout: Duration,
}

impl FallbackRunner {
    pub fn new(
        providers: Vec<Arc<dyn LlmProvider>>,
        cache: Arc<dyn CacheBackend>,
        cache_ttl_secs: u64,
        vision_timeout: Duration,
        text_timeout: Duration,
    ) -> Self {
        Self { providers, cache, cache_ttl_secs, vision_timeout, text_timeout }
    }

    /// Run `prompt` against `image_bytes` through each configured
    /// provider in order, returning the first cached-or-fresh response
    /// that `validator` accepts. With no validator, any non-error
    /// response is accepted.
    pub async fn run_vision(
        &self,
        cache_key_prefix: &str,
        prompt: &str,
        image_bytes: &[u8],
        validator: Option<&(dyn Fn(&str) -> bool + Sync)>,
    ) -> Result<String, AllProvidersFailed> {
        let fingerprint = vision_fingerprint(cache_key_prefix, prompt, image_bytes);

        if let Some(cached) = self.cache.get(&fingerprint).await {
            info!(prefix = cache_key_prefix, "LLM cache hit");
            return Ok(cached);
        }

        let mut errors = Vec::new();

        for provider in &self.providers {
            if !provider.is_configured() {
                continue;
            }

            match tokio::time::timeout(
                self.vision_timeout,
                provider.invoke_vision(prompt, image_bytes),
            )
            .await
            {
                Ok(Ok(text)) => {
                    if validator.is_some_and(|is_valid| !is_valid(&text)) {
                        warn!(engine = provider.name(), "LLM response rejected by validator");
                        errors.push(EngineError {
                            engine: provider.name().to_string(),
                            message: "response rejected by validator".to_string(),
                        });
                        continue;
                    }
                    self.cache.set(&fingerprint, text.clone(), self.cache_ttl_secs).await;
                    return Ok(text);
                }
                Ok(Err(e)) => {
                    warn!(engine = provider.name(), error = %e, "LLM provider failed");
                    errors.push(EngineError { engine: provider.name().to_string(), message: e.to_string() });
                }
                Err(_) => {
                    warn!(engine = provider.name(), "LLM provider timed out");
                    errors.push(EngineError {
                        engine: provider.name().to_string(),
                        message: LlmError::Timeout(provider.name().to_string()).to_string(),
                    });
                }
            }
        }

        Err(AllProvidersFailed { engine_errors: errors })
    }

    /// Run a chat-style message list through each configured provider
    /// in order, returning the first cached-or-fresh response that
    /// `validator` accepts. With no validator, any non-error response
    /// is accepted.
    pub async fn run_text(
        &self,
        cache_key_prefix: &str,
        messages: &[(String, String)],
        validator: Option<&(dyn Fn(&str) -> bool + Sync)>,
    ) -> Result<String, AllProvidersFailed> {
        let fingerprint = text_fingerprint(cache_key_prefix, messages);

        if let Some(cached) = self.cache.get(&fingerprint).await {
            info!(prefix = cache_key_prefix, "LLM cache hit");
            return Ok(cached);
        }

        let mut errors = Vec::new();

        for provider in &self.providers {
            if !provider.is_configured() {
                continue;
            }

            match tokio::time::timeout(self.text_timeout, provider.invoke_text(messages)).await {
                Ok(Ok(text)) => {
                    if validator.is_some_and(|is_valid| !is_valid(&text)) {
                        warn!(engine = provider.name(), "LLM response rejected by validator");
                        errors.push(EngineError {
                            engine: provider.name().to_string(),
                            message: "response rejected by validator".to_string(),
                        });
                        continue;
                    }
                    self.cache.set(&fingerprint, text.clone(), self.cache_ttl_secs).await;
                    return Ok(text);
                }
                Ok(Err(e)) => {
                    warn!(engine = provider.name(), error = %e, "LLM provider failed");
                    errors.push(EngineError { engine: provider.name().to_string(), message: e.to_string() });
                }
                Err(_) => {
                    warn!(engine = provider.name(), "LLM provider timed out");
                    errors.push(EngineError {
                        engine: provider.name().to_string(),
                        message: LlmError::Timeout(provider.name().to_string()).to_string(),
                    });
                }
            }
        }

        Err(AllProvidersFailed { engine_errors: errors })
    }
}

/// Deterministic across process restarts, unlike a `DefaultHasher`-based
/// key, which is reseeded every run and therefore useless as a
/// persistent cache key.
fn vision_fingerprint(prefix: &str, prompt: &str, image_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(b"\0");
    hasher.update(prompt.as_bytes());
    hasher.update(b"\0");
    hasher.update(image_bytes);
    format!("{:x}", hasher.finalize())
}

fn text_fingerprint(prefix: &str, messages: &[(String, String)]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    for (role, content) in messages {
        hasher.update(b"\0");
        hasher.update(role.as_bytes());
        hasher.update(b"\0");
        hasher.update(content.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::services::cache::{InMemoryCacheBackend, NoopCacheBackend};

    #[test]
    fn fingerprint_is_stable_for_identical_input() {
        let a = vision_fingerprint("diagram", "describe this", b"bytes");
        let b = vision_fingerprint("diagram", "describe this", b"bytes");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_on_any_input_change() {
        let base = vision_fingerprint("diagram", "describe this", b"bytes");
        assert_ne!(base, vision_fingerprint("other", "describe this", b"bytes"));
        assert_ne!(base, vision_fingerprint("diagram", "describe that", b"bytes"));
        assert_ne!(base, vision_fingerprint("diagram", "describe this", b"other"));
    }

    struct MockProvider {
        name: &'static str,
        configured: bool,
        response: Result<&'static str, &'static str>,
        call_count: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for MockProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn invoke_vision(&self, _prompt: &str, _image_bytes: &[u8]) -> Result<String, LlmError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.response
                .map(|s| s.to_string())
                .map_err(|e| LlmError::RequestFailed { engine: self.name.to_string(), message: e.to_string() })
        }

        async fn invoke_text(&self, _messages: &[(String, String)]) -> Result<String, LlmError> {
            self.invoke_vision("", &[]).await
        }
    }

    fn runner_with(providers: Vec<Arc<dyn LlmProvider>>, cache: Arc<dyn CacheBackend>) -> FallbackRunner {
        FallbackRunner::new(
            providers,
            cache,
            60,
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn falls_back_to_the_first_provider_that_succeeds() {
        let p1_calls = Arc::new(AtomicUsize::new(0));
        let p2_calls = Arc::new(AtomicUsize::new(0));
        let p3_calls = Arc::new(AtomicUsize::new(0));

        let p1: Arc<dyn LlmProvider> = Arc::new(MockProvider {
            name: "P1",
            configured: true,
            response: Err("boom"),
            call_count: p1_calls.clone(),
        });
        let p2: Arc<dyn LlmProvider> = Arc::new(MockProvider {
            name: "P2",
            configured: true,
            response: Ok(r#"{"ok": true}"#),
            call_count: p2_calls.clone(),
        });
        let p3: Arc<dyn LlmProvider> = Arc::new(MockProvider {
            name: "P3",
            configured: true,
            response: Ok(r#"{"ok": "should never be seen"}"#),
            call_count: p3_calls.clone(),
        });

        let runner = runner_with(vec![p1, p2, p3], Arc::new(NoopCacheBackend));
        let result = runner.run_vision("test", "prompt", b"img", None).await.unwrap();

        assert_eq!(result, r#"{"ok": true}"#);
        assert_eq!(p1_calls.load(Ordering::SeqCst), 1);
        assert_eq!(p2_calls.load(Ordering::SeqCst), 1);
        assert_eq!(p3_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn caches_the_first_success_and_skips_providers_on_repeat_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider: Arc<dyn LlmProvider> = Arc::new(MockProvider {
            name: "P1",
            configured: true,
            response: Ok(r#"{"cached": true}"#),
            call_count: calls.clone(),
        });

        let cache: Arc<dyn CacheBackend> = Arc::new(InMemoryCacheBackend::new());
        let runner = runner_with(vec![provider], cache);

        let first = runner.run_vision("test", "prompt", b"img", None).await.unwrap();
        let second = runner.run_vision("test", "prompt", b"img", None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second call must be served from cache");
    }

    #[tokio::test]
    async fn reports_every_provider_error_when_all_fail() {
        let p1: Arc<dyn LlmProvider> = Arc::new(MockProvider {
            name: "A",
            configured: true,
            response: Err("down"),
            call_count: Arc::new(AtomicUsize::new(0)),
        });
        let p2: Arc<dyn LlmProvider> = Arc::new(MockProvider {
            name: "B",
            configured: true,
            response: Err("also down"),
            call_count: Arc::new(AtomicUsize::new(0)),
        });

        let runner = runner_with(vec![p1, p2], Arc::new(NoopCacheBackend));
        let err = runner.run_vision("test", "prompt", b"img", None).await.unwrap_err();

        assert_eq!(err.engine_errors.len(), 2);
        assert_eq!(err.engine_errors[0].engine, "A");
        assert_eq!(err.engine_errors[1].engine, "B");
    }

    #[tokio::test]
    async fn unconfigured_providers_are_skipped_without_being_invoked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let unconfigured: Arc<dyn LlmProvider> = Arc::new(MockProvider {
            name: "unconfigured",
            configured: false,
            response: Ok("never"),
            call_count: calls.clone(),
        });
        let configured: Arc<dyn LlmProvider> = Arc::new(MockProvider {
            name: "configured",
            configured: true,
            response: Ok(r#"{"ok": true}"#),
            call_count: Arc::new(AtomicUsize::new(0)),
        });

        let runner = runner_with(vec![unconfigured, configured], Arc::new(NoopCacheBackend));
        runner.run_vision("test", "prompt", b"img", None).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn validator_rejects_an_empty_response_and_falls_back() {
        let p1: Arc<dyn LlmProvider> = Arc::new(MockProvider {
            name: "empty",
            configured: true,
            response: Ok("{}"),
            call_count: Arc::new(AtomicUsize::new(0)),
        });
        let p2: Arc<dyn LlmProvider> = Arc::new(MockProvider {
            name: "real",
            configured: true,
            response: Ok(r#"{"components": ["a"]}"#),
            call_count: Arc::new(AtomicUsize::new(0)),
        });

        let runner = runner_with(vec![p1, p2], Arc::new(NoopCacheBackend));
        let not_empty: &(dyn Fn(&str) -> bool + Sync) = &|text: &str| text != "{}";
        let result = runner.run_vision("test", "prompt", b"img", Some(not_empty)).await.unwrap();

        assert_eq!(result, r#"{"components": ["a"]}"#);
    }

    #[tokio::test]
    async fn validator_rejecting_every_provider_reports_all_as_failed() {
        let p1: Arc<dyn LlmProvider> = Arc::new(MockProvider {
            name: "empty",
            configured: true,
            response: Ok("{}"),
            call_count: Arc::new(AtomicUsize::new(0)),
        });

        let runner = runner_with(vec![p1], Arc::new(NoopCacheBackend));
        let always_reject: &(dyn Fn(&str) -> bool + Sync) = &|_: &str| false;
        let err =
            runner.run_vision("test", "prompt", b"img", Some(always_reject)).await.unwrap_err();

        assert_eq!(err.engine_errors.len(), 1);
        assert_eq!(err.engine_errors[0].engine, "empty");
    }

}
