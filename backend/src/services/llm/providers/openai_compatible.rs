//! Generic provider adapter speaking the OpenAI chat-completions wire
//! format, which the majority of hosted and self-hosted model gateways
//! (including non-OpenAI vendors with a compatibility shim) accept.
//! Vendor SDKs are out of scope; this ships one HTTP-JSON client
//! configured entirely by `[[llm.providers]]` config.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use once_cell::sync::OnceCell;
use reqwest::Client;
use serde_json::json;

use crate::config::LlmProviderConfig;
use crate::services::llm::provider::{LlmError, LlmProvider};

pub struct OpenAiCompatibleProvider {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    temperature: f64,
    client: OnceCell<Client>,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &LlmProviderConfig, timeout: Duration, temperature: f64) -> Self {
        let api_key = config
            .api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty());

        Self {
            name: config.name.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: config.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string()),
            api_key,
            timeout,
            temperature,
            client: OnceCell::new(),
        }
    }

    /// Built on first use only, so an unconfigured provider never pays
    /// for a client it will never call.
    fn client(&self) -> &Client {
        self.client.get_or_init(|| {
            Client::builder().timeout(self.timeout).build().unwrap_or_default()
        })
    }

    async fn chat(&self, body: serde_json::Value) -> Result<String, LlmError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| LlmError::NotConfigured(self.name.clone()))?;

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let response = self
            .client()
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.name.clone())
                } else {
                    LlmError::RequestFailed { engine: self.name.clone(), message: e.to_string() }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                engine: self.name.clone(),
                message: format!("status {status}: {text}"),
            });
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| {
            LlmError::InvalidResponse { engine: self.name.clone(), message: e.to_string() }
        })?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::InvalidResponse {
                engine: self.name.clone(),
                message: "missing choices[0].message.content".to_string(),
            })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn invoke_vision(&self, prompt: &str, image_bytes: &[u8]) -> Result<String, LlmError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_bytes);
        let data_url = format!("data:image/png;base64,{encoded}");

        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": prompt},
                    {"type": "image_url", "image_url": {"url": data_url}},
                ],
            }],
        });

        self.chat(body).await
    }

    async fn invoke_text(&self, messages: &[(String, String)]) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages
                .iter()
                .map(|(role, content)| json!({"role": role, "content": content}))
                .collect::<Vec<_>>(),
        });

        self.chat(body).await
    }
}
