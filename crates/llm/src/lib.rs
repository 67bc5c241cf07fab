//! The pluggable LLM provider contract and its two concrete backends.
//!
//! Everything above this crate talks to `dyn Generator`, never to a
//! specific provider. `generate` is the entire surface: one call in,
//! one string out, errors (including timeouts) surfaced as `Err` so the
//! retry handler can treat them uniformly.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Role of a single turn in the conversation sent to the model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// The LLM provider contract (spec.md §6). `generate` may throw or be
/// wrapped in a timeout by the caller (the orchestrator's retry handler
/// owns the per-attempt deadline, not this trait).
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Ollama `/api/chat` backend.
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let endpoint = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": temperature },
            "messages": messages.iter().map(|m| json!({
                "role": role_str(m.role),
                "content": m.content,
            })).collect::<Vec<_>>(),
        });

        let response = self.client.post(endpoint).json(&payload).send().await?;
        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(anyhow!("ollama error ({status}): {body}"));
        }

        body.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| anyhow!("ollama response missing message.content: {body}"))
    }
}

/// OpenRouter (`/chat/completions`) backend, OpenAI-compatible wire format.
pub struct OpenRouterGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenRouterGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Generator for OpenRouterGenerator {
    async fn generate(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(anyhow!("OPENROUTER_API_KEY not configured"));
        }

        let payload = json!({
            "model": self.model,
            "temperature": temperature,
            "messages": messages.iter().map(|m| json!({
                "role": role_str(m.role),
                "content": m.content,
            })).collect::<Vec<_>>(),
        });

        let response = self
            .client
            .post("https://openrouter.ai/api/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", "https://cipher.local")
            .header("X-Title", "Cipher")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(anyhow!("openrouter error ({status}): {body}"));
        }

        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| anyhow!("openrouter response missing choices[0].message.content: {body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_constructors_set_role() {
        let m = ChatMessage::system("hi");
        assert_eq!(m.role, Role::System);
        assert_eq!(m.content, "hi");
    }

    #[tokio::test]
    async fn openrouter_without_key_fails_fast() {
        let gen = OpenRouterGenerator::new("", "openai/gpt-4o-mini", Duration::from_secs(1));
        let err = gen.generate(&[ChatMessage::user("hi")], 0.7).await.unwrap_err();
        assert!(err.to_string().contains("OPENROUTER_API_KEY"));
    }
}
