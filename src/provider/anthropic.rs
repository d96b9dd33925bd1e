use reqwest::Client;
use serde_json::json;
use zeroize::Zeroizing;

use crate::provider::*;

pub struct AnthropicProvider {
    client: Client,
    api_key: Zeroizing<String>,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(config: &crate::config::Config) -> anyhow::Result<Self> {
        let auth = config
            .provider
            .anthropic
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Anthropic not configured"))?;
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(
                    config.provider.timeout_seconds,
                ))
                .build()?,
            api_key: auth.resolve_api_key("anthropic")?,
            base_url: auth
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com".into()),
        })
    }

    fn build_body(&self, request: &ChatRequest) -> serde_json::Value {
        // System text travels in its own field, not as a message.
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();

        json!({
            "model": request.model,
            "system": request.system,
            "messages": messages,
            "max_tokens": request.max_tokens,
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: ChatRequest) -> anyhow::Result<Message> {
        let body = self.build_body(&request);
        let mut header_val = reqwest::header::HeaderValue::from_str(&self.api_key)
            .unwrap_or_else(|_| reqwest::header::HeaderValue::from_static(""));
        header_val.set_sensitive(true);
        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", header_val)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error ({status}): {text}");
        }
        let json: serde_json::Value = resp.json().await?;
        Ok(Message {
            role: Role::Assistant,
            content: extract_text(&json),
        })
    }
}

fn extract_text(json: &serde_json::Value) -> String {
    json["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .filter_map(|b| b["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}
