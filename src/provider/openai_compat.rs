use reqwest::Client;
use serde_json::json;
use zeroize::Zeroizing;

use crate::provider::*;

pub struct OpenAICompatProvider {
    client: Client,
    api_key: Zeroizing<String>,
    base_url: String,
    fallback_model: Option<String>,
    extra_headers: Vec<(String, String)>,
}

impl OpenAICompatProvider {
    pub fn new(
        api_key: Zeroizing<String>,
        base_url: String,
        fallback_model: Option<String>,
        extra_headers: Vec<(String, String)>,
        timeout_seconds: u64,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_seconds))
                .build()?,
            api_key,
            base_url,
            fallback_model,
            extra_headers,
        })
    }

    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        json!({
            "model": request.model,
            "messages": build_openai_messages(&request.messages, &request.system),
            "max_tokens": request.max_tokens,
            "stream": false,
        })
    }

    fn build_http_request(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", &*self.api_key))
            .json(body);
        for (k, v) in &self.extra_headers {
            req = req.header(k.as_str(), v.as_str());
        }
        req
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait::async_trait]
impl LlmProvider for OpenAICompatProvider {
    async fn complete(&self, request: ChatRequest) -> anyhow::Result<Message> {
        let body = self.build_request_body(&request);
        let resp = self.build_http_request(&body).send().await?;
        let status = resp.status();

        if !status.is_success() {
            if is_retryable(status) {
                if let Some(fallback) = &self.fallback_model {
                    tracing::warn!("Primary model failed ({status}), trying fallback: {fallback}");
                    let mut fb = body.clone();
                    fb["model"] = json!(fallback);
                    let resp2 = self.build_http_request(&fb).send().await?;
                    let status2 = resp2.status();
                    if !status2.is_success() {
                        let text = resp2.text().await.unwrap_or_default();
                        anyhow::bail!("API error (fallback {status2}): {text}");
                    }
                    return parse_openai_response(&resp2.json().await?);
                }
            }
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("API error ({status}): {text}");
        }

        parse_openai_response(&resp.json().await?)
    }
}

pub fn build_openai_messages(messages: &[Message], system: &str) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    if !system.is_empty() {
        out.push(json!({"role": "system", "content": system}));
    }
    for msg in messages {
        out.push(json!({"role": msg.role, "content": msg.content}));
    }
    out
}
