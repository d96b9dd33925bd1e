pub mod anthropic;
pub mod openai_compat;

use serde::{Deserialize, Serialize};

use crate::config::Config;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
}

#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> anyhow::Result<Message>;
}

/// Single-prompt text completion, the only capability the question
/// pipeline needs from a language model.
#[async_trait::async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

const SYSTEM_PROMPT: &str = "You help a user understand their own shell command history. \
Follow the output instructions in each request exactly.";

/// Binds a provider to one model and exposes it as a [`Completer`].
pub struct ProviderCompleter {
    provider: Box<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
}

impl ProviderCompleter {
    pub fn new(provider: Box<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 2048,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let provider = create_provider(&config.provider.default, config)?;
        Ok(Self::new(provider, config.ask_model()))
    }

    fn request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.into(),
            messages: vec![Message {
                role: Role::User,
                content: prompt.to_string(),
            }],
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait::async_trait]
impl Completer for ProviderCompleter {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let response = self.provider.complete(self.request(prompt)).await?;
        Ok(response.content)
    }
}

/// Factory: create a provider by name.
pub fn create_provider(
    provider_name: &str,
    config: &Config,
) -> anyhow::Result<Box<dyn LlmProvider>> {
    let timeout = config.provider.timeout_seconds;
    let fallback = config.provider.fallback_model.clone();
    match provider_name {
        "openrouter" => {
            let auth = config
                .provider
                .openrouter
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("OpenRouter not configured"))?;
            Ok(Box::new(openai_compat::OpenAICompatProvider::new(
                auth.resolve_api_key("openrouter")?,
                auth.base_url
                    .clone()
                    .unwrap_or_else(|| "https://openrouter.ai/api/v1".into()),
                fallback,
                vec![("X-Title".into(), "histq".into())],
                timeout,
            )?))
        }
        "openai" => {
            let auth = config
                .provider
                .openai
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("OpenAI not configured"))?;
            Ok(Box::new(openai_compat::OpenAICompatProvider::new(
                auth.resolve_api_key("openai")?,
                auth.base_url
                    .clone()
                    .unwrap_or_else(|| "https://api.openai.com/v1".into()),
                fallback,
                vec![],
                timeout,
            )?))
        }
        "anthropic" => Ok(Box::new(anthropic::AnthropicProvider::new(config)?)),
        "gemini" => {
            let auth = config
                .provider
                .gemini
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Gemini not configured"))?;
            Ok(Box::new(openai_compat::OpenAICompatProvider::new(
                auth.resolve_api_key("gemini")?,
                "https://generativelanguage.googleapis.com/v1beta/openai".into(),
                None,
                vec![],
                timeout,
            )?))
        }
        "ollama" => {
            let auth = config.provider.ollama.as_ref();
            let base_url = auth
                .and_then(|a| a.base_url.clone())
                .unwrap_or_else(|| "http://localhost:11434/v1".into());
            let api_key = auth
                .and_then(|a| a.resolve_api_key("ollama").ok())
                .unwrap_or_else(|| zeroize::Zeroizing::new("ollama".into()));
            Ok(Box::new(openai_compat::OpenAICompatProvider::new(
                api_key, base_url, fallback, vec![], timeout,
            )?))
        }
        _ => anyhow::bail!("Unknown provider: {provider_name}"),
    }
}

/// Parse an OpenAI-format JSON response into our Message type.
pub fn parse_openai_response(json: &serde_json::Value) -> anyhow::Result<Message> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| anyhow::anyhow!("No choices in response"))?;
    let text = choice["message"]["content"].as_str().unwrap_or("");
    Ok(Message {
        role: Role::Assistant,
        content: text.to_string(),
    })
}

#[cfg(test)]
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::Completer;

    /// Replays canned responses in order and records every prompt.
    pub struct ScriptedCompleter {
        responses: Mutex<VecDeque<anyhow::Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedCompleter {
        pub fn new<I, S>(responses: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self::from_results(responses.into_iter().map(|s| Ok(s.into())).collect())
        }

        pub fn from_results(responses: Vec<anyhow::Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Completer for ScriptedCompleter {
        async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
        }
    }
}
