use serde::Deserialize;
use std::path::PathBuf;
use std::process::Command;
use zeroize::Zeroizing;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub ask: AskConfig,
    pub provider: ProviderConfig,
    pub db: DbConfig,
}

/// Settings consumed by the question pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AskConfig {
    pub enabled: bool,
    /// Overrides `provider.model` for history questions.
    pub model: Option<String>,
    pub execution_timeout_seconds: u64,
    pub max_retries: u32,
    pub max_tokens_per_chunk: usize,
    pub top_commands: usize,
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
            execution_timeout_seconds: 10,
            max_retries: 3,
            max_tokens_per_chunk: 4000,
            top_commands: 10,
        }
    }
}

impl AskConfig {
    pub fn effective_max_retries(&self) -> u32 {
        self.max_retries.clamp(1, 10)
    }

    pub fn effective_max_tokens_per_chunk(&self) -> usize {
        self.max_tokens_per_chunk.max(1)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub default: String,
    pub model: String,
    pub fallback_model: Option<String>,
    pub openrouter: Option<ProviderAuth>,
    pub anthropic: Option<ProviderAuth>,
    pub openai: Option<ProviderAuth>,
    pub ollama: Option<ProviderAuth>,
    pub gemini: Option<ProviderAuth>,
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default: "openrouter".into(),
            model: "google/gemini-2.5-flash".into(),
            fallback_model: None,
            openrouter: Some(ProviderAuth::default()),
            anthropic: None,
            openai: None,
            ollama: None,
            gemini: None,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ProviderAuth {
    pub api_key: Option<String>,
    pub api_key_cmd: Option<String>,
    pub base_url: Option<String>,
}

impl ProviderAuth {
    pub fn resolve_api_key(&self, provider_name: &str) -> anyhow::Result<Zeroizing<String>> {
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                return Ok(Zeroizing::new(key.clone()));
            }
        }
        if let Some(cmd) = &self.api_key_cmd {
            #[cfg(unix)]
            let output = Command::new("sh").arg("-c").arg(cmd).output()?;
            #[cfg(windows)]
            let output = Command::new("cmd").args(["/C", cmd]).output()?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                anyhow::bail!(
                    "api_key_cmd failed (exit {}): {stderr}",
                    output.status.code().unwrap_or(-1)
                );
            }
            let key = String::from_utf8(output.stdout)?.trim().to_string();
            if key.is_empty() {
                anyhow::bail!("api_key_cmd returned empty string");
            }
            return Ok(Zeroizing::new(key));
        }
        let env_var = api_key_env_var(provider_name);
        if !env_var.is_empty() {
            if let Ok(key) = std::env::var(env_var) {
                if !key.is_empty() {
                    return Ok(Zeroizing::new(key));
                }
            }
        }
        anyhow::bail!("No API key for {provider_name} (tried config, api_key_cmd, ${env_var})")
    }
}

fn api_key_env_var(provider_name: &str) -> &'static str {
    match provider_name {
        "openrouter" => "OPENROUTER_API_KEY",
        "anthropic" => "ANTHROPIC_API_KEY",
        "openai" => "OPENAI_API_KEY",
        "gemini" => "GEMINI_API_KEY",
        _ => "",
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub busy_timeout_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 10_000,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::path();
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = std::fs::metadata(&path) {
                if meta.permissions().mode() & 0o077 != 0 {
                    tracing::warn!(
                        "{} is readable by other users. Consider: chmod 600 {}",
                        path.display(),
                        path.display()
                    );
                }
            }
        }
        let content = std::fs::read_to_string(&path)?;
        let config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
        Ok(config)
    }

    pub fn path() -> PathBuf {
        Self::histq_dir().join("config.toml")
    }

    pub fn db_path() -> PathBuf {
        Self::histq_dir().join("history.db")
    }

    pub fn histq_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("HISTQ_HOME") {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".histq")
    }

    /// Model used for history questions.
    pub fn ask_model(&self) -> &str {
        self.ask.model.as_deref().unwrap_or(&self.provider.model)
    }
}
