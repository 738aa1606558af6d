//! Language model backend configuration

use serde::{Deserialize, Serialize};

/// Backend configuration identifier
pub type BackendConfigId = i64;

/// Wire protocol of an API-hosted chat model
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatApi {
    /// OpenAI-compatible `/chat/completions`
    #[default]
    OpenAi,
    /// Anthropic `/messages`
    Anthropic,
}

/// Which kind of backend serves a configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendKind {
    /// Chat model behind a hosted API (OpenAI, Anthropic)
    ApiChat {
        #[serde(default)]
        provider: ChatApi,
    },
    /// Externally hosted completion model (Together-style API)
    Hosted,
    /// Local inference endpoint (Ollama)
    Local,
}

impl BackendKind {
    /// Short label for logs and audit records
    pub fn label(&self) -> &'static str {
        match self {
            Self::ApiChat { provider: ChatApi::OpenAi } => "openai",
            Self::ApiChat { provider: ChatApi::Anthropic } => "anthropic",
            Self::Hosted => "hosted",
            Self::Local => "local",
        }
    }
}

/// A configured language model backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmBackendConfig {
    /// Configuration ID
    pub id: BackendConfigId,
    /// Display name (unique)
    pub name: String,
    /// Backend kind
    pub kind: BackendKind,
    /// Model identifier; the backend's default is used when absent
    #[serde(default)]
    pub model: Option<String>,
    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub credential_env: Option<String>,
    /// Endpoint override; the backend's default is used when absent
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Whether this is the default configuration
    #[serde(default)]
    pub is_default: bool,
}

fn default_temperature() -> f32 { 0.3 }
fn default_max_tokens() -> u32 { 512 }

impl LlmBackendConfig {
    /// Create a configuration with default sampling settings
    pub fn new(id: BackendConfigId, name: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            model: None,
            credential_env: None,
            endpoint: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            is_default: false,
        }
    }

    /// Set the model identifier
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the credential environment variable
    pub fn with_credential_env(mut self, var: impl Into<String>) -> Self {
        self.credential_env = Some(var.into());
        self
    }

    /// Mark as the default configuration
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Model to use, falling back to the backend default
    pub fn model_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.model.as_deref().unwrap_or(fallback)
    }

    /// Endpoint to use without a trailing slash, falling back to the backend default
    pub fn endpoint_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.endpoint
            .as_deref()
            .unwrap_or(fallback)
            .trim_end_matches('/')
    }

    /// Resolve the API key from the configured variable, or from `fallback_var`
    pub fn resolve_credential(&self, fallback_var: &str) -> Option<String> {
        let var = self.credential_env.as_deref().unwrap_or(fallback_var);
        std::env::var(var).ok().filter(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_toml() {
        let config: LlmBackendConfig = toml::from_str(
            r#"
            id = 3
            name = "claude"
            kind = { type = "api_chat", provider = "anthropic" }
            credential_env = "MY_KEY"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.kind,
            BackendKind::ApiChat { provider: ChatApi::Anthropic }
        );
        assert_eq!(config.kind.label(), "anthropic");
        assert_eq!(config.temperature, 0.3);
        assert!(!config.is_default);
    }

    #[test]
    fn test_fallbacks() {
        let config = LlmBackendConfig::new(1, "local", BackendKind::Local)
            .with_endpoint("http://ollama:11434/");
        assert_eq!(config.model_or("llama2"), "llama2");
        assert_eq!(config.endpoint_or("http://localhost:11434"), "http://ollama:11434");
    }
}
