//! Language model backend strategies, one per `BackendKind`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::providers::OllamaClient;
use crate::types::{BackendKind, ChatApi, LlmBackendConfig};

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "gpt-3.5-turbo";
const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";

const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_MODEL: &str = "claude-2";
const ANTHROPIC_KEY_VAR: &str = "ANTHROPIC_API_KEY";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const HOSTED_ENDPOINT: &str = "https://api.together.xyz/v1";
const HOSTED_MODEL: &str = "mistralai/Mixtral-8x7B-Instruct-v0.1";
const HOSTED_KEY_VAR: &str = "TOGETHER_API_KEY";

const LOCAL_ENDPOINT: &str = "http://localhost:11434";
const LOCAL_MODEL: &str = "llama2";

/// Completes a prompt with the model a configuration describes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, prompt: &str, config: &LlmBackendConfig) -> Result<String>;
}

fn require_credential(config: &LlmBackendConfig, fallback_var: &str) -> Result<String> {
    config.resolve_credential(fallback_var).ok_or_else(|| {
        Error::llm(format!(
            "no API key for backend '{}': set {}",
            config.name,
            config.credential_env.as_deref().unwrap_or(fallback_var)
        ))
    })
}

/// Send a request and decode a JSON reply, turning HTTP failures into `Error::Llm`
async fn send_json<T: serde::de::DeserializeOwned>(backend: &str, request: RequestBuilder) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::llm(format!("{} request failed: {}", backend, e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::llm(format!("{} returned HTTP {} - {}", backend, status, body)));
    }

    response
        .json()
        .await
        .map_err(|e| Error::llm(format!("failed to parse {} response: {}", backend, e)))
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicMessage {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct TextCompletion {
    choices: Vec<TextChoice>,
}

#[derive(Deserialize)]
struct TextChoice {
    text: String,
}

/// Chat model behind a hosted API (OpenAI-compatible or Anthropic)
pub struct ApiChatBackend {
    client: Client,
}

impl ApiChatBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn openai(&self, prompt: &str, config: &LlmBackendConfig) -> Result<String> {
        let api_key = require_credential(config, OPENAI_KEY_VAR)?;
        let url = format!("{}/chat/completions", config.endpoint_or(OPENAI_ENDPOINT));
        let body = json!({
            "model": config.model_or(OPENAI_MODEL),
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
        });

        let completion: ChatCompletion = send_json(
            "openai",
            self.client.post(&url).bearer_auth(api_key).json(&body),
        )
        .await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::llm("No choices in response"))
    }

    async fn anthropic(&self, prompt: &str, config: &LlmBackendConfig) -> Result<String> {
        let api_key = require_credential(config, ANTHROPIC_KEY_VAR)?;
        let url = format!("{}/messages", config.endpoint_or(ANTHROPIC_ENDPOINT));
        let body = json!({
            "model": config.model_or(ANTHROPIC_MODEL),
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
        });

        let message: AnthropicMessage = send_json(
            "anthropic",
            self.client
                .post(&url)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body),
        )
        .await?;

        let text: String = message
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(Error::llm("No text content in response"));
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmBackend for ApiChatBackend {
    async fn generate(&self, prompt: &str, config: &LlmBackendConfig) -> Result<String> {
        match config.kind {
            BackendKind::ApiChat { provider: ChatApi::Anthropic } => self.anthropic(prompt, config).await,
            _ => self.openai(prompt, config).await,
        }
    }
}

/// Externally hosted completion model (Together-style `/completions`)
pub struct HostedModelBackend {
    client: Client,
}

impl HostedModelBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LlmBackend for HostedModelBackend {
    async fn generate(&self, prompt: &str, config: &LlmBackendConfig) -> Result<String> {
        let api_key = require_credential(config, HOSTED_KEY_VAR)?;
        let url = format!("{}/completions", config.endpoint_or(HOSTED_ENDPOINT));
        let body = json!({
            "model": config.model_or(HOSTED_MODEL),
            "prompt": prompt,
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
        });

        let completion: TextCompletion = send_json(
            "hosted",
            self.client.post(&url).bearer_auth(api_key).json(&body),
        )
        .await?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text.trim().to_string())
            .ok_or_else(|| Error::llm("No choices in response"))
    }
}

/// Local Ollama inference endpoint, one client per endpoint
pub struct LocalBackend {
    timeout: Duration,
    clients: DashMap<String, Arc<OllamaClient>>,
}

impl LocalBackend {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            clients: DashMap::new(),
        }
    }

    fn client_for(&self, endpoint: &str) -> Result<Arc<OllamaClient>> {
        if let Some(client) = self.clients.get(endpoint) {
            return Ok(client.clone());
        }
        let client = Arc::new(OllamaClient::new(endpoint, self.timeout, 0)?);
        self.clients.insert(endpoint.to_string(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl LlmBackend for LocalBackend {
    async fn generate(&self, prompt: &str, config: &LlmBackendConfig) -> Result<String> {
        let client = self.client_for(config.endpoint_or(LOCAL_ENDPOINT))?;
        client
            .generate(
                config.model_or(LOCAL_MODEL),
                prompt,
                config.temperature,
                config.max_tokens,
            )
            .await
    }
}

/// One backend strategy per `BackendKind`
#[derive(Clone)]
pub struct BackendSet {
    api_chat: Arc<dyn LlmBackend>,
    hosted: Arc<dyn LlmBackend>,
    local: Arc<dyn LlmBackend>,
}

impl BackendSet {
    /// HTTP-backed strategies sharing one connection pool
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_chat: Arc::new(ApiChatBackend::new(client.clone())),
            hosted: Arc::new(HostedModelBackend::new(client)),
            local: Arc::new(LocalBackend::new(timeout)),
        })
    }

    /// Use the same strategy for every kind
    pub fn uniform(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            api_chat: backend.clone(),
            hosted: backend.clone(),
            local: backend,
        }
    }

    pub fn with_api_chat(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.api_chat = backend;
        self
    }

    pub fn with_hosted(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.hosted = backend;
        self
    }

    pub fn with_local(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.local = backend;
        self
    }

    /// Strategy serving `kind`
    pub fn for_kind(&self, kind: &BackendKind) -> &Arc<dyn LlmBackend> {
        match kind {
            BackendKind::ApiChat { .. } => &self.api_chat,
            BackendKind::Hosted => &self.hosted,
            BackendKind::Local => &self.local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_credential_is_llm_error() {
        let backend = HostedModelBackend::new(Client::new());
        let config = LlmBackendConfig::new(1, "together", BackendKind::Hosted)
            .with_credential_env("VAULT_RAG_TEST_UNSET_KEY");

        let err = backend.generate("hi", &config).await.unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
        assert!(err.to_string().contains("VAULT_RAG_TEST_UNSET_KEY"));
    }

    #[tokio::test]
    async fn test_dispatch_by_kind() {
        let mut local = MockLlmBackend::new();
        local
            .expect_generate()
            .returning(|_, _| Ok("from local".to_string()));
        let mut hosted = MockLlmBackend::new();
        hosted
            .expect_generate()
            .returning(|_, _| Ok("from hosted".to_string()));

        let set = BackendSet::uniform(Arc::new(MockLlmBackend::new()))
            .with_local(Arc::new(local))
            .with_hosted(Arc::new(hosted));

        let local_config = LlmBackendConfig::new(1, "l", BackendKind::Local);
        let hosted_config = LlmBackendConfig::new(2, "h", BackendKind::Hosted);

        assert_eq!(
            set.for_kind(&local_config.kind).generate("p", &local_config).await.unwrap(),
            "from local"
        );
        assert_eq!(
            set.for_kind(&hosted_config.kind).generate("p", &hosted_config).await.unwrap(),
            "from hosted"
        );
    }

    #[test]
    fn test_response_shapes() {
        let chat: ChatCompletion =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":"Blue."}}]}"#)
                .unwrap();
        assert_eq!(chat.choices[0].message.content.as_deref(), Some("Blue."));

        let message: AnthropicMessage =
            serde_json::from_str(r#"{"content":[{"type":"text","text":"Blue."}]}"#).unwrap();
        assert_eq!(message.content[0].text.as_deref(), Some("Blue."));

        let completion: TextCompletion =
            serde_json::from_str(r#"{"choices":[{"text":" Blue.\n"}]}"#).unwrap();
        assert_eq!(completion.choices[0].text, " Blue.\n");
    }
}
