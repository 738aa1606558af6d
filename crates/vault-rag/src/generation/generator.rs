//! Answer generation over a configured backend

use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::Error;
use crate::types::{LlmBackendConfig, Turn};

use super::backends::BackendSet;
use super::prompt::PromptBuilder;

/// Prefix of the answer text when the backend fails
pub const LLM_ERROR_PREFIX: &str = "Error during LLM query: ";

/// Builds the prompt and invokes the backend for a configuration.
///
/// Never fails: backend errors and timeouts become the answer text.
#[derive(Clone)]
pub struct AnswerGenerator {
    backends: BackendSet,
    timeout: Duration,
}

impl AnswerGenerator {
    pub fn new(backends: BackendSet, config: &GenerationConfig) -> Self {
        Self {
            backends,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Override the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn answer(
        &self,
        question: &str,
        context: &[String],
        history: &[Turn],
        config: &LlmBackendConfig,
    ) -> String {
        let prompt = PromptBuilder::build_rag_prompt(question, context, history);
        let backend = self.backends.for_kind(&config.kind);

        tracing::info!(
            "Generating answer with backend '{}' ({}), {} context chunks",
            config.name,
            config.kind.label(),
            context.len()
        );

        let result = match tokio::time::timeout(self.timeout, backend.generate(&prompt, config)).await {
            Ok(result) => result,
            Err(_) => Err(Error::llm(format!(
                "backend '{}' timed out after {}s",
                config.name,
                self.timeout.as_secs_f32()
            ))),
        };

        match result {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Backend '{}' failed: {}", config.name, e);
                format!("{}{}", LLM_ERROR_PREFIX, e)
            }
        }
    }
}
