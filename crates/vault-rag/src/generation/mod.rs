//! Answer generation: prompt construction and language model backends

pub mod backends;
pub mod generator;
pub mod prompt;

pub use backends::{ApiChatBackend, BackendSet, HostedModelBackend, LlmBackend, LocalBackend};
pub use generator::{AnswerGenerator, LLM_ERROR_PREFIX};
pub use prompt::{PromptBuilder, CONTEXT_SEPARATOR};
