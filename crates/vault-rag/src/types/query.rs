//! Query request, response and audit types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::backend::BackendConfigId;
use super::document::{CategoryId, DocumentId, OwnerId};

/// Which documents a query may read
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryScope {
    /// An explicit, already-authorized set of documents
    Documents(Vec<DocumentId>),
    /// Every document in a category
    Category(CategoryId),
    /// Every document owned by a user
    Owner(OwnerId),
}

/// One question/answer pair within a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Query request handed to the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The question to answer
    pub question: String,

    /// Documents the question may be answered from
    pub scope: QueryScope,

    /// Conversation to continue; a new one is started when absent
    #[serde(default)]
    pub conversation_id: Option<String>,

    /// Backend configuration; the default configuration is used when absent
    #[serde(default)]
    pub backend_config_id: Option<BackendConfigId>,
}

impl QueryRequest {
    /// Query over an explicit set of documents
    pub fn new(question: impl Into<String>, document_ids: Vec<DocumentId>) -> Self {
        Self {
            question: question.into(),
            scope: QueryScope::Documents(document_ids),
            conversation_id: None,
            backend_config_id: None,
        }
    }

    /// Query over an arbitrary scope
    pub fn scoped(question: impl Into<String>, scope: QueryScope) -> Self {
        Self {
            question: question.into(),
            scope,
            conversation_id: None,
            backend_config_id: None,
        }
    }

    /// Continue an existing conversation
    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Use a specific backend configuration
    pub fn with_backend(mut self, backend_config_id: BackendConfigId) -> Self {
        self.backend_config_id = Some(backend_config_id);
        self
    }
}

/// Engine answer for a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Generated answer (or the textual backend error)
    pub answer: String,
    /// Conversation to pass back for follow-up questions
    pub conversation_id: String,
    /// Documents the query was restricted to
    pub queried_document_ids: Vec<DocumentId>,
    /// Context chunks given to the model, in prompt order
    pub context: Vec<String>,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

impl QueryResponse {
    /// Whether the answer was produced without any retrieved context
    pub fn is_without_context(&self) -> bool {
        self.context.is_empty()
    }
}

/// Audit artifact produced for every completed query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub question: String,
    pub answer: String,
    pub queried_document_ids: Vec<DocumentId>,
    pub conversation_id: String,
    /// Name of the backend configuration that answered
    pub backend: String,
    pub created_at: DateTime<Utc>,
}
