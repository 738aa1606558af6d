//! Backend configuration lookup

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BackendConfigId, LlmBackendConfig};

/// Trait for resolving language model backend configurations
///
/// Implementations:
/// - `StaticBackendConfigs`: fixed set loaded from `RagConfig::backends`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendConfigStore: Send + Sync {
    /// Configuration by id
    async fn get(&self, id: BackendConfigId) -> Result<Option<LlmBackendConfig>>;

    /// The configuration flagged as default, if any
    async fn default_config(&self) -> Result<Option<LlmBackendConfig>>;
}
