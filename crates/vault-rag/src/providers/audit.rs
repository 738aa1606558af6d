//! Sinks for query audit records and expiry notifications

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Document, QueryRecord};

/// Receives one record per answered query
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: QueryRecord) -> Result<()>;
}

/// Tells a document's owner that it is about to expire
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExpiryNotifier: Send + Sync {
    async fn notify(&self, document: &Document, expires_at: DateTime<Utc>) -> Result<()>;
}
