//! Adapter traits at the boundaries of the sync core
//!
//! The core never talks HTTP itself; it pages records out of a
//! [`ProductSource`], writes them through a [`CrmSink`], and hands the run's
//! aggregate to a [`SyncHistory`] store and a [`SummaryNotifier`]. Concrete
//! platform clients implement these traits (with their own retry/backoff,
//! transparent to the core).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::events::{FailureRecord, HistoryEntry, SuccessRecord};
use super::product::{Product, ProductPage};

/// Normalized destination property set produced by the mapper
pub type Properties = BTreeMap<String, String>;

/// Errors surfaced by a [`ProductSource`]
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source API error: {0}")]
    Api(String),
    #[error("source I/O error: {0}")]
    Io(String),
    #[error("source response missing expected data: {0}")]
    MissingData(String),
}

/// Errors surfaced by a [`CrmSink`].
///
/// The raw payload is preserved so the error classifier can derive a
/// structured reason from it.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Destination rejected the write; `body` is the raw error payload
    #[error("sink validation error: {body}")]
    Validation { body: serde_json::Value },
    /// Non-validation API failure
    #[error("sink API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// Network-level failure on a single call
    #[error("sink I/O error: {0}")]
    Io(String),
}

/// Paginated read access to the upstream catalog
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Look up a single record by SKU. `Ok(None)` when no record matches.
    async fn fetch_by_sku(&self, sku: &str) -> Result<Option<Product>, SourceError>;

    /// Fetch one page of the full catalog listing. `cursor` is the
    /// continuation token from the previous page, `None` for the first page.
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<ProductPage, SourceError>;

    /// Fetch one page of records whose creation or modification timestamp
    /// falls within `[start, end]`.
    async fn fetch_page_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cursor: Option<&str>,
    ) -> Result<ProductPage, SourceError>;
}

/// Write access to the downstream CRM records
#[async_trait]
pub trait CrmSink: Send + Sync {
    /// Search for an existing destination record by SKU, limited to one
    /// result. Returns the destination id when found.
    async fn find_by_sku(&self, sku: &str) -> Result<Option<String>, SinkError>;

    /// Search for an existing destination record by its source identifier
    async fn find_by_source_id(&self, source_id: &str) -> Result<Option<String>, SinkError>;

    /// Create a destination record and return its id
    async fn create(&self, properties: &Properties) -> Result<String, SinkError>;

    /// Update an existing destination record
    async fn update(&self, destination_id: &str, properties: &Properties) -> Result<(), SinkError>;

    /// Archive a destination record
    async fn archive(&self, destination_id: &str) -> Result<(), SinkError>;
}

/// Persisted run history (the result sink's mandatory channel).
///
/// Persistence is best-effort from the orchestrator's point of view: a
/// failure is logged and never propagated into the run's own outcome.
#[async_trait]
pub trait SyncHistory: Send + Sync {
    async fn persist(&self, entry: &HistoryEntry) -> anyhow::Result<()>;
}

/// Summary notification (the result sink's final channel, e.g. email).
///
/// Awaited before the stream closes so send failures reach the logs, but a
/// failure never changes the run's outcome. Skipped entirely on cancellation.
#[async_trait]
pub trait SummaryNotifier: Send + Sync {
    async fn notify(
        &self,
        successes: &[SuccessRecord],
        failures: &[FailureRecord],
    ) -> anyhow::Result<()>;
}
