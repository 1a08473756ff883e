//! In-memory adapter doubles for tests
//!
//! Deterministic `ProductSource`/`CrmSink`/`SyncHistory`/`SummaryNotifier`
//! implementations used by the unit and integration tests. Not gated behind
//! `cfg(test)` so the `tests/` suites can use them too.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::events::{FailureRecord, HistoryEntry, SuccessRecord};
use crate::domain::product::{Product, ProductPage, ProductStatus, ProductVariant};
use crate::domain::services::{
    CrmSink, ProductSource, Properties, SinkError, SourceError, SummaryNotifier, SyncHistory,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a minimal active product with a single variant
pub fn product(id: &str, title: &str, sku: Option<&str>) -> Product {
    Product {
        id: format!("gid://source/Product/{id}"),
        title: title.to_string(),
        description_html: format!("<p>{title}</p>"),
        online_store_url: None,
        image_url: None,
        variants: vec![ProductVariant {
            id: format!("gid://source/ProductVariant/{id}"),
            title: "Default".to_string(),
            sku: sku.map(str::to_string),
            price: "10.00".to_string(),
        }],
        metafields: Vec::new(),
        status: ProductStatus::Active,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Scripted in-memory catalog source.
///
/// Pagination is cursor-as-page-index: `None` is page 0 and each page's
/// `next_cursor` names the next index. The date-range listing serves the
/// same pages; tests that care about the window script it directly.
#[derive(Default)]
pub struct MockSource {
    by_sku: Mutex<HashMap<String, Product>>,
    pages: Mutex<Vec<Vec<Product>>>,
    fail_on_page: Mutex<Option<usize>>,
    lookup_delay: Mutex<Option<Duration>>,
    page_delay: Mutex<Option<Duration>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product for SKU lookups (ignores SKU-less products)
    pub fn with_product(self, record: Product) -> Self {
        if let Some(sku) = record.sku().map(str::to_string) {
            lock(&self.by_sku).insert(sku, record);
        }
        self
    }

    /// Script the paginated catalog listing
    pub fn with_pages(self, pages: Vec<Vec<Product>>) -> Self {
        *lock(&self.pages) = pages;
        self
    }

    /// Make the fetch of page `index` fail with an API error
    pub fn fail_on_page(self, index: usize) -> Self {
        *lock(&self.fail_on_page) = Some(index);
        self
    }

    /// Delay every per-SKU lookup (for cancellation-timing tests)
    pub fn with_lookup_delay(self, delay: Duration) -> Self {
        *lock(&self.lookup_delay) = Some(delay);
        self
    }

    /// Delay every page fetch (for cancellation-timing tests)
    pub fn with_page_delay(self, delay: Duration) -> Self {
        *lock(&self.page_delay) = Some(delay);
        self
    }

    async fn pause(&self, delay: &Mutex<Option<Duration>>) {
        let delay = *lock(delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn page_at(&self, cursor: Option<&str>) -> Result<ProductPage, SourceError> {
        let index: usize = match cursor {
            None => 0,
            Some(raw) => raw
                .parse()
                .map_err(|_| SourceError::Api(format!("bad cursor: {raw}")))?,
        };
        if *lock(&self.fail_on_page) == Some(index) {
            return Err(SourceError::Api(format!("listing page {index} unavailable")));
        }
        let pages = lock(&self.pages);
        let Some(products) = pages.get(index) else {
            return Ok(ProductPage::empty());
        };
        let next_cursor = (index + 1 < pages.len()).then(|| (index + 1).to_string());
        Ok(ProductPage {
            products: products.clone(),
            next_cursor,
        })
    }
}

#[async_trait]
impl ProductSource for MockSource {
    async fn fetch_by_sku(&self, sku: &str) -> Result<Option<Product>, SourceError> {
        self.pause(&self.lookup_delay).await;
        Ok(lock(&self.by_sku).get(sku).cloned())
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<ProductPage, SourceError> {
        self.pause(&self.page_delay).await;
        self.page_at(cursor)
    }

    async fn fetch_page_by_date_range(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        cursor: Option<&str>,
    ) -> Result<ProductPage, SourceError> {
        self.pause(&self.page_delay).await;
        self.page_at(cursor)
    }
}

struct StoredRecord {
    id: String,
    properties: Properties,
}

#[derive(Default)]
struct SinkState {
    records: HashMap<String, StoredRecord>,
    archived: Vec<String>,
}

/// In-memory CRM with call counters and programmable write rejections
#[derive(Default)]
pub struct MockSink {
    state: Mutex<SinkState>,
    reject: Mutex<HashMap<String, Value>>,
    next_id: AtomicU64,
    find_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    write_delay: Mutex<Option<Duration>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload an existing destination record keyed by SKU
    pub fn with_existing(self, sku: &str, destination_id: &str) -> Self {
        lock(&self.state).records.insert(
            sku.to_string(),
            StoredRecord {
                id: destination_id.to_string(),
                properties: Properties::new(),
            },
        );
        self
    }

    /// Make every write for `sku` fail with a validation error carrying `body`
    pub fn rejecting(self, sku: &str, body: Value) -> Self {
        lock(&self.reject).insert(sku.to_string(), body);
        self
    }

    /// Delay every write (for cancellation-timing tests)
    pub fn with_write_delay(self, delay: Duration) -> Self {
        *lock(&self.write_delay) = Some(delay);
        self
    }

    pub fn record_count(&self) -> usize {
        lock(&self.state).records.len()
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn archived_ids(&self) -> Vec<String> {
        lock(&self.state).archived.clone()
    }

    /// Stored properties for `sku`, when a record exists
    pub fn properties_for(&self, sku: &str) -> Option<Properties> {
        lock(&self.state)
            .records
            .get(sku)
            .map(|record| record.properties.clone())
    }

    fn sku_of(properties: &Properties) -> String {
        properties.get("sku").cloned().unwrap_or_default()
    }

    async fn check_write(&self, sku: &str) -> Result<(), SinkError> {
        let delay = *lock(&self.write_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(body) = lock(&self.reject).get(sku) {
            return Err(SinkError::Validation { body: body.clone() });
        }
        Ok(())
    }
}

#[async_trait]
impl CrmSink for MockSink {
    async fn find_by_sku(&self, sku: &str) -> Result<Option<String>, SinkError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.state)
            .records
            .get(sku)
            .map(|record| record.id.clone()))
    }

    async fn find_by_source_id(&self, source_id: &str) -> Result<Option<String>, SinkError> {
        Ok(lock(&self.state)
            .records
            .values()
            .find(|record| {
                record
                    .properties
                    .get("source_id")
                    .is_some_and(|id| id == source_id)
            })
            .map(|record| record.id.clone()))
    }

    async fn create(&self, properties: &Properties) -> Result<String, SinkError> {
        let sku = Self::sku_of(properties);
        self.check_write(&sku).await?;
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let id = format!("crm-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        lock(&self.state).records.insert(
            sku,
            StoredRecord {
                id: id.clone(),
                properties: properties.clone(),
            },
        );
        Ok(id)
    }

    async fn update(&self, destination_id: &str, properties: &Properties) -> Result<(), SinkError> {
        let sku = Self::sku_of(properties);
        self.check_write(&sku).await?;
        self.update_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = lock(&self.state);
        let record = state
            .records
            .values_mut()
            .find(|record| record.id == destination_id)
            .ok_or_else(|| SinkError::Api {
                status: 404,
                message: format!("no record {destination_id}"),
            })?;
        record.properties = properties.clone();
        Ok(())
    }

    async fn archive(&self, destination_id: &str) -> Result<(), SinkError> {
        let mut state = lock(&self.state);
        if !state.records.values().any(|r| r.id == destination_id) {
            return Err(SinkError::Api {
                status: 404,
                message: format!("no record {destination_id}"),
            });
        }
        state.archived.push(destination_id.to_string());
        Ok(())
    }
}

/// History store that keeps entries in memory
#[derive(Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
    attempts: AtomicUsize,
    fail: Mutex<bool>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every persist call fail (history must stay best-effort)
    pub fn failing(self) -> Self {
        *lock(&self.fail) = true;
        self
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        lock(&self.entries).clone()
    }

    /// Persist calls made, including failed ones
    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncHistory for MemoryHistory {
    async fn persist(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if *lock(&self.fail) {
            anyhow::bail!("history store unavailable");
        }
        lock(&self.entries).push(entry.clone());
        Ok(())
    }
}

/// Notifier that records every summary it is asked to send
#[derive(Default)]
pub struct MemoryNotifier {
    summaries: Mutex<Vec<(Vec<SuccessRecord>, Vec<FailureRecord>)>>,
    attempts: AtomicUsize,
    fail: Mutex<bool>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every notify call fail (notification must stay best-effort)
    pub fn failing(self) -> Self {
        *lock(&self.fail) = true;
        self
    }

    pub fn sent(&self) -> Vec<(Vec<SuccessRecord>, Vec<FailureRecord>)> {
        lock(&self.summaries).clone()
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.summaries).len()
    }

    /// Notify calls made, including failed ones
    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SummaryNotifier for MemoryNotifier {
    async fn notify(
        &self,
        successes: &[SuccessRecord],
        failures: &[FailureRecord],
    ) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if *lock(&self.fail) {
            anyhow::bail!("notification channel unavailable");
        }
        lock(&self.summaries).push((successes.to_vec(), failures.to_vec()));
        Ok(())
    }
}
