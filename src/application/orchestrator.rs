//! Sync orchestrator: the reconciliation core
//!
//! One [`SyncOrchestrator`] drives a run in one of three modes (SKU list,
//! full catalog, date range) through pagination, per-record reconciliation
//! with a bounded concurrency fan-out, live progress events, and result
//! aggregation. Each run owns its progress counters and outcome lists; the
//! only state shared across runs is the [`RunGuard`].
//!
//! Per-record errors are always contained and recorded as a `Failure`
//! outcome; only page-fetch errors abort a run. The event stream always ends
//! with exactly one terminal event.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::error_classifier;
use crate::application::mapper;
use crate::application::run_guard::RunGuard;
use crate::domain::events::{SyncEvent, SyncMode, SyncOutcome, SyncProgress, SyncReport, UNKNOWN_SKU};
use crate::domain::events::HistoryEntry;
use crate::domain::product::Product;
use crate::domain::services::{
    CrmSink, ProductSource, SinkError, SourceError, SummaryNotifier, SyncHistory,
};
use crate::infrastructure::config::SyncConfig;

/// Errors the orchestrator itself can return
#[derive(Debug, Error)]
pub enum SyncError {
    /// Fetching a page of the source listing failed; aborts the run
    #[error("failed to fetch catalog page: {0}")]
    PageFetch(#[source] SourceError),
    /// A direct sink operation failed (non-streamed entry points)
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Result of [`SyncOrchestrator::archive_removed`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// The matching destination record was archived
    Archived { destination_id: String },
    /// No destination record matched the source id
    NotFound,
}

/// A spawned sync run: its id, event stream, and driver handle
pub struct SyncRun {
    pub run_id: String,
    /// Caller-facing event stream; dropping this receiver is the
    /// cancellation signal for the run.
    pub events: mpsc::Receiver<SyncEvent>,
    /// Handle of the background task driving the run
    pub driver: JoinHandle<()>,
}

impl SyncRun {
    /// Consume the run into a `Stream` of events (detaches the driver)
    pub fn into_stream(self) -> ReceiverStream<SyncEvent> {
        ReceiverStream::new(self.events)
    }
}

/// Work item for one record's reconciliation
enum ReconcileJob {
    /// A caller-supplied key that must first be resolved upstream
    Key(String),
    /// A record already fetched from a catalog page
    Record(Product),
}

/// Drives catalog synchronization runs against the configured adapters
#[derive(Clone)]
pub struct SyncOrchestrator {
    source: Arc<dyn ProductSource>,
    sink: Arc<dyn CrmSink>,
    history: Arc<dyn SyncHistory>,
    notifier: Arc<dyn SummaryNotifier>,
    guard: Arc<RunGuard>,
    config: SyncConfig,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn ProductSource>,
        sink: Arc<dyn CrmSink>,
        history: Arc<dyn SyncHistory>,
        notifier: Arc<dyn SummaryNotifier>,
        guard: Arc<RunGuard>,
        config: SyncConfig,
    ) -> Self {
        Self {
            source,
            sink,
            history,
            notifier,
            guard,
            config,
        }
    }

    /// Sync an explicit list of SKUs.
    ///
    /// Entries are flattened on whitespace; duplicates are preserved and
    /// processed independently. Blank entries are kept so they surface as
    /// explicit failures rather than disappearing.
    pub fn run_by_skus(&self, keys: &[String]) -> SyncRun {
        let keys = flatten_keys(keys);
        self.spawn_run(SyncMode::Skus, RunInput::Skus(keys))
    }

    /// Sync the entire catalog via cursor pagination (guarded, cooldown)
    pub fn run_full_catalog(&self) -> SyncRun {
        self.spawn_run(SyncMode::All, RunInput::All)
    }

    /// Sync records created or modified within `[start, end]`, inclusive
    /// calendar days in UTC.
    pub fn run_by_date_range(&self, start: NaiveDate, end: NaiveDate) -> SyncRun {
        let (start, end) = day_bounds(start, end);
        self.spawn_run(SyncMode::Dates, RunInput::Dates(start, end))
    }

    /// Archive the destination record matching a removed source record.
    ///
    /// Single-record webhook path: not guarded, not streamed.
    pub async fn archive_removed(&self, source_id: &str) -> Result<ArchiveOutcome, SyncError> {
        match self.sink.find_by_source_id(source_id).await? {
            Some(destination_id) => {
                self.sink.archive(&destination_id).await?;
                info!(source_id, destination_id, "archived removed record in CRM");
                Ok(ArchiveOutcome::Archived { destination_id })
            }
            None => {
                info!(source_id, "no matching CRM record to archive");
                Ok(ArchiveOutcome::NotFound)
            }
        }
    }

    fn spawn_run(&self, mode: SyncMode, input: RunInput) -> SyncRun {
        let run_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let ctx = RunCtx {
            run_id: run_id.clone(),
            tx,
            cancel: CancellationToken::new(),
            progress: Arc::new(Mutex::new(SyncProgress::default())),
            report: Arc::new(Mutex::new(SyncReport::default())),
            semaphore: Arc::new(Semaphore::new(self.config.concurrency.max(1))),
        };
        let orchestrator = self.clone();
        let driver = tokio::spawn(async move {
            orchestrator.drive(mode, input, ctx).await;
        });
        SyncRun {
            run_id,
            events: rx,
            driver,
        }
    }

    async fn drive(self, mode: SyncMode, input: RunInput, ctx: RunCtx) {
        let _permit = match self.guard.try_acquire(mode) {
            Ok(permit) => permit,
            Err(rejection) => {
                warn!(run_id = %ctx.run_id, %mode, "sync run rejected: {rejection}");
                ctx.emit(SyncEvent::Fatal {
                    error: rejection.to_string(),
                })
                .await;
                return;
            }
        };

        info!(run_id = %ctx.run_id, %mode, "starting sync run");
        let mut handles = Vec::new();
        let page_result = match input {
            RunInput::Skus(keys) => {
                ctx.log(format!("Starting sync of {} SKU(s)...", keys.len()))
                    .await;
                self.page_keys(&ctx, keys, &mut handles).await
            }
            RunInput::All => {
                ctx.log("Starting sync of all products...".to_string()).await;
                self.page_catalog(&ctx, None, &mut handles).await
            }
            RunInput::Dates(start, end) => {
                ctx.log(format!(
                    "Starting sync of products between {} and {}...",
                    start.format("%Y-%m-%d"),
                    end.format("%Y-%m-%d")
                ))
                .await;
                self.page_catalog(&ctx, Some((start, end)), &mut handles).await
            }
        };

        self.finalize(&ctx, mode, page_result, handles).await;
    }

    /// ByKeys "paging": the batches are the key list itself
    async fn page_keys(
        &self,
        ctx: &RunCtx,
        keys: Vec<String>,
        handles: &mut Vec<JoinHandle<()>>,
    ) -> Result<(), SyncError> {
        {
            ctx.progress.lock().await.total = keys.len() as u32;
        }
        for key in keys {
            if ctx.is_cancelled() {
                break;
            }
            self.dispatch(ctx, ReconcileJob::Key(key), handles);
        }
        Ok(())
    }

    /// Cursor pagination over the full catalog, optionally date-filtered.
    ///
    /// Pagination advances once the current page's records have been
    /// dispatched, not completed; the cursor comes from the fetched page, so
    /// correctness does not depend on completion order.
    async fn page_catalog(
        &self,
        ctx: &RunCtx,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        handles: &mut Vec<JoinHandle<()>>,
    ) -> Result<(), SyncError> {
        let mut cursor: Option<String> = None;
        loop {
            if ctx.is_cancelled() {
                return Ok(());
            }

            let page = match range {
                Some((start, end)) => {
                    self.source
                        .fetch_page_by_date_range(start, end, cursor.as_deref())
                        .await
                }
                None => self.source.fetch_page(cursor.as_deref()).await,
            }
            .map_err(SyncError::PageFetch)?;

            let count = page.products.len();
            if count > 0 {
                // total grows as pages are discovered
                ctx.progress.lock().await.total += count as u32;
            }
            ctx.log(format!("Fetched page of {count} product(s)")).await;

            for product in page.products {
                if ctx.is_cancelled() {
                    return Ok(());
                }
                self.dispatch(ctx, ReconcileJob::Record(product), handles);
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(())
    }

    /// Spawn one record's reconciliation under the concurrency limiter
    fn dispatch(&self, ctx: &RunCtx, job: ReconcileJob, handles: &mut Vec<JoinHandle<()>>) {
        let orchestrator = self.clone();
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            // the semaphore is never closed; acquisition only fails then
            let Ok(_permit) = ctx.semaphore.clone().acquire_owned().await else {
                return;
            };
            let outcome = orchestrator.reconcile(&ctx, job).await;
            ctx.record(outcome).await;
        }));
    }

    /// Per-record reconciliation. Infallible: every path returns exactly one
    /// outcome; sink errors are classified into failures here and never
    /// propagate to the run.
    async fn reconcile(&self, ctx: &RunCtx, job: ReconcileJob) -> SyncOutcome {
        match job {
            ReconcileJob::Key(key) => {
                let sku = key.trim().to_string();
                if sku.is_empty() {
                    ctx.log("Rejected entry with missing SKU".to_string()).await;
                    return SyncOutcome::failure(UNKNOWN_SKU, "missing SKU");
                }
                match self.source.fetch_by_sku(&sku).await {
                    Ok(Some(product)) => self.reconcile_product(ctx, product, Some(&sku)).await,
                    Ok(None) => {
                        ctx.log(format!("Could not find product for SKU: {sku}"))
                            .await;
                        SyncOutcome::failure(sku, "product not found in source catalog")
                    }
                    Err(source_error) => {
                        ctx.log(format!("Failed (SKU: {sku}) - source lookup failed: {source_error}"))
                            .await;
                        SyncOutcome::failure(sku, format!("source lookup failed: {source_error}"))
                    }
                }
            }
            ReconcileJob::Record(product) => self.reconcile_product(ctx, product, None).await,
        }
    }

    async fn reconcile_product(
        &self,
        ctx: &RunCtx,
        product: Product,
        sku_hint: Option<&str>,
    ) -> SyncOutcome {
        // a record without a resolvable SKU is rejected before any sink call
        let Some(sku) = product.sku().map(str::to_string) else {
            ctx.log(format!(
                "No SKU for product \"{}\". Rejecting record.",
                product.title
            ))
            .await;
            return SyncOutcome::failure(sku_hint.unwrap_or(UNKNOWN_SKU), "missing SKU");
        };

        ctx.log(format!(
            "Processing product: {} (SKU: {sku})",
            product.title
        ))
        .await;

        match self.write_record(&sku, &product).await {
            Ok(action) => {
                let verb = if action == "updated" { "Updated" } else { "Created" };
                ctx.log(format!("{verb}: {} (SKU: {sku})", product.title)).await;
                SyncOutcome::success(sku, product.title, action)
            }
            Err(sink_error) => {
                let classified = error_classifier::classify(&sink_error);
                ctx.log(format!("Failed (SKU: {sku}) - {}", classified.message))
                    .await;
                SyncOutcome::failure(sku, classified.message)
            }
        }
    }

    /// Search-then-create-or-update against the sink
    async fn write_record(&self, sku: &str, product: &Product) -> Result<&'static str, SinkError> {
        let properties = mapper::normalize(product);
        match self.sink.find_by_sku(sku).await? {
            Some(destination_id) => {
                self.sink.update(&destination_id, &properties).await?;
                Ok("updated")
            }
            None => {
                self.sink.create(&properties).await?;
                Ok("created")
            }
        }
    }

    /// Drain in-flight work, persist history, and emit the terminal event.
    ///
    /// History persistence runs on every exit path (completed, cancelled,
    /// fatal) and is best-effort: a failure is logged, never propagated. The
    /// notifier is awaited on the completed path only.
    async fn finalize(
        &self,
        ctx: &RunCtx,
        mode: SyncMode,
        page_result: Result<(), SyncError>,
        handles: Vec<JoinHandle<()>>,
    ) {
        // in-flight reconciliations are always awaited, never orphaned
        join_all(handles).await;

        let report = ctx.report.lock().await.clone();
        let entry = HistoryEntry::from_report(mode, &report);
        if let Err(history_error) = self.history.persist(&entry).await {
            warn!(run_id = %ctx.run_id, "failed to persist sync history: {history_error:#}");
        }

        if let Err(fatal) = page_result {
            error!(run_id = %ctx.run_id, "sync run aborted: {fatal}");
            ctx.emit(SyncEvent::Fatal {
                error: fatal.to_string(),
            })
            .await;
            return;
        }

        if ctx.cancel.is_cancelled() {
            info!(run_id = %ctx.run_id, dispatched = report.dispatched(), "sync run cancelled by client");
            ctx.emit(SyncEvent::Cancelled {
                message: format!(
                    "Sync cancelled by client after {} record(s).",
                    report.dispatched()
                ),
            })
            .await;
            return;
        }

        if let Err(notify_error) = self
            .notifier
            .notify(&report.successes, &report.failures)
            .await
        {
            warn!(run_id = %ctx.run_id, "failed to send summary notification: {notify_error:#}");
        }

        info!(
            run_id = %ctx.run_id,
            dispatched = report.dispatched(),
            failed = report.failed_count(),
            "sync run completed"
        );
        ctx.emit(SyncEvent::Completed {
            message: format!("Synced {} products to the CRM.", report.dispatched()),
            failed_count: report.failed_count(),
        })
        .await;
    }
}

/// Per-run input after normalization
enum RunInput {
    Skus(Vec<String>),
    All,
    Dates(DateTime<Utc>, DateTime<Utc>),
}

/// Shared per-run state handed to dispatched reconciliations
#[derive(Clone)]
struct RunCtx {
    run_id: String,
    tx: mpsc::Sender<SyncEvent>,
    cancel: CancellationToken,
    progress: Arc<Mutex<SyncProgress>>,
    report: Arc<Mutex<SyncReport>>,
    semaphore: Arc<Semaphore>,
}

impl RunCtx {
    /// Best-effort event emit; a closed receiver flips the run to cancelled
    async fn emit(&self, event: SyncEvent) {
        if self.tx.send(event).await.is_err() {
            self.cancel.cancel();
        }
    }

    async fn log(&self, message: String) {
        info!(run_id = %self.run_id, "{message}");
        self.emit(SyncEvent::Log(message)).await;
    }

    /// Cancellation is cooperative: client disconnect (closed receiver) stops
    /// future paging and dispatch, never in-flight reconciliations.
    fn is_cancelled(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        if self.tx.is_closed() {
            self.cancel.cancel();
            return true;
        }
        false
    }

    /// Record one settled outcome. The processed-counter bump and its
    /// progress event form one step under the progress lock, so updates are
    /// serialized and never lost even though reconciliations interleave.
    async fn record(&self, outcome: SyncOutcome) {
        {
            self.report.lock().await.push(outcome);
        }
        let mut progress = self.progress.lock().await;
        progress.processed += 1;
        let snapshot = *progress;
        self.emit(SyncEvent::Progress {
            processed: snapshot.processed,
            total: snapshot.total,
        })
        .await;
    }
}

/// Flatten raw key entries on whitespace, preserving blank entries so they
/// are rejected explicitly downstream.
fn flatten_keys(raw: &[String]) -> Vec<String> {
    let mut keys = Vec::new();
    for entry in raw {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            keys.push(String::new());
        } else {
            keys.extend(trimmed.split_whitespace().map(str::to_string));
        }
    }
    keys
}

/// Inclusive calendar-day bounds in UTC: `[start 00:00:00, end 23:59:59]`
fn day_bounds(start: NaiveDate, end: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start_at = start.and_time(NaiveTime::MIN).and_utc();
    let end_at = end
        .and_hms_opt(23, 59, 59)
        .unwrap_or_else(|| end.and_time(NaiveTime::MIN))
        .and_utc();
    (start_at, end_at)
}
