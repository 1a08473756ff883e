//! catalog-sync: product catalog synchronization core
//!
//! Reconciles an e-commerce product catalog into a CRM's custom records.
//! Three entry modes (explicit SKU list, full catalog, date range) drive the
//! same pipeline: page records out of a [`domain::ProductSource`], normalize
//! each into destination properties, search-then-create-or-update through a
//! [`domain::CrmSink`], and stream live [`domain::SyncEvent`]s back to the
//! caller while aggregating a run report.
//!
//! The core is transport-agnostic: platform HTTP clients, the event-stream
//! transport, and the notification channel all plug in at the adapter traits
//! in [`domain::services`].

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod test_utils;

pub use application::{
    ArchiveOutcome, GuardRejection, RunGuard, SyncError, SyncOrchestrator, SyncRun,
};
pub use domain::{
    CrmSink, Product, ProductSource, SummaryNotifier, SyncEvent, SyncHistory, SyncMode,
    SyncOutcome, SyncReport,
};
pub use infrastructure::{JsonHistoryStore, LoggingNotifier, SyncConfig};
