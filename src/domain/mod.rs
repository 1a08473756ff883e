//! Domain layer: catalog entities, sync events, and adapter traits

pub mod events;
pub mod product;
pub mod services;

pub use events::{
    FailureRecord, HistoryEntry, SuccessRecord, SyncEvent, SyncMode, SyncOutcome, SyncProgress,
    SyncReport, UNKNOWN_SKU,
};
pub use product::{Metafield, Product, ProductPage, ProductStatus, ProductVariant};
pub use services::{
    CrmSink, ProductSource, Properties, SinkError, SourceError, SummaryNotifier, SyncHistory,
};
