//! Application layer: the synchronization core
//!
//! Orchestrator, record mapper, error classifier, and run guard. Everything
//! here talks to the outside world only through the domain adapter traits.

pub mod error_classifier;
pub mod mapper;
pub mod orchestrator;
pub mod run_guard;

pub use error_classifier::{ClassifiedError, FailureCategory, classify};
pub use orchestrator::{ArchiveOutcome, SyncError, SyncOrchestrator, SyncRun};
pub use run_guard::{DEFAULT_COOLDOWN, GuardRejection, RunGuard, RunPermit};
