//! Event types streamed from the sync core to the caller
//!
//! A run yields a sequence of [`SyncEvent`]s: any number of log and progress
//! events followed by exactly one terminal event (completed, cancelled, or
//! fatal). The transport consuming the stream is an external collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel used when a failure has no resolvable SKU
pub const UNKNOWN_SKU: &str = "Unknown SKU";

/// The three entry modes of the sync orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Caller-supplied SKU list
    Skus,
    /// Full catalog walk via cursor pagination
    All,
    /// Creation/modification date window
    Dates,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Skus => write!(f, "skus"),
            SyncMode::All => write!(f, "all"),
            SyncMode::Dates => write!(f, "dates"),
        }
    }
}

/// A record that was successfully created or updated downstream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessRecord {
    pub sku: String,
    pub title: String,
    /// "created" or "updated"
    pub status: String,
}

/// A record that could not be synchronized
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureRecord {
    /// SKU, or [`UNKNOWN_SKU`] when none could be resolved
    pub sku: String,
    pub reason: String,
}

/// Terminal outcome of one record's reconciliation.
///
/// Every record dispatched for reconciliation produces exactly one outcome,
/// even on unexpected errors. This is the core invariant of the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum SyncOutcome {
    Success(SuccessRecord),
    Failure(FailureRecord),
}

impl SyncOutcome {
    pub fn success(
        sku: impl Into<String>,
        title: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        SyncOutcome::Success(SuccessRecord {
            sku: sku.into(),
            title: title.into(),
            status: status.into(),
        })
    }

    pub fn failure(sku: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncOutcome::Failure(FailureRecord {
            sku: sku.into(),
            reason: reason.into(),
        })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failure(_))
    }
}

/// Progress counters for one run.
///
/// `processed` only ever increases; `total` may grow while pagination is
/// still discovering records.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncProgress {
    pub processed: u32,
    pub total: u32,
}

/// Aggregated success/failure lists for one run, in completion order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub successes: Vec<SuccessRecord>,
    pub failures: Vec<FailureRecord>,
}

impl SyncReport {
    pub fn push(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Success(record) => self.successes.push(record),
            SyncOutcome::Failure(record) => self.failures.push(record),
        }
    }

    /// Number of records that produced an outcome
    pub fn dispatched(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }
}

/// Persisted history record for one completed (or partial) run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub mode: SyncMode,
    pub timestamp: DateTime<Utc>,
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub successes: Vec<SuccessRecord>,
    pub failures: Vec<FailureRecord>,
}

impl HistoryEntry {
    pub fn from_report(mode: SyncMode, report: &SyncReport) -> Self {
        Self {
            mode,
            timestamp: Utc::now(),
            total: report.dispatched(),
            success_count: report.successes.len(),
            failure_count: report.failures.len(),
            successes: report.successes.clone(),
            failures: report.failures.clone(),
        }
    }
}

/// Events emitted on the caller-facing stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum SyncEvent {
    /// Human-readable log line
    Log(String),
    /// Monotonic progress update, one per settled record
    Progress { processed: u32, total: u32 },
    /// Terminal: run finished normally
    Completed { message: String, failed_count: usize },
    /// Terminal: caller disconnected; in-flight work was drained first
    Cancelled { message: String },
    /// Terminal: page fetching failed or the run was rejected by the guard
    Fatal { error: String },
}

impl SyncEvent {
    /// Whether this event closes the stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncEvent::Completed { .. } | SyncEvent::Cancelled { .. } | SyncEvent::Fatal { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_both_sides() {
        let mut report = SyncReport::default();
        report.push(SyncOutcome::success("A", "Product A", "created"));
        report.push(SyncOutcome::failure("B", "sink rejected record"));
        report.push(SyncOutcome::failure(UNKNOWN_SKU, "missing SKU"));

        assert_eq!(report.dispatched(), 3);
        assert_eq!(report.failed_count(), 2);
    }

    #[test]
    fn outcome_helpers_tag_the_variant() {
        assert!(SyncOutcome::failure("B", "missing SKU").is_failure());
        assert!(!SyncOutcome::success("A", "Product A", "created").is_failure());
    }

    #[test]
    fn terminal_events_are_flagged() {
        assert!(!SyncEvent::Log("x".into()).is_terminal());
        assert!(
            !SyncEvent::Progress {
                processed: 1,
                total: 2
            }
            .is_terminal()
        );
        assert!(
            SyncEvent::Completed {
                message: "done".into(),
                failed_count: 0
            }
            .is_terminal()
        );
        assert!(
            SyncEvent::Fatal {
                error: "boom".into()
            }
            .is_terminal()
        );
    }

    #[test]
    fn history_entry_mode_serializes_as_type() {
        let entry = HistoryEntry::from_report(SyncMode::All, &SyncReport::default());
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "all");
        assert_eq!(value["total"], 0);
    }
}
