//! Log-backed summary notifier
//!
//! Renders the run summary (the same body an email notifier would send) into
//! the logs. Actual delivery transports live outside the core; they plug in
//! through the same [`SummaryNotifier`] trait.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::events::{FailureRecord, SuccessRecord};
use crate::domain::services::SummaryNotifier;

/// [`SummaryNotifier`] that writes the summary to the logs
#[derive(Debug, Default)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }

    /// Render the failure report body
    fn failure_body(failures: &[FailureRecord]) -> String {
        failures.iter().fold(
            "The following products failed to update:\n\n".to_string(),
            |mut body, failure| {
                body.push_str(&format!(
                    "SKU: {} - Reason: {}\n",
                    failure.sku, failure.reason
                ));
                body
            },
        )
    }
}

#[async_trait]
impl SummaryNotifier for LoggingNotifier {
    async fn notify(
        &self,
        successes: &[SuccessRecord],
        failures: &[FailureRecord],
    ) -> Result<()> {
        info!(
            success_count = successes.len(),
            failure_count = failures.len(),
            "sync summary"
        );
        if !failures.is_empty() {
            warn!("{}", Self::failure_body(failures));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_never_fails() {
        let notifier = LoggingNotifier::new();
        let failures = vec![FailureRecord {
            sku: "A1".to_string(),
            reason: "missing SKU".to_string(),
        }];
        assert!(notifier.notify(&[], &failures).await.is_ok());
        assert!(notifier.notify(&[], &[]).await.is_ok());
    }

    #[test]
    fn failure_body_lists_each_sku() {
        let failures = vec![
            FailureRecord {
                sku: "A1".to_string(),
                reason: "missing SKU".to_string(),
            },
            FailureRecord {
                sku: "B2".to_string(),
                reason: "SKU already in use.".to_string(),
            },
        ];
        let body = LoggingNotifier::failure_body(&failures);
        assert!(body.contains("SKU: A1 - Reason: missing SKU"));
        assert!(body.contains("SKU: B2"));
    }
}
