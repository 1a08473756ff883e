//! End-to-end sync run scenarios against in-memory adapters

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;

use catalog_sync::application::orchestrator::SyncRun;
use catalog_sync::application::{ArchiveOutcome, RunGuard, SyncOrchestrator};
use catalog_sync::domain::{Properties, SyncEvent, UNKNOWN_SKU};
use catalog_sync::infrastructure::SyncConfig;
use catalog_sync::test_utils::{MemoryHistory, MemoryNotifier, MockSink, MockSource, product};

struct Harness {
    orchestrator: SyncOrchestrator,
    sink: Arc<MockSink>,
    history: Arc<MemoryHistory>,
    notifier: Arc<MemoryNotifier>,
}

fn harness(source: MockSource, sink: MockSink, cooldown: Duration) -> Harness {
    harness_with(
        source,
        sink,
        cooldown,
        MemoryHistory::new(),
        MemoryNotifier::new(),
    )
}

fn harness_with(
    source: MockSource,
    sink: MockSink,
    cooldown: Duration,
    history: MemoryHistory,
    notifier: MemoryNotifier,
) -> Harness {
    let sink = Arc::new(sink);
    let history = Arc::new(history);
    let notifier = Arc::new(notifier);
    let config = SyncConfig {
        // large enough that a run never blocks on an unconsumed stream
        event_buffer: 4096,
        ..SyncConfig::default()
    };
    let orchestrator = SyncOrchestrator::new(
        Arc::new(source),
        sink.clone(),
        history.clone(),
        notifier.clone(),
        Arc::new(RunGuard::new(cooldown)),
        config,
    );
    Harness {
        orchestrator,
        sink,
        history,
        notifier,
    }
}

/// Wait for the run to finish, then collect every event it emitted
async fn drain(run: SyncRun) -> Vec<SyncEvent> {
    let SyncRun {
        run_id: _,
        mut events,
        driver,
    } = run;
    driver.await.expect("sync driver panicked");
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        collected.push(event);
    }
    collected
}

fn assert_single_terminal(events: &[SyncEvent]) {
    assert_eq!(
        events.iter().filter(|e| e.is_terminal()).count(),
        1,
        "expected exactly one terminal event, got: {events:?}"
    );
    assert!(events.last().is_some_and(SyncEvent::is_terminal));
}

fn last_progress(events: &[SyncEvent]) -> (u32, u32) {
    events
        .iter()
        .rev()
        .find_map(|event| match event {
            SyncEvent::Progress { processed, total } => Some((*processed, *total)),
            _ => None,
        })
        .expect("no progress event emitted")
}

fn skus(entries: &[&str]) -> Vec<String> {
    entries.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn sku_run_yields_one_outcome_per_entry() {
    let source = MockSource::new().with_product(product("1", "Emerald Ring", Some("ABC123")));
    let h = harness(source, MockSink::new(), Duration::ZERO);

    let events = drain(h.orchestrator.run_by_skus(&skus(&["ABC123", ""]))).await;

    assert_single_terminal(&events);
    match events.last() {
        Some(SyncEvent::Completed { failed_count, .. }) => assert_eq!(*failed_count, 1),
        other => panic!("expected Completed, got {other:?}"),
    }
    assert_eq!(last_progress(&events), (2, 2));

    let entries = h.history.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].total, 2);
    assert_eq!(entries[0].success_count, 1);
    assert_eq!(entries[0].failures[0].sku, UNKNOWN_SKU);
    assert_eq!(entries[0].failures[0].reason, "missing SKU");

    assert_eq!(h.sink.create_calls(), 1);
    assert!(h.sink.properties_for("ABC123").is_some());
}

#[tokio::test]
async fn blank_entries_never_reach_the_sink() {
    let h = harness(MockSource::new(), MockSink::new(), Duration::ZERO);

    let events = drain(h.orchestrator.run_by_skus(&skus(&["   "]))).await;

    match events.last() {
        Some(SyncEvent::Completed { failed_count, .. }) => assert_eq!(*failed_count, 1),
        other => panic!("expected Completed, got {other:?}"),
    }
    assert_eq!(h.sink.find_calls(), 0);
    assert_eq!(h.sink.create_calls(), 0);
}

#[tokio::test]
async fn unknown_sku_is_reported_not_found() {
    let h = harness(MockSource::new(), MockSink::new(), Duration::ZERO);

    drain(h.orchestrator.run_by_skus(&skus(&["NOPE-1"]))).await;

    let entries = h.history.entries();
    assert_eq!(entries[0].failures[0].sku, "NOPE-1");
    assert_eq!(
        entries[0].failures[0].reason,
        "product not found in source catalog"
    );
}

#[tokio::test]
async fn resyncing_a_sku_updates_instead_of_duplicating() {
    let source = MockSource::new().with_product(product("7", "Gold Band", Some("RING-1")));
    let h = harness(source, MockSink::new(), Duration::ZERO);

    drain(h.orchestrator.run_by_skus(&skus(&["RING-1"]))).await;
    drain(h.orchestrator.run_by_skus(&skus(&["RING-1"]))).await;

    assert_eq!(h.sink.create_calls(), 1);
    assert_eq!(h.sink.update_calls(), 1);
    assert_eq!(h.sink.record_count(), 1);

    let summaries = h.notifier.sent();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].0[0].status, "created");
    assert_eq!(summaries[1].0[0].status, "updated");
}

#[tokio::test]
async fn result_sink_failures_are_best_effort() {
    let source = MockSource::new().with_product(product("1", "Emerald Ring", Some("ABC123")));
    let h = harness_with(
        source,
        MockSink::new(),
        Duration::ZERO,
        MemoryHistory::new().failing(),
        MemoryNotifier::new().failing(),
    );

    let events = drain(h.orchestrator.run_by_skus(&skus(&["ABC123", ""]))).await;

    // persist and notify both failed; the run is unaffected
    assert_single_terminal(&events);
    match events.last() {
        Some(SyncEvent::Completed { failed_count, .. }) => assert_eq!(*failed_count, 1),
        other => panic!("expected Completed, got {other:?}"),
    }
    assert_eq!(h.sink.create_calls(), 1);

    // both channels were tried, neither outcome leaked into the run
    assert_eq!(h.history.attempt_count(), 1);
    assert!(h.history.entries().is_empty());
    assert_eq!(h.notifier.attempt_count(), 1);
    assert_eq!(h.notifier.sent_count(), 0);
}

#[tokio::test]
async fn preloaded_sink_record_is_updated_not_recreated() {
    let source = MockSource::new().with_product(product("7", "Gold Band", Some("RING-1")));
    let sink = MockSink::new().with_existing("RING-1", "crm-existing");
    let h = harness(source, sink, Duration::ZERO);

    drain(h.orchestrator.run_by_skus(&skus(&["RING-1"]))).await;

    assert_eq!(h.sink.create_calls(), 0);
    assert_eq!(h.sink.update_calls(), 1);
    let properties = h.sink.properties_for("RING-1").unwrap();
    assert_eq!(properties["name"], "Gold Band");

    let summaries = h.notifier.sent();
    assert_eq!(summaries[0].0[0].status, "updated");
}

#[tokio::test]
async fn validation_rejections_are_contained_per_record() {
    let source = MockSource::new()
        .with_product(product("1", "Good Ring", Some("A-1")))
        .with_product(product("2", "Bad Ring", Some("B-1")));
    let sink = MockSink::new().rejecting(
        "B-1",
        json!({
            "message": "Property values were not valid",
            "errors": [{
                "code": "PROPERTY_DOESNT_EXIST",
                "context": { "propertyName": ["jewelry__carat"] }
            }]
        }),
    );
    let h = harness(source, sink, Duration::ZERO);

    let events = drain(h.orchestrator.run_by_skus(&skus(&["A-1", "B-1"]))).await;

    match events.last() {
        Some(SyncEvent::Completed { failed_count, .. }) => assert_eq!(*failed_count, 1),
        other => panic!("expected Completed, got {other:?}"),
    }
    // the rejected record failed with a structured reason, the other synced
    assert!(h.sink.properties_for("A-1").is_some());
    let entries = h.history.entries();
    assert_eq!(entries[0].failures[0].sku, "B-1");
    assert!(
        entries[0].failures[0]
            .reason
            .starts_with("Missing fields: jewelry__carat")
    );
}

#[tokio::test]
async fn full_catalog_walks_every_page() {
    let source = MockSource::new().with_pages(vec![
        vec![
            product("1", "P1", Some("S-1")),
            product("2", "P2", Some("S-2")),
        ],
        vec![
            product("3", "P3", Some("S-3")),
            product("4", "P4", Some("S-4")),
            product("5", "P5", Some("S-5")),
        ],
    ]);
    let h = harness(source, MockSink::new(), Duration::ZERO);

    let events = drain(h.orchestrator.run_full_catalog()).await;

    match events.last() {
        Some(SyncEvent::Completed {
            message,
            failed_count,
        }) => {
            assert_eq!(message, "Synced 5 products to the CRM.");
            assert_eq!(*failed_count, 0);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
    assert_eq!(last_progress(&events), (5, 5));
    assert_eq!(h.sink.record_count(), 5);
}

#[tokio::test]
async fn page_fetch_failure_aborts_but_keeps_prior_outcomes() {
    let source = MockSource::new()
        .with_pages(vec![
            vec![
                product("1", "P1", Some("S-1")),
                product("2", "P2", Some("S-2")),
                product("3", "P3", Some("S-3")),
            ],
            vec![product("4", "P4", Some("S-4"))],
        ])
        .fail_on_page(1);
    let h = harness(source, MockSink::new(), Duration::ZERO);

    let events = drain(h.orchestrator.run_full_catalog()).await;

    assert_single_terminal(&events);
    match events.last() {
        Some(SyncEvent::Fatal { error }) => {
            assert!(error.contains("failed to fetch catalog page"))
        }
        other => panic!("expected Fatal, got {other:?}"),
    }
    // the first page's records settled and were persisted before the abort
    let entries = h.history.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].total, 3);
    assert_eq!(h.notifier.sent_count(), 0);
}

#[tokio::test]
async fn concurrent_full_runs_are_mutually_exclusive() {
    let source = MockSource::new().with_pages(vec![vec![
        product("1", "P1", Some("S-1")),
        product("2", "P2", Some("S-2")),
        product("3", "P3", Some("S-3")),
    ]]);
    let sink = MockSink::new().with_write_delay(Duration::from_millis(50));
    let h = harness(source, sink, Duration::ZERO);

    let mut first = h.orchestrator.run_full_catalog();
    // first event arrives only after the guard slot is taken
    let opening = first.events.recv().await.expect("first run emitted nothing");
    assert!(matches!(opening, SyncEvent::Log(_)));

    let second_events = drain(h.orchestrator.run_full_catalog()).await;
    assert_eq!(second_events.len(), 1);
    match &second_events[0] {
        SyncEvent::Fatal { error } => assert!(error.contains("already in progress")),
        other => panic!("expected Fatal, got {other:?}"),
    }

    // the rejected attempt leaves the first run untouched
    first.driver.await.expect("sync driver panicked");
    let mut rest = vec![opening];
    while let Some(event) = first.events.recv().await {
        rest.push(event);
    }
    assert!(matches!(rest.last(), Some(SyncEvent::Completed { .. })));
    assert_eq!(h.sink.record_count(), 3);
}

#[tokio::test]
async fn cooldown_blocks_back_to_back_full_runs() {
    let source = MockSource::new();
    let h = harness(source, MockSink::new(), Duration::from_secs(900));

    let first = drain(h.orchestrator.run_full_catalog()).await;
    assert!(matches!(first.last(), Some(SyncEvent::Completed { .. })));

    let second = drain(h.orchestrator.run_full_catalog()).await;
    match second.last() {
        Some(SyncEvent::Fatal { error }) => {
            assert!(error.contains("wait"), "unexpected rejection: {error}")
        }
        other => panic!("expected Fatal, got {other:?}"),
    }
    // only the completed run reached history
    assert_eq!(h.history.entries().len(), 1);
}

#[tokio::test]
async fn sku_runs_are_never_guarded() {
    let h = harness(MockSource::new(), MockSink::new(), Duration::from_secs(900));

    drain(h.orchestrator.run_full_catalog()).await;
    // still in cooldown for full runs; SKU runs go through
    let events = drain(h.orchestrator.run_by_skus(&skus(&["X-1"]))).await;
    assert!(matches!(events.last(), Some(SyncEvent::Completed { .. })));
}

#[tokio::test]
async fn empty_date_range_completes_cleanly() {
    let h = harness(MockSource::new(), MockSink::new(), Duration::ZERO);
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();

    let events = drain(h.orchestrator.run_by_date_range(start, end)).await;

    match events.last() {
        Some(SyncEvent::Completed { failed_count, .. }) => assert_eq!(*failed_count, 0),
        other => panic!("expected Completed, got {other:?}"),
    }
    let summaries = h.notifier.sent();
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].0.is_empty());
    assert!(summaries[0].1.is_empty());

    let entries = h.history.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].total, 0);
}

#[tokio::test]
async fn dropped_receiver_cancels_and_still_persists_history() {
    let pages: Vec<Vec<_>> = (0..6)
        .map(|p| {
            (0..10)
                .map(|i| {
                    let n = p * 10 + i;
                    product(&n.to_string(), &format!("P{n}"), Some(&format!("S-{n}")))
                })
                .collect()
        })
        .collect();
    let source = MockSource::new()
        .with_pages(pages)
        .with_page_delay(Duration::from_millis(20));
    let sink = MockSink::new().with_write_delay(Duration::from_millis(25));
    let h = harness(source, sink, Duration::ZERO);

    let run = h.orchestrator.run_full_catalog();
    let SyncRun {
        run_id: _,
        mut events,
        driver,
    } = run;
    // wait until at least one record settled, then disconnect
    loop {
        match events.recv().await.expect("run ended before any progress") {
            SyncEvent::Progress { .. } => break,
            _ => continue,
        }
    }
    drop(events);
    driver.await.expect("sync driver panicked");

    // no summary on a cancelled run, but history still records the partial run
    assert_eq!(h.notifier.sent_count(), 0);
    let entries = h.history.entries();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.total, entry.success_count + entry.failure_count);
    assert!(entry.total >= 1, "at least one record settled");
    assert!(entry.total < 60, "cancellation stopped the catalog walk");
}

#[tokio::test]
async fn disconnect_drains_in_flight_sku_lookups() {
    let mut source = MockSource::new().with_lookup_delay(Duration::from_millis(25));
    let mut keys = Vec::new();
    for n in 0..40 {
        source = source.with_product(product(&n.to_string(), &format!("P{n}"), Some(&format!("S-{n}"))));
        keys.push(format!("S-{n}"));
    }
    let h = harness(source, MockSink::new(), Duration::ZERO);

    let run = h.orchestrator.run_by_skus(&keys);
    let SyncRun {
        run_id: _,
        mut events,
        driver,
    } = run;
    // disconnect while every lookup is still in flight
    events.recv().await.expect("run emitted nothing");
    drop(events);
    driver.await.expect("sync driver panicked");

    // in-flight records finish and the full report is persisted; the
    // summary is skipped on the cancelled path
    let entries = h.history.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].total, 40);
    assert_eq!(entries[0].success_count, 40);
    assert_eq!(h.sink.record_count(), 40);
    assert_eq!(h.notifier.sent_count(), 0);
}

#[tokio::test]
async fn archive_removed_archives_the_matching_record() {
    use catalog_sync::domain::CrmSink;

    let h = harness(MockSource::new(), MockSink::new(), Duration::ZERO);
    let mut properties = Properties::new();
    properties.insert("sku".to_string(), "R-1".to_string());
    properties.insert("source_id".to_string(), "gid://source/Product/9".to_string());
    let id = h.sink.create(&properties).await.unwrap();

    let outcome = h
        .orchestrator
        .archive_removed("gid://source/Product/9")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ArchiveOutcome::Archived {
            destination_id: id.clone()
        }
    );
    assert_eq!(h.sink.archived_ids(), vec![id]);

    let missing = h.orchestrator.archive_removed("gid://nope").await.unwrap();
    assert_eq!(missing, ArchiveOutcome::NotFound);
}
