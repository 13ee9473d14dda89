//! Integration tests for the live tail driver.
//!
//! Run on a paused clock so poll timing is exact.

use std::sync::Arc;
use std::time::Duration;

use claw_logview::{
    BatchId, LogBatch, LogRecord, LogViewConfig, MemoryLogSource, SubjectId, TailDriver,
    ViewEvent,
};
use tokio::sync::mpsc::UnboundedReceiver;

const TICK: Duration = Duration::from_secs(3);

// ==================== Helper Functions ====================

fn config() -> LogViewConfig {
    LogViewConfig::default().with_poll_interval(TICK)
}

fn batch(messages: &[&str], max_id: u64) -> LogBatch {
    LogBatch::new(records(messages), BatchId(max_id))
}

fn records(messages: &[&str]) -> Vec<LogRecord> {
    messages.iter().map(|m| LogRecord::new(*m)).collect()
}

async fn next_event(events: &mut UnboundedReceiver<ViewEvent>) -> ViewEvent {
    events.recv().await.expect("driver still running")
}

/// Consumes `Loading` and returns the `Loaded` that follows it.
async fn expect_loaded(events: &mut UnboundedReceiver<ViewEvent>) -> ViewEvent {
    assert!(matches!(next_event(events).await, ViewEvent::Loading { .. }));
    let event = next_event(events).await;
    assert!(matches!(event, ViewEvent::Loaded { .. }), "got {event:?}");
    event
}

// ==================== Polling ====================

#[tokio::test(start_paused = true)]
async fn polls_exactly_once_per_interval() {
    let source = Arc::new(MemoryLogSource::new());
    let subject = SubjectId::new("user-1");
    source.push_batch(&subject, batch(&["r1", "r2"], 5));

    let (driver, handle, mut events) = TailDriver::new(Arc::clone(&source), &config());
    let client = async {
        handle.select(subject.clone(), true).expect("send");
        let loaded = expect_loaded(&mut events).await;
        assert_eq!(
            loaded,
            ViewEvent::Loaded {
                subject: subject.clone(),
                visible: records(&["r1", "r2"]),
                scroll_to_bottom: true,
                following: true,
            }
        );

        tokio::time::sleep(TICK * 3 + Duration::from_millis(500)).await;
        handle.shutdown().expect("send");
    };
    tokio::join!(driver.run(), client);

    assert_eq!(
        source.calls(),
        vec![
            (subject.clone(), BatchId::ZERO),
            (subject.clone(), BatchId(5)),
            (subject.clone(), BatchId(5)),
            (subject, BatchId(5)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn appended_records_advance_cursor() {
    let source = Arc::new(MemoryLogSource::new());
    let subject = SubjectId::new("user-1");
    source.push_batch(&subject, batch(&["r1", "r2"], 5));
    source.push_batch(&subject, batch(&["r3"], 7));

    let (driver, handle, mut events) = TailDriver::new(Arc::clone(&source), &config());
    let client = async {
        handle.select(subject.clone(), true).expect("send");
        expect_loaded(&mut events).await;

        assert_eq!(
            next_event(&mut events).await,
            ViewEvent::Appended {
                visible: records(&["r3"]),
                scroll_to_bottom: true,
            }
        );

        tokio::time::sleep(TICK + Duration::from_millis(500)).await;
        handle.shutdown().expect("send");
    };
    let (view, ()) = tokio::join!(driver.run(), client);

    let messages: Vec<_> = view
        .controller()
        .records()
        .iter()
        .map(|r| r.message.as_str())
        .collect();
    assert_eq!(messages, vec!["r1", "r2", "r3"]);
    assert_eq!(view.controller().last_seen_id(), BatchId(7));
    assert_eq!(source.calls()[2], (subject, BatchId(7)));
}

#[tokio::test(start_paused = true)]
async fn appended_event_carries_only_visible_records() {
    let source = Arc::new(MemoryLogSource::new());
    let subject = SubjectId::new("user-1");
    source.push_batch(&subject, batch(&[], 1));
    source.push_batch(
        &subject,
        LogBatch::new(
            vec![
                LogRecord::new("login").with_category("[Auth] [Login]"),
                LogRecord::new("slow").with_category("[Network] [Timeout]"),
            ],
            BatchId(3),
        ),
    );

    let (driver, handle, mut events) = TailDriver::new(Arc::clone(&source), &config());
    let client = async {
        handle.set_query("[network]").expect("send");
        assert!(matches!(
            next_event(&mut events).await,
            ViewEvent::Refiltered { .. }
        ));

        handle.select(subject.clone(), true).expect("send");
        expect_loaded(&mut events).await;

        match next_event(&mut events).await {
            ViewEvent::Appended { visible, .. } => {
                assert_eq!(visible.len(), 1);
                assert_eq!(visible[0].message, "slow");
            }
            other => panic!("expected Appended, got {other:?}"),
        }
        handle.shutdown().expect("send");
    };
    tokio::join!(driver.run(), client);
}

// ==================== Selection ====================

#[tokio::test(start_paused = true)]
async fn late_response_for_previous_subject_is_ignored() {
    let source = Arc::new(MemoryLogSource::new());
    let first = SubjectId::new("user-a");
    let second = SubjectId::new("user-b");
    source.push_delayed(&first, batch(&["a1"], 4), Duration::from_secs(5));
    source.push_batch(&second, batch(&["b1"], 2));

    let (driver, handle, mut events) = TailDriver::new(Arc::clone(&source), &config());
    let client = async {
        handle.select(first.clone(), false).expect("send");
        handle.select(second.clone(), false).expect("send");

        assert_eq!(
            next_event(&mut events).await,
            ViewEvent::Loading {
                subject: first.clone()
            }
        );
        let loaded = expect_loaded(&mut events).await;
        assert!(matches!(loaded, ViewEvent::Loaded { ref subject, .. } if *subject == second));

        // Let the delayed answer for the first subject land.
        tokio::time::sleep(Duration::from_secs(6)).await;

        handle.set_query("").expect("send");
        match next_event(&mut events).await {
            ViewEvent::Refiltered { visible, .. } => assert_eq!(visible, records(&["b1"])),
            other => panic!("expected Refiltered, got {other:?}"),
        }
        handle.shutdown().expect("send");
    };
    let (view, ()) = tokio::join!(driver.run(), client);

    assert_eq!(view.controller().subject(), Some(&second));
    assert_eq!(view.controller().last_seen_id(), BatchId(2));
}

#[tokio::test(start_paused = true)]
async fn deselect_clears_view() {
    let source = Arc::new(MemoryLogSource::new());
    let subject = SubjectId::new("user-1");
    source.push_batch(&subject, batch(&["r1"], 1));

    let (driver, handle, mut events) = TailDriver::new(Arc::clone(&source), &config());
    let client = async {
        handle.select(subject.clone(), true).expect("send");
        expect_loaded(&mut events).await;

        handle.deselect().expect("send");
        assert_eq!(next_event(&mut events).await, ViewEvent::Cleared);

        tokio::time::sleep(TICK * 4).await;
        handle.shutdown().expect("send");
    };
    let (view, ()) = tokio::join!(driver.run(), client);

    assert!(view.visible_records().is_empty());
    assert_eq!(source.call_count(), 1, "no polls after deselect");
}

// ==================== Failures ====================

#[tokio::test(start_paused = true)]
async fn initial_failure_is_reported_and_not_retried() {
    let source = Arc::new(MemoryLogSource::new());
    let subject = SubjectId::new("user-1");
    source.push_error(&subject, 500, "boom");

    let (driver, handle, mut events) = TailDriver::new(Arc::clone(&source), &config());
    let client = async {
        handle.select(subject.clone(), true).expect("send");
        assert!(matches!(
            next_event(&mut events).await,
            ViewEvent::Loading { .. }
        ));
        match next_event(&mut events).await {
            ViewEvent::LoadFailed {
                subject: failed,
                error,
            } => {
                assert_eq!(failed, subject);
                assert!(error.contains("500"), "error was {error}");
            }
            other => panic!("expected LoadFailed, got {other:?}"),
        }

        tokio::time::sleep(TICK * 4).await;
        handle.shutdown().expect("send");
    };
    let (view, ()) = tokio::join!(driver.run(), client);

    assert_eq!(source.call_count(), 1);
    assert!(view.controller().error().is_some());
}

#[tokio::test(start_paused = true)]
async fn poll_failure_keeps_polling() {
    let source = Arc::new(MemoryLogSource::new());
    let subject = SubjectId::new("user-1");
    source.push_batch(&subject, batch(&["r1", "r2"], 5));
    source.push_error(&subject, 503, "busy");
    source.push_batch(&subject, batch(&["r3"], 6));

    let (driver, handle, mut events) = TailDriver::new(Arc::clone(&source), &config());
    let client = async {
        handle.select(subject.clone(), true).expect("send");
        expect_loaded(&mut events).await;

        match next_event(&mut events).await {
            ViewEvent::PollFailed {
                error,
                failed_polls,
            } => {
                assert!(error.contains("503"), "error was {error}");
                assert_eq!(failed_polls, 1);
            }
            other => panic!("expected PollFailed, got {other:?}"),
        }
        assert_eq!(
            next_event(&mut events).await,
            ViewEvent::Appended {
                visible: records(&["r3"]),
                scroll_to_bottom: true,
            }
        );
        handle.shutdown().expect("send");
    };
    tokio::join!(driver.run(), client);

    assert_eq!(
        source.calls(),
        vec![
            (subject.clone(), BatchId::ZERO),
            (subject.clone(), BatchId(5)),
            (subject, BatchId(5)),
        ]
    );
}

// ==================== Following ====================

#[tokio::test(start_paused = true)]
async fn unfollow_stops_fetching() {
    let source = Arc::new(MemoryLogSource::new());
    let subject = SubjectId::new("user-1");
    source.push_batch(&subject, batch(&["r1"], 1));

    let (driver, handle, mut events) = TailDriver::new(Arc::clone(&source), &config());
    let client = async {
        handle.select(subject.clone(), true).expect("send");
        expect_loaded(&mut events).await;

        handle.set_following(false).expect("send");
        assert_eq!(
            next_event(&mut events).await,
            ViewEvent::FollowingChanged(false)
        );

        tokio::time::sleep(TICK * 10).await;
        handle.shutdown().expect("send");
    };
    tokio::join!(driver.run(), client);

    assert_eq!(source.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn debug_flag_on_starts_following_idle_subject() {
    let source = Arc::new(MemoryLogSource::new());
    let subject = SubjectId::new("user-1");
    source.push_batch(&subject, batch(&["r1"], 1));

    let (driver, handle, mut events) = TailDriver::new(Arc::clone(&source), &config());
    let client = async {
        handle.select(subject.clone(), false).expect("send");
        match expect_loaded(&mut events).await {
            ViewEvent::Loaded {
                following,
                scroll_to_bottom,
                ..
            } => {
                assert!(!following);
                assert!(!scroll_to_bottom);
            }
            other => panic!("expected Loaded, got {other:?}"),
        }

        tokio::time::sleep(TICK * 2).await;
        handle.debug_flag_changed(true).expect("send");
        assert_eq!(
            next_event(&mut events).await,
            ViewEvent::FollowingChanged(true)
        );

        tokio::time::sleep(TICK + Duration::from_millis(500)).await;
        handle.shutdown().expect("send");
    };
    tokio::join!(driver.run(), client);

    assert_eq!(
        source.calls(),
        vec![(subject.clone(), BatchId::ZERO), (subject, BatchId(1))]
    );
}
