mod common;

use async_trait::async_trait;
use common::{MockBackend, RecordingNotifier, code, key, seed};
use docward_sync::{RemoteBackend, RetryPolicy, SyncEngine, SyncError, SyncResult};
use docward_types::{NewEntry, SyncAttemptStatus, SyncScope, SyncStatus};
use docward_warehouse::{PutMode, Warehouse};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

fn engine(
    warehouse: &Arc<Warehouse>,
    backends: &[Arc<MockBackend>],
    retry: RetryPolicy,
) -> SyncEngine {
    let backends = backends
        .iter()
        .map(|b| Arc::clone(b) as Arc<dyn RemoteBackend>)
        .collect();
    SyncEngine::new(Arc::clone(warehouse), backends).with_retry_policy(retry)
}

fn status(warehouse: &Warehouse, id: &str, filename: &str) -> SyncStatus {
    warehouse.get(&key(id, filename)).unwrap().sync_status
}

// ── Batch behaviour ───────────────────────────────────────────────

#[tokio::test]
async fn failure_of_one_item_does_not_abort_the_batch() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    seed(&warehouse, "0101234567", "A.xml");
    seed(&warehouse, "0101234567", "B.xml");
    seed(&warehouse, "0101234567", "C.xml");
    let backend = Arc::new(MockBackend::new("mock").failing_on(&[2]));

    let attempts = engine(&warehouse, &[backend.clone()], fast_retry(1))
        .sync(&SyncScope::All)
        .await
        .unwrap();

    assert_eq!(attempts.len(), 1);
    let attempt = &attempts[0];
    assert_eq!(attempt.files_attempted, 3);
    assert_eq!(attempt.files_succeeded, 2);
    assert_eq!(attempt.status, SyncAttemptStatus::PartialSuccess);
    assert_eq!(attempt.entry_ref, "ALL");
    assert!(attempt.detail.as_deref().unwrap().contains("0101234567/B.xml"));

    assert_eq!(status(&warehouse, "0101234567", "A.xml"), SyncStatus::Synced);
    assert_eq!(status(&warehouse, "0101234567", "B.xml"), SyncStatus::Failed);
    assert_eq!(status(&warehouse, "0101234567", "C.xml"), SyncStatus::Synced);
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn synced_entry_carries_backend_locator() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    seed(&warehouse, "0101234567", "A.xml");
    let backend = Arc::new(MockBackend::new("mock"));

    engine(&warehouse, &[backend], fast_retry(3))
        .sync(&SyncScope::All)
        .await
        .unwrap();

    let entry = warehouse.get(&key("0101234567", "A.xml")).unwrap();
    assert_eq!(entry.sync_status, SyncStatus::Synced);
    assert_eq!(entry.remote_locator.as_deref(), Some("mock://mock/0101234567/A.xml"));
    assert!(warehouse.list_pending(&SyncScope::All).unwrap().is_empty());
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    seed(&warehouse, "0101234567", "A.xml");
    let backend = Arc::new(MockBackend::new("mock").failing_on(&[1, 2]));

    let attempts = engine(&warehouse, &[backend.clone()], fast_retry(3))
        .sync(&SyncScope::All)
        .await
        .unwrap();

    assert_eq!(attempts[0].status, SyncAttemptStatus::Success);
    assert_eq!(backend.calls(), 3);
    assert_eq!(status(&warehouse, "0101234567", "A.xml"), SyncStatus::Synced);
}

#[tokio::test]
async fn exhausted_retries_mark_entry_failed_with_reason() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    seed(&warehouse, "0101234567", "A.xml");
    let backend = Arc::new(MockBackend::new("mock").failing_on(&[1, 2, 3]));

    let attempts = engine(&warehouse, &[backend.clone()], fast_retry(3))
        .sync(&SyncScope::All)
        .await
        .unwrap();

    assert_eq!(attempts[0].status, SyncAttemptStatus::Failed);
    assert_eq!(backend.calls(), 3);
    let entry = warehouse.get(&key("0101234567", "A.xml")).unwrap();
    assert_eq!(entry.sync_status, SyncStatus::Failed);
    assert!(entry.sync_error.as_deref().unwrap().contains("connection reset"));
}

#[tokio::test]
async fn permanent_errors_are_not_retried() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    seed(&warehouse, "0101234567", "A.xml");
    let backend = Arc::new(
        MockBackend::new("mock")
            .failing_on(&[1])
            .failing_with(|| SyncError::Config("token revoked".into())),
    );

    engine(&warehouse, &[backend.clone()], fast_retry(3))
        .sync(&SyncScope::All)
        .await
        .unwrap();

    assert_eq!(backend.calls(), 1);
    assert_eq!(status(&warehouse, "0101234567", "A.xml"), SyncStatus::Failed);
}

#[tokio::test]
async fn slow_upload_times_out_and_is_retried() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    seed(&warehouse, "0101234567", "A.xml");
    let backend = Arc::new(MockBackend::new("mock").slow(Duration::from_millis(500)));

    let attempts = engine(&warehouse, &[backend.clone()], fast_retry(2))
        .with_call_timeout(Duration::from_millis(20))
        .sync(&SyncScope::All)
        .await
        .unwrap();

    assert_eq!(backend.calls(), 2);
    assert_eq!(attempts[0].status, SyncAttemptStatus::Failed);
    let entry = warehouse.get(&key("0101234567", "A.xml")).unwrap();
    assert!(entry.sync_error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn empty_batch_is_a_success() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    let backend = Arc::new(MockBackend::new("mock"));

    let attempts = engine(&warehouse, &[backend], fast_retry(3))
        .sync(&SyncScope::All)
        .await
        .unwrap();

    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, SyncAttemptStatus::Success);
    assert_eq!(attempts[0].files_attempted, 0);
}

#[tokio::test]
async fn no_backends_means_no_attempts() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    seed(&warehouse, "0101234567", "A.xml");

    let attempts = engine(&warehouse, &[], fast_retry(3))
        .sync(&SyncScope::All)
        .await
        .unwrap();

    assert!(attempts.is_empty());
    assert_eq!(status(&warehouse, "0101234567", "A.xml"), SyncStatus::Pending);
}

// ── Scope ─────────────────────────────────────────────────────────

#[tokio::test]
async fn entity_scope_only_touches_that_entity() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    seed(&warehouse, "0101234567", "A.xml");
    seed(&warehouse, "0309876543", "A.xml");
    let backend = Arc::new(MockBackend::new("mock"));

    let scope = SyncScope::ByEntity(code("0309876543"));
    let attempts = engine(&warehouse, &[backend.clone()], fast_retry(3))
        .sync(&scope)
        .await
        .unwrap();

    assert_eq!(attempts[0].entry_ref, "0309876543");
    assert_eq!(attempts[0].files_attempted, 1);
    assert_eq!(*backend.uploads.lock().unwrap(), vec!["0309876543/A.xml".to_string()]);
    assert_eq!(status(&warehouse, "0101234567", "A.xml"), SyncStatus::Pending);
    assert_eq!(status(&warehouse, "0309876543", "A.xml"), SyncStatus::Synced);
}

// ── Configuration failures ────────────────────────────────────────

#[tokio::test]
async fn misconfigured_backend_short_circuits_the_batch() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    seed(&warehouse, "0101234567", "A.xml");
    seed(&warehouse, "0101234567", "B.xml");
    let backend = Arc::new(MockBackend::new("mock").misconfigured("no token configured"));

    let attempts = engine(&warehouse, &[backend.clone()], fast_retry(3))
        .sync(&SyncScope::All)
        .await
        .unwrap();

    assert_eq!(backend.calls(), 0);
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, SyncAttemptStatus::Failed);
    assert_eq!(attempts[0].files_attempted, 2);
    assert_eq!(attempts[0].files_succeeded, 0);
    assert!(attempts[0].detail.as_deref().unwrap().contains("no token configured"));
    assert_eq!(status(&warehouse, "0101234567", "A.xml"), SyncStatus::Pending);
    assert_eq!(status(&warehouse, "0101234567", "B.xml"), SyncStatus::Pending);
}

#[tokio::test]
async fn backend_rejecting_credentials_mid_run_gets_no_further_uploads() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    seed(&warehouse, "0101234567", "A.xml");
    seed(&warehouse, "0101234567", "B.xml");
    seed(&warehouse, "0101234567", "C.xml");
    let backend = Arc::new(
        MockBackend::new("github")
            .failing_on(&[1, 2, 3])
            .failing_with(|| SyncError::Config("401 Bad credentials".into())),
    );

    let attempts = engine(&warehouse, &[backend.clone()], fast_retry(3))
        .sync(&SyncScope::All)
        .await
        .unwrap();

    assert_eq!(backend.calls(), 1);
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, SyncAttemptStatus::Failed);
    assert_eq!(attempts[0].files_attempted, 3);
    assert_eq!(attempts[0].files_succeeded, 0);
    assert!(attempts[0].detail.as_deref().unwrap().contains("401 Bad credentials"));
    for filename in ["A.xml", "B.xml", "C.xml"] {
        assert_eq!(status(&warehouse, "0101234567", filename), SyncStatus::Pending);
    }
}

#[tokio::test]
async fn credential_rejection_on_one_backend_leaves_the_others_running() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    seed(&warehouse, "0101234567", "A.xml");
    seed(&warehouse, "0101234567", "B.xml");
    let primary = Arc::new(MockBackend::new("primary"));
    let github = Arc::new(
        MockBackend::new("github")
            .failing_on(&[1])
            .failing_with(|| SyncError::Config("403 Forbidden".into())),
    );

    let attempts = engine(&warehouse, &[primary.clone(), github.clone()], fast_retry(1))
        .sync(&SyncScope::All)
        .await
        .unwrap();

    assert_eq!(primary.calls(), 2);
    assert_eq!(github.calls(), 1);
    assert_eq!(attempts[0].status, SyncAttemptStatus::Success);
    assert_eq!(attempts[1].status, SyncAttemptStatus::Failed);
    // Neither entry reached every backend.
    assert_eq!(status(&warehouse, "0101234567", "A.xml"), SyncStatus::Pending);
    assert_eq!(status(&warehouse, "0101234567", "B.xml"), SyncStatus::Pending);
}

// ── Concurrent edits ──────────────────────────────────────────────

/// Replaces the entry's content while its old bytes are in flight.
struct ReplacingBackend {
    warehouse: Arc<Warehouse>,
    uploaded: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl RemoteBackend for ReplacingBackend {
    fn name(&self) -> &str {
        "replacing"
    }

    async fn upload(&self, locator_hint: &str, content: &[u8]) -> SyncResult<String> {
        self.uploaded.lock().unwrap().push(content.to_vec());
        self.warehouse
            .put(
                NewEntry::new(code("0101234567"), "A.xml", "ACME", "<doc>v2</doc>"),
                PutMode::Upsert,
            )
            .unwrap();
        Ok(format!("mock://replacing/{locator_hint}"))
    }
}

#[tokio::test]
async fn content_replaced_during_upload_stays_pending() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    warehouse
        .put(
            NewEntry::new(code("0101234567"), "A.xml", "ACME", "<doc>v1</doc>"),
            PutMode::Upsert,
        )
        .unwrap();
    let backend = Arc::new(ReplacingBackend {
        warehouse: Arc::clone(&warehouse),
        uploaded: Mutex::new(Vec::new()),
    });

    let backends: Vec<Arc<dyn RemoteBackend>> = vec![backend.clone()];
    let attempts = SyncEngine::new(Arc::clone(&warehouse), backends)
        .with_retry_policy(fast_retry(1))
        .sync(&SyncScope::All)
        .await
        .unwrap();

    assert_eq!(attempts[0].status, SyncAttemptStatus::Success);
    assert_eq!(*backend.uploaded.lock().unwrap(), vec![b"<doc>v1</doc>".to_vec()]);
    let stored = warehouse.get(&key("0101234567", "A.xml")).unwrap();
    assert_eq!(stored.content(), b"<doc>v2</doc>");
    assert_eq!(stored.sync_status, SyncStatus::Pending);
    assert_eq!(stored.remote_locator, None);
}

// ── Several backends ──────────────────────────────────────────────

#[tokio::test]
async fn entry_is_synced_only_when_every_accepting_backend_has_it() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    seed(&warehouse, "0101234567", "A.xml");
    seed(&warehouse, "0309876543", "A.xml");
    let primary = Arc::new(MockBackend::new("primary"));
    // Only takes the second entity and always fails.
    let secondary = Arc::new(
        MockBackend::new("secondary")
            .only("0309876543")
            .failing_on(&[1]),
    );

    let attempts = engine(
        &warehouse,
        &[primary.clone(), secondary.clone()],
        fast_retry(1),
    )
    .sync(&SyncScope::All)
    .await
    .unwrap();

    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].backend, "primary");
    assert_eq!(attempts[0].status, SyncAttemptStatus::Success);
    assert_eq!(attempts[1].backend, "secondary");
    assert_eq!(attempts[1].files_attempted, 1);
    assert_eq!(attempts[1].status, SyncAttemptStatus::Failed);

    let first = warehouse.get(&key("0101234567", "A.xml")).unwrap();
    assert_eq!(first.sync_status, SyncStatus::Synced);
    assert_eq!(first.remote_locator.as_deref(), Some("mock://primary/0101234567/A.xml"));
    let second = warehouse.get(&key("0309876543", "A.xml")).unwrap();
    assert_eq!(second.sync_status, SyncStatus::Failed);
    assert!(second.sync_error.as_deref().unwrap().starts_with("secondary:"));
}

// ── Audit and alerts ──────────────────────────────────────────────

#[tokio::test]
async fn attempts_are_recorded_and_failures_alerted() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    seed(&warehouse, "0101234567", "A.xml");
    let notifier = Arc::new(RecordingNotifier::default());
    let backend = Arc::new(MockBackend::new("mock").failing_on(&[1]));

    let engine = engine(&warehouse, &[backend], fast_retry(1)).with_notifier(notifier.clone());
    engine.sync(&SyncScope::All).await.unwrap();

    let recorded = warehouse.audit().recent_sync_attempts(10, 0).unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].status, SyncAttemptStatus::Failed);
    assert_eq!(notifier.messages.lock().unwrap().len(), 1);

    warehouse.requeue_failed().unwrap();
    engine.sync(&SyncScope::All).await.unwrap();
    assert_eq!(warehouse.audit().sync_attempt_count().unwrap(), 2);
    assert_eq!(notifier.messages.lock().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_runs_do_not_upload_twice() {
    let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
    seed(&warehouse, "0101234567", "A.xml");
    let backend = Arc::new(MockBackend::new("mock").slow(Duration::from_millis(50)));
    let engine = Arc::new(engine(&warehouse, &[backend.clone()], fast_retry(1)));

    let a = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.sync(&SyncScope::All).await }
    });
    let b = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.sync(&SyncScope::All).await }
    });
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(backend.calls(), 1);
}

// ── Retry policy ──────────────────────────────────────────────────

#[test]
fn backoff_doubles_and_caps() {
    let policy = RetryPolicy {
        max_attempts: 6,
        base_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(3),
    };
    assert_eq!(policy.delay_before(1), Duration::ZERO);
    assert_eq!(policy.delay_before(2), Duration::from_millis(500));
    assert_eq!(policy.delay_before(3), Duration::from_millis(1000));
    assert_eq!(policy.delay_before(4), Duration::from_millis(2000));
    assert_eq!(policy.delay_before(5), Duration::from_secs(3));
    assert_eq!(policy.delay_before(40), Duration::from_secs(3));
}

#[test]
fn retry_policy_defaults() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.base_delay, Duration::from_millis(500));
    assert_eq!(policy.max_delay, Duration::from_secs(30));
}

#[test]
fn only_transport_failures_are_retryable() {
    assert!(SyncError::Network("reset".into()).is_retryable());
    assert!(SyncError::Backend("502".into()).is_retryable());
    assert!(SyncError::Timeout.is_retryable());
    assert!(!SyncError::Config("no token".into()).is_retryable());
    assert!(!SyncError::ChannelClosed.is_retryable());
}
