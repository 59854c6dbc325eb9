#![allow(dead_code)]

use async_trait::async_trait;
use docward_sync::{RemoteBackend, SyncError, SyncResult};
use docward_types::{EntityCode, EntryKey, NewEntry, Notifier, WarehouseEntry};
use docward_warehouse::{PutMode, Warehouse};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn code(s: &str) -> EntityCode {
    EntityCode::parse(s).unwrap()
}

pub fn key(id: &str, filename: &str) -> EntryKey {
    EntryKey::new(code(id), filename)
}

pub fn seed(warehouse: &Warehouse, id: &str, filename: &str) -> WarehouseEntry {
    warehouse
        .put(
            NewEntry::new(code(id), filename, "ACME", format!("<doc><mst>{id}</mst></doc>")),
            PutMode::Upsert,
        )
        .unwrap()
        .entry
}

/// Backend whose behaviour is scripted per call number (1-based).
pub struct MockBackend {
    name: String,
    calls: AtomicUsize,
    failing_calls: HashSet<usize>,
    failure: fn() -> SyncError,
    config_error: Option<String>,
    delay: Option<Duration>,
    only_entity: Option<EntityCode>,
    pub uploads: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
            failing_calls: HashSet::new(),
            failure: || SyncError::Network("connection reset".into()),
            config_error: None,
            delay: None,
            only_entity: None,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, calls: &[usize]) -> Self {
        self.failing_calls = calls.iter().copied().collect();
        self
    }

    pub fn failing_with(mut self, failure: fn() -> SyncError) -> Self {
        self.failure = failure;
        self
    }

    pub fn misconfigured(mut self, reason: &str) -> Self {
        self.config_error = Some(reason.to_string());
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn only(mut self, entity: &str) -> Self {
        self.only_entity = Some(code(entity));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_config(&self) -> SyncResult<()> {
        match &self.config_error {
            Some(reason) => Err(SyncError::Config(reason.clone())),
            None => Ok(()),
        }
    }

    fn accepts(&self, entry: &WarehouseEntry) -> bool {
        self.only_entity.as_ref().is_none_or(|id| *id == entry.entity_id)
    }

    async fn upload(&self, locator_hint: &str, _content: &[u8]) -> SyncResult<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_calls.contains(&call) {
            return Err((self.failure)());
        }
        self.uploads.lock().unwrap().push(locator_hint.to_string());
        Ok(format!("mock://{}/{locator_hint}", self.name))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
