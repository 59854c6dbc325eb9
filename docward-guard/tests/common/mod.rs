#![allow(dead_code)]

use docward_guard::{ProtectionLoop, ProtectionPolicy, RegistrationHook, RegistrationPolicy};
use docward_types::{EntityCode, EntryKey, NewEntry, Notifier, WarehouseEntry};
use docward_warehouse::{PutMode, Warehouse};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const TAX_ID: &str = "0101234567";

pub fn code(s: &str) -> EntityCode {
    EntityCode::parse(s).unwrap()
}

/// A tax declaration with an identifier tag, a company name and an amount.
pub fn declaration(id: &str, amount: u32) -> String {
    format!(
        "<HSoThueDTu><TTinChung><MST>{id}</MST><TenNNT>CÔNG TY TNHH ACME</TenNNT></TTinChung>\
         <CTieuTKhai><ct21>{amount}</ct21></CTieuTKhai></HSoThueDTu>"
    )
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

#[derive(Default)]
pub struct RecordingHook {
    pub registered: Mutex<Vec<EntryKey>>,
}

impl RegistrationHook for RecordingHook {
    fn on_registered(&self, entry: &WarehouseEntry) {
        self.registered.lock().unwrap().push(entry.key());
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub warehouse: Arc<Warehouse>,
    pub notifier: Arc<RecordingNotifier>,
    pub hook: Arc<RecordingHook>,
    pub guard: Arc<ProtectionLoop>,
}

impl Fixture {
    pub fn new(registration: RegistrationPolicy) -> Self {
        let mut policy = ProtectionPolicy::new(registration);
        policy.retry_delay = Duration::from_millis(10);
        Self::with_policy(policy)
    }

    pub fn with_policy(policy: ProtectionPolicy) -> Self {
        let warehouse = Arc::new(Warehouse::open_in_memory().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let hook = Arc::new(RecordingHook::default());
        let guard = ProtectionLoop::new(Arc::clone(&warehouse), policy)
            .with_notifier(notifier.clone())
            .with_registration_hook(hook.clone());
        Self {
            dir: TempDir::new().unwrap(),
            warehouse,
            notifier,
            hook,
            guard: Arc::new(guard),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn store(&self, id: &str, filename: &str, content: &str) {
        self.warehouse
            .put(
                NewEntry::new(code(id), filename, "CÔNG TY TNHH ACME", content.as_bytes().to_vec()),
                PutMode::Upsert,
            )
            .unwrap();
    }
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
