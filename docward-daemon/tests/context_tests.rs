use docward_daemon::{AppContext, Config};
use docward_types::{EntityCode, EntryKey, SyncStatus};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;

const TAX_ID: &str = "0101234567";

fn declaration(amount: u32) -> String {
    format!(
        "<HSoThueDTu><TTinChung><MST>{TAX_ID}</MST><TenNNT>CÔNG TY TNHH ACME</TenNNT></TTinChung>\
         <CTieuTKhai><ct21>{amount}</ct21></CTieuTKhai></HSoThueDTu>"
    )
}

struct Layout {
    _dir: TempDir,
    watch: PathBuf,
    templates: PathBuf,
    mirror: PathBuf,
    config: Config,
}

fn layout(registration: &str) -> Layout {
    let dir = TempDir::new().unwrap();
    let watch = dir.path().join("watch");
    let templates = dir.path().join("templates");
    let mirror = dir.path().join("mirror");
    std::fs::create_dir_all(&watch).unwrap();
    std::fs::create_dir_all(&templates).unwrap();

    let toml = format!(
        r#"
[warehouse]
database = '{db}'
templates_dir = '{templates}'

[guard]
registration = "{registration}"
roots = ['{watch}']
poll_interval_ms = 50
retry_delay_ms = 10

[sync]
interval_secs = 3600
base_delay_ms = 10

[[sync.backends]]
kind = "directory"
name = "mirror"
path = '{mirror}'
"#,
        db = dir.path().join("state").join("docward.db").display(),
        templates = templates.display(),
        watch = watch.display(),
        mirror = mirror.display(),
    );
    let config = Config::from_toml(&toml).unwrap();
    Layout {
        _dir: dir,
        watch,
        templates,
        mirror,
        config,
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn auto_registered_document_is_mirrored() {
    let layout = layout("auto");
    let context = AppContext::open(layout.config.clone()).unwrap();
    let warehouse = Arc::clone(&context.warehouse);

    let (stop, stopped) = oneshot::channel::<()>();
    let daemon = tokio::spawn(context.run(async move {
        let _ = stopped.await;
    }));

    std::fs::write(layout.watch.join("etax_q1.xml"), declaration(100)).unwrap();

    let mirrored = layout.mirror.join(TAX_ID).join("etax_q1.xml");
    assert!(wait_for(|| mirrored.exists()).await, "document never mirrored");
    assert_eq!(read(&mirrored), declaration(100));

    let key = EntryKey::new(EntityCode::parse(TAX_ID).unwrap(), "etax_q1.xml");
    assert!(
        wait_for(|| warehouse.get(&key).is_some_and(|e| e.sync_status == SyncStatus::Synced))
            .await
    );

    stop.send(()).unwrap();
    daemon.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn templates_are_loaded_and_restored_over_edits() {
    let layout = layout("operator");
    std::fs::write(layout.templates.join("etax_q2.xml"), declaration(500)).unwrap();

    let context = AppContext::open(layout.config.clone()).unwrap();
    let warehouse = Arc::clone(&context.warehouse);
    let (stop, stopped) = oneshot::channel::<()>();
    let daemon = tokio::spawn(context.run(async move {
        let _ = stopped.await;
    }));

    assert!(wait_for(|| warehouse.mirror().len() == 1).await, "template not loaded");

    let target = layout.watch.join("etax_q2.xml");
    std::fs::write(&target, declaration(999_999)).unwrap();

    assert!(
        wait_for(|| read(&target) == declaration(500)).await,
        "edited document was not restored"
    );

    stop.send(()).unwrap();
    daemon.await.unwrap().unwrap();

    let events = warehouse.audit().recent_protection_events(10, 0).unwrap();
    assert!(events.iter().any(|e| e.target_path == target));
}

#[tokio::test]
async fn run_requires_roots() {
    let dir = TempDir::new().unwrap();
    let toml = format!(
        "[warehouse]\ndatabase = '{}'\n[guard]\nregistration = \"auto\"\n",
        dir.path().join("docward.db").display()
    );
    let context = AppContext::open(Config::from_toml(&toml).unwrap()).unwrap();

    let err = context.run(std::future::pending::<()>()).await.unwrap_err();
    assert!(err.to_string().contains("roots"));
}

#[test]
fn open_creates_database_directory() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("nested").join("state").join("docward.db");
    let toml = format!(
        "[warehouse]\ndatabase = '{}'\n[guard]\nregistration = \"auto\"\n",
        db.display()
    );

    let context = AppContext::open(Config::from_toml(&toml).unwrap()).unwrap();

    assert!(db.exists());
    assert!(context.warehouse.mirror().is_empty());
}
