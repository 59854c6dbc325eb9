//! Process-wide wiring: one warehouse, one sync engine, one alert channel.

use crate::config::Config;
use crate::notify::WebhookNotifier;
use anyhow::{Context as _, Result, bail};
use docward_guard::{PollingWatcher, ProtectionLoop, RegistrationHook};
use docward_sync::{SyncEngine, SyncRequester, SyncScheduler};
use docward_types::{LogNotifier, Notifier, SyncScope, WarehouseEntry};
use docward_warehouse::{PutMode, Warehouse};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Requests a sync of the entity whose document was just registered.
pub struct SyncOnRegister {
    requester: SyncRequester,
}

impl SyncOnRegister {
    pub fn new(requester: SyncRequester) -> Self {
        Self { requester }
    }
}

impl RegistrationHook for SyncOnRegister {
    fn on_registered(&self, entry: &WarehouseEntry) {
        let scope = SyncScope::ByEntity(entry.entity_id.clone());
        if let Err(e) = self.requester.request(scope) {
            debug!(entity = %entry.entity_id, "sync request not delivered: {e}");
        }
    }
}

pub struct AppContext {
    pub config: Config,
    pub warehouse: Arc<Warehouse>,
    pub notifier: Arc<dyn Notifier>,
    pub engine: Arc<SyncEngine>,
}

impl AppContext {
    /// Opens the warehouse and builds the sync engine.
    pub fn open(config: Config) -> Result<Self> {
        if let Some(parent) = config.warehouse.database.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let warehouse = Warehouse::open(&config.warehouse.database).with_context(|| {
            format!("failed to open warehouse {}", config.warehouse.database.display())
        })?;
        let warehouse = Arc::new(warehouse);

        let notifier: Arc<dyn Notifier> = match &config.notify.webhook_url {
            Some(url) => Arc::new(
                WebhookNotifier::new(url.as_str()).context("failed to create webhook client")?,
            ),
            None => Arc::new(LogNotifier),
        };

        let backends = config
            .sync
            .backends
            .iter()
            .map(|backend| {
                backend
                    .build()
                    .with_context(|| format!("failed to set up backend {}", backend.name()))
            })
            .collect::<Result<Vec<_>>>()?;
        let engine = SyncEngine::new(Arc::clone(&warehouse), backends)
            .with_retry_policy(config.sync.retry_policy())
            .with_call_timeout(config.sync.call_timeout())
            .with_notifier(Arc::clone(&notifier));

        Ok(Self {
            config,
            warehouse,
            notifier,
            engine: Arc::new(engine),
        })
    }

    /// A protection loop over this context's warehouse.
    #[must_use]
    pub fn protection_loop(&self, hook: Option<Arc<dyn RegistrationHook>>) -> ProtectionLoop {
        let guard = ProtectionLoop::new(Arc::clone(&self.warehouse), self.config.guard.policy())
            .with_notifier(Arc::clone(&self.notifier));
        match hook {
            Some(hook) => guard.with_registration_hook(hook),
            None => guard,
        }
    }

    /// Runs the daemon until `shutdown` resolves, then stops the watcher,
    /// drains the protection workers and stops the scheduler, in that order.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let roots = self.config.guard.roots.clone();
        if roots.is_empty() {
            bail!("guard.roots is empty, nothing to protect");
        }
        for root in &roots {
            if !root.is_dir() {
                warn!(root = %root.display(), "watched root is not a directory");
            }
        }

        let scheduler = SyncScheduler::start(Arc::clone(&self.engine), self.config.sync.schedule());
        let hook: Arc<dyn RegistrationHook> = Arc::new(SyncOnRegister::new(scheduler.requester()));
        let guard = Arc::new(self.protection_loop(Some(hook)));

        if let Some(dir) = &self.config.warehouse.templates_dir {
            let report = guard
                .register_dir(dir, PutMode::InsertOnly)
                .await
                .with_context(|| format!("failed to load templates from {}", dir.display()))?;
            info!(
                loaded = report.registered.len(),
                skipped = report.skipped.len(),
                "templates loaded"
            );
        }

        let handle = Arc::clone(&guard).spawn();
        let watcher = PollingWatcher::new(
            roots,
            self.config.guard.poll_interval(),
            self.config.guard.filter(),
        )
        .spawn(handle.sink());
        info!(
            entries = self.warehouse.mirror().len(),
            backends = self.engine.backend_names().len(),
            "docward running"
        );

        shutdown.await;
        info!("shutting down");

        watcher.stop().await;
        handle.shutdown().await;
        scheduler.shutdown().await;
        Ok(())
    }
}
