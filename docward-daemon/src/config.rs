//! `docward.toml` parsing.
//!
//! Every field has a default except `guard.registration`, which the operator
//! must choose.

use docward_fingerprint::{RESTORE_THRESHOLD, TEMPLATE_THRESHOLD};
use docward_guard::{FilenameFilter, ProtectionPolicy, RegistrationPolicy};
use docward_sync::{
    DirectoryBackend, GitHubBackend, GitHubConfig, RemoteBackend, RetryPolicy, SyncResult,
    SyncSchedule,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    pub guard: GuardConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("guard.restore_threshold", self.guard.restore_threshold),
            ("guard.template_threshold", self.guard.template_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be between 0 and 1")));
            }
        }
        if self.guard.max_concurrency == 0 {
            return Err(ConfigError::Invalid("guard.max_concurrency must be positive".into()));
        }
        if self.guard.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("guard.poll_interval_ms must be positive".into()));
        }
        if self.sync.interval_secs == 0 {
            return Err(ConfigError::Invalid("sync.interval_secs must be positive".into()));
        }
        let mut names: Vec<&str> = self.sync.backends.iter().map(BackendConfig::name).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ConfigError::Invalid(format!("duplicate backend name: {}", pair[0])));
        }
        Ok(())
    }
}

// ── [warehouse] ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Loaded insert-only at startup.
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
}

fn default_database() -> PathBuf {
    PathBuf::from("docward.db")
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            templates_dir: None,
        }
    }
}

// ── [guard] ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct GuardConfig {
    pub registration: RegistrationPolicy,
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_restore_threshold")]
    pub restore_threshold: f64,
    #[serde(default = "default_template_threshold")]
    pub template_threshold: f64,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_name_prefixes")]
    pub name_prefixes: Vec<String>,
    #[serde(default = "default_name_keywords")]
    pub name_keywords: Vec<String>,
    #[serde(default)]
    pub excluded_dirs: Vec<String>,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_scan_entries")]
    pub max_scan_entries: usize,
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: u64,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_concurrency() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_restore_threshold() -> f64 {
    RESTORE_THRESHOLD
}

fn default_template_threshold() -> f64 {
    TEMPLATE_THRESHOLD
}

fn default_extensions() -> Vec<String> {
    FilenameFilter::default().extensions
}

fn default_name_prefixes() -> Vec<String> {
    FilenameFilter::default().name_prefixes
}

fn default_name_keywords() -> Vec<String> {
    FilenameFilter::default().name_keywords
}

fn default_retry_delay_ms() -> u64 {
    250
}

fn default_max_scan_entries() -> usize {
    10_000
}

fn default_max_document_bytes() -> u64 {
    16 * 1024 * 1024
}

impl GuardConfig {
    #[must_use]
    pub fn policy(&self) -> ProtectionPolicy {
        ProtectionPolicy {
            filter: self.filter(),
            restore_threshold: self.restore_threshold,
            template_threshold: self.template_threshold,
            registration: self.registration,
            max_concurrency: self.max_concurrency,
            queue_capacity: self.queue_capacity,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_scan_entries: self.max_scan_entries,
            max_document_bytes: self.max_document_bytes,
        }
    }

    #[must_use]
    pub fn filter(&self) -> FilenameFilter {
        FilenameFilter {
            extensions: self.extensions.clone(),
            name_prefixes: self.name_prefixes.clone(),
            name_keywords: self.name_keywords.clone(),
            excluded_dirs: self.excluded_dirs.clone(),
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ── [sync] ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub requeue_failed: bool,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

fn default_true() -> bool {
    true
}

fn default_sync_interval_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_secs() -> u64 {
    30
}

fn default_call_timeout_secs() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sync_interval_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            call_timeout_secs: default_call_timeout_secs(),
            requeue_failed: true,
            backends: Vec::new(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }

    #[must_use]
    pub fn schedule(&self) -> SyncSchedule {
        SyncSchedule {
            enabled: self.enabled,
            interval: Duration::from_secs(self.interval_secs),
            requeue_failed: self.requeue_failed,
        }
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// One `[[sync.backends]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Directory {
        #[serde(default)]
        name: Option<String>,
        path: PathBuf,
    },
    Github {
        #[serde(default)]
        name: Option<String>,
        owner: String,
        repo: String,
        #[serde(default)]
        branch: Option<String>,
        #[serde(default)]
        path_prefix: String,
        /// Inline token. Takes precedence over `token_env`.
        #[serde(default)]
        token: Option<String>,
        /// Environment variable holding the token.
        #[serde(default)]
        token_env: Option<String>,
        #[serde(default)]
        api_base_url: Option<String>,
    },
}

impl BackendConfig {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Directory { name, .. } => name.as_deref().unwrap_or("directory"),
            Self::Github { name, .. } => name.as_deref().unwrap_or("github"),
        }
    }

    /// Builds the backend. A missing token is not an error here; it surfaces
    /// as a configuration failure on each sync run.
    pub fn build(&self) -> SyncResult<Arc<dyn RemoteBackend>> {
        Ok(match self {
            Self::Directory { path, .. } => {
                Arc::new(DirectoryBackend::new(self.name(), path.clone()))
            }
            Self::Github {
                owner,
                repo,
                branch,
                path_prefix,
                token,
                token_env,
                api_base_url,
                ..
            } => {
                let defaults = GitHubConfig::default();
                let config = GitHubConfig {
                    owner: owner.clone(),
                    repo: repo.clone(),
                    branch: branch.clone().unwrap_or(defaults.branch),
                    path_prefix: path_prefix.clone(),
                    token: token
                        .clone()
                        .or_else(|| token_env.as_deref().and_then(|var| std::env::var(var).ok())),
                    api_base_url: api_base_url.clone().unwrap_or(defaults.api_base_url),
                };
                Arc::new(GitHubBackend::new(self.name(), config)?)
            }
        })
    }
}

// ── [notify] ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    /// Receives `{"text": "..."}` posts.
    #[serde(default)]
    pub webhook_url: Option<String>,
}
