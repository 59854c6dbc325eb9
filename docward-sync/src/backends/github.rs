//! GitHub repository backend.
//!
//! Uses the contents API: `GET` the current blob sha (if any), then `PUT`
//! the new content base64-encoded.

use crate::backend::RemoteBackend;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

fn default_branch() -> String {
    "main".to_string()
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Folder inside the repository. Empty means the repository root.
    #[serde(default)]
    pub path_prefix: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Base URL for the GitHub API (e.g. `https://api.github.com`).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            branch: default_branch(),
            path_prefix: String::new(),
            token: None,
            api_base_url: default_api_base_url(),
        }
    }
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("path_prefix", &self.path_prefix)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutContents<'a> {
    message: String,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

pub struct GitHubBackend {
    name: String,
    config: GitHubConfig,
    client: Client,
}

impl GitHubBackend {
    pub fn new(name: impl Into<String>, config: GitHubConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("docward/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            name: name.into(),
            config,
            client,
        })
    }

    fn repo_path(&self, locator_hint: &str) -> String {
        let prefix = self.config.path_prefix.trim_matches('/');
        if prefix.is_empty() {
            locator_hint.to_string()
        } else {
            format!("{prefix}/{locator_hint}")
        }
    }

    fn contents_url(&self, repo_path: &str) -> String {
        let path = repo_path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_base_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.owner),
            urlencoding::encode(&self.config.repo),
            path
        )
    }

    fn token(&self) -> SyncResult<&str> {
        self.config
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SyncError::Config(format!("{}: no GitHub token configured", self.name)))
    }

    async fn existing_sha(&self, url: &str, token: &str) -> SyncResult<Option<String>> {
        let response = self
            .client
            .get(url)
            .query(&[("ref", self.config.branch.as_str())])
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("lookup failed: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let existing: ContentsResponse = response
                    .json()
                    .await
                    .map_err(|e| SyncError::Backend(format!("parse lookup response failed: {e}")))?;
                Ok(Some(existing.sha))
            }
            status => Err(status_error("lookup", status, response.text().await.unwrap_or_default())),
        }
    }
}

fn status_error(action: &str, status: StatusCode, body: String) -> SyncError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SyncError::Config(format!("{action} rejected ({status}): {body}"))
        }
        _ => SyncError::Backend(format!("{action} failed ({status}): {body}")),
    }
}

#[async_trait]
impl RemoteBackend for GitHubBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_config(&self) -> SyncResult<()> {
        if self.config.owner.is_empty() || self.config.repo.is_empty() {
            return Err(SyncError::Config(format!(
                "{}: GitHub owner and repository are required",
                self.name
            )));
        }
        self.token().map(|_| ())
    }

    async fn upload(&self, locator_hint: &str, content: &[u8]) -> SyncResult<String> {
        let token = self.token()?;
        let repo_path = self.repo_path(locator_hint);
        let url = self.contents_url(&repo_path);

        let sha = self.existing_sha(&url, token).await?;
        debug!(path = %repo_path, update = sha.is_some(), "uploading to GitHub");

        let body = PutContents {
            message: format!("docward: update {locator_hint}"),
            content: STANDARD.encode(content),
            branch: &self.config.branch,
            sha,
        };
        let response = self
            .client
            .put(&url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("upload failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("upload", status, response.text().await.unwrap_or_default()));
        }

        Ok(format!(
            "github:{}/{}/{}",
            self.config.owner, self.config.repo, repo_path
        ))
    }
}
