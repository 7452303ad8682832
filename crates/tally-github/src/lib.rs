use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

mod client;
mod memory;
mod retry;

pub use client::{DEFAULT_API_BASE, GitHubClient, RELEASES_PAGE_SIZE, USER_AGENT};
pub use memory::{MemoryStore, WriteRecord};
pub use retry::{
    RETRYABLE_STATUSES, RetryPolicy, RetrySignals, is_retryable_status, is_write_conflict,
};

/// Owner and name of the repository a store operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryMeta {
    pub default_branch: String,
    pub private: bool,
}

/// Opaque optimistic-concurrency token for a stored file (a blob sha on GitHub).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content: String,
    pub version: VersionToken,
}

#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub path: &'a str,
    pub branch: &'a str,
    pub content: &'a str,
    pub message: &'a str,
    /// Token from the most recent read of this path, `None` when creating the file.
    pub expected_version: Option<&'a VersionToken>,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("write to '{path}' was rejected as a conflict ({status}): {message}")]
    Conflict {
        path: String,
        status: u16,
        message: String,
    },
    #[error("GitHub API {method} {path} failed ({status}): {message}")]
    Status {
        method: String,
        path: String,
        status: u16,
        message: String,
    },
    #[error("GitHub API {method} {path} timed out after {timeout_ms}ms")]
    Timeout {
        method: String,
        path: String,
        timeout_ms: u128,
    },
    #[error("GitHub API {method} {path} request failed: {source}")]
    Transport {
        method: String,
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid API base URL '{0}'")]
    InvalidBaseUrl(String),
    #[error("response decoding failed for {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("file content at '{path}' is not valid base64: {source}")]
    Base64 {
        path: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("unexpected GitHub API response: {0}")]
    UnexpectedResponse(String),
    #[error("release pagination exceeded safety limit ({0} pages)")]
    PaginationLimit(u32),
    #[error("could not resolve SHA for branch '{fallback}' while creating '{branch}'")]
    MissingSourceSha { branch: String, fallback: String },
    #[error("expected file at '{path}' on branch '{branch}', but a directory was found")]
    Directory { path: String, branch: String },
    #[error("expected file at '{path}' on branch '{branch}', got type '{kind}'")]
    NotAFile {
        path: String,
        branch: String,
        kind: String,
    },
    #[error("failed to lock shared resource: {0}")]
    LockPoisoned(String),
}

impl RemoteError {
    /// Whether a conditional write lost a race and the caller should re-read and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Conflict { status, .. } | Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Versioned file storage plus the repository lookups a publish run needs.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_repository_meta(&self, repo: &RepoRef) -> Result<RepositoryMeta, RemoteError>;

    /// Creates `branch` from `fallback_branch` when missing. Returns whether it was created.
    async fn ensure_branch_exists(
        &self,
        repo: &RepoRef,
        branch: &str,
        fallback_branch: &str,
    ) -> Result<bool, RemoteError>;

    /// Sum of every release asset's download counter.
    async fn fetch_aggregate_total(&self, repo: &RepoRef) -> Result<u64, RemoteError>;

    async fn read_file(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: &str,
    ) -> Result<Option<RemoteFile>, RemoteError>;

    async fn write_file(
        &self,
        repo: &RepoRef,
        request: WriteRequest<'_>,
    ) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_report_is_conflict() {
        let conflict = RemoteError::Conflict {
            path: "gh-dl/downloads.json".to_owned(),
            status: 409,
            message: "sha mismatch".to_owned(),
        };
        assert!(conflict.is_conflict());
        assert_eq!(conflict.status(), Some(409));

        let status = RemoteError::Status {
            method: "GET".to_owned(),
            path: "/repos/x/y".to_owned(),
            status: 503,
            message: "unavailable".to_owned(),
        };
        assert!(!status.is_conflict());
        assert_eq!(
            status.to_string(),
            "GitHub API GET /repos/x/y failed (503): unavailable"
        );
        assert_eq!(RemoteError::PaginationLimit(1000).status(), None);
    }

    #[test]
    fn repo_ref_displays_as_slug() {
        assert_eq!(RepoRef::new("octo", "widgets").to_string(), "octo/widgets");
    }
}
