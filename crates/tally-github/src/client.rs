use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_core::Secret;
use tracing::{debug, warn};

use crate::retry::{RetryPolicy, RetrySignals, is_retryable_status, is_write_conflict};
use crate::{
    RemoteError, RemoteFile, RemoteStore, RepoRef, RepositoryMeta, VersionToken, WriteRequest,
};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const USER_AGENT: &str = concat!("tally/", env!("CARGO_PKG_VERSION"));
pub const RELEASES_PAGE_SIZE: usize = 100;
const MAX_RELEASE_PAGES: u32 = 1_000;
const API_VERSION: &str = "2022-11-28";

/// GitHub REST implementation of [`RemoteStore`].
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_base: Url,
    token: Secret,
    policy: RetryPolicy,
}

#[derive(Debug, Clone, Copy)]
enum NotFound {
    Fail,
    Absent,
}

impl GitHubClient {
    pub fn new(token: Secret) -> Result<Self, RemoteError> {
        Self::with_api_base(token, DEFAULT_API_BASE, RetryPolicy::default())
    }

    pub fn with_api_base(
        token: Secret,
        api_base: &str,
        policy: RetryPolicy,
    ) -> Result<Self, RemoteError> {
        let api_base = Url::parse(api_base.trim_end_matches('/'))
            .map_err(|_| RemoteError::InvalidBaseUrl(api_base.to_owned()))?;
        if api_base.cannot_be_a_base() {
            return Err(RemoteError::InvalidBaseUrl(api_base.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(policy.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(RemoteError::Client)?;

        Ok(Self {
            client,
            api_base,
            token,
            policy,
        })
    }

    fn repo_url(&self, repo: &RepoRef, tail: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidBaseUrl(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(["repos", repo.owner.as_str(), repo.repo.as_str()])
            .extend(tail);
        Ok(url)
    }

    fn contents_url(&self, repo: &RepoRef, path: &str) -> Result<Url, RemoteError> {
        let mut tail = vec!["contents"];
        tail.extend(path.split('/').filter(|segment| !segment.is_empty()));
        self.repo_url(repo, &tail)
    }

    async fn request(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        not_found: NotFound,
    ) -> Result<Option<String>, RemoteError> {
        let path = url.path().to_owned();
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let mut builder = self
                .client
                .request(method.clone(), url.clone())
                .bearer_auth(self.token.expose())
                .header(reqwest::header::ACCEPT, "application/vnd.github+json")
                .header("X-GitHub-Api-Version", API_VERSION);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(err) if attempt < max_attempts => {
                    let wait = self.policy.backoff_delay(
                        attempt,
                        None,
                        Utc::now(),
                        self.policy.sample_jitter(),
                    );
                    warn!(
                        method = %method,
                        path = %path,
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "GitHub request failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Err(err) if err.is_timeout() => {
                    return Err(RemoteError::Timeout {
                        method: method.to_string(),
                        path,
                        timeout_ms: self.policy.request_timeout.as_millis(),
                    });
                }
                Err(source) => {
                    return Err(RemoteError::Transport {
                        method: method.to_string(),
                        path,
                        source,
                    });
                }
            };

            let status = response.status();
            if status == StatusCode::NOT_FOUND && matches!(not_found, NotFound::Absent) {
                return Ok(None);
            }
            if status.is_success() {
                if status == StatusCode::NO_CONTENT {
                    return Ok(None);
                }
                let text = response.text().await.map_err(|source| RemoteError::Transport {
                    method: method.to_string(),
                    path: path.clone(),
                    source,
                })?;
                return Ok(Some(text));
            }

            let signals = RetrySignals::from_headers(response.headers());
            let raw = response.text().await.unwrap_or_default();
            let message = error_detail(&raw);

            if method == Method::PUT && is_write_conflict(status.as_u16(), &message) {
                return Err(RemoteError::Conflict {
                    path,
                    status: status.as_u16(),
                    message,
                });
            }

            let now = Utc::now();
            let retryable = is_retryable_status(status.as_u16())
                || signals.hinted_wait(&self.policy, now).is_some();
            if retryable && attempt < max_attempts {
                let wait = self.policy.backoff_delay(
                    attempt,
                    Some(&signals),
                    now,
                    self.policy.sample_jitter(),
                );
                warn!(
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    attempt,
                    max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    "GitHub API returned a transient error, retrying"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            return Err(RemoteError::Status {
                method: method.to_string(),
                path,
                status: status.as_u16(),
                message,
            });
        }

        Err(RemoteError::UnexpectedResponse(format!(
            "{method} {path} failed after retries"
        )))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: Url,
        not_found: NotFound,
    ) -> Result<Option<T>, RemoteError> {
        let path = url.path().to_owned();
        let Some(text) = self.request(Method::GET, url, None, not_found).await? else {
            return Ok(None);
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| RemoteError::Json { path, source })
    }

    async fn get_ref(
        &self,
        repo: &RepoRef,
        branch: &str,
        not_found: NotFound,
    ) -> Result<Option<RefResponse>, RemoteError> {
        let url = self.repo_url(repo, &["git", "ref", "heads", branch])?;
        self.get_json(url, not_found).await
    }
}

#[async_trait]
impl RemoteStore for GitHubClient {
    async fn fetch_repository_meta(&self, repo: &RepoRef) -> Result<RepositoryMeta, RemoteError> {
        let url = self.repo_url(repo, &[])?;
        let response: RepositoryResponse = self
            .get_json(url, NotFound::Fail)
            .await?
            .ok_or_else(|| RemoteError::UnexpectedResponse("empty repository response".to_owned()))?;

        Ok(RepositoryMeta {
            default_branch: response.default_branch,
            private: response.private,
        })
    }

    async fn ensure_branch_exists(
        &self,
        repo: &RepoRef,
        branch: &str,
        fallback_branch: &str,
    ) -> Result<bool, RemoteError> {
        if self.get_ref(repo, branch, NotFound::Absent).await?.is_some() {
            return Ok(false);
        }

        let source_sha = self
            .get_ref(repo, fallback_branch, NotFound::Fail)
            .await?
            .and_then(|reference| reference.object)
            .and_then(|object| object.sha)
            .filter(|sha| !sha.is_empty())
            .ok_or_else(|| RemoteError::MissingSourceSha {
                branch: branch.to_owned(),
                fallback: fallback_branch.to_owned(),
            })?;

        let body = serde_json::to_value(CreateRefRequest {
            r#ref: format!("refs/heads/{branch}"),
            sha: source_sha,
        })
        .map_err(|source| RemoteError::Json {
            path: "git/refs".to_owned(),
            source,
        })?;
        let url = self.repo_url(repo, &["git", "refs"])?;
        self.request(Method::POST, url, Some(&body), NotFound::Fail)
            .await?;

        debug!(repository = %repo, branch, fallback_branch, "created output branch");
        Ok(true)
    }

    async fn fetch_aggregate_total(&self, repo: &RepoRef) -> Result<u64, RemoteError> {
        let mut total = 0u64;
        let mut page = 1u32;

        loop {
            let mut url = self.repo_url(repo, &["releases"])?;
            url.query_pairs_mut()
                .append_pair("per_page", &RELEASES_PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());

            let releases: Value = self
                .get_json(url, NotFound::Fail)
                .await?
                .unwrap_or(Value::Null);
            let Some(releases) = releases.as_array() else {
                return Err(RemoteError::UnexpectedResponse(
                    "releases list is not an array".to_owned(),
                ));
            };

            total = total.saturating_add(releases.iter().map(release_downloads).sum::<u64>());

            if releases.len() < RELEASES_PAGE_SIZE {
                break;
            }
            page += 1;
            if page > MAX_RELEASE_PAGES {
                return Err(RemoteError::PaginationLimit(MAX_RELEASE_PAGES));
            }
        }

        debug!(repository = %repo, total, pages = page, "fetched aggregate release downloads");
        Ok(total)
    }

    async fn read_file(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: &str,
    ) -> Result<Option<RemoteFile>, RemoteError> {
        let mut url = self.contents_url(repo, path)?;
        url.query_pairs_mut().append_pair("ref", branch);

        let Some(data) = self.get_json::<Value>(url, NotFound::Absent).await? else {
            return Ok(None);
        };
        if data.is_array() {
            return Err(RemoteError::Directory {
                path: path.to_owned(),
                branch: branch.to_owned(),
            });
        }

        let entry: ContentResponse =
            serde_json::from_value(data).map_err(|source| RemoteError::Json {
                path: path.to_owned(),
                source,
            })?;
        if entry.kind != "file" {
            return Err(RemoteError::NotAFile {
                path: path.to_owned(),
                branch: branch.to_owned(),
                kind: entry.kind,
            });
        }

        let content = match entry.content {
            Some(encoded) => decode_content(path, &encoded)?,
            None => String::new(),
        };
        Ok(Some(RemoteFile {
            content,
            version: VersionToken::from_raw(entry.sha),
        }))
    }

    async fn write_file(
        &self,
        repo: &RepoRef,
        request: WriteRequest<'_>,
    ) -> Result<(), RemoteError> {
        let body = serde_json::to_value(PutContentRequest {
            message: request.message,
            branch: request.branch,
            content: STANDARD.encode(request.content.as_bytes()),
            sha: request.expected_version.map(VersionToken::as_str),
        })
        .map_err(|source| RemoteError::Json {
            path: request.path.to_owned(),
            source,
        })?;

        let url = self.contents_url(repo, request.path)?;
        self.request(Method::PUT, url, Some(&body), NotFound::Fail)
            .await
            .map_err(|err| match err {
                RemoteError::Conflict {
                    status, message, ..
                } => RemoteError::Conflict {
                    path: request.path.to_owned(),
                    status,
                    message,
                },
                other => other,
            })?;
        Ok(())
    }
}

fn release_downloads(release: &Value) -> u64 {
    release
        .get("assets")
        .and_then(Value::as_array)
        .map(|assets| {
            assets
                .iter()
                .filter_map(|asset| asset.get("download_count").and_then(download_count))
                .sum()
        })
        .unwrap_or(0)
}

/// Integer counts are taken as-is; fractional ones are floored and anything
/// negative or non-numeric counts as nothing.
fn download_count(value: &Value) -> Option<u64> {
    if let Some(count) = value.as_u64() {
        return Some(count);
    }
    let count = value.as_f64()?;
    if !count.is_finite() || count <= 0.0 {
        return None;
    }
    Some(count.floor() as u64)
}

fn decode_content(path: &str, encoded: &str) -> Result<String, RemoteError> {
    let compact: String = encoded.chars().filter(|ch| !ch.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|source| RemoteError::Base64 {
            path: path.to_owned(),
            source,
        })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// The server's `message` field, else the raw body, else a placeholder.
fn error_detail(raw: &str) -> String {
    let message = serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|parsed| parsed.get("message").and_then(Value::as_str).map(str::to_owned));
    if let Some(message) = message {
        return message;
    }
    if raw.trim().is_empty() {
        "unknown error".to_owned()
    } else {
        raw.to_owned()
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryResponse {
    default_branch: String,
    #[serde(default)]
    private: bool,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    #[serde(default)]
    object: Option<RefObject>,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    #[serde(default)]
    sha: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateRefRequest {
    r#ref: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutContentRequest<'a> {
    message: &'a str,
    branch: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn release_downloads_skip_invalid_counters() {
        let release = json!({
            "assets": [
                {"download_count": 10},
                {"download_count": 2.9},
                {"download_count": -4},
                {"download_count": "7"},
                {}
            ]
        });
        assert_eq!(release_downloads(&release), 12);
        assert_eq!(release_downloads(&json!({"assets": null})), 0);
        assert_eq!(release_downloads(&json!({})), 0);
    }

    #[test]
    fn content_decoding_ignores_embedded_newlines() {
        let encoded = "eyJvd25lciI6\nIngifQ==\n";
        assert_eq!(
            decode_content("a.json", encoded).expect("decode"),
            r#"{"owner":"x"}"#
        );
        assert!(matches!(
            decode_content("a.json", "***"),
            Err(RemoteError::Base64 { .. })
        ));
    }

    #[test]
    fn error_detail_prefers_message_field() {
        assert_eq!(error_detail(r#"{"message":"Bad credentials"}"#), "Bad credentials");
        assert_eq!(error_detail("upstream exploded"), "upstream exploded");
        assert_eq!(error_detail(""), "unknown error");
    }

    #[test]
    fn urls_percent_encode_each_segment() {
        let client = GitHubClient::with_api_base(
            Secret::new("token"),
            "https://api.example.test/",
            RetryPolicy::default(),
        )
        .expect("client");
        let repo = RepoRef::new("octo", "widgets");

        let url = client
            .contents_url(&repo, "gh-dl/my file#1.json")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://api.example.test/repos/octo/widgets/contents/gh-dl/my%20file%231.json"
        );

        let reference = client
            .repo_url(&repo, &["git", "ref", "heads", "stats/daily"])
            .expect("url");
        assert_eq!(
            reference.as_str(),
            "https://api.example.test/repos/octo/widgets/git/ref/heads/stats%2Fdaily"
        );
    }

    #[test]
    fn invalid_api_base_is_rejected() {
        assert!(matches!(
            GitHubClient::with_api_base(Secret::new("t"), "not a url", RetryPolicy::default()),
            Err(RemoteError::InvalidBaseUrl(_))
        ));
    }
}
