use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    RemoteError, RemoteFile, RemoteStore, RepoRef, RepositoryMeta, VersionToken, WriteRequest,
};

/// A write accepted or rejected by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub path: String,
    pub branch: String,
    pub content: String,
    pub message: String,
    pub expected_version: Option<VersionToken>,
    pub accepted: bool,
}

#[derive(Debug, Clone)]
struct StoredFile {
    content: String,
    version: u64,
}

impl StoredFile {
    fn token(&self) -> VersionToken {
        VersionToken::from_raw(format!("v{}", self.version))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    branches: BTreeSet<String>,
    files: BTreeMap<(String, String), StoredFile>,
    next_version: u64,
    pending_conflicts: HashMap<String, u32>,
    aggregate_calls: u32,
    reads: Vec<(String, Option<VersionToken>)>,
    writes: Vec<WriteRecord>,
}

impl MemoryState {
    fn bump_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }
}

/// In-process [`RemoteStore`] with real version-token checks.
///
/// Conflicts can be injected per path: the next writes to that path behave as
/// if another writer committed first, so the stored token moves on and the
/// write is rejected.
#[derive(Debug)]
pub struct MemoryStore {
    meta: RepositoryMeta,
    aggregate_total: u64,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new(meta: RepositoryMeta, aggregate_total: u64) -> Self {
        let mut state = MemoryState::default();
        state.branches.insert(meta.default_branch.clone());
        Self {
            meta,
            aggregate_total,
            state: Mutex::new(state),
        }
    }

    pub fn public(aggregate_total: u64) -> Self {
        Self::new(
            RepositoryMeta {
                default_branch: "main".to_owned(),
                private: false,
            },
            aggregate_total,
        )
    }

    /// Seeds a file, creating its branch. Returns the stored token.
    pub fn put_file(
        &self,
        path: &str,
        branch: &str,
        content: &str,
    ) -> Result<VersionToken, RemoteError> {
        let mut state = self.lock()?;
        let version = state.bump_version();
        state.branches.insert(branch.to_owned());
        let file = StoredFile {
            content: content.to_owned(),
            version,
        };
        let token = file.token();
        state
            .files
            .insert((branch.to_owned(), path.to_owned()), file);
        Ok(token)
    }

    /// Rejects the next `count` writes to `path` as lost races.
    pub fn inject_conflicts(&self, path: &str, count: u32) -> Result<(), RemoteError> {
        self.lock()?
            .pending_conflicts
            .insert(path.to_owned(), count);
        Ok(())
    }

    pub fn file_content(&self, path: &str, branch: &str) -> Result<Option<String>, RemoteError> {
        Ok(self
            .lock()?
            .files
            .get(&(branch.to_owned(), path.to_owned()))
            .map(|file| file.content.clone()))
    }

    pub fn has_branch(&self, branch: &str) -> Result<bool, RemoteError> {
        Ok(self.lock()?.branches.contains(branch))
    }

    pub fn aggregate_calls(&self) -> Result<u32, RemoteError> {
        Ok(self.lock()?.aggregate_calls)
    }

    /// Every read as `(path, token returned)`, in call order.
    pub fn reads(&self) -> Result<Vec<(String, Option<VersionToken>)>, RemoteError> {
        Ok(self.lock()?.reads.clone())
    }

    pub fn writes(&self) -> Result<Vec<WriteRecord>, RemoteError> {
        Ok(self.lock()?.writes.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, RemoteError> {
        self.state
            .lock()
            .map_err(|err| RemoteError::LockPoisoned(err.to_string()))
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn fetch_repository_meta(&self, _repo: &RepoRef) -> Result<RepositoryMeta, RemoteError> {
        Ok(self.meta.clone())
    }

    async fn ensure_branch_exists(
        &self,
        _repo: &RepoRef,
        branch: &str,
        fallback_branch: &str,
    ) -> Result<bool, RemoteError> {
        let mut state = self.lock()?;
        if state.branches.contains(branch) {
            return Ok(false);
        }
        if !state.branches.contains(fallback_branch) {
            return Err(RemoteError::MissingSourceSha {
                branch: branch.to_owned(),
                fallback: fallback_branch.to_owned(),
            });
        }

        let copied = state
            .files
            .iter()
            .filter(|((file_branch, _), _)| file_branch == fallback_branch)
            .map(|((_, path), file)| ((branch.to_owned(), path.clone()), file.clone()))
            .collect::<Vec<_>>();
        state.files.extend(copied);
        state.branches.insert(branch.to_owned());
        Ok(true)
    }

    async fn fetch_aggregate_total(&self, _repo: &RepoRef) -> Result<u64, RemoteError> {
        self.lock()?.aggregate_calls += 1;
        Ok(self.aggregate_total)
    }

    async fn read_file(
        &self,
        _repo: &RepoRef,
        path: &str,
        branch: &str,
    ) -> Result<Option<RemoteFile>, RemoteError> {
        let mut state = self.lock()?;
        let file = state
            .files
            .get(&(branch.to_owned(), path.to_owned()))
            .map(|file| RemoteFile {
                content: file.content.clone(),
                version: file.token(),
            });
        state.reads.push((
            path.to_owned(),
            file.as_ref().map(|file| file.version.clone()),
        ));
        Ok(file)
    }

    async fn write_file(
        &self,
        _repo: &RepoRef,
        request: WriteRequest<'_>,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock()?;
        let key = (request.branch.to_owned(), request.path.to_owned());
        let mut record = WriteRecord {
            path: request.path.to_owned(),
            branch: request.branch.to_owned(),
            content: request.content.to_owned(),
            message: request.message.to_owned(),
            expected_version: request.expected_version.cloned(),
            accepted: false,
        };

        let injected = match state.pending_conflicts.get_mut(request.path) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if injected {
            // Another writer lands first: same bytes, new version.
            let version = state.bump_version();
            let content = state
                .files
                .get(&key)
                .map(|file| file.content.clone())
                .unwrap_or_default();
            state
                .files
                .insert(key, StoredFile { content, version });
            state.writes.push(record);
            return Err(conflict(request.path, "injected concurrent write"));
        }

        let current = state.files.get(&key).map(StoredFile::token);
        if current.as_ref() != request.expected_version {
            state.writes.push(record);
            let message = match current {
                Some(token) => format!("{} does not match {token}", request.path),
                None => format!("{} does not exist", request.path),
            };
            return Err(conflict(request.path, &message));
        }

        let version = state.bump_version();
        state.files.insert(
            key,
            StoredFile {
                content: request.content.to_owned(),
                version,
            },
        );
        record.accepted = true;
        state.writes.push(record);
        Ok(())
    }
}

fn conflict(path: &str, message: &str) -> RemoteError {
    RemoteError::Conflict {
        path: path.to_owned(),
        status: 409,
        message: message.to_owned(),
    }
}
