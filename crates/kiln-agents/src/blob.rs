//! Staging store for file-based input/output exchange

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use kiln_core::LiteralMap;

use crate::error::{AgentError, Result};

/// Scheme prefix accepted for local staging paths
const FILE_SCHEME: &str = "file://";

/// Capability for moving files between local disk and a shared location
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a local file to a remote path
    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Download a remote path to a local file
    async fn get(&self, remote_path: &str, local_path: &Path) -> Result<()>;

    /// Fresh remote directory no other execution uses
    fn random_remote_directory(&self) -> String;

    /// Fresh local file path for scratch use
    fn random_local_path(&self) -> PathBuf;
}

/// Blob store backed by a shared directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    /// Root that stands in for the remote side
    root: PathBuf,
    /// Scratch directory for local copies
    scratch: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, scratch: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scratch: scratch.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a remote path to a location on disk
    pub fn resolve(&self, remote_path: &str) -> PathBuf {
        PathBuf::from(remote_path.strip_prefix(FILE_SCHEME).unwrap_or(remote_path))
    }
}

async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AgentError::blob(parent, e))?;
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| AgentError::blob(from, e))?;
    Ok(())
}

#[async_trait::async_trait]
impl BlobStore for LocalBlobStore {
    #[instrument(skip(self))]
    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        copy_file(local_path, &self.resolve(remote_path)).await
    }

    #[instrument(skip(self))]
    async fn get(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        copy_file(&self.resolve(remote_path), local_path).await
    }

    fn random_remote_directory(&self) -> String {
        self.root
            .join(uuid::Uuid::new_v4().simple().to_string())
            .to_string_lossy()
            .to_string()
    }

    fn random_local_path(&self) -> PathBuf {
        self.scratch.join(uuid::Uuid::new_v4().simple().to_string())
    }
}

/// Serialize a literal map and upload it to `remote_path`
pub async fn write_literal_map(
    store: &dyn BlobStore,
    literals: &LiteralMap,
    remote_path: &str,
) -> Result<()> {
    let local = store.random_local_path();
    if let Some(parent) = local.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AgentError::blob(parent, e))?;
    }
    let bytes = serde_json::to_vec(literals)?;
    tokio::fs::write(&local, bytes)
        .await
        .map_err(|e| AgentError::blob(&local, e))?;

    debug!(remote = remote_path, count = literals.len(), "uploading literal map");
    let result = store.put(&local, remote_path).await;
    let _ = tokio::fs::remove_file(&local).await;
    result
}

/// Download `remote_path` and parse it as a literal map
pub async fn read_literal_map(store: &dyn BlobStore, remote_path: &str) -> Result<LiteralMap> {
    let bytes = read_bytes(store, remote_path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Download `remote_path` and return its raw contents
pub async fn read_bytes(store: &dyn BlobStore, remote_path: &str) -> Result<Vec<u8>> {
    let local = store.random_local_path();
    store.get(remote_path, &local).await?;
    let bytes = tokio::fs::read(&local)
        .await
        .map_err(|e| AgentError::blob(&local, e));
    let _ = tokio::fs::remove_file(&local).await;
    debug!(remote = remote_path, "downloaded staged file");
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> LocalBlobStore {
        LocalBlobStore::new(temp.path().join("remote"), temp.path().join("scratch"))
    }

    #[test]
    fn test_random_paths_are_unique() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let a = store.random_remote_directory();
        let b = store.random_remote_directory();
        assert_ne!(a, b);
        assert!(a.starts_with(&*store.root().to_string_lossy()));
        assert_ne!(store.random_local_path(), store.random_local_path());
    }

    #[test]
    fn test_resolve_strips_file_scheme() {
        let store = LocalBlobStore::new("/r", "/s");
        assert_eq!(store.resolve("file:///r/a/b"), PathBuf::from("/r/a/b"));
        assert_eq!(store.resolve("/r/a/b"), PathBuf::from("/r/a/b"));
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let local = temp.path().join("in.txt");
        std::fs::write(&local, "payload").unwrap();

        let remote = format!("{}/nested/file.txt", store.random_remote_directory());
        store.put(&local, &remote).await.unwrap();

        let back = temp.path().join("out").join("copy.txt");
        store.get(&remote, &back).await.unwrap();
        assert_eq!(std::fs::read_to_string(back).unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_literal_map_through_store() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let remote = format!("{}/inputs.pb", store.random_remote_directory());

        let map = LiteralMap::new().with("x", 3i64).with("name", "kiln");
        write_literal_map(&store, &map, &remote).await.unwrap();

        let back = read_literal_map(&store, &remote).await.unwrap();
        assert_eq!(back, map);
    }

    #[tokio::test]
    async fn test_get_missing_is_error() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let err = read_literal_map(&store, "/definitely/not/here.pb").await.unwrap_err();
        assert!(matches!(err, AgentError::Blob { .. }));
    }
}
