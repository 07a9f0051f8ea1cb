//! Filename-keyed uploads into a single remote folder.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use drivesync_common::{Error, RemoteFileRef, Result};

use crate::provider::{FileQuery, StorageBackend};

/// Maximum number of same-named files considered per upload.
pub const MATCH_LIMIT: usize = 100;

/// Result of a single upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// No file with that name existed; a new one was created.
    Created(RemoteFileRef),
    /// Every existing file with that name was overwritten.
    Updated(Vec<RemoteFileRef>),
}

impl UploadOutcome {
    /// Files touched by the upload.
    pub fn files(&self) -> &[RemoteFileRef] {
        match self {
            UploadOutcome::Created(file) => std::slice::from_ref(file),
            UploadOutcome::Updated(files) => files,
        }
    }
}

/// Gateway for uploading local files into the target folder.
///
/// Files are keyed by name within the folder. The backend does not enforce
/// name uniqueness, so when duplicates exist each of them is updated.
pub struct RemoteFileGateway<B: StorageBackend + ?Sized> {
    backend: Arc<B>,
    folder_id: String,
}

impl<B: StorageBackend + ?Sized> RemoteFileGateway<B> {
    /// Create a gateway bound to a fixed destination folder.
    pub fn new(backend: Arc<B>, folder_id: impl Into<String>) -> Self {
        Self {
            backend,
            folder_id: folder_id.into(),
        }
    }

    /// The destination folder identifier.
    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    /// Get the underlying backend.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// List up to `limit` files visible to the backend.
    pub async fn list_files(&self, limit: usize) -> Result<Vec<RemoteFileRef>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.backend.list(&FileQuery::default(), limit).await
    }

    /// Upload `local_path` as `remote_name` into the target folder.
    ///
    /// # Postconditions
    /// - If no file named `remote_name` existed, exactly one was created
    /// - Otherwise every matching file now holds the local content
    ///
    /// Every match is attempted even when an earlier update fails; the first
    /// failure is then returned.
    ///
    /// # Errors
    /// - `Error::Upload` if the local file cannot be read
    /// - Remote errors if the backend rejects a call
    pub async fn upload(&self, local_path: &Path, remote_name: &str) -> Result<UploadOutcome> {
        let content = tokio::fs::read(local_path)
            .await
            .map_err(|source| Error::Upload {
                path: local_path.to_path_buf(),
                source,
            })?;

        let query = FileQuery::named_in(remote_name, &self.folder_id);
        let existing = self.backend.list(&query, MATCH_LIMIT).await?;

        if existing.is_empty() {
            debug!(name = remote_name, bytes = content.len(), "No remote match, creating");
            let file = self
                .backend
                .create(remote_name, &self.folder_id, content)
                .await?;
            info!("File Uploaded: {}", file.id);
            return Ok(UploadOutcome::Created(file));
        }

        if existing.len() > 1 {
            warn!(
                name = remote_name,
                count = existing.len(),
                "Multiple remote files share this name, updating all of them"
            );
        }

        let mut updated = Vec::with_capacity(existing.len());
        let mut first_error = None;
        for file in existing {
            match self.backend.update(&file.id, content.clone()).await {
                Ok(result) => {
                    info!("File Updated: {}", result.name);
                    updated.push(result);
                }
                Err(e) => {
                    warn!(file_id = %file.id, "Update failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(UploadOutcome::Updated(updated)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BackendCall, MemoryBackend};
    use tempfile::TempDir;

    const FOLDER: &str = "target-folder";

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_upload_new_file_creates_once() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "report.csv", b"a,b,c");
        let backend = Arc::new(MemoryBackend::new());
        let gateway = RemoteFileGateway::new(backend.clone(), FOLDER);

        let outcome = gateway.upload(&path, "report.csv").await.unwrap();

        assert!(matches!(outcome, UploadOutcome::Created(_)));
        assert_eq!(backend.create_count(), 1);
        assert_eq!(backend.update_count(), 0);

        let calls = backend.calls();
        assert_eq!(
            calls[0],
            BackendCall::List {
                query: FileQuery::named_in("report.csv", FOLDER),
                limit: MATCH_LIMIT,
            }
        );
        assert_eq!(
            calls[1],
            BackendCall::Create {
                name: "report.csv".to_string(),
                parent_id: FOLDER.to_string(),
                content: b"a,b,c".to_vec(),
            }
        );
    }

    #[tokio::test]
    async fn test_upload_existing_file_updates() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "report.csv", b"new bytes");
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_with_id("X", "report.csv", FOLDER, b"old bytes".to_vec());
        let gateway = RemoteFileGateway::new(backend.clone(), FOLDER);

        let outcome = gateway.upload(&path, "report.csv").await.unwrap();

        assert_eq!(
            outcome,
            UploadOutcome::Updated(vec![RemoteFileRef::new("X", "report.csv")])
        );
        assert_eq!(backend.create_count(), 0);
        assert_eq!(
            backend.calls()[1],
            BackendCall::Update {
                file_id: "X".to_string(),
                content: b"new bytes".to_vec(),
            }
        );
        assert_eq!(backend.content("X"), Some(b"new bytes".to_vec()));
    }

    #[tokio::test]
    async fn test_upload_updates_every_duplicate() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "notes.txt", b"v2");
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("notes.txt", FOLDER, b"v1".to_vec());
        backend.insert("notes.txt", FOLDER, b"v1".to_vec());
        backend.insert("notes.txt", "another-folder", b"v1".to_vec());
        let gateway = RemoteFileGateway::new(backend.clone(), FOLDER);

        let outcome = gateway.upload(&path, "notes.txt").await.unwrap();

        assert_eq!(outcome.files().len(), 2);
        assert_eq!(backend.create_count(), 0);
        assert_eq!(backend.update_count(), 2);
    }

    /// Delegates to a memory backend but rejects updates of one file.
    struct RejectUpdateOf {
        inner: MemoryBackend,
        file_id: &'static str,
    }

    #[async_trait::async_trait]
    impl StorageBackend for RejectUpdateOf {
        fn name(&self) -> &str {
            "reject-update"
        }

        async fn list(&self, query: &FileQuery, limit: usize) -> Result<Vec<RemoteFileRef>> {
            self.inner.list(query, limit).await
        }

        async fn create(&self, name: &str, parent_id: &str, content: Vec<u8>) -> Result<RemoteFileRef> {
            self.inner.create(name, parent_id, content).await
        }

        async fn update(&self, file_id: &str, content: Vec<u8>) -> Result<RemoteFileRef> {
            if file_id == self.file_id {
                return Err(Error::PermissionDenied(format!("read-only: {}", file_id)));
            }
            self.inner.update(file_id, content).await
        }
    }

    #[tokio::test]
    async fn test_failed_duplicate_update_still_updates_the_rest() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "notes.txt", b"v2");
        let inner = MemoryBackend::new();
        inner.insert_with_id("A", "notes.txt", FOLDER, b"v1".to_vec());
        inner.insert_with_id("B", "notes.txt", FOLDER, b"v1".to_vec());
        let backend = Arc::new(RejectUpdateOf { inner, file_id: "A" });
        let gateway = RemoteFileGateway::new(backend.clone(), FOLDER);

        let result = gateway.upload(&path, "notes.txt").await;

        assert!(matches!(result, Err(Error::PermissionDenied(_))));
        assert_eq!(backend.inner.update_count(), 1);
        assert_eq!(backend.inner.content("A"), Some(b"v1".to_vec()));
        assert_eq!(backend.inner.content("B"), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_upload_same_name_in_other_folder_creates() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "notes.txt", b"v1");
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("notes.txt", "another-folder", b"old".to_vec());
        let gateway = RemoteFileGateway::new(backend.clone(), FOLDER);

        gateway.upload(&path, "notes.txt").await.unwrap();

        assert_eq!(backend.create_count(), 1);
        assert_eq!(backend.update_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_missing_local_file() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(MemoryBackend::new());
        let gateway = RemoteFileGateway::new(backend.clone(), FOLDER);

        let result = gateway.upload(&dir.path().join("gone.txt"), "gone.txt").await;

        assert!(matches!(result, Err(Error::Upload { .. })));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upload_remote_rejection() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", b"data");
        let backend = Arc::new(MemoryBackend::new());
        backend.set_rejection(Some("storage quota exceeded"));
        let gateway = RemoteFileGateway::new(backend.clone(), FOLDER);

        let result = gateway.upload(&path, "a.txt").await;

        assert!(result.unwrap_err().is_remote());
        assert_eq!(backend.create_count(), 0);
    }

    #[tokio::test]
    async fn test_list_files() {
        let backend = Arc::new(MemoryBackend::new());
        let gateway = RemoteFileGateway::new(backend.clone(), FOLDER);

        assert!(gateway.list_files(10).await.unwrap().is_empty());

        for i in 0..5 {
            backend.insert(&format!("file{}.txt", i), FOLDER, vec![]);
        }

        assert_eq!(gateway.list_files(3).await.unwrap().len(), 3);
        assert!(gateway.list_files(0).await.unwrap().is_empty());
    }
}
