//! In-memory storage backend for testing.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use drivesync_common::{Error, RemoteFileRef, Result};

use crate::provider::{FileQuery, StorageBackend};

/// A call received by the memory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    List { query: FileQuery, limit: usize },
    Create { name: String, parent_id: String, content: Vec<u8> },
    Update { file_id: String, content: Vec<u8> },
}

#[derive(Debug, Clone)]
struct StoredFile {
    name: String,
    parents: Vec<String>,
    content: Vec<u8>,
}

/// In-memory storage backend.
///
/// Useful for testing and development. Every call is recorded so tests can
/// assert on the exact sequence of list/create/update operations, and the
/// backend can be switched into a rejecting mode to simulate remote failures.
pub struct MemoryBackend {
    files: Arc<RwLock<BTreeMap<String, StoredFile>>>,
    calls: Arc<RwLock<Vec<BackendCall>>>,
    rejection: Arc<RwLock<Option<String>>>,
}

impl MemoryBackend {
    /// Create a new empty memory backend.
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(BTreeMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            rejection: Arc::new(RwLock::new(None)),
        }
    }

    /// Seed a file without recording a call. Returns the new file id.
    pub fn insert(&self, name: &str, parent_id: &str, content: Vec<u8>) -> String {
        let id = Uuid::new_v4().to_string();
        self.insert_with_id(&id, name, parent_id, content);
        id
    }

    /// Seed a file with a fixed id.
    pub fn insert_with_id(&self, id: &str, name: &str, parent_id: &str, content: Vec<u8>) {
        self.files.write().unwrap().insert(
            id.to_string(),
            StoredFile {
                name: name.to_string(),
                parents: vec![parent_id.to_string()],
                content,
            },
        );
    }

    /// Reject every subsequent call with a remote error, or stop rejecting.
    pub fn set_rejection(&self, message: Option<&str>) {
        *self.rejection.write().unwrap() = message.map(String::from);
    }

    /// Content of a stored file.
    pub fn content(&self, file_id: &str) -> Option<Vec<u8>> {
        self.files
            .read()
            .unwrap()
            .get(file_id)
            .map(|f| f.content.clone())
    }

    /// Number of stored files.
    pub fn len(&self) -> usize {
        self.files.read().unwrap().len()
    }

    /// Check if no files are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn create_count(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::Create { .. }))
    }

    pub fn update_count(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::Update { .. }))
    }

    pub fn list_count(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::List { .. }))
    }

    fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.read().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: BackendCall) -> Result<()> {
        self.calls.write().unwrap().push(call);

        match self.rejection.read().unwrap().as_ref() {
            Some(message) => Err(Error::Remote(message.clone())),
            None => Ok(()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(&self, query: &FileQuery, limit: usize) -> Result<Vec<RemoteFileRef>> {
        self.record(BackendCall::List {
            query: query.clone(),
            limit,
        })?;

        let files = self.files.read().unwrap();
        Ok(files
            .iter()
            .filter(|(_, f)| query.matches(&f.name, &f.parents))
            .take(limit)
            .map(|(id, f)| RemoteFileRef::new(id.clone(), f.name.clone()))
            .collect())
    }

    async fn create(&self, name: &str, parent_id: &str, content: Vec<u8>) -> Result<RemoteFileRef> {
        self.record(BackendCall::Create {
            name: name.to_string(),
            parent_id: parent_id.to_string(),
            content: content.clone(),
        })?;

        let id = self.insert(name, parent_id, content);
        Ok(RemoteFileRef::new(id, name))
    }

    async fn update(&self, file_id: &str, content: Vec<u8>) -> Result<RemoteFileRef> {
        self.record(BackendCall::Update {
            file_id: file_id.to_string(),
            content: content.clone(),
        })?;

        let mut files = self.files.write().unwrap();
        match files.get_mut(file_id) {
            Some(file) => {
                file.content = content;
                Ok(RemoteFileRef::new(file_id, file.name.clone()))
            }
            None => Err(Error::NotFound(format!("File not found: {}", file_id))),
        }
    }
}
