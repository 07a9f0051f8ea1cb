//! Storage backend trait definition.

use async_trait::async_trait;

use drivesync_common::{RemoteFileRef, Result};

/// Filter for listing remote files.
///
/// An empty query matches every non-trashed file the credential can see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileQuery {
    /// Exact file name to match.
    pub name: Option<String>,
    /// Parent folder the file must live in.
    pub parent_id: Option<String>,
}

impl FileQuery {
    /// Query for files called `name` directly inside `parent_id`.
    pub fn named_in(name: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            parent_id: Some(parent_id.into()),
        }
    }

    /// Check whether a file with the given name and parents matches.
    pub fn matches(&self, name: &str, parents: &[String]) -> bool {
        let name_ok = self.name.as_deref().is_none_or(|n| n == name);
        let parent_ok = self
            .parent_id
            .as_ref()
            .is_none_or(|p| parents.iter().any(|candidate| candidate == p));
        name_ok && parent_ok
    }

    /// Render as a Drive v3 `q` expression.
    pub fn to_drive_query(&self) -> String {
        let mut clauses = Vec::new();

        if let Some(name) = &self.name {
            clauses.push(format!("name = '{}'", escape_literal(name)));
        }
        if let Some(parent) = &self.parent_id {
            clauses.push(format!("'{}' in parents", escape_literal(parent)));
        }
        clauses.push("trashed = false".to_string());

        clauses.join(" and ")
    }
}

/// Escape a string literal for the Drive query language.
fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Remote object storage consumed by the gateway.
///
/// Implementations handle their own authentication. No operation retries.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get the backend name (e.g., "gdrive", "memory").
    fn name(&self) -> &str;

    /// List up to `limit` files matching `query`.
    ///
    /// An empty result is not an error.
    async fn list(&self, query: &FileQuery, limit: usize) -> Result<Vec<RemoteFileRef>>;

    /// Create a new file called `name` inside `parent_id`.
    ///
    /// # Postconditions
    /// - Returns the id and name assigned by the backend
    ///
    /// # Errors
    /// - Backend rejection (quota, permission, network)
    async fn create(&self, name: &str, parent_id: &str, content: Vec<u8>) -> Result<RemoteFileRef>;

    /// Replace the content of an existing file.
    ///
    /// # Errors
    /// - File not found
    /// - Backend rejection (quota, permission, network)
    async fn update(&self, file_id: &str, content: Vec<u8>) -> Result<RemoteFileRef>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_query_rendering() {
        let query = FileQuery::named_in("report.csv", "folder123");
        assert_eq!(
            query.to_drive_query(),
            "name = 'report.csv' and 'folder123' in parents and trashed = false"
        );
    }

    #[test]
    fn test_drive_query_escapes_quotes() {
        let query = FileQuery::named_in("it's.txt", "folder");
        assert_eq!(
            query.to_drive_query(),
            "name = 'it\\'s.txt' and 'folder' in parents and trashed = false"
        );

        let query = FileQuery::named_in("back\\slash", "folder");
        assert!(query.to_drive_query().starts_with("name = 'back\\\\slash'"));
    }

    #[test]
    fn test_empty_query() {
        assert_eq!(FileQuery::default().to_drive_query(), "trashed = false");
        assert!(FileQuery::default().matches("anything", &[]));
    }

    #[test]
    fn test_query_matches() {
        let query = FileQuery::named_in("report.csv", "folder");
        let parents = vec!["other".to_string(), "folder".to_string()];

        assert!(query.matches("report.csv", &parents));
        assert!(!query.matches("report.txt", &parents));
        assert!(!query.matches("report.csv", &["other".to_string()]));
    }
}
