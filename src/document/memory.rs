use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{Document, DocumentError, DocumentStore, DocumentWrite};

/// Process-local document store.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<(String, String), Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.documents
            .read()
            .await
            .keys()
            .filter(|(c, _)| c == collection)
            .count()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, DocumentError> {
        Ok(self
            .documents
            .read()
            .await
            .get(&(collection.to_owned(), id.to_owned()))
            .cloned())
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
    ) -> Result<(), DocumentError> {
        let document = write.resolve(Utc::now());
        self.documents
            .write()
            .await
            .insert((collection.to_owned(), id.to_owned()), document);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::server_timestamp;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryDocumentStore::new();
        assert!(store.get_document("users", "A1").await.unwrap().is_none());

        let before = Utc::now();
        store
            .set_document(
                "users",
                "A1",
                DocumentWrite::new()
                    .set("role", "admin")
                    .set("createdAt", server_timestamp()),
            )
            .await
            .unwrap();

        let document = store.get_document("users", "A1").await.unwrap().unwrap();
        assert_eq!(document.get_str("role"), Some("admin"));
        assert!(document.get_timestamp("createdAt").unwrap() >= before);

        assert!(store.get_document("profiles", "A1").await.unwrap().is_none());
        assert_eq!(store.count("users").await, 1);
    }

    #[tokio::test]
    async fn test_set_replaces_document() {
        let store = MemoryDocumentStore::new();
        store
            .set_document("users", "A1", DocumentWrite::new().set("a", "1"))
            .await
            .unwrap();
        store
            .set_document("users", "A1", DocumentWrite::new().set("b", "2"))
            .await
            .unwrap();

        let document = store.get_document("users", "A1").await.unwrap().unwrap();
        assert_eq!(document.get_str("a"), None);
        assert_eq!(document.get_str("b"), Some("2"));
        assert_eq!(store.count("users").await, 1);
    }
}
