use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{Document, DocumentStore, StoreError, WriteBatch, WriteOp};

type DocKey = (String, String);

/// In-process document store with the same batch semantics as the real one
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<BTreeMap<DocKey, Document>>,
    max_batch_size: Option<usize>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforce a commit size limit like a bounded backend
    pub fn with_max_batch_size(max: usize) -> Self {
        Self {
            max_batch_size: Some(max),
            ..Self::default()
        }
    }

    pub fn insert(&self, collection: &str, id: &str, document: Document) {
        self.lock()
            .insert((collection.to_string(), id.to_string()), document);
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.lock()
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.lock().keys().filter(|(c, _)| c == collection).count()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<DocKey, Document>> {
        self.documents.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn merge(
    documents: &mut BTreeMap<DocKey, Document>,
    collection: &str,
    id: &str,
    fields: &Document,
) -> Result<(), StoreError> {
    let doc = documents
        .get_mut(&(collection.to_string(), id.to_string()))
        .ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;
    doc.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.document(collection, id))
    }

    async fn set(&self, collection: &str, id: &str, document: &Document) -> Result<(), StoreError> {
        self.insert(collection, id, document.clone());
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: &Document) -> Result<(), StoreError> {
        merge(&mut self.lock(), collection, id, fields)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.lock().remove(&(collection.to_string(), id.to_string()));
        Ok(())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if let Some(max) = self.max_batch_size {
            if batch.len() > max {
                return Err(StoreError::BatchTooLarge { len: batch.len(), max });
            }
        }

        // Apply to a scratch copy and swap it in only if every write succeeded
        let mut documents = self.lock();
        let mut staged = documents.clone();
        for op in batch.ops() {
            let WriteOp::Update { collection, id, fields } = op;
            merge(&mut staged, collection, id, fields)
                .map_err(|e| StoreError::Aborted(e.to_string()))?;
        }
        *documents = staged;
        Ok(())
    }

    fn max_batch_size(&self) -> Option<usize> {
        self.max_batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::field;
    use serde_json::json;

    #[tokio::test]
    async fn failed_commit_leaves_documents_untouched() {
        let store = MemoryDocumentStore::new();
        store.insert("users", "U1", field("status", "active"));

        let mut batch = WriteBatch::new();
        batch
            .update("users", "U1", field("status", "inactive"))
            .update("users", "missing", field("status", "inactive"));

        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::Aborted(_)));
        assert_eq!(store.document("users", "U1").unwrap()["status"], json!("active"));
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let store = MemoryDocumentStore::new();
        store.insert("users", "U1", field("email", "a@b.com"));

        store.update("users", "U1", &field("role", "admin")).await.unwrap();

        let doc = store.document("users", "U1").unwrap();
        assert_eq!(doc["email"], json!("a@b.com"));
        assert_eq!(doc["role"], json!("admin"));
    }

    #[tokio::test]
    async fn update_of_missing_document_fails() {
        let store = MemoryDocumentStore::new();
        let err = store.update("users", "U9", &field("role", "admin")).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::NotFound { collection: "users".to_string(), id: "U9".to_string() }
        );
    }
}
