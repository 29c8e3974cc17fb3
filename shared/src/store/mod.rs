//! Document store client: per-document reads and writes plus atomic batches.

pub mod dynamo;
pub mod memory;

pub use dynamo::DynamoDocumentStore;
pub use memory::MemoryDocumentStore;

use async_trait::async_trait;
use serde_json::Value;

/// A stored document: a JSON object keyed by field name
pub type Document = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Merge `fields` into an existing document; fails if it does not exist
    Update {
        collection: String,
        id: String,
        fields: Document,
    },
}

/// Writes staged for a single atomic commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, collection: &str, id: &str, fields: Document) -> &mut Self {
        self.ops.push(WriteOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// One write per document in first-staged order, later fields winning.
    /// Backends that refuse two actions on one item commit this instead.
    pub fn coalesced(&self) -> Vec<WriteOp> {
        let mut merged: Vec<WriteOp> = Vec::with_capacity(self.ops.len());
        for op in &self.ops {
            let WriteOp::Update { collection, id, fields } = op;
            let position = merged.iter().position(|staged| {
                let WriteOp::Update { collection: c, id: i, .. } = staged;
                c == collection && i == id
            });
            match position {
                Some(index) => {
                    let WriteOp::Update { fields: staged, .. } = &mut merged[index];
                    staged.extend(fields.clone());
                }
                None => merged.push(op.clone()),
            }
        }
        merged
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("document {collection}/{id} does not exist")]
    NotFound { collection: String, id: String },
    #[error("field name {0} is reserved")]
    ReservedField(String),
    #[error("batch of {len} writes exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },
    #[error("batch was not committed: {0}")]
    Aborted(String),
    #[error("document store error: {0}")]
    Service(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Create or replace the whole document
    async fn set(&self, collection: &str, id: &str, document: &Document) -> Result<(), StoreError>;

    /// Merge fields into an existing document
    async fn update(&self, collection: &str, id: &str, fields: &Document) -> Result<(), StoreError>;

    /// Deleting a missing document is not an error
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Apply every staged write or none of them
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Largest batch the backend can commit atomically, if bounded
    fn max_batch_size(&self) -> Option<usize> {
        None
    }
}

/// Single-field document, the shape of every field update
pub fn field(name: &str, value: impl Into<Value>) -> Document {
    let mut doc = Document::new();
    doc.insert(name.to_string(), value.into());
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coalesced_merges_writes_to_the_same_document() {
        let mut batch = WriteBatch::new();
        batch
            .update("users", "U1", field("status", "a"))
            .update("users", "U2", field("status", "a"))
            .update("users", "U1", field("status", "b"))
            .update("users", "U1", field("role", "admin"));

        let ops = batch.coalesced();
        assert_eq!(batch.len(), 4);
        assert_eq!(ops.len(), 2);

        let WriteOp::Update { id, fields, .. } = &ops[0];
        assert_eq!(id, "U1");
        assert_eq!(fields["status"], json!("b"));
        assert_eq!(fields["role"], json!("admin"));

        let WriteOp::Update { id, .. } = &ops[1];
        assert_eq!(id, "U2");
    }

    #[test]
    fn same_id_in_another_collection_is_kept_apart() {
        let mut batch = WriteBatch::new();
        batch
            .update("users", "U1", field("status", "a"))
            .update("projects", "U1", field("status", "b"));
        assert_eq!(batch.coalesced().len(), 2);
    }
}
