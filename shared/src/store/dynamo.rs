use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, TransactWriteItem, Update};
use aws_sdk_dynamodb::Client as DynamoClient;
use serde_json::Value;
use std::collections::HashMap;

use super::{Document, DocumentStore, StoreError, WriteBatch, WriteOp};

/// TransactWriteItems accepts at most this many actions
pub const MAX_TRANSACTION_ITEMS: usize = 100;

const PARTITION_KEY: &str = "PK";
const SORT_KEY: &str = "SK";
const EXISTS_CONDITION: &str = "attribute_exists(PK)";

/// Single-table DynamoDB document store.
///
/// Every document is one item with `PK = SK = <COLLECTION>#<id>` and the
/// document fields as top-level attributes.
pub struct DynamoDocumentStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoDocumentStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

pub(crate) fn item_key(collection: &str, id: &str) -> String {
    format!("{}#{}", collection.to_uppercase(), id)
}

fn key_attributes(collection: &str, id: &str) -> HashMap<String, AttributeValue> {
    let key = item_key(collection, id);
    HashMap::from([
        (PARTITION_KEY.to_string(), AttributeValue::S(key.clone())),
        (SORT_KEY.to_string(), AttributeValue::S(key)),
    ])
}

fn is_reserved(name: &str) -> bool {
    name == PARTITION_KEY || name == SORT_KEY
}

pub(crate) fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute(v)))
                .collect(),
        ),
    }
}

pub(crate) fn from_attribute(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => n
            .parse::<serde_json::Number>()
            .map(Value::Number)
            .unwrap_or_else(|_| Value::String(n.clone())),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::L(items) => Value::Array(items.iter().map(from_attribute).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_attribute(v)))
                .collect(),
        ),
        AttributeValue::Ss(items) => {
            Value::Array(items.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(items) => Value::Array(
            items
                .iter()
                .map(|n| from_attribute(&AttributeValue::N(n.clone())))
                .collect(),
        ),
        _ => Value::Null,
    }
}

/// `SET #f0 = :v0, ...` plus its name and value placeholders
struct UpdateParts {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

fn update_parts(fields: &Document) -> Result<UpdateParts, StoreError> {
    let mut assignments = Vec::with_capacity(fields.len());
    let mut names = HashMap::new();
    let mut values = HashMap::new();

    for (i, (name, value)) in fields.iter().enumerate() {
        if is_reserved(name) {
            return Err(StoreError::ReservedField(name.clone()));
        }
        assignments.push(format!("#f{i} = :v{i}"));
        names.insert(format!("#f{i}"), name.clone());
        values.insert(format!(":v{i}"), to_attribute(value));
    }

    Ok(UpdateParts {
        expression: format!("SET {}", assignments.join(", ")),
        names,
        values,
    })
}

#[async_trait]
impl DocumentStore for DynamoDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(key_attributes(collection, id)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::Service(DisplayErrorContext(&e).to_string()))?;

        Ok(result.item().map(|item| {
            item.iter()
                .filter(|(name, _)| !is_reserved(name))
                .map(|(name, attr)| (name.clone(), from_attribute(attr)))
                .collect()
        }))
    }

    async fn set(&self, collection: &str, id: &str, document: &Document) -> Result<(), StoreError> {
        let mut item: HashMap<String, AttributeValue> = document
            .iter()
            .filter(|(name, _)| !is_reserved(name))
            .map(|(name, value)| (name.clone(), to_attribute(value)))
            .collect();
        item.extend(key_attributes(collection, id));

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| StoreError::Service(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: &Document) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let parts = update_parts(fields)?;

        self.client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(key_attributes(collection, id)))
            .update_expression(parts.expression)
            .set_expression_attribute_names(Some(parts.names))
            .set_expression_attribute_values(Some(parts.values))
            .condition_expression(EXISTS_CONDITION)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(err) if err.is_conditional_check_failed_exception() => StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                },
                _ => StoreError::Service(DisplayErrorContext(&e).to_string()),
            })?;

        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(key_attributes(collection, id)))
            .send()
            .await
            .map_err(|e| StoreError::Service(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        if batch.len() > MAX_TRANSACTION_ITEMS {
            return Err(StoreError::BatchTooLarge {
                len: batch.len(),
                max: MAX_TRANSACTION_ITEMS,
            });
        }

        // A transaction may touch each item only once
        let ops = batch.coalesced();
        let mut items = Vec::with_capacity(ops.len());
        for op in &ops {
            let WriteOp::Update { collection, id, fields } = op;
            let parts = update_parts(fields)?;
            let update = Update::builder()
                .table_name(&self.table_name)
                .set_key(Some(key_attributes(collection, id)))
                .update_expression(parts.expression)
                .set_expression_attribute_names(Some(parts.names))
                .set_expression_attribute_values(Some(parts.values))
                .condition_expression(EXISTS_CONDITION)
                .build()
                .map_err(|e| StoreError::Service(e.to_string()))?;
            items.push(TransactWriteItem::builder().update(update).build());
        }

        self.client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(err) if err.is_transaction_canceled_exception() => {
                    StoreError::Aborted(DisplayErrorContext(&e).to_string())
                }
                _ => StoreError::Service(DisplayErrorContext(&e).to_string()),
            })?;

        Ok(())
    }

    fn max_batch_size(&self) -> Option<usize> {
        Some(MAX_TRANSACTION_ITEMS)
    }
}
