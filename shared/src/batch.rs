use crate::authz::{CallerContext, Operation};
use crate::error::AdminError;
use crate::store::{field, StoreError, WriteBatch};
use crate::types::{present, BatchUpdateFieldRequest, MessageResponse};
use crate::AppState;

/// Set one field to the same value on every listed document, atomically.
///
/// `findValue` must be supplied but does not filter the targets: every id in
/// `docIds` is updated.
pub async fn batch_update_field(
    state: &AppState,
    caller: Option<&CallerContext>,
    req: BatchUpdateFieldRequest,
) -> Result<MessageResponse, AdminError> {
    state.policy.require(caller, Operation::BatchUpdateField)?;

    let (Some(collection), Some(doc_ids), Some(field_name), Some(find_value), Some(replace_value)) = (
        present(&req.collection),
        req.doc_ids.as_ref(),
        present(&req.field_name),
        req.find_value.as_ref(),
        req.replace_value.as_ref(),
    ) else {
        return Err(AdminError::invalid_argument(
            "Missing arguments for the batch update.",
        ));
    };

    if let Some(max) = state.store.max_batch_size() {
        if doc_ids.len() > max {
            return Err(AdminError::invalid_argument(format!(
                "A batch update can modify at most {} documents ({} given).",
                max,
                doc_ids.len()
            )));
        }
    }

    tracing::debug!(%find_value, "findValue is not used to filter batch targets");

    let mut batch = WriteBatch::new();
    let mut count = 0usize;
    for doc_id in doc_ids {
        batch.update(collection, doc_id, field(field_name, replace_value.clone()));
        count += 1;
    }

    state.store.commit(batch).await.map_err(|e| {
        tracing::error!(
            collection,
            field_name,
            documents = count,
            error = %e,
            "Batch update rejected, no documents modified"
        );
        match e {
            StoreError::BatchTooLarge { .. } => AdminError::invalid_argument(e.to_string()),
            other => AdminError::internal("Error while running the batch update.", other),
        }
    })?;
    tracing::info!("Batch update set '{}' on {} {} documents", field_name, count, collection);

    Ok(MessageResponse {
        success: true,
        message: format!("{} records updated successfully.", count),
    })
}
