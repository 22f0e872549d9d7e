//! Mutation compiler
//!
//! Maps each request variant onto its compiled counterpart. The match over
//! `MutationRequest` has no wildcard arm, so a new operation kind does not
//! compile until it is handled here.

use serde_json::Value;
use tracing::debug;

use super::request::{
    BatchRequest, CompleteRequest, CreateRequest, DeleteRequest, MutationRequest, UpdateRequest,
};
use crate::contract::{
    normalize_date, BatchMutation, ChangeSet, CompiledMutation, CompleteMutation, CreateMutation,
    DeleteMutation, EntityRef, MutableProperty, MutationOp, UpdateMutation,
};
use crate::error::ContractError;

#[derive(Debug, Clone)]
pub struct MutationCompiler {
    max_batch: usize,
}

impl Default for MutationCompiler {
    fn default() -> Self {
        Self { max_batch: 100 }
    }
}

impl MutationCompiler {
    pub fn new(max_batch: usize) -> Self {
        Self { max_batch }
    }

    pub fn compile(&self, request: &MutationRequest) -> Result<CompiledMutation, ContractError> {
        let compiled = match request {
            MutationRequest::Create(r) => CompiledMutation::Create(create(r)?),
            MutationRequest::Update(r) => CompiledMutation::Update(update(r)?),
            MutationRequest::Complete(r) => CompiledMutation::Complete(complete(r)?),
            MutationRequest::Delete(r) => CompiledMutation::Delete(delete(r)?),
            MutationRequest::Batch(r) => CompiledMutation::Batch(self.batch(r)?),
        };
        debug!(
            operation = compiled.operation_name(),
            entities = ?compiled.affected_entities(),
            "Compiled mutation"
        );
        Ok(compiled)
    }

    /// Validate every sub-operation independently and report all failures
    /// together
    fn batch(&self, request: &BatchRequest) -> Result<BatchMutation, ContractError> {
        let found = request.operations.len();
        if found == 0 || found > self.max_batch {
            return Err(ContractError::BatchSize {
                max: self.max_batch,
                found,
            });
        }

        let mut operations = Vec::with_capacity(found);
        let mut failures = Vec::new();
        for (index, raw) in request.operations.iter().enumerate() {
            match compile_sub_operation(index, raw) {
                Ok(op) => operations.push(op),
                Err(e) => failures.push((index, e)),
            }
        }
        if !failures.is_empty() {
            return Err(ContractError::BatchOperations { failures });
        }
        Ok(BatchMutation {
            operations,
            stop_on_error: request.stop_on_error,
        })
    }
}

fn compile_sub_operation(index: usize, raw: &Value) -> Result<MutationOp, ContractError> {
    if raw.get("operation").and_then(Value::as_str) == Some("batch") {
        return Err(ContractError::NestedBatch { index });
    }
    let request: MutationRequest = serde_json::from_value(raw.clone())?;
    match &request {
        MutationRequest::Create(r) => Ok(MutationOp::Create(create(r)?)),
        MutationRequest::Update(r) => Ok(MutationOp::Update(update(r)?)),
        MutationRequest::Complete(r) => Ok(MutationOp::Complete(complete(r)?)),
        MutationRequest::Delete(r) => Ok(MutationOp::Delete(delete(r)?)),
        MutationRequest::Batch(_) => Err(ContractError::NestedBatch { index }),
    }
}

fn create(request: &CreateRequest) -> Result<CreateMutation, ContractError> {
    let entity = request.target.entity_type();
    let context = format!("{} create", entity);
    if !request.data.contains_key(MutableProperty::Name.name()) {
        return Err(ContractError::MissingField {
            field: MutableProperty::Name.name().to_string(),
            context,
        });
    }
    Ok(CreateMutation {
        target: request.target,
        data: ChangeSet::from_external(entity, &request.data, &context)?,
    })
}

fn update(request: &UpdateRequest) -> Result<UpdateMutation, ContractError> {
    let entity = request.target.entity_type();
    let changes =
        ChangeSet::from_external(entity, &request.changes, &format!("{} update", entity))?;
    if changes.is_empty() {
        return Err(ContractError::InvalidValue {
            field: "changes".to_string(),
            expected: "at least one property".to_string(),
            found: "empty object".to_string(),
        });
    }
    Ok(UpdateMutation {
        entity: entity_ref(request.target, &request.id)?,
        changes,
    })
}

fn complete(request: &CompleteRequest) -> Result<CompleteMutation, ContractError> {
    let completion_date = request
        .completion_date
        .as_deref()
        .map(|raw| normalize_date("completionDate", raw))
        .transpose()?;
    Ok(CompleteMutation {
        entity: entity_ref(request.target, &request.id)?,
        completion_date,
    })
}

fn delete(request: &DeleteRequest) -> Result<DeleteMutation, ContractError> {
    Ok(DeleteMutation {
        entity: entity_ref(request.target, &request.id)?,
    })
}

/// The single point where an external `id` becomes `taskId`/`projectId`
fn entity_ref(
    target: crate::contract::MutationTarget,
    id: &str,
) -> Result<EntityRef, ContractError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ContractError::InvalidValue {
            field: "id".to_string(),
            expected: "non-empty identifier".to_string(),
            found: "empty string".to_string(),
        });
    }
    Ok(EntityRef::from_target(target, id))
}
