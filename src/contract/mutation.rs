//! Compiled mutations
//!
//! A closed sum type: every consumer matches all variants without a wildcard
//! arm, so adding an operation kind fails to compile until each consumer
//! handles it.

use focus_types::EntityType;
use serde::{Deserialize, Serialize};

use super::mutations::ChangeSet;
use crate::cache::CacheCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationTarget {
    Task,
    Project,
}

impl MutationTarget {
    pub fn entity_type(&self) -> EntityType {
        match self {
            MutationTarget::Task => EntityType::Task,
            MutationTarget::Project => EntityType::Project,
        }
    }
}

/// Reference to an existing entity, keyed the way scripts expect it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum EntityRef {
    Task {
        #[serde(rename = "taskId")]
        task_id: String,
    },
    Project {
        #[serde(rename = "projectId")]
        project_id: String,
    },
}

impl EntityRef {
    /// Map an external `id` onto `taskId`/`projectId` by target
    pub fn from_target(target: MutationTarget, id: impl Into<String>) -> Self {
        match target {
            MutationTarget::Task => EntityRef::Task { task_id: id.into() },
            MutationTarget::Project => EntityRef::Project {
                project_id: id.into(),
            },
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntityRef::Task { task_id } => task_id,
            EntityRef::Project { project_id } => project_id,
        }
    }

    pub fn target(&self) -> MutationTarget {
        match self {
            EntityRef::Task { .. } => MutationTarget::Task,
            EntityRef::Project { .. } => MutationTarget::Project,
        }
    }

    /// Parameter key carrying the id in generated scripts
    pub fn key(&self) -> &'static str {
        match self {
            EntityRef::Task { .. } => "taskId",
            EntityRef::Project { .. } => "projectId",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateMutation {
    pub target: MutationTarget,
    pub data: ChangeSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateMutation {
    #[serde(flatten)]
    pub entity: EntityRef,
    pub changes: ChangeSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMutation {
    #[serde(flatten)]
    pub entity: EntityRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteMutation {
    #[serde(flatten)]
    pub entity: EntityRef,
}

/// A single (non-batch) operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum MutationOp {
    Create(CreateMutation),
    Update(UpdateMutation),
    Complete(CompleteMutation),
    Delete(DeleteMutation),
}

impl MutationOp {
    pub fn target(&self) -> MutationTarget {
        match self {
            MutationOp::Create(m) => m.target,
            MutationOp::Update(m) => m.entity.target(),
            MutationOp::Complete(m) => m.entity.target(),
            MutationOp::Delete(m) => m.entity.target(),
        }
    }

    pub fn operation_name(&self) -> &'static str {
        match self {
            MutationOp::Create(_) => "create",
            MutationOp::Update(_) => "update",
            MutationOp::Complete(_) => "complete",
            MutationOp::Delete(_) => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMutation {
    pub operations: Vec<MutationOp>,
    pub stop_on_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum CompiledMutation {
    Create(CreateMutation),
    Update(UpdateMutation),
    Complete(CompleteMutation),
    Delete(DeleteMutation),
    Batch(BatchMutation),
}

impl CompiledMutation {
    pub fn operation_name(&self) -> &'static str {
        match self {
            CompiledMutation::Create(_) => "create",
            CompiledMutation::Update(_) => "update",
            CompiledMutation::Complete(_) => "complete",
            CompiledMutation::Delete(_) => "delete",
            CompiledMutation::Batch(_) => "batch",
        }
    }

    /// Entity types whose cached reads a successful run makes stale
    pub fn affected_entities(&self) -> Vec<EntityType> {
        let mut entities = match self {
            CompiledMutation::Create(m) => vec![m.target.entity_type()],
            CompiledMutation::Update(m) => vec![m.entity.target().entity_type()],
            CompiledMutation::Complete(m) => vec![m.entity.target().entity_type()],
            CompiledMutation::Delete(m) => vec![m.entity.target().entity_type()],
            CompiledMutation::Batch(b) => b
                .operations
                .iter()
                .map(|op| op.target().entity_type())
                .collect(),
        };
        entities.sort_unstable();
        entities.dedup();
        entities
    }

    /// Cache categories to drop after success
    pub fn invalidated_categories(&self) -> Vec<CacheCategory> {
        let mut categories: Vec<CacheCategory> = self
            .affected_entities()
            .into_iter()
            .flat_map(CacheCategory::invalidated_by)
            .collect();
        categories.sort_unstable();
        categories.dedup();
        categories
    }

    /// Single operations in execution order
    pub fn into_operations(self) -> Vec<MutationOp> {
        match self {
            CompiledMutation::Create(m) => vec![MutationOp::Create(m)],
            CompiledMutation::Update(m) => vec![MutationOp::Update(m)],
            CompiledMutation::Complete(m) => vec![MutationOp::Complete(m)],
            CompiledMutation::Delete(m) => vec![MutationOp::Delete(m)],
            CompiledMutation::Batch(b) => b.operations,
        }
    }
}

impl From<MutationOp> for CompiledMutation {
    fn from(op: MutationOp) -> Self {
        match op {
            MutationOp::Create(m) => CompiledMutation::Create(m),
            MutationOp::Update(m) => CompiledMutation::Update(m),
            MutationOp::Complete(m) => CompiledMutation::Complete(m),
            MutationOp::Delete(m) => CompiledMutation::Delete(m),
        }
    }
}
