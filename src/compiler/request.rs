//! Inbound request shapes
//!
//! Closed JSON: every struct denies unknown fields, so a misspelled key is a
//! validation error instead of a silently dropped filter. Filter maps stay
//! raw here; `QueryCompiler` owns their translation.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::contract::{
    AnalysisScope, MeetingNotesParams, MutationTarget, OutputField, QueryEntity, QueryMode,
    ScopedAnalysisKind, SortSpec,
};
use crate::error::ContractError;

/// Exactly one of `query`, `mutation`, `analysis`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase", deny_unknown_fields)]
pub enum ToolRequest {
    Query(QueryRequest),
    Mutation(MutationRequest),
    Analysis(AnalysisRequest),
}

impl ToolRequest {
    pub fn from_value(value: Value) -> Result<Self, ContractError> {
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryRequest {
    #[serde(rename = "type")]
    pub entity: QueryEntity,
    #[serde(default)]
    pub mode: QueryMode,
    #[serde(default)]
    pub filters: Map<String, Value>,
    #[serde(default)]
    pub fields: Option<Vec<OutputField>>,
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub count_only: bool,
}

impl QueryRequest {
    pub fn new(entity: QueryEntity) -> Self {
        Self {
            entity,
            mode: QueryMode::All,
            filters: Map::new(),
            fields: None,
            sort: Vec::new(),
            limit: None,
            offset: None,
            count_only: false,
        }
    }
}

/// Mutation request, discriminated by `operation`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum MutationRequest {
    Create(CreateRequest),
    Update(UpdateRequest),
    Complete(CompleteRequest),
    Delete(DeleteRequest),
    Batch(BatchRequest),
}

impl MutationRequest {
    pub fn operation_name(&self) -> &'static str {
        match self {
            MutationRequest::Create(_) => "create",
            MutationRequest::Update(_) => "update",
            MutationRequest::Complete(_) => "complete",
            MutationRequest::Delete(_) => "delete",
            MutationRequest::Batch(_) => "batch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRequest {
    pub target: MutationTarget,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRequest {
    pub target: MutationTarget,
    pub id: String,
    pub changes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CompleteRequest {
    pub target: MutationTarget,
    pub id: String,
    #[serde(default)]
    pub completion_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteRequest {
    pub target: MutationTarget,
    pub id: String,
}

/// Sub-operations stay raw so each one is validated, and reported,
/// independently
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BatchRequest {
    pub operations: Vec<Value>,
    #[serde(default)]
    pub stop_on_error: bool,
}

/// Analysis request, discriminated by `type`. `parse_meeting_notes` has no
/// scope and requires params.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisRequest {
    ProductivityStats(ScopedRequest),
    TaskVelocity(ScopedRequest),
    OverdueAnalysis(ScopedRequest),
    PatternAnalysis(ScopedRequest),
    WorkflowAnalysis(ScopedRequest),
    RecurringTasks(ScopedRequest),
    ManageReviews(ScopedRequest),
    ParseMeetingNotes(MeetingNotesRequest),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopedRequest {
    #[serde(default)]
    pub scope: AnalysisScope,
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeetingNotesRequest {
    pub params: MeetingNotesParams,
}

/// Either a scoped analysis with its kind, or meeting-notes parsing
pub enum AnalysisTarget<'a> {
    Scoped(ScopedAnalysisKind, &'a ScopedRequest),
    MeetingNotes(&'a MeetingNotesRequest),
}

impl AnalysisRequest {
    pub fn target(&self) -> AnalysisTarget<'_> {
        use ScopedAnalysisKind as K;
        match self {
            AnalysisRequest::ProductivityStats(r) => AnalysisTarget::Scoped(K::ProductivityStats, r),
            AnalysisRequest::TaskVelocity(r) => AnalysisTarget::Scoped(K::TaskVelocity, r),
            AnalysisRequest::OverdueAnalysis(r) => AnalysisTarget::Scoped(K::OverdueAnalysis, r),
            AnalysisRequest::PatternAnalysis(r) => AnalysisTarget::Scoped(K::PatternAnalysis, r),
            AnalysisRequest::WorkflowAnalysis(r) => AnalysisTarget::Scoped(K::WorkflowAnalysis, r),
            AnalysisRequest::RecurringTasks(r) => AnalysisTarget::Scoped(K::RecurringTasks, r),
            AnalysisRequest::ManageReviews(r) => AnalysisTarget::Scoped(K::ManageReviews, r),
            AnalysisRequest::ParseMeetingNotes(r) => AnalysisTarget::MeetingNotes(r),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.target() {
            AnalysisTarget::Scoped(kind, _) => kind.as_str(),
            AnalysisTarget::MeetingNotes(_) => "parse_meeting_notes",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_request_parses() {
        let request = ToolRequest::from_value(json!({
            "query": {
                "type": "tasks",
                "mode": "flagged",
                "filters": {"tags": {"any": ["home"]}},
                "fields": ["id", "name"],
                "limit": 10,
                "countOnly": false
            }
        }))
        .unwrap();
        let ToolRequest::Query(query) = request else {
            panic!("expected query");
        };
        assert_eq!(query.entity, QueryEntity::Tasks);
        assert_eq!(query.mode, QueryMode::Flagged);
        assert_eq!(query.limit, Some(10));
    }

    #[test]
    fn test_unknown_top_level_field_rejected() {
        let err = ToolRequest::from_value(json!({
            "query": {"type": "tasks", "filtres": {}}
        }))
        .unwrap_err();
        assert!(matches!(err, ContractError::Schema { .. }));

        assert!(ToolRequest::from_value(json!({
            "query": {"type": "tasks"},
            "mutation": {"operation": "delete", "target": "task", "id": "x"}
        }))
        .is_err());
    }

    #[test]
    fn test_mutation_request_variants() {
        let update: MutationRequest = serde_json::from_value(json!({
            "operation": "update", "target": "task", "id": "t1", "changes": {"flagged": true}
        }))
        .unwrap();
        assert_eq!(update.operation_name(), "update");

        let bad: Result<MutationRequest, _> = serde_json::from_value(json!({
            "operation": "delete", "target": "task", "id": "t1", "force": true
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_meeting_notes_requires_params() {
        let missing: Result<AnalysisRequest, _> =
            serde_json::from_value(json!({"type": "parse_meeting_notes"}));
        assert!(missing.is_err());

        let scoped: AnalysisRequest =
            serde_json::from_value(json!({"type": "overdue_analysis"})).unwrap();
        assert_eq!(scoped.type_name(), "overdue_analysis");
    }
}
