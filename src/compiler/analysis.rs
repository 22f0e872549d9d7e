//! Analysis compiler
//!
//! Scoped analyses become an internal dataset query over the same filter
//! specification queries use. Meeting-notes parsing is text only.

use tracing::debug;

use super::request::{AnalysisRequest, AnalysisTarget, ScopedRequest};
use crate::config::QueryConfig;
use crate::contract::{
    CompiledAnalysis, CompiledQuery, DateBound, DateRange, FilterProperty, FilterSet,
    FilterValue, MeetingNotesParams, OutputField, QueryEntity, QueryMode, ScopedAnalysis,
    ScopedAnalysisKind, TagOperator,
};
use crate::error::ContractError;

#[derive(Debug, Clone, Default)]
pub struct AnalysisCompiler {
    limits: QueryConfig,
}

impl AnalysisCompiler {
    pub fn new(limits: QueryConfig) -> Self {
        Self { limits }
    }

    pub fn compile(&self, request: &AnalysisRequest) -> Result<CompiledAnalysis, ContractError> {
        let compiled = match request.target() {
            AnalysisTarget::Scoped(kind, scoped) => {
                CompiledAnalysis::Scoped(self.scoped(kind, scoped)?)
            }
            AnalysisTarget::MeetingNotes(notes) => {
                CompiledAnalysis::ParseMeetingNotes(meeting_notes(&notes.params)?)
            }
        };
        debug!(analysis = compiled.type_name(), "Compiled analysis");
        Ok(compiled)
    }

    fn scoped(
        &self,
        kind: ScopedAnalysisKind,
        request: &ScopedRequest,
    ) -> Result<ScopedAnalysis, ContractError> {
        let scope = &request.scope;
        let entity = kind.dataset_entity();
        let mut filters = FilterSet::new();

        if !scope.include_completed.unwrap_or(includes_completed(kind)) {
            filters.insert(FilterProperty::Completed, FilterValue::Bool(false))?;
        }
        match kind {
            ScopedAnalysisKind::OverdueAnalysis => {
                filters.insert(
                    FilterProperty::DueDate,
                    FilterValue::DateRange(DateRange::before(DateBound::Now)),
                )?;
                filters.insert(FilterProperty::Completed, FilterValue::Bool(false))?;
            }
            ScopedAnalysisKind::RecurringTasks => {
                filters.insert(FilterProperty::HasRepetition, FilterValue::Bool(true))?;
            }
            ScopedAnalysisKind::ProductivityStats
            | ScopedAnalysisKind::TaskVelocity
            | ScopedAnalysisKind::PatternAnalysis
            | ScopedAnalysisKind::WorkflowAnalysis
            | ScopedAnalysisKind::ManageReviews => {}
        }

        if let Some(range) = &scope.date_range {
            let property = date_property(kind);
            let window = DateRange::absolute_between(property.name(), &range.start, &range.end)?;
            filters.insert(property, FilterValue::DateRange(window))?;
        }

        if !scope.tags.is_empty() {
            filters.insert(
                FilterProperty::Tags,
                FilterValue::TagSet {
                    tags: scope.tags.clone(),
                    operator: TagOperator::Or,
                },
            )?;
        }
        // Several projects are matched by the analyzer; one narrows a task scan.
        // Project datasets are always narrowed by name in the analyzer.
        if let ([project], QueryEntity::Tasks) = (scope.projects.as_slice(), entity) {
            filters.insert(
                FilterProperty::Project,
                FilterValue::OptionalText(Some(project.clone())),
            )?;
        }
        filters.validate_for(entity.entity_type())?;

        let dataset = CompiledQuery {
            entity,
            mode: QueryMode::All,
            filters,
            fields: dataset_fields(kind),
            sort: Vec::new(),
            limit: self.limits.candidate_cap,
            offset: 0,
            count_only: false,
        };

        Ok(ScopedAnalysis {
            kind,
            scope: scope.clone(),
            params: request.params.clone(),
            dataset,
        })
    }
}

fn includes_completed(kind: ScopedAnalysisKind) -> bool {
    match kind {
        ScopedAnalysisKind::ProductivityStats
        | ScopedAnalysisKind::TaskVelocity
        | ScopedAnalysisKind::PatternAnalysis => true,
        ScopedAnalysisKind::OverdueAnalysis
        | ScopedAnalysisKind::WorkflowAnalysis
        | ScopedAnalysisKind::RecurringTasks
        | ScopedAnalysisKind::ManageReviews => false,
    }
}

/// Date the scope's `dateRange` narrows
fn date_property(kind: ScopedAnalysisKind) -> FilterProperty {
    match kind {
        ScopedAnalysisKind::ProductivityStats | ScopedAnalysisKind::TaskVelocity => {
            FilterProperty::CompletionDate
        }
        ScopedAnalysisKind::OverdueAnalysis => FilterProperty::DueDate,
        ScopedAnalysisKind::PatternAnalysis
        | ScopedAnalysisKind::WorkflowAnalysis
        | ScopedAnalysisKind::RecurringTasks
        | ScopedAnalysisKind::ManageReviews => FilterProperty::Modified,
    }
}

fn dataset_fields(kind: ScopedAnalysisKind) -> Vec<OutputField> {
    use OutputField as F;
    match kind.dataset_entity() {
        QueryEntity::Projects => vec![F::Id, F::Name, F::Status, F::Folder, F::TaskCount, F::Modified],
        QueryEntity::Tasks | QueryEntity::Tags => {
            let mut fields = vec![
                F::Id,
                F::Name,
                F::Completed,
                F::Flagged,
                F::DueDate,
                F::Tags,
                F::Project,
                F::EstimatedMinutes,
            ];
            match kind {
                ScopedAnalysisKind::ProductivityStats | ScopedAnalysisKind::TaskVelocity => {
                    fields.push(F::CompletionDate)
                }
                ScopedAnalysisKind::RecurringTasks => fields.push(F::RepetitionRule),
                ScopedAnalysisKind::OverdueAnalysis
                | ScopedAnalysisKind::PatternAnalysis
                | ScopedAnalysisKind::WorkflowAnalysis
                | ScopedAnalysisKind::ManageReviews => {}
            }
            fields
        }
    }
}

fn meeting_notes(params: &MeetingNotesParams) -> Result<MeetingNotesParams, ContractError> {
    if params.text.trim().is_empty() {
        return Err(ContractError::InvalidValue {
            field: "params.text".to_string(),
            expected: "non-empty text".to_string(),
            found: "empty string".to_string(),
        });
    }
    Ok(params.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheCategory;
    use serde_json::{json, Value};

    fn request(v: Value) -> AnalysisRequest {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_overdue_dataset() {
        let compiled = AnalysisCompiler::default()
            .compile(&request(json!({
                "type": "overdue_analysis",
                "scope": {"tags": ["work"]}
            })))
            .unwrap();
        let CompiledAnalysis::Scoped(analysis) = &compiled else {
            panic!("expected scoped analysis");
        };
        assert_eq!(analysis.dataset.entity, QueryEntity::Tasks);
        assert_eq!(analysis.dataset.filters.completed(), Some(false));
        assert!(analysis.dataset.filters.contains(FilterProperty::DueDate));
        assert!(analysis.dataset.filters.contains(FilterProperty::Tags));
        assert_eq!(
            compiled.cache_slot().map(|(c, _)| c),
            Some(CacheCategory::Analytics)
        );
    }

    #[test]
    fn test_reviews_scan_projects() {
        let compiled = AnalysisCompiler::default()
            .compile(&request(json!({"type": "manage_reviews"})))
            .unwrap();
        let CompiledAnalysis::Scoped(analysis) = &compiled else {
            panic!("expected scoped analysis");
        };
        assert_eq!(analysis.dataset.entity, QueryEntity::Projects);
        assert_eq!(
            compiled.cache_slot().map(|(c, _)| c),
            Some(CacheCategory::Reviews)
        );
    }

    #[test]
    fn test_review_scope_skips_task_project_filter() {
        let compiled = AnalysisCompiler::default()
            .compile(&request(json!({
                "type": "manage_reviews",
                "scope": {"projects": ["Ops"]}
            })))
            .unwrap();
        let CompiledAnalysis::Scoped(analysis) = &compiled else {
            panic!("expected scoped analysis");
        };
        assert!(!analysis.dataset.filters.contains(FilterProperty::Project));
        assert_eq!(analysis.scope.projects, vec!["Ops".to_string()]);
    }

    #[test]
    fn test_date_range_validated() {
        let err = AnalysisCompiler::default()
            .compile(&request(json!({
                "type": "productivity_stats",
                "scope": {"dateRange": {"start": "2026-13-01", "end": "2026-12-31"}}
            })))
            .unwrap_err();
        assert!(matches!(err, ContractError::InvalidDate { .. }));

        let err = AnalysisCompiler::default()
            .compile(&request(json!({
                "type": "productivity_stats",
                "scope": {"dateRange": {"start": "2026-12-31", "end": "2026-01-01"}}
            })))
            .unwrap_err();
        assert!(
            matches!(err, ContractError::InvalidDate { ref reason, .. } if reason.contains("after range end"))
        );
    }

    #[test]
    fn test_meeting_notes_passthrough() {
        let compiled = AnalysisCompiler::default()
            .compile(&request(json!({
                "type": "parse_meeting_notes",
                "params": {"text": "- [ ] send deck", "defaultProject": "Q4"}
            })))
            .unwrap();
        assert!(compiled.cache_slot().is_none());
        assert_eq!(compiled.operation_name(), "analysis:parse_meeting_notes");

        assert!(AnalysisCompiler::default()
            .compile(&request(json!({
                "type": "parse_meeting_notes", "params": {"text": "  "}
            })))
            .is_err());
    }
}
