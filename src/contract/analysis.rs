//! Compiled analysis requests

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::query::{CompiledQuery, QueryEntity};
use crate::cache::{cache_key, CacheCategory};

/// Analyses that run over a scoped dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopedAnalysisKind {
    ProductivityStats,
    TaskVelocity,
    OverdueAnalysis,
    PatternAnalysis,
    WorkflowAnalysis,
    RecurringTasks,
    ManageReviews,
}

impl ScopedAnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopedAnalysisKind::ProductivityStats => "productivity_stats",
            ScopedAnalysisKind::TaskVelocity => "task_velocity",
            ScopedAnalysisKind::OverdueAnalysis => "overdue_analysis",
            ScopedAnalysisKind::PatternAnalysis => "pattern_analysis",
            ScopedAnalysisKind::WorkflowAnalysis => "workflow_analysis",
            ScopedAnalysisKind::RecurringTasks => "recurring_tasks",
            ScopedAnalysisKind::ManageReviews => "manage_reviews",
        }
    }

    /// Collection the dataset query walks
    pub fn dataset_entity(&self) -> QueryEntity {
        match self {
            ScopedAnalysisKind::ManageReviews => QueryEntity::Projects,
            _ => QueryEntity::Tasks,
        }
    }

    pub fn cache_category(&self) -> CacheCategory {
        match self {
            ScopedAnalysisKind::ManageReviews => CacheCategory::Reviews,
            _ => CacheCategory::Analytics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeDateRange {
    pub start: String,
    pub end: String,
}

/// Optional narrowing shared by every scoped analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnalysisScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<ScopeDateRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_completed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MeetingNotesParams {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_project: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedAnalysis {
    pub kind: ScopedAnalysisKind,
    pub scope: AnalysisScope,
    pub params: Map<String, Value>,
    /// Query whose result the analyzer consumes
    pub dataset: CompiledQuery,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompiledAnalysis {
    Scoped(ScopedAnalysis),
    /// Text extraction only; never touches the application
    ParseMeetingNotes(MeetingNotesParams),
}

impl CompiledAnalysis {
    pub fn type_name(&self) -> &'static str {
        match self {
            CompiledAnalysis::Scoped(a) => a.kind.as_str(),
            CompiledAnalysis::ParseMeetingNotes(_) => "parse_meeting_notes",
        }
    }

    pub fn operation_name(&self) -> String {
        format!("analysis:{}", self.type_name())
    }

    /// Cache placement for analyses that read the application
    pub fn cache_slot(&self) -> Option<(CacheCategory, String)> {
        match self {
            CompiledAnalysis::Scoped(a) => Some((a.kind.cache_category(), cache_key(a))),
            CompiledAnalysis::ParseMeetingNotes(_) => None,
        }
    }
}
