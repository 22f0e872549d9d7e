//! Analysis collaborator
//!
//! The façade hands an analyzer the records a scoped analysis's dataset query
//! returned. `RollupAnalyzer` only counts; richer heuristics plug in through
//! the `Analyzer` trait.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::contract::{MeetingNotesParams, QueryEntity, ScopedAnalysis};

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Summarize the dataset records of a scoped analysis
    async fn analyze(&self, analysis: &ScopedAnalysis, records: &[Map<String, Value>]) -> Value;

    /// Extract action items from free text; never touches the application
    fn parse_meeting_notes(&self, params: &MeetingNotesParams) -> Value;
}

/// Counts and tallies, no judgement
#[derive(Debug, Clone, Default)]
pub struct RollupAnalyzer;

#[async_trait]
impl Analyzer for RollupAnalyzer {
    async fn analyze(&self, analysis: &ScopedAnalysis, records: &[Map<String, Value>]) -> Value {
        let records: Vec<&Map<String, Value>> = records
            .iter()
            .filter(|r| in_project_scope(r, analysis.dataset.entity, &analysis.scope.projects))
            .collect();

        let summary = match analysis.dataset.entity {
            QueryEntity::Projects => project_rollup(&records),
            QueryEntity::Tasks | QueryEntity::Tags => task_rollup(&records, Utc::now()),
        };
        json!({
            "type": analysis.kind.as_str(),
            "scope": analysis.scope,
            "summary": summary,
        })
    }

    fn parse_meeting_notes(&self, params: &MeetingNotesParams) -> Value {
        let items: Vec<Value> = extract_action_items(&params.text)
            .into_iter()
            .map(|name| {
                let mut data = Map::new();
                data.insert("name".into(), Value::String(name));
                if let Some(project) = &params.default_project {
                    data.insert("project".into(), Value::String(project.clone()));
                }
                if !params.default_tags.is_empty() {
                    data.insert("tags".into(), json!(params.default_tags));
                }
                json!({"operation": "create", "target": "task", "data": data})
            })
            .collect();
        json!({"count": items.len(), "actionItems": items})
    }
}

/// Scoped projects matched by name, case-insensitively.
///
/// Task datasets are already narrowed when only one project is scoped;
/// project datasets are always matched on their own `name`.
fn in_project_scope(record: &Map<String, Value>, entity: QueryEntity, projects: &[String]) -> bool {
    let key = match entity {
        QueryEntity::Projects if !projects.is_empty() => "name",
        _ if projects.len() < 2 => return true,
        _ => "project",
    };
    let Some(name) = record.get(key).and_then(Value::as_str) else {
        return false;
    };
    projects.iter().any(|p| p.eq_ignore_ascii_case(name))
}

fn flag(record: &Map<String, Value>, key: &str) -> bool {
    record.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn task_rollup(records: &[&Map<String, Value>], now: DateTime<Utc>) -> Value {
    let mut completed = 0usize;
    let mut flagged = 0usize;
    let mut overdue = 0usize;
    let mut recurring = 0usize;
    let mut estimated_minutes = 0u64;
    let mut by_project: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_tag: BTreeMap<String, usize> = BTreeMap::new();

    for record in records {
        let done = flag(record, "completed");
        if done {
            completed += 1;
        }
        if flag(record, "flagged") {
            flagged += 1;
        }
        let due = record
            .get("dueDate")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
        if !done && due.is_some_and(|d| d < now) {
            overdue += 1;
        }
        if record.get("repetitionRule").is_some_and(|r| !r.is_null()) {
            recurring += 1;
        }
        estimated_minutes += record
            .get("estimatedMinutes")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let project = record
            .get("project")
            .and_then(Value::as_str)
            .unwrap_or("(no project)");
        *by_project.entry(project.to_string()).or_default() += 1;
        for tag in record
            .get("tags")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
        {
            *by_tag.entry(tag.to_string()).or_default() += 1;
        }
    }

    let total = records.len();
    json!({
        "total": total,
        "completed": completed,
        "remaining": total - completed,
        "flagged": flagged,
        "overdue": overdue,
        "recurring": recurring,
        "estimatedMinutes": estimated_minutes,
        "byProject": by_project,
        "byTag": by_tag,
    })
}

fn project_rollup(records: &[&Map<String, Value>]) -> Value {
    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_folder: BTreeMap<String, usize> = BTreeMap::new();
    let mut empty = 0usize;
    for record in records {
        let status = record
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        *by_status.entry(status.to_string()).or_default() += 1;
        let folder = record
            .get("folder")
            .and_then(Value::as_str)
            .unwrap_or("(top level)");
        *by_folder.entry(folder.to_string()).or_default() += 1;
        if record.get("taskCount").and_then(Value::as_u64) == Some(0) {
            empty += 1;
        }
    }
    json!({
        "total": records.len(),
        "withoutTasks": empty,
        "byStatus": by_status,
        "byFolder": by_folder,
    })
}

static ACTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:[-*]\s*\[\s\]|todo:|action:)\s*(.+?)\s*$")
        .expect("valid action item regex")
});

/// Lines starting with `- [ ]`, `* [ ]`, `TODO:` or `Action:`
pub fn extract_action_items(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| ACTION_LINE.captures(line))
        .map(|caps| caps[1].to_string())
        .filter(|item| !item.is_empty())
        .collect()
}
