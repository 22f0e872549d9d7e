//! Analyses through the façade
//!
//! Run with: cargo test --test analysis_integration

mod helpers;

use std::sync::Arc;

use async_trait::async_trait;
use helpers::{engine, Reply, ScriptedRunner};
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};

use focus_bridge::contract::{MeetingNotesParams, ScopedAnalysis};
use focus_bridge::{Analyzer, ErrorCode};

#[tokio::test]
async fn overdue_analysis_rolls_up_and_caches() {
    let runner = ScriptedRunner::always(Reply::json(json!({
        "count": 2,
        "truncated": false,
        "items": [
            {"id": "a", "completed": false, "flagged": true, "dueDate": "2020-01-01T00:00:00.000Z", "project": "Ops", "tags": ["work"]},
            {"id": "b", "completed": false, "flagged": false, "dueDate": "2020-02-01T00:00:00.000Z", "project": null, "tags": []}
        ]
    })));
    let tools = engine(runner.clone());
    let request = json!({"analysis": {"type": "overdue_analysis", "scope": {"tags": ["work"]}}});

    let response = tools.handle_value(request.clone()).await;
    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.metadata.operation, "analysis:overdue_analysis");
    let data = response.data.unwrap();
    assert_eq!(data["type"], json!("overdue_analysis"));
    assert_eq!(data["summary"]["total"], json!(2));
    assert_eq!(data["summary"]["overdue"], json!(2));
    assert_eq!(data["summary"]["flagged"], json!(1));

    let again = tools.handle_value(request).await;
    assert!(again.metadata.from_cache);
    assert_eq!(again.metadata.extra["cacheCategory"], json!("analytics"));
    assert_eq!(runner.calls(), 1);
}

#[tokio::test]
async fn task_mutation_invalidates_analytics() {
    let runner = ScriptedRunner::new(|script, _| {
        if script.contains("function findOrCreateTag") {
            Reply::json(json!({"id": "new"}))
        } else {
            Reply::json(json!({"count": 0, "truncated": false, "items": []}))
        }
    });
    let tools = engine(runner.clone());
    let request = json!({"analysis": {"type": "productivity_stats"}});

    tools.handle_value(request.clone()).await;
    tools
        .handle_value(json!({"mutation": {
            "operation": "create", "target": "task", "data": {"name": "Plan"}
        }}))
        .await;
    let after = tools.handle_value(request).await;
    assert!(!after.metadata.from_cache);
    assert_eq!(runner.calls(), 3);
}

#[tokio::test]
async fn meeting_notes_never_touch_the_host() {
    let runner = ScriptedRunner::always(Reply::json(json!({})));
    let tools = engine(runner.clone());

    let response = tools
        .handle_value(json!({"analysis": {
            "type": "parse_meeting_notes",
            "params": {"text": "Agenda\n- [ ] Draft budget\nAction: email Sam", "defaultTags": ["followup"]}
        }}))
        .await;
    assert!(response.success);
    let data = response.data.unwrap();
    assert_eq!(data["count"], json!(2));
    assert_eq!(data["actionItems"][1]["data"]["name"], json!("email Sam"));
    assert_eq!(runner.calls(), 0);
}

#[tokio::test]
async fn unknown_analysis_type_is_a_validation_error() {
    let tools = engine(ScriptedRunner::always(Reply::json(json!({}))));
    let response = tools
        .handle_value(json!({"analysis": {"type": "mood_ring"}}))
        .await;
    assert_eq!(response.error_code(), Some(ErrorCode::ValidationError));
    assert_eq!(response.metadata.operation, "request");
}

fn review_host() -> Arc<ScriptedRunner> {
    ScriptedRunner::new(|script, _| {
        if script.contains("evaluateJavascript") {
            Reply::json(json!({"verdicts": {
                "p1": {"pass": true, "fields": {"modified": "2026-10-01T08:00:00.000Z"}},
                "p2": {"pass": true, "fields": {"modified": "2026-10-02T08:00:00.000Z"}},
                "p3": {"pass": true, "fields": {"modified": "2026-10-03T08:00:00.000Z"}}
            }}))
        } else {
            Reply::json(json!({
                "count": 3, "truncated": false,
                "items": [
                    {"id": "p1", "name": "Ops", "status": "active", "taskCount": 4},
                    {"id": "p2", "name": "Garden", "status": "onHold", "taskCount": 0},
                    {"id": "p3", "name": "Home", "status": "active", "taskCount": 2}
                ]
            }))
        }
    })
}

#[tokio::test]
async fn reviews_scoped_to_one_project() {
    let runner = review_host();
    let tools = engine(runner.clone());

    let response = tools
        .handle_value(json!({"analysis": {"type": "manage_reviews", "scope": {"projects": ["Ops"]}}}))
        .await;
    assert!(response.success, "{:?}", response.error);
    let summary = &response.data.unwrap()["summary"];
    assert_eq!(summary["total"], json!(1));
    assert_eq!(summary["byStatus"], json!({"active": 1}));
    assert_eq!(runner.calls(), 2);
}

#[tokio::test]
async fn reviews_scoped_to_several_projects() {
    let tools = engine(review_host());

    let response = tools
        .handle_value(json!({"analysis": {
            "type": "manage_reviews",
            "scope": {"projects": ["ops", "Garden"]}
        }}))
        .await;
    assert!(response.success, "{:?}", response.error);
    let summary = &response.data.unwrap()["summary"];
    assert_eq!(summary["total"], json!(2));
    assert_eq!(summary["withoutTasks"], json!(1));
}

struct CountingAnalyzer;

#[async_trait]
impl Analyzer for CountingAnalyzer {
    async fn analyze(&self, analysis: &ScopedAnalysis, records: &[Map<String, Value>]) -> Value {
        json!({"kind": analysis.kind.as_str(), "records": records.len()})
    }

    fn parse_meeting_notes(&self, _params: &MeetingNotesParams) -> Value {
        json!({"count": 0, "actionItems": []})
    }
}

#[tokio::test]
async fn custom_analyzer_receives_the_dataset() {
    // Project datasets read `modified`, so a secondary batch follows
    let runner = ScriptedRunner::new(|script, _| {
        if script.contains("evaluateJavascript") {
            Reply::json(json!({"verdicts": {
                "p": {"pass": true, "fields": {"modified": "2026-10-01T08:00:00.000Z"}}
            }}))
        } else {
            Reply::json(json!({
                "count": 1, "truncated": false,
                "items": [{"id": "p", "name": "Review", "status": "active", "taskCount": 0}]
            }))
        }
    });
    let tools = engine(runner.clone()).with_analyzer(Arc::new(CountingAnalyzer));

    let response = tools
        .handle_value(json!({"analysis": {"type": "manage_reviews"}}))
        .await;
    assert_eq!(
        response.data,
        Some(json!({"kind": "manage_reviews", "records": 1}))
    );
    assert_eq!(response.metadata.extra["cacheCategory"], json!("reviews"));
    assert_eq!(runner.calls(), 2);
}
