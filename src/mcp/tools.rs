//! MCP Tool Definitions
//!
//! Schemas are descriptive; the request compilers do the real validation and
//! reject unknown fields.

use serde_json::json;

use super::protocol::Tool;

pub const QUERY_TOOL: &str = "focus_query";
pub const MUTATE_TOOL: &str = "focus_mutate";
pub const ANALYZE_TOOL: &str = "focus_analyze";

/// Get all available MCP tools
pub fn get_tools() -> Vec<Tool> {
    let date_range = json!({
        "type": "object",
        "properties": {
            "before": {"type": "string"},
            "after": {"type": "string"},
            "between": {"type": "array", "items": {"type": "string"}, "minItems": 2, "maxItems": 2}
        },
        "additionalProperties": false
    });

    vec![
        Tool {
            name: QUERY_TOOL.into(),
            description: "Query tasks, projects or tags. Modes expand into filters; \
                          results are cached per category."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "type": {"type": "string", "enum": ["tasks", "projects", "tags"]},
                    "mode": {
                        "type": "string",
                        "enum": ["all", "inbox", "flagged", "available", "today", "overdue", "upcoming", "search"],
                        "default": "all"
                    },
                    "filters": {
                        "type": "object",
                        "properties": {
                            "status": {"type": "string"},
                            "tags": {
                                "type": "object",
                                "properties": {
                                    "any": {"type": "array", "items": {"type": "string"}},
                                    "all": {"type": "array", "items": {"type": "string"}},
                                    "none": {"type": "array", "items": {"type": "string"}}
                                }
                            },
                            "text": {"type": "string"},
                            "search": {"type": "string"},
                            "project": {"type": ["string", "null"]},
                            "projectId": {"type": "string"},
                            "folder": {"type": "string"},
                            "flagged": {"type": "boolean"},
                            "available": {"type": "boolean"},
                            "blocked": {"type": "boolean"},
                            "inInbox": {"type": "boolean"},
                            "hasRepetition": {"type": "boolean"},
                            "daysAhead": {"type": "integer", "minimum": 1, "maximum": 365},
                            "dueDate": date_range,
                            "deferDate": date_range,
                            "plannedDate": date_range,
                            "completionDate": date_range,
                            "modified": date_range
                        }
                    },
                    "fields": {"type": "array", "items": {"type": "string"}},
                    "sort": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "field": {"type": "string"},
                                "direction": {"type": "string", "enum": ["asc", "desc"]}
                            },
                            "required": ["field"]
                        }
                    },
                    "limit": {"type": "integer", "minimum": 1, "maximum": 500, "default": 25},
                    "offset": {"type": "integer", "minimum": 0, "default": 0},
                    "countOnly": {"type": "boolean", "default": false}
                },
                "required": ["type"]
            }),
        },
        Tool {
            name: MUTATE_TOOL.into(),
            description: "Create, update, complete or delete tasks and projects, singly or in \
                          a sequential batch."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "operation": {
                        "type": "string",
                        "enum": ["create", "update", "complete", "delete", "batch"]
                    },
                    "target": {"type": "string", "enum": ["task", "project"]},
                    "id": {"type": "string"},
                    "data": {"type": "object"},
                    "changes": {"type": "object"},
                    "completionDate": {"type": "string"},
                    "operations": {"type": "array", "items": {"type": "object"}},
                    "stopOnError": {"type": "boolean", "default": false}
                },
                "required": ["operation"]
            }),
        },
        Tool {
            name: ANALYZE_TOOL.into(),
            description: "Run a scoped analysis over the task database, or extract action \
                          items from meeting notes."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "type": {
                        "type": "string",
                        "enum": [
                            "productivity_stats", "task_velocity", "overdue_analysis",
                            "pattern_analysis", "workflow_analysis", "recurring_tasks",
                            "manage_reviews", "parse_meeting_notes"
                        ]
                    },
                    "scope": {
                        "type": "object",
                        "properties": {
                            "dateRange": {
                                "type": "object",
                                "properties": {
                                    "start": {"type": "string"},
                                    "end": {"type": "string"}
                                },
                                "required": ["start", "end"]
                            },
                            "tags": {"type": "array", "items": {"type": "string"}},
                            "projects": {"type": "array", "items": {"type": "string"}},
                            "includeCompleted": {"type": "boolean"}
                        }
                    },
                    "params": {"type": "object"}
                },
                "required": ["type"]
            }),
        },
    ]
}
