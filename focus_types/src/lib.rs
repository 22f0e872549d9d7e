//! Focus Types - Level 1 Foundation Types
//!
//! Plain data structures shared between the focus-bridge engine and anything
//! that consumes its responses.
//!
//! ## Architecture Level: LEVEL 1 (Foundation)
//!
//! This crate sits at the bottom of the workspace. The engine depends on it;
//! it depends on nothing in the workspace.
//!
//! ## Contents
//!
//! - Entity types addressed by requests
//! - The closed error-code taxonomy
//! - The uniform response envelope (`success` / `data` / `error` / `metadata`)
//!
//! ## Rules
//!
//! 1. **NO BUSINESS LOGIC** - only data structures, constructors and accessors
//! 2. **NO WORKSPACE DEPENDENCIES**
//! 3. **SERIALIZABLE** - every type round-trips through serde

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// ENTITY TYPES
// ============================================================================

/// Entities the target application exposes to automation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Task,
    Project,
    Tag,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Task => "task",
            EntityType::Project => "project",
            EntityType::Tag => "tag",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// ERROR TAXONOMY
// ============================================================================

/// Closed set of error codes carried by a failed response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request failed schema or specification checks; no script was run
    ValidationError,
    /// Target application is not launched
    NotRunning,
    /// Automation permission has not been granted
    PermissionDenied,
    /// Script did not finish within its deadline
    Timeout,
    /// Circuit breaker is open; no process was spawned
    CircuitOpen,
    /// The script itself reported a domain failure
    ScriptError,
    /// Process-level I/O failure that survived every retry
    Transient,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NotRunning => "NOT_RUNNING",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::CircuitOpen => "CIRCUIT_OPEN",
            ErrorCode::ScriptError => "SCRIPT_ERROR",
            ErrorCode::Transient => "TRANSIENT",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// RESPONSE ENVELOPE
// ============================================================================

/// Error block of a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ErrorPayload {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Metadata present on every response, success or failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Operation name, e.g. `query:tasks` or `mutation:update`
    pub operation: String,
    pub timestamp: DateTime<Utc>,
    pub from_cache: bool,
    pub query_time_ms: u64,
    /// Operation-specific extras (counts, cache category, attempts)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ResponseMetadata {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            timestamp: Utc::now(),
            from_cache: false,
            query_time_ms: 0,
            extra: BTreeMap::new(),
        }
    }
}

/// Uniform response wrapper returned to every external caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    pub metadata: ResponseMetadata,
}

impl<T> ResponseEnvelope<T> {
    /// Successful response carrying `data`
    pub fn success(operation: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: ResponseMetadata::new(operation),
        }
    }

    /// Failed response carrying a structured error
    pub fn failure(operation: impl Into<String>, error: ErrorPayload) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            metadata: ResponseMetadata::new(operation),
        }
    }

    pub fn with_query_time(mut self, query_time_ms: u64) -> Self {
        self.metadata.query_time_ms = query_time_ms;
        self
    }

    pub fn from_cache(mut self, from_cache: bool) -> Self {
        self.metadata.from_cache = from_cache;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.extra.insert(key.into(), value.into());
        self
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_error_code_wire_names() {
        assert_eq!(
            serde_json::to_value(ErrorCode::ValidationError).unwrap(),
            json!("VALIDATION_ERROR")
        );
        assert_eq!(
            serde_json::to_value(ErrorCode::CircuitOpen).unwrap(),
            json!("CIRCUIT_OPEN")
        );
        assert_eq!(ErrorCode::PermissionDenied.to_string(), "PERMISSION_DENIED");
    }

    #[test]
    fn test_success_envelope_shape() {
        let env = ResponseEnvelope::success("query:tasks", json!({"tasks": []}))
            .with_query_time(12)
            .with_extra("count", 0);
        let value = serde_json::to_value(&env).unwrap();

        assert_eq!(value["success"], json!(true));
        assert_eq!(value["data"], json!({"tasks": []}));
        assert!(value.get("error").is_none());
        assert_eq!(value["metadata"]["operation"], json!("query:tasks"));
        assert_eq!(value["metadata"]["fromCache"], json!(false));
        assert_eq!(value["metadata"]["queryTimeMs"], json!(12));
        assert_eq!(value["metadata"]["count"], json!(0));
    }

    #[test]
    fn test_failure_envelope_shape() {
        let env: ResponseEnvelope<Value> = ResponseEnvelope::failure(
            "mutation:create",
            ErrorPayload::new(ErrorCode::NotRunning, "application is not running")
                .with_suggestion("Launch the application and retry"),
        );
        let value = serde_json::to_value(&env).unwrap();

        assert_eq!(value["success"], json!(false));
        assert!(value.get("data").is_none());
        assert_eq!(value["error"]["code"], json!("NOT_RUNNING"));
        assert_eq!(
            value["error"]["suggestion"],
            json!("Launch the application and retry")
        );
        assert_eq!(env.error_code(), Some(ErrorCode::NotRunning));
    }

    #[test]
    fn test_entity_type_serde() {
        let parsed: EntityType = serde_json::from_value(json!("project")).unwrap();
        assert_eq!(parsed, EntityType::Project);
        assert_eq!(EntityType::Task.to_string(), "task");
    }
}
