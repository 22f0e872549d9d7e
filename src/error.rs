//! Error handling for the focus-bridge engine
//!
//! Each layer owns a thiserror enum; `FocusError` sits on top and maps every
//! failure onto the closed `ErrorCode` taxonomy that callers see.

use focus_types::{EntityType, ErrorCode};
use thiserror::Error;

use crate::bridge::ExecutionDiagnostics;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum FocusError {
    #[error("Validation error: {0}")]
    Contract(#[from] ContractError),

    #[error("Script build error: {0}")]
    Build(#[from] ScriptBuildError),

    #[error("{0}")]
    Bridge(#[from] BridgeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FocusError {
    /// Error code reported in the response envelope
    pub fn code(&self) -> ErrorCode {
        match self {
            FocusError::Contract(_) => ErrorCode::ValidationError,
            FocusError::Build(_) => ErrorCode::Unknown,
            FocusError::Bridge(e) => e.kind.code(),
            FocusError::Serialization(_) => ErrorCode::Unknown,
        }
    }

    /// Human-actionable hint derived from the classification, never from raw
    /// process output
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            FocusError::Contract(_) => {
                Some("Check the request against the tool schema; unknown fields are rejected")
            }
            FocusError::Build(_) | FocusError::Serialization(_) => None,
            FocusError::Bridge(e) => e.kind.suggestion(),
        }
    }
}

// =============================================================================
// CONTRACT (SPECIFICATION) ERRORS
// =============================================================================

/// Violations of the filter/mutation specification, raised before any script
/// is generated
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    #[error("Unknown filter '{key}' for {entity} queries")]
    UnknownFilter { key: String, entity: EntityType },

    #[error("Filter '{property}' does not apply to {entity} queries")]
    FilterNotApplicable {
        property: &'static str,
        entity: EntityType,
    },

    #[error("Invalid value for '{field}': expected {expected}, found {found}")]
    InvalidValue {
        field: String,
        expected: String,
        found: String,
    },

    #[error("Operator {operator} is not supported by '{property}'")]
    UnsupportedOperator {
        property: &'static str,
        operator: String,
    },

    #[error("Missing required field '{field}' for {context}")]
    MissingField { field: String, context: String },

    #[error("Unknown field '{field}' for {context}")]
    UnknownField { field: String, context: String },

    #[error("Property '{property}' cannot be changed on a {entity}")]
    PropertyNotMutable { property: String, entity: EntityType },

    #[error("Invalid date '{value}' for '{field}': {reason}")]
    InvalidDate {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Batch must contain between 1 and {max} operations, found {found}")]
    BatchSize { max: usize, found: usize },

    #[error("Batch operation {index} cannot itself be a batch")]
    NestedBatch { index: usize },

    #[error("Invalid batch: {}", summarize_batch(.failures))]
    BatchOperations { failures: Vec<(usize, ContractError)> },

    #[error("Request does not match schema: {message}")]
    Schema { message: String },
}

impl ContractError {
    pub fn invalid_value(
        field: impl Into<String>,
        expected: impl Into<String>,
        found: &serde_json::Value,
    ) -> Self {
        ContractError::InvalidValue {
            field: field.into(),
            expected: expected.into(),
            found: describe_json(found),
        }
    }
}

impl From<serde_json::Error> for ContractError {
    fn from(error: serde_json::Error) -> Self {
        ContractError::Schema {
            message: error.to_string(),
        }
    }
}

fn summarize_batch(failures: &[(usize, ContractError)]) -> String {
    failures
        .iter()
        .map(|(index, error)| format!("[{}] {}", index, error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Short type description of a JSON value for error messages
pub(crate) fn describe_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => format!("boolean {}", b),
        serde_json::Value::Number(n) => format!("number {}", n),
        serde_json::Value::String(s) if s.len() > 40 => "string".to_string(),
        serde_json::Value::String(s) => format!("string \"{}\"", s),
        serde_json::Value::Array(_) => "array".to_string(),
        serde_json::Value::Object(_) => "object".to_string(),
    }
}

// =============================================================================
// SCRIPT BUILD ERRORS
// =============================================================================

/// Failures while substituting parameters into a script template
#[derive(Error, Debug)]
pub enum ScriptBuildError {
    #[error("No value supplied for placeholder(s): {}", .names.join(", "))]
    MissingParameters { names: Vec<String> },

    #[error("Parameter '{name}' could not be encoded: {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

// =============================================================================
// EXECUTION BRIDGE ERRORS
// =============================================================================

/// Closed classification of execution failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotRunning,
    PermissionDenied,
    Timeout,
    ScriptError,
    Transient,
    CircuitOpen,
    Unknown,
}

impl ErrorKind {
    pub fn code(&self) -> ErrorCode {
        match self {
            ErrorKind::NotRunning => ErrorCode::NotRunning,
            ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            ErrorKind::Timeout => ErrorCode::Timeout,
            ErrorKind::ScriptError => ErrorCode::ScriptError,
            ErrorKind::Transient => ErrorCode::Transient,
            ErrorKind::CircuitOpen => ErrorCode::CircuitOpen,
            ErrorKind::Unknown => ErrorCode::Unknown,
        }
    }

    /// Only process-level hiccups are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Timeout)
    }

    /// Whether a failed attempt of this kind counts toward opening the circuit.
    /// `ScriptError` and `PermissionDenied` mean the process answered.
    pub fn trips_breaker(&self) -> bool {
        match self {
            ErrorKind::Transient
            | ErrorKind::Timeout
            | ErrorKind::NotRunning
            | ErrorKind::Unknown => true,
            ErrorKind::ScriptError | ErrorKind::PermissionDenied | ErrorKind::CircuitOpen => false,
        }
    }

    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ErrorKind::NotRunning => Some("Launch the task application and retry"),
            ErrorKind::PermissionDenied => Some(
                "Grant automation permission in System Settings > Privacy & Security > Automation",
            ),
            ErrorKind::Timeout => {
                Some("The application took too long to respond; narrow the query or retry later")
            }
            ErrorKind::ScriptError => {
                Some("Check that the referenced task or project still exists")
            }
            ErrorKind::Transient => Some("Temporary communication failure; retry the request"),
            ErrorKind::CircuitOpen => Some(
                "Repeated failures talking to the application; wait a moment before retrying",
            ),
            ErrorKind::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.code().as_str()
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized failure of a script execution
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct BridgeError {
    pub kind: ErrorKind,
    pub message: String,
    pub diagnostics: ExecutionDiagnostics,
}

impl BridgeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            diagnostics: ExecutionDiagnostics::default(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FocusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_errors_are_validation() {
        let err: FocusError = ContractError::UnknownFilter {
            key: "colour".into(),
            entity: EntityType::Task,
        }
        .into();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn test_bridge_error_code_follows_kind() {
        let err: FocusError = BridgeError::new(ErrorKind::PermissionDenied, "-1743").into();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert!(err.suggestion().unwrap().contains("Automation"));
    }

    #[test]
    fn test_retry_and_breaker_classes() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(!ErrorKind::ScriptError.is_retryable());
        assert!(!ErrorKind::NotRunning.is_retryable());

        assert!(ErrorKind::NotRunning.trips_breaker());
        assert!(!ErrorKind::ScriptError.trips_breaker());
        assert!(!ErrorKind::PermissionDenied.trips_breaker());
    }

    #[test]
    fn test_batch_summary_lists_indices() {
        let err = ContractError::BatchOperations {
            failures: vec![
                (
                    0,
                    ContractError::MissingField {
                        field: "name".into(),
                        context: "task create".into(),
                    },
                ),
                (2, ContractError::NestedBatch { index: 2 }),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("[0] Missing required field 'name'"));
        assert!(text.contains("[2] Batch operation 2"));
    }
}
