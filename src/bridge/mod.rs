//! Execution bridge
//!
//! ```text
//! template + params ──build_script──▶ script ──ScriptRunner──▶ stdout/stderr
//!                                                   │
//!                      circuit breaker / retry ◀────┤
//!                                                   ▼
//!                       unwrap_script_output ──▶ ScriptExecutionResult
//! ```

pub mod circuit;
pub mod classify;
pub mod envelope;
pub mod executor;
pub mod retry;
pub mod runner;
pub mod template;

pub use circuit::{CircuitBreaker, CircuitOpen, CircuitPermit, CircuitState};
pub use classify::ErrorClassifier;
pub use envelope::unwrap_script_output;
pub use executor::{ExecutionBridge, ExecutionDiagnostics, ExecutionOutcome, ScriptExecutionResult};
pub use retry::RetryPolicy;
pub use runner::{OsascriptRunner, RawOutput, RunOutcome, ScriptRunner};
pub use template::{build_script, js_literal, placeholders, ScriptParams};
