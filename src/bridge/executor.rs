//! Execution bridge
//!
//! Runs complete scripts through a `ScriptRunner` behind the circuit breaker,
//! retries what is worth retrying, and normalizes every run into a
//! `ScriptExecutionResult`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use super::circuit::{CircuitBreaker, CircuitState};
use super::classify::ErrorClassifier;
use super::envelope::unwrap_script_output;
use super::retry::RetryPolicy;
use super::runner::{RunOutcome, ScriptRunner};
use super::template::{build_script, ScriptParams};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, ErrorKind, ScriptBuildError};
use crate::script::secondary::evaluate_wrapper;

/// Longest stderr excerpt kept in messages and diagnostics
const STDERR_LIMIT: usize = 500;

/// What happened while running one script, across all attempts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDiagnostics {
    /// Processes spawned; zero when the circuit rejected the call
    pub attempts: u32,
    pub duration_ms: u64,
    pub script_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl ExecutionDiagnostics {
    /// Fold a follow-up execution (e.g. the secondary pass) into this one
    pub fn absorb(&mut self, other: &ExecutionDiagnostics) {
        self.attempts += other.attempts;
        self.duration_ms += other.duration_ms;
        self.script_bytes += other.script_bytes;
        if other.stderr.is_some() {
            self.stderr = other.stderr.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Ok(Value),
    Failed { kind: ErrorKind, message: String },
}

/// Normalized result of `ExecutionBridge::execute`
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptExecutionResult {
    pub outcome: ExecutionOutcome,
    pub diagnostics: ExecutionDiagnostics,
}

impl ScriptExecutionResult {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Ok(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            ExecutionOutcome::Ok(_) => None,
            ExecutionOutcome::Failed { kind, .. } => Some(*kind),
        }
    }

    pub fn into_result(self) -> Result<(Value, ExecutionDiagnostics), BridgeError> {
        match self.outcome {
            ExecutionOutcome::Ok(value) => Ok((value, self.diagnostics)),
            ExecutionOutcome::Failed { kind, message } => Err(BridgeError {
                kind,
                message,
                diagnostics: self.diagnostics,
            }),
        }
    }
}

struct AttemptFailure {
    kind: ErrorKind,
    message: String,
    stderr: Option<String>,
}

/// Admission state, updated under one lock so a call is either counted
/// before shutdown starts or refused
#[derive(Debug, Clone, Copy, Default)]
struct Gate {
    inflight: usize,
    closing: bool,
}

/// Decrements the in-flight count when a call finishes, however it finishes
struct InflightGuard<'a> {
    gate: &'a watch::Sender<Gate>,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.gate
            .send_modify(|g| g.inflight = g.inflight.saturating_sub(1));
    }
}

pub struct ExecutionBridge {
    runner: Arc<dyn ScriptRunner>,
    circuit: CircuitBreaker,
    retry: RetryPolicy,
    timeout: Duration,
    classifier: ErrorClassifier,
    gate: watch::Sender<Gate>,
}

impl ExecutionBridge {
    pub fn new(runner: Arc<dyn ScriptRunner>, config: &BridgeConfig) -> Self {
        let (gate, _) = watch::channel(Gate::default());
        Self {
            runner,
            circuit: CircuitBreaker::new(config.circuit_threshold, config.circuit_cooldown()),
            retry: RetryPolicy::from_config(config),
            timeout: config.timeout(),
            classifier: ErrorClassifier::new(),
            gate,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit.state()
    }

    /// Scripts currently running or waiting between retries
    pub fn inflight(&self) -> usize {
        self.gate.borrow().inflight
    }

    pub fn is_closing(&self) -> bool {
        self.gate.borrow().closing
    }

    fn enter(&self) -> Option<InflightGuard<'_>> {
        let admitted = self.gate.send_if_modified(|g| {
            if g.closing {
                return false;
            }
            g.inflight += 1;
            true
        });
        admitted.then(|| InflightGuard { gate: &self.gate })
    }

    /// Build `template` with `params`, then execute it
    pub async fn execute_template(
        &self,
        template: &str,
        params: &ScriptParams,
        key: Option<&str>,
    ) -> Result<ScriptExecutionResult, ScriptBuildError> {
        let script = build_script(template, params)?;
        Ok(self.execute(&script, key).await)
    }

    /// Run an OmniJS program through the primary host's evaluate entry point
    pub async fn evaluate_secondary(
        &self,
        source: &str,
        key: Option<&str>,
    ) -> Result<ScriptExecutionResult, ScriptBuildError> {
        let script = evaluate_wrapper(source)?;
        Ok(self.execute(&script, key).await)
    }

    /// Execute a complete script and unwrap its output (optionally the
    /// `key` member of the payload)
    pub async fn execute(&self, script: &str, key: Option<&str>) -> ScriptExecutionResult {
        let started = Instant::now();
        let mut diagnostics = ExecutionDiagnostics {
            script_bytes: script.len(),
            ..Default::default()
        };

        let Some(_guard) = self.enter() else {
            return ScriptExecutionResult {
                outcome: ExecutionOutcome::Failed {
                    kind: ErrorKind::Unknown,
                    message: "Engine is shutting down".to_string(),
                },
                diagnostics,
            };
        };

        let mut attempt: u32 = 0;
        let outcome = loop {
            let permit = match self.circuit.try_acquire() {
                Ok(permit) => permit,
                Err(open) => {
                    warn!(
                        retry_after_ms = open.retry_after.as_millis() as u64,
                        "Circuit open, not spawning script host"
                    );
                    break ExecutionOutcome::Failed {
                        kind: ErrorKind::CircuitOpen,
                        message: format!(
                            "Circuit open after repeated failures; next probe in {} ms",
                            open.retry_after.as_millis()
                        ),
                    };
                }
            };

            attempt += 1;
            diagnostics.attempts = attempt;

            match self.attempt(script, key).await {
                Ok(value) => {
                    permit.success();
                    break ExecutionOutcome::Ok(value);
                }
                Err(failure) => {
                    if failure.kind.trips_breaker() {
                        permit.failure();
                    } else {
                        permit.success();
                    }
                    diagnostics.stderr = failure.stderr;

                    if self.retry.should_retry(failure.kind, attempt) {
                        let delay = self.retry.delay_for(attempt);
                        warn!(
                            attempt,
                            kind = %failure.kind,
                            delay_ms = delay.as_millis() as u64,
                            "Retrying script"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    break ExecutionOutcome::Failed {
                        kind: failure.kind,
                        message: failure.message,
                    };
                }
            }
        };

        diagnostics.duration_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            ExecutionOutcome::Ok(_) => debug!(
                attempts = diagnostics.attempts,
                duration_ms = diagnostics.duration_ms,
                "Script succeeded"
            ),
            ExecutionOutcome::Failed { kind, message } => warn!(
                attempts = diagnostics.attempts,
                duration_ms = diagnostics.duration_ms,
                %kind,
                message = %message,
                "Script failed"
            ),
        }

        ScriptExecutionResult {
            outcome,
            diagnostics,
        }
    }

    async fn attempt(&self, script: &str, key: Option<&str>) -> Result<Value, AttemptFailure> {
        match self.runner.run(script, self.timeout).await {
            RunOutcome::Completed(output) if output.succeeded() => {
                unwrap_script_output(&output.stdout, key).map_err(|e| AttemptFailure {
                    kind: e.kind,
                    message: e.message,
                    stderr: excerpt(&output.stderr),
                })
            }
            RunOutcome::Completed(output) => {
                let kind = self.classifier.classify(&output.stderr, output.exit_code);
                let stderr = excerpt(&output.stderr);
                let message = match (&stderr, output.exit_code) {
                    (Some(text), _) => text.clone(),
                    (None, Some(code)) => format!("Script host exited with status {}", code),
                    (None, None) => "Script host was terminated by a signal".to_string(),
                };
                Err(AttemptFailure {
                    kind,
                    message,
                    stderr,
                })
            }
            RunOutcome::TimedOut { after } => Err(AttemptFailure {
                kind: ErrorKind::Timeout,
                message: format!("Script did not finish within {} ms", after.as_millis()),
                stderr: None,
            }),
            RunOutcome::SpawnFailed(e) => Err(AttemptFailure {
                kind: self.classifier.classify_io(&e),
                message: format!("Failed to start script host: {}", e),
                stderr: None,
            }),
            RunOutcome::Io(e) => Err(AttemptFailure {
                kind: self.classifier.classify_io(&e),
                message: format!("Script host I/O failed: {}", e),
                stderr: None,
            }),
        }
    }

    /// Refuse new calls and wait up to `grace` for running ones.
    /// Returns whether everything drained in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let mut pending = 0;
        self.gate.send_if_modified(|g| {
            pending = g.inflight;
            !std::mem::replace(&mut g.closing, true)
        });
        if pending == 0 {
            return true;
        }
        info!(pending, grace_ms = grace.as_millis() as u64, "Draining in-flight scripts");

        let mut rx = self.gate.subscribe();
        let drained = matches!(
            timeout(grace, rx.wait_for(|g| g.inflight == 0)).await,
            Ok(Ok(_))
        );
        if !drained {
            warn!(remaining = self.inflight(), "Shutdown grace period elapsed");
        }
        drained
    }
}

fn excerpt(stderr: &str) -> Option<String> {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(STDERR_LIMIT).collect())
}
