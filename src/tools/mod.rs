//! Tool Façade
//!
//! ```text
//! request ─▶ compile ─▶ cache? ─▶ generate + execute ─▶ invalidate on writes ─▶ envelope
//! ```
//!
//! Every call returns a `ResponseEnvelope`; failures never escape as errors.

pub mod analyzer;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub use analyzer::{extract_action_items, Analyzer, RollupAnalyzer};

use crate::bridge::{CircuitState, ExecutionBridge, ExecutionDiagnostics, ScriptRunner};
use crate::cache::{CacheCategory, CacheStats, CacheStore};
use crate::compiler::{
    AnalysisRequest, MutationRequest, QueryRequest, RequestCompiler, ToolRequest,
};
use crate::config::EngineConfig;
use crate::contract::{
    BatchMutation, CompiledAnalysis, CompiledMutation, CompiledQuery, MutationOp, ScopedAnalysis,
};
use crate::error::{ErrorKind, FocusError};
use crate::script::{
    apply_verdicts, finalize_records, generate_filter_block, generate_mutation_script,
    generate_query_script, generate_secondary_batch_script, Verdict,
};
use focus_types::{ErrorPayload, ResponseEnvelope};

/// Response type of every façade call
pub type ToolResponse = ResponseEnvelope<Value>;

/// Owns the engine's shared state: one cache, one bridge, one breaker
pub struct FocusTools {
    compiler: RequestCompiler,
    cache: CacheStore,
    bridge: ExecutionBridge,
    analyzer: Arc<dyn Analyzer>,
    config: EngineConfig,
}

impl FocusTools {
    pub fn new(config: &EngineConfig, runner: Arc<dyn ScriptRunner>) -> Self {
        Self {
            compiler: RequestCompiler::new(&config.query),
            cache: CacheStore::new(config.cache.clone()),
            bridge: ExecutionBridge::new(runner, &config.bridge),
            analyzer: Arc::new(RollupAnalyzer),
            config: config.clone(),
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.bridge.circuit_state()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn bridge(&self) -> &ExecutionBridge {
        &self.bridge
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.config.shutdown_grace()
    }

    /// Stop accepting script executions and drain running ones
    pub async fn shutdown(&self) -> bool {
        self.bridge.shutdown(self.config.shutdown_grace()).await
    }

    /// Entry point for raw JSON requests
    pub async fn handle_value(&self, raw: Value) -> ToolResponse {
        let started = Instant::now();
        match ToolRequest::from_value(raw) {
            Ok(request) => self.handle(&request).await,
            Err(e) => self.failure("request", FocusError::from(e), started),
        }
    }

    pub async fn handle(&self, request: &ToolRequest) -> ToolResponse {
        let span = info_span!("request", request_id = %Uuid::new_v4());
        async {
            match request {
                ToolRequest::Query(q) => self.query(q).await,
                ToolRequest::Mutation(m) => self.mutate(m).await,
                ToolRequest::Analysis(a) => self.analyze(a).await,
            }
        }
        .instrument(span)
        .await
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub async fn query(&self, request: &QueryRequest) -> ToolResponse {
        let started = Instant::now();
        let operation = format!("query:{}", request.entity);
        let query = match self.compiler.query.compile(request) {
            Ok(q) => q,
            Err(e) => return self.failure(&operation, e.into(), started),
        };
        let category = query.cache_category();
        let key = query.cache_key();

        if let Some(hit) = self.cache.get(category, &key) {
            info!(%operation, cache_hit = true, category = category.as_str(), "Query served from cache");
            return ResponseEnvelope::success(&operation, hit.value)
                .from_cache(true)
                .with_query_time(elapsed_ms(started))
                .with_extra("cacheCategory", category.as_str())
                .with_extra("cacheAgeMs", hit.age.as_millis() as u64);
        }

        match self.run_query(&query).await {
            Ok((value, diagnostics)) => {
                self.cache.set(category, key, value.clone());
                info!(
                    %operation,
                    cache_hit = false,
                    attempts = diagnostics.attempts,
                    duration_ms = elapsed_ms(started),
                    "Query executed"
                );
                ResponseEnvelope::success(&operation, value)
                    .with_query_time(elapsed_ms(started))
                    .with_extra("cacheCategory", category.as_str())
                    .with_extra("twoPhase", query.needs_secondary())
                    .with_extra("attempts", diagnostics.attempts)
            }
            Err(e) => self.failure(&operation, e, started),
        }
    }

    /// Generate and execute a compiled query, including the secondary pass
    /// when the query needs one
    pub async fn run_query(
        &self,
        query: &CompiledQuery,
    ) -> Result<(Value, ExecutionDiagnostics), FocusError> {
        let script = generate_query_script(query, self.config.query.candidate_cap)?;
        let (primary, mut diagnostics) = self
            .bridge
            .execute_template(&script.template, &script.params, None)
            .await?
            .into_result()?;
        if !script.two_phase {
            return Ok((primary, diagnostics));
        }

        let capped = primary
            .get("truncated")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if capped {
            warn!(
                cap = self.config.query.candidate_cap,
                "Candidate cap reached; results may be incomplete"
            );
        }
        let candidates: Vec<Map<String, Value>> = primary
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|i| i.as_object().cloned()).collect())
            .unwrap_or_default();

        let records = if candidates.is_empty() {
            candidates
        } else {
            let ids: Vec<String> = candidates
                .iter()
                .filter_map(|c| c.get("id").and_then(Value::as_str).map(str::to_string))
                .collect();
            let block = generate_filter_block(query.entity.entity_type(), &query.filters)?;
            let source = generate_secondary_batch_script(
                query.entity,
                &block,
                &query.filters,
                &ids,
                &query.secondary_fields(),
            )?;
            let (raw, secondary) = self
                .bridge
                .evaluate_secondary(&source, Some("verdicts"))
                .await?
                .into_result()?;
            diagnostics.absorb(&secondary);
            let verdicts: HashMap<String, Verdict> = serde_json::from_value(raw)?;
            apply_verdicts(candidates, &verdicts)
        };

        let mut result = finalize_records(records, query);
        if capped {
            if let Some(obj) = result.as_object_mut() {
                obj.insert("candidatesCapped".into(), Value::Bool(true));
            }
        }
        Ok((result, diagnostics))
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    pub async fn mutate(&self, request: &MutationRequest) -> ToolResponse {
        let started = Instant::now();
        let operation = format!("mutation:{}", request.operation_name());
        let compiled = match self.compiler.mutation.compile(request) {
            Ok(m) => m,
            Err(e) => return self.failure(&operation, e.into(), started),
        };
        let categories = compiled.invalidated_categories();

        let op = match compiled {
            CompiledMutation::Batch(batch) => {
                return self.run_batch(&operation, batch, &categories, started).await;
            }
            CompiledMutation::Create(m) => MutationOp::Create(m),
            CompiledMutation::Update(m) => MutationOp::Update(m),
            CompiledMutation::Complete(m) => MutationOp::Complete(m),
            CompiledMutation::Delete(m) => MutationOp::Delete(m),
        };
        match self.run_mutation(&op).await {
            Ok((value, diagnostics)) => {
                let dropped = self.invalidate(&categories);
                info!(%operation, invalidated = dropped, duration_ms = elapsed_ms(started), "Mutation applied");
                ResponseEnvelope::success(&operation, value)
                    .with_query_time(elapsed_ms(started))
                    .with_extra("invalidated", dropped)
                    .with_extra("attempts", diagnostics.attempts)
            }
            Err(e) => {
                // A failed or timed-out script may still have written
                let dropped = if reached_host(&e) {
                    self.invalidate(&categories)
                } else {
                    0
                };
                self.failure(&operation, e, started)
                    .with_extra("invalidated", dropped)
            }
        }
    }

    async fn run_mutation(
        &self,
        op: &MutationOp,
    ) -> Result<(Value, ExecutionDiagnostics), FocusError> {
        let script = generate_mutation_script(op)?;
        Ok(self.bridge.execute(&script, None).await.into_result()?)
    }

    /// Sub-operations run in order, one script each
    async fn run_batch(
        &self,
        operation: &str,
        batch: BatchMutation,
        categories: &[CacheCategory],
        started: Instant,
    ) -> ToolResponse {
        let total = batch.operations.len();
        let mut results = Vec::with_capacity(total);
        let mut succeeded = 0usize;
        let mut dispatched = false;
        let mut first_error: Option<FocusError> = None;

        for (index, op) in batch.operations.iter().enumerate() {
            match self.run_mutation(op).await {
                Ok((value, _)) => {
                    succeeded += 1;
                    dispatched = true;
                    results.push(json!({
                        "index": index,
                        "operation": op.operation_name(),
                        "success": true,
                        "data": value,
                    }));
                }
                Err(e) => {
                    warn!(index, error = %e, "Batch operation failed");
                    dispatched |= reached_host(&e);
                    results.push(json!({
                        "index": index,
                        "operation": op.operation_name(),
                        "success": false,
                        "error": error_payload(&e, self.bridge.is_closing()),
                    }));
                    first_error.get_or_insert(e);
                    if batch.stop_on_error {
                        break;
                    }
                }
            }
        }

        let dropped = if dispatched {
            self.invalidate(categories)
        } else {
            0
        };
        let failed = results.len() - succeeded;
        let data = json!({
            "results": results,
            "succeeded": succeeded,
            "failed": failed,
            "skipped": total - results.len(),
        });

        let envelope = match first_error {
            None => ResponseEnvelope::success(operation, data),
            Some(e) => {
                let mut payload = error_payload(&e, self.bridge.is_closing());
                payload.message = format!(
                    "{} of {} batch operations failed: {}",
                    failed, total, payload.message
                );
                let mut envelope = ResponseEnvelope::failure(operation, payload);
                envelope.data = Some(data);
                envelope
            }
        };
        envelope
            .with_query_time(elapsed_ms(started))
            .with_extra("invalidated", dropped)
    }

    fn invalidate(&self, categories: &[CacheCategory]) -> usize {
        categories
            .iter()
            .map(|category| self.cache.invalidate(*category))
            .sum()
    }

    // =========================================================================
    // ANALYSIS
    // =========================================================================

    pub async fn analyze(&self, request: &AnalysisRequest) -> ToolResponse {
        let started = Instant::now();
        let operation = format!("analysis:{}", request.type_name());
        let compiled = match self.compiler.analysis.compile(request) {
            Ok(a) => a,
            Err(e) => return self.failure(&operation, e.into(), started),
        };

        let slot = compiled.cache_slot();
        if let Some((category, key)) = &slot {
            if let Some(hit) = self.cache.get(*category, key) {
                return ResponseEnvelope::success(&operation, hit.value)
                    .from_cache(true)
                    .with_query_time(elapsed_ms(started))
                    .with_extra("cacheCategory", category.as_str());
            }
        }

        let result = match compiled {
            CompiledAnalysis::ParseMeetingNotes(params) => {
                Ok(self.analyzer.parse_meeting_notes(&params))
            }
            CompiledAnalysis::Scoped(analysis) => self.run_analysis(&analysis).await,
        };

        match result {
            Ok(value) => {
                let mut envelope = ResponseEnvelope::success(&operation, value.clone())
                    .with_query_time(elapsed_ms(started));
                if let Some((category, key)) = slot {
                    self.cache.set(category, key, value);
                    envelope = envelope.with_extra("cacheCategory", category.as_str());
                }
                envelope
            }
            Err(e) => self.failure(&operation, e, started),
        }
    }

    async fn run_analysis(&self, analysis: &ScopedAnalysis) -> Result<Value, FocusError> {
        let (dataset, _) = self.run_query(&analysis.dataset).await?;
        let records: Vec<Map<String, Value>> = dataset
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|i| i.as_object().cloned()).collect())
            .unwrap_or_default();
        Ok(self.analyzer.analyze(analysis, &records).await)
    }

    // =========================================================================
    // ENVELOPES
    // =========================================================================

    fn failure(&self, operation: &str, error: FocusError, started: Instant) -> ToolResponse {
        let closing = self.bridge.is_closing();
        warn!(%operation, code = %error.code(), error = %error, "Request failed");
        let mut envelope = ResponseEnvelope::failure(operation, error_payload(&error, closing))
            .with_query_time(elapsed_ms(started));
        if let FocusError::Bridge(e) = &error {
            envelope = envelope.with_extra("attempts", e.diagnostics.attempts);
        }
        envelope
    }
}

/// Whether at least one attempt ran the script. Validation failures,
/// shutdown refusals and an already-open circuit never do.
fn reached_host(error: &FocusError) -> bool {
    matches!(error, FocusError::Bridge(e) if e.diagnostics.attempts > 0)
}

fn error_payload(error: &FocusError, closing: bool) -> ErrorPayload {
    let (code, message) = match error {
        FocusError::Bridge(e) => (e.kind.code(), e.message.clone()),
        other => (other.code(), other.to_string()),
    };
    let payload = ErrorPayload::new(code, message);
    let suggestion = match error {
        FocusError::Bridge(e) if e.kind == ErrorKind::Unknown && closing => {
            Some("The engine is shutting down; retry once it has restarted")
        }
        _ => error.suggestion(),
    };
    match suggestion {
        Some(s) => payload.with_suggestion(s),
        None => payload,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
