//! Request Compilers
//!
//! The sole translation point between the external request vocabulary and
//! the contract types. Nothing here generates script text or touches the
//! application. A request that fails here never reaches the bridge.

pub mod analysis;
pub mod mutation;
pub mod query;
pub mod request;

pub use analysis::AnalysisCompiler;
pub use mutation::MutationCompiler;
pub use query::QueryCompiler;
pub use request::{
    AnalysisRequest, BatchRequest, CompleteRequest, CreateRequest, DeleteRequest,
    MeetingNotesRequest, MutationRequest, QueryRequest, ScopedRequest, ToolRequest,
    UpdateRequest,
};

use crate::config::QueryConfig;
use crate::contract::{CompiledAnalysis, CompiledMutation, CompiledQuery};
use crate::error::ContractError;

/// Output of `RequestCompiler::compile`
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledRequest {
    Query(CompiledQuery),
    Mutation(CompiledMutation),
    Analysis(CompiledAnalysis),
}

/// The three compilers behind one entry point
#[derive(Debug, Clone, Default)]
pub struct RequestCompiler {
    pub query: QueryCompiler,
    pub mutation: MutationCompiler,
    pub analysis: AnalysisCompiler,
}

impl RequestCompiler {
    pub fn new(limits: &QueryConfig) -> Self {
        Self {
            query: QueryCompiler::new(limits.clone()),
            mutation: MutationCompiler::new(limits.max_batch),
            analysis: AnalysisCompiler::new(limits.clone()),
        }
    }

    pub fn compile(&self, request: &ToolRequest) -> Result<CompiledRequest, ContractError> {
        Ok(match request {
            ToolRequest::Query(q) => CompiledRequest::Query(self.query.compile(q)?),
            ToolRequest::Mutation(m) => CompiledRequest::Mutation(self.mutation.compile(m)?),
            ToolRequest::Analysis(a) => CompiledRequest::Analysis(self.analysis.compile(a)?),
        })
    }
}
