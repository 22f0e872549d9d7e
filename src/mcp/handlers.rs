//! MCP Tool Handlers
//!
//! Each tool's arguments are the inner request object; the handler wraps
//! them under the tool's key and hands them to the façade.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::protocol::ToolCallResult;
use super::tools::{ANALYZE_TOOL, MUTATE_TOOL, QUERY_TOOL};
use crate::tools::FocusTools;

/// Tool handlers over one shared engine
#[derive(Clone)]
pub struct ToolHandlers {
    tools: Arc<FocusTools>,
}

impl ToolHandlers {
    pub fn new(tools: Arc<FocusTools>) -> Self {
        Self { tools }
    }

    pub fn engine(&self) -> &Arc<FocusTools> {
        &self.tools
    }

    /// Handle a tool call by name
    pub async fn handle(&self, name: &str, args: Value) -> ToolCallResult {
        let Some(key) = request_key(name) else {
            return ToolCallResult::error(format!("Unknown tool: {}", name));
        };
        let mut request = Map::new();
        request.insert(key.to_string(), args);
        let response = self.tools.handle_value(Value::Object(request)).await;
        ToolCallResult::envelope(&response)
    }
}

fn request_key(tool: &str) -> Option<&'static str> {
    match tool {
        QUERY_TOOL => Some("query"),
        MUTATE_TOOL => Some("mutation"),
        ANALYZE_TOOL => Some("analysis"),
        _ => None,
    }
}
