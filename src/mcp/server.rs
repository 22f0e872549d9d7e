//! MCP Server
//!
//! Reads newline-delimited JSON-RPC from stdin. Each `tools/call` runs as its
//! own task; every response goes through one writer task so lines never
//! interleave on stdout.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::handlers::ToolHandlers;
use super::protocol::*;
use super::tools::get_tools;
use crate::tools::FocusTools;

const PREVIEW_LEN: usize = 100;

/// MCP Server
pub struct McpServer {
    handlers: ToolHandlers,
}

/// What to do with one inbound line
enum Dispatch {
    Reply(JsonRpcResponse),
    Call {
        id: Option<Value>,
        params: ToolCallParams,
    },
    Silent,
}

impl McpServer {
    pub fn new(tools: Arc<FocusTools>) -> Self {
        Self {
            handlers: ToolHandlers::new(tools),
        }
    }

    /// Run the server over stdin/stdout
    pub async fn run(&self) -> anyhow::Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve until `reader` reaches EOF, then drain in-flight calls
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let writer_task = tokio::spawn(write_responses(rx, writer));
        let mut calls: JoinSet<()> = JoinSet::new();
        let mut lines = BufReader::new(reader).lines();

        info!("MCP server started, waiting for messages");
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            debug!(message = %preview(line), "<-");

            match self.dispatch(line) {
                Dispatch::Reply(response) => {
                    let _ = tx.send(response);
                }
                Dispatch::Call { id, params } => {
                    let handlers = self.handlers.clone();
                    let tx = tx.clone();
                    calls.spawn(async move {
                        debug!(tool = %params.name, "Calling tool");
                        let result = handlers.handle(&params.name, params.arguments).await;
                        let _ = tx.send(JsonRpcResponse::from_result(id, &result));
                    });
                }
                Dispatch::Silent => {}
            }

            while let Some(joined) = calls.try_join_next() {
                if let Err(e) = joined {
                    warn!(error = %e, "Tool call task failed");
                }
            }
        }

        info!(pending = calls.len(), "Input closed, draining in-flight calls");
        let engine = self.handlers.engine();
        let drained = timeout(engine.shutdown_grace(), async {
            while let Some(joined) = calls.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "Tool call task failed");
                }
            }
        })
        .await
        .is_ok();
        if !drained {
            warn!(remaining = calls.len(), "Shutdown grace elapsed; abandoning remaining calls");
            calls.shutdown().await;
        }
        engine.shutdown().await;

        drop(tx);
        writer_task.await??;
        info!("MCP server shut down");
        Ok(())
    }

    /// Handle a single JSON-RPC message
    fn dispatch(&self, msg: &str) -> Dispatch {
        let req: JsonRpcRequest = match serde_json::from_str(msg) {
            Ok(r) => r,
            Err(e) => return Dispatch::Reply(JsonRpcResponse::error(None, PARSE_ERROR, e.to_string())),
        };
        if req.jsonrpc != "2.0" {
            return Dispatch::Reply(JsonRpcResponse::error(
                req.id,
                INVALID_REQUEST,
                format!("Unsupported jsonrpc version: {}", req.jsonrpc),
            ));
        }
        if req.is_notification() {
            debug!(method = %req.method, "Notification");
            return Dispatch::Silent;
        }

        let id = req.id.clone();
        match req.method.as_str() {
            "initialize" => Dispatch::Reply(JsonRpcResponse::success(id, initialize_result())),

            "ping" => Dispatch::Reply(JsonRpcResponse::success(id, json!({}))),

            "tools/list" => {
                let result = ToolsListResult { tools: get_tools() };
                Dispatch::Reply(JsonRpcResponse::from_result(id, &result))
            }

            "tools/call" => match serde_json::from_value::<ToolCallParams>(req.params) {
                Ok(params) => Dispatch::Call { id, params },
                Err(e) => Dispatch::Reply(JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string())),
            },

            _ => Dispatch::Reply(JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Unknown method: {}", req.method),
            )),
        }
    }
}

async fn write_responses<W>(
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
    mut writer: W,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let out = serde_json::to_string(&response)?;
        debug!(message = %preview(&out), "->");
        writer.write_all(out.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

fn preview(line: &str) -> String {
    match line.char_indices().nth(PREVIEW_LEN) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::io::AsyncReadExt;

    use crate::bridge::{RawOutput, RunOutcome, ScriptRunner};
    use crate::config::EngineConfig;

    struct CannedRunner;

    #[async_trait]
    impl ScriptRunner for CannedRunner {
        async fn run(&self, _script: &str, _deadline: Duration) -> RunOutcome {
            RunOutcome::Completed(RawOutput::success(
                r#"{"count":1,"truncated":false,"items":[{"id":"t1","name":"Write report"}]}"#,
            ))
        }
    }

    async fn exchange(input: &str) -> Vec<Value> {
        let tools = Arc::new(FocusTools::new(
            &EngineConfig::default(),
            Arc::new(CannedRunner),
        ));
        let server = McpServer::new(tools);
        let (mut client, server_side) = tokio::io::duplex(64 * 1024);
        server.serve(input.as_bytes(), server_side).await.unwrap();

        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        out.lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_and_list() {
        let replies = exchange(concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        ))
        .await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(replies[1]["result"]["tools"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_tool_call_wraps_arguments() {
        let replies = exchange(concat!(
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"focus_query","arguments":{"type":"tasks"}}}"#,
            "\n",
        ))
        .await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["id"], 7);
        let text = replies[0]["result"]["content"][0]["text"].as_str().unwrap();
        let envelope: Value = serde_json::from_str(text).unwrap();
        assert_eq!(envelope["success"], true);
        assert_eq!(envelope["data"]["items"][0]["id"], "t1");
        assert!(replies[0]["result"].get("isError").is_none());
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let replies = exchange(concat!(
            "not json\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"arguments":{}}}"#,
            "\n",
        ))
        .await;
        let codes: Vec<i64> = replies
            .iter()
            .map(|r| r["error"]["code"].as_i64().unwrap())
            .collect();
        assert_eq!(
            codes,
            vec![PARSE_ERROR as i64, METHOD_NOT_FOUND as i64, INVALID_PARAMS as i64]
        );
    }

    #[tokio::test]
    async fn test_validation_failure_sets_is_error() {
        let replies = exchange(concat!(
            r#"{"jsonrpc":"2.0","id":9,"method":"tools/call","params":{"name":"focus_mutate","arguments":{"operation":"create","target":"task","data":{}}}}"#,
            "\n",
        ))
        .await;
        assert_eq!(replies[0]["result"]["isError"], true);
        let text = replies[0]["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("VALIDATION_ERROR"));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(150);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_LEN + 3);
    }
}
