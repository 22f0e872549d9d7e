//! focus-bridge - contract-driven automation engine for OmniFocus
//!
//! Requests are validated against a closed filter/mutation vocabulary,
//! compiled into parameterized scripts, and executed through a retrying,
//! circuit-broken bridge to the scripting host.
//!
//! ## Call chain
//!
//! ```text
//! ToolRequest ─▶ compiler ─▶ contract (CompiledQuery / CompiledMutation / CompiledAnalysis)
//!                                 │
//!                                 ▼
//!                     script generator ─▶ bridge ─▶ osascript
//!                                 ▲                   │
//!                   cache ◀── tools (FocusTools) ◀────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use focus_bridge::{EngineConfig, FocusTools, OsascriptRunner};
//! use serde_json::json;
//!
//! # async fn demo() {
//! let config = EngineConfig::default();
//! let runner = Arc::new(OsascriptRunner::from_config(&config.bridge));
//! let tools = FocusTools::new(&config, runner);
//! let response = tools
//!     .handle_value(json!({"query": {"type": "tasks", "mode": "flagged"}}))
//!     .await;
//! assert!(response.success);
//! # }
//! ```

// Core error handling
pub mod error;

pub mod config;

// Filter/mutation vocabulary and compiled request forms
pub mod contract;

// Script generation
pub mod script;

pub mod cache;

// Process execution: build, run, classify, retry, break
pub mod bridge;

// External request shapes and their compilers
pub mod compiler;

// Tool façade and MCP transport
pub mod mcp;
pub mod tools;

pub use bridge::{ExecutionBridge, OsascriptRunner, ScriptRunner};
pub use cache::{CacheCategory, CacheStore};
pub use compiler::{RequestCompiler, ToolRequest};
pub use config::EngineConfig;
pub use error::{BridgeError, ContractError, ErrorKind, FocusError, ScriptBuildError};
pub use tools::{Analyzer, FocusTools, RollupAnalyzer, ToolResponse};

pub use focus_types::{EntityType, ErrorCode, ErrorPayload, ResponseEnvelope, ResponseMetadata};
