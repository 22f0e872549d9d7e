//! MCP (Model Context Protocol) stdio transport
//!
//! ```text
//!  client ── JSON-RPC over stdio ──▶ McpServer
//!                                     ├── focus_query    ─┐
//!                                     ├── focus_mutate   ─┼─▶ FocusTools
//!                                     └── focus_analyze  ─┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=focus_bridge=debug ./target/debug/focus_mcp --config focus.yaml
//! ```

pub mod handlers;
pub mod protocol;
pub mod server;
pub mod tools;

pub use handlers::ToolHandlers;
pub use server::McpServer;
pub use tools::get_tools;
