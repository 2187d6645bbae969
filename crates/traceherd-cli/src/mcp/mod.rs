//! MCP surface: JSON-RPC framing, tool argument schemas, view models and
//! tool handlers.

pub mod query;
pub mod server;
pub mod tools;
pub mod views;

pub use server::run_server;
