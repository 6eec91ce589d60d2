//! MCP tool surface for the OLT automation engine.
//!
//! - `types`: Serializable response types for MCP tools
//! - `schema`: JSON Schema helpers for unsigned fields
//! - `commands`: MCP tool implementations

pub mod commands;
pub mod schema;
pub mod types;

pub use commands::McpOltCommands;
