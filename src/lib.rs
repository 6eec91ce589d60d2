pub mod mcp;
pub mod olt;
