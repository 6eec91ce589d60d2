//! OLT session pool and automation engine.
//!
//! - `channel`: the shell channel primitive and its connector seam
//! - `ssh`: russh-backed implementation of the channel
//! - `cli`: prompt-driven command execution and CLI context tracking
//! - `pool`: per-caller session registry, lazy connect, reaper
//! - `parser`: tolerant parsers for device output
//! - `vendor`: per-family command sets and provisioning plans
//! - `workflow`: ordered multi-step sequences with context rollback
//! - `service`: validated operations over the pool

pub mod channel;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod pool;
pub mod service;
pub mod ssh;
pub mod vendor;
pub mod workflow;

pub use config::OltConfig;
pub use error::{ErrorKind, OltError};
pub use pool::ConnectionPool;
pub use service::OntService;
