#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use dotenv::dotenv;
use olt_mcp::mcp::McpOltCommands;
use olt_mcp::olt::clock::SystemClock;
use olt_mcp::olt::ssh::SshConnector;
use olt_mcp::olt::{ConnectionPool, OltConfig, OntService};
use poem_mcpserver::McpServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let pool = ConnectionPool::new(OltConfig::from_env(), Arc::new(SshConnector), Arc::new(SystemClock));
    pool.start();
    let commands = McpOltCommands::new(Arc::new(OntService::new(pool.clone())));

    let result = poem_mcpserver::stdio::stdio(McpServer::new().tools(commands)).await;
    pool.shutdown().await;
    result?;
    Ok(())
}
