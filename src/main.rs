#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use dotenv::dotenv;
use olt_mcp::mcp::McpOltCommands;
use olt_mcp::olt::clock::SystemClock;
use olt_mcp::olt::ssh::SshConnector;
use olt_mcp::olt::{ConnectionPool, OltConfig, OntService};
use poem::{EndpointExt, Route, Server, listener::TcpListener, middleware::Tracing};
use poem_mcpserver::{McpServer, streamable_http};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = OltConfig::from_env();
    info!("OLT target: {}", config.device);

    let pool = ConnectionPool::new(config, Arc::new(SshConnector), Arc::new(SystemClock));
    pool.start();
    let commands = McpOltCommands::new(Arc::new(OntService::new(pool.clone())));

    let mcp_port: u16 = std::env::var("MCP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let mcp_addr = format!("0.0.0.0:{}", mcp_port);
    info!("Starting MCP server on {}", mcp_addr);

    let app = Route::new()
        .at(
            "/",
            streamable_http::endpoint(move |_| McpServer::new().tools(commands.clone())),
        )
        .with(Tracing);

    info!("Use olt_get_session to obtain a caller_id, then query or provision ONTs");

    let result = Server::new(TcpListener::bind(mcp_addr))
        .name("OLT MCP Server")
        .run(app)
        .await;

    pool.shutdown().await;
    result?;
    Ok(())
}
