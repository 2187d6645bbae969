pub mod mcp;

use clap::{Parser, Subcommand};
use tracing::warn;
use traceherd_client::{Client, Config, load_env_file};

#[derive(Parser)]
#[command(name = "traceherd")]
#[command(about = "Query, search and diff recorded AI-agent execution traces", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Log filter when RUST_LOG is unset (logs go to stderr)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the MCP server over stdio
    Serve,
    /// Verify provider connectivity and credentials
    Check,
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    init_tracing(&cli.log_level);

    // Explicit startup step: seed credentials from the nearest .env file
    // before anything reads the environment.
    load_env_file();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        match cli.command {
            Commands::Serve => serve().await,
            Commands::Check => check().await,
        }
    })
}

/// stdout carries JSON-RPC frames, so diagnostics must go to stderr.
fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve() -> anyhow::Result<()> {
    // A missing key must not keep the server from starting: tool calls
    // report the authentication problem as readable text instead.
    let client = match Config::from_env() {
        Ok(config) => Some(Client::new(config)?),
        Err(e) => {
            warn!("starting without provider credentials: {}", e);
            None
        }
    };
    mcp::run_server(client).await
}

async fn check() -> anyhow::Result<()> {
    let client = Client::new(Config::from_env()?)?;
    let response = client.list_sessions().await?;
    println!(
        "Connected. Provider has {} sessions, {} LLM events, {} function events (bundle version {}).",
        response.sessions.len(),
        response.events.len(),
        response.function_events.len(),
        if response.version.is_empty() {
            "unknown"
        } else {
            &response.version
        },
    );
    Ok(())
}
