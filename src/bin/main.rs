//! Bootstrap binary: load layered config, init tracing, open the database
//! pool (running migrations), build the router, and serve. Grounded on the
//! teacher's `start_webhook_server()` bind/serve shape, generalized from one
//! webhook listener to the full LLMLab router.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "llmlab", about = "Multi-tenant metering reverse proxy for LLM provider APIs")]
struct Cli {
    /// Path to a TOML config file. Falls back to LLMLAB_CONFIG, then compiled-in defaults.
    #[arg(long, env = "LLMLAB_CONFIG_PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = llmlab::config::Config::load_from(cli.config)?;

    llmlab::observability::tracing::init(&config.logging);
    llmlab::observability::mark_started();

    let pool = llmlab::storage::DatabasePool::new(&config.database).await?;
    let state = llmlab::api::AppState::build(pool, &config).await?;
    let router = llmlab::api::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.http.bind, config.http.port).parse()?;
    tracing::info!(%addr, "llmlab listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
