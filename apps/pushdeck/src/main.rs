use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use pushdeck::app::GridApp;
use pushdeck::client::GridClient;
use pushdeck::config::{self, Config};
use pushdeck::telemetry::logging::{self, LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "pushdeck", about = "Server-driven push-button grid client")]
struct Cli {
    /// WebSocket endpoint of the grid server
    #[arg(long, short = 's')]
    server: Option<String>,

    /// Fixed grid size as ROWSxCOLS instead of asking the server
    #[arg(long)]
    grid: Option<String>,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    /// Write logs to a file (stderr is unusable while the TUI is up)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&LogConfig {
        level: cli.log_level,
        file: cli.log_file.clone(),
    })
    .context("failed to initialize logging")?;

    let mut config = Config::from_env();
    if let Some(server) = cli.server.as_deref() {
        config.server_url = config::normalize_endpoint(server);
    }
    url::Url::parse(&config.server_url)
        .with_context(|| format!("invalid server endpoint {:?}", config.server_url))?;
    if let Some(grid) = cli.grid.as_deref() {
        config.grid = Some(
            config::parse_grid(grid)
                .with_context(|| format!("invalid --grid value {grid:?}, expected ROWSxCOLS"))?,
        );
    }

    let app = Arc::new(GridApp::new(&config));
    app.connect();

    let client = GridClient::new(app.clone());
    let result = client.run().await;

    // Teardown on every exit path so the socket and reconnect timer die
    // with the UI.
    app.close();
    result.context("client loop failed")?;
    Ok(())
}
