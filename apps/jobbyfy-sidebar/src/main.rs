mod cli;
mod commands;
mod logging;

use clap::Parser;
use cli::Cli;
use commands::Bridge;
use sidebar_bridge::BridgeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.logging.level, cli.logging.file.as_deref())?;

    let mut config = BridgeConfig::from_env();
    if let Some(url) = cli.api_base_url {
        config.api_base_url = url.trim_end_matches('/').to_string();
    }

    let bridge = Bridge::connect(&config, cli.storage)?;
    commands::run(bridge, cli.command).await
}
