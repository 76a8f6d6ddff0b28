mod main_runtime;

use clap::Parser;
use mt5_bridge::cli::{Cli, Commands};
use mt5_bridge::config::AppConfig;
use mt5_bridge::services::start_api_server;
use mt5_bridge::Bridge;
use tracing::{error, info};

use crate::main_runtime::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_from(&cli.config_dir)?;

    match cli.command {
        Some(Commands::CheckConfig) => {
            match config.validate() {
                Ok(()) => {
                    println!("Configuration OK");
                    println!(
                        "  listen: {}:{}  queue: max_len={} redelivery={}s ttl={}s batch={}",
                        config.server.host,
                        config.server.port,
                        config.queue.max_len,
                        config.queue.redelivery_timeout_secs,
                        config.queue.command_ttl_secs,
                        config.queue.max_poll_batch,
                    );
                }
                Err(errors) => {
                    for e in &errors {
                        eprintln!("✗ {e}");
                    }
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
            }
        }
        Some(Commands::Serve { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            run_server(config).await?;
        }
        None => run_server(config).await?,
    }

    Ok(())
}

async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let _log_guard = init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Invalid configuration: {}", e);
        }
        anyhow::bail!("{} configuration error(s)", errors.len());
    }

    info!(
        max_len = config.queue.max_len,
        redelivery_timeout_secs = config.queue.redelivery_timeout_secs,
        command_ttl_secs = config.queue.command_ttl_secs,
        "Starting MT5 bridge"
    );

    let bridge = Bridge::new(&config);
    start_api_server(&config, bridge).await?;
    Ok(())
}
