use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mt5-bridge")]
#[command(version)]
#[command(about = "Status and command relay between MT5 expert advisors and a mobile app", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and per-environment config files
    #[arg(short, long, default_value = "config", env = "MT5_BRIDGE_CONFIG_DIR")]
    pub config_dir: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP relay (default)
    Serve {
        /// Bind address (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Port (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Load and validate the configuration, then exit
    CheckConfig,
}
