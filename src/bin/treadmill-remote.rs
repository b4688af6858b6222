use std::path::PathBuf;
use clap::Parser;
use log::{error, info};
use treadmill_remote::{init_logging, run, RunOptions};
use treadmill_remote::error::{AppRunError, ConfigError};

/// Control a treadmill through its local websocket bridge.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the config file. Defaults to treadmill-remote.json next to the executable, or the
    /// os config directory.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Websocket url of the bridge, overrides `bridgeUrl`.
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Do not launch the bridge, even if the config describes how to.
    #[arg(long)]
    no_bridge: bool,

    /// Path to the session database, overrides `databasePath`.
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,

    /// Log debug messages.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppRunError> {
    let cli = Cli::parse();

    init_logging(cli.verbose);
    info!(concat!("Treadmill Remote ", env!("CARGO_PKG_VERSION")));

    let options = RunOptions {
        config_path: cli.config,
        bridge_url: cli.url,
        no_bridge: cli.no_bridge,
        database_path: cli.database,
    };

    match run(options).await {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            error!("This application has already been started");
            Ok(())
        },
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(_) => Ok(()),
    }
}
