use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use log::{error, info, warn};

use crate::bridge::process::BridgeProcess;
use crate::config::io::{default_database_path, ConfigIO};
use crate::config::types::Config;
use crate::device::connection::BridgeConnection;
use crate::device::events::EventBus;
use crate::device::treadmill::Treadmill;
use crate::error::AppRunError;
use crate::session::recorder::SessionRecorder;
use crate::session::store::SqliteSessionStore;
use crate::ui::terminal::run_terminal;

pub mod bridge;
pub mod config;
pub mod device;
pub mod error;
pub mod session;
pub mod ui;

pub fn init_logging(verbose: bool) {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

/// Command line overrides, applied on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub bridge_url: Option<String>,
    pub no_bridge: bool,
    pub database_path: Option<PathBuf>,
}

async fn load_config(config_io: &ConfigIO) -> Result<Config, AppRunError> {
    match config_io.read().await {
        Ok(config) => Ok(config),
        Err(err) if err.is_file_not_found_error() => {
            // this is probably the first start of the app
            info!("Config file not found, using defaults");
            Ok(Config::default())
        },
        Err(err) => {
            error!("Failed to load config: {:?}", &err);
            Err(err.into())
        },
    }
}

fn database_path(options: &RunOptions, config: &Config) -> PathBuf {
    options.database_path.clone()
        .or_else(|| config.database_path.clone())
        .or_else(default_database_path)
        .unwrap_or_else(|| {
            warn!("Could not determine data directory, storing sessions in the working directory");
            PathBuf::from("sessions.sqlite")
        })
}

pub async fn run(options: RunOptions) -> Result<(), AppRunError> {
    let mut config_io = ConfigIO::new_sync(options.config_path.clone())?;
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    let mut config = load_config(&config_io).await?;
    if let Some(url) = &options.bridge_url {
        config.bridge_url = url.clone();
    }

    let bridge = match (&config.bridge, options.no_bridge) {
        (Some(command), false) => Some(BridgeProcess::start(command).await?),
        _ => {
            info!("Not launching a bridge, expecting one at {}", config.bridge_url);
            None
        },
    };

    let connection = Arc::new(BridgeConnection::open(&config.bridge_url, config.connection_options()).await?);

    let store = Arc::new(SqliteSessionStore::open(&database_path(&options, &config))?);
    let events = Arc::new(EventBus::new());
    let recorder = SessionRecorder::new(store, events.clone());
    let treadmill = Arc::new(Treadmill::new(connection.clone(), events, recorder, config.treadmill_settings()));

    treadmill.connect().await?;

    let result = run_terminal(treadmill).await;

    connection.close().await;
    if let Some(bridge) = bridge {
        if let Err(err) = bridge.shutdown().await {
            warn!("Failed to stop bridge: {}", err);
        }
    }

    result
}
