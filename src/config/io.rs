use std::env::current_exe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use directories_next::ProjectDirs;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use serde_json;
use fd_lock::{RwLock, RwLockWriteGuard};
use log::{info, warn};
use std::fs::OpenOptions;
use std::str;

use crate::config::types::Config;
use crate::error::ConfigError;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("nl", "treadmill-remote", "treadmill-remote")
}

// creates a path to treadmill-remote.json in the same directory as the executable
// this could be useful for usb sticks
fn get_portable_config_path() -> Option<PathBuf> {
    match current_exe() {
        Ok(mut path) => {
            // /opt/treadmill-remote => /opt/treadmill-remote.json
            if !path.set_extension("json") {
                warn!("current exe has no filename: {}", path.to_string_lossy());
                return None
            }

            Some(path)
        },
        Err(err) => {
            warn!("failed to get current exe path: {:?}", err);
            None
        },
    }
}

// creates a path to treadmill-remote.json in an os dependent standard directory, such as
// ~/.config on linux.
fn get_local_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| {
        dirs.config_dir().join("treadmill-remote.json")
    })
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    let portable = get_portable_config_path();
    if let Some(path) = portable {
        let attr = std::fs::metadata(&path);
        match attr {
            Ok(attr) => {
                if attr.is_file() {
                    return Ok(path);
                }
            }
            Err(err) => {
                info!("Could not read metadata of: {}; Using local path instead. ({})", path.to_string_lossy(), err);
            },
        }

    }

    match get_local_config_path() {
        None => Err(ConfigError::NoConfigPath),
        Some(path) => Ok(path),
    }
}

/// Where sessions are stored when the config does not say otherwise.
pub fn default_database_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| {
        dirs.data_dir().join("sessions.sqlite")
    })
}

pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<std::fs::File>, ConfigError> {
        match self.rw_lock.try_write() {
            Ok(guard) => Ok(guard),
            Err(source) =>{
                return Err(ConfigError::CanNotLock { source });
            },
        }
    }
}

struct ConfigIOInner {
    file: std::fs::File,
}

#[derive(Clone)]
pub struct ConfigIO {
    inner: Arc<Mutex<ConfigIOInner>>,
}

impl ConfigIO {
    /// Opens the config file at `path`, or at the default location if None.
    pub fn new_sync(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path,
            None => get_config_path()?,
        };
        info!("Using config file {}", path.to_string_lossy());

        if let Some(directory) = path.parent().filter(|directory| !directory.as_os_str().is_empty()) {
            std::fs::create_dir_all(directory)?;
        }

        Self::open_file(&path)
    }

    fn open_file(path: &Path) -> Result<Self, ConfigError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .append(false)
            .create(true)
            .open(path)?;

        let inner = ConfigIOInner {
            file,
        };
        Ok(ConfigIO { inner: Arc::new(Mutex::new(inner)) })
    }

    // obtain an exclusive file lock so that the device is controlled by only one instance of this
    // application.
    pub fn locker(&mut self) -> Result<ConfigIOLocker, ConfigError> {
        let inner = self.inner.lock().expect("Failed to lock ConfigIO inner");

        Ok(ConfigIOLocker {
            rw_lock: RwLock::new(inner.file.try_clone()?),
        })
    }

    // The File returned from here should never be closed!
    fn get_file(&self) -> Result<File, ConfigError> {
        let inner = self.inner.lock().expect("Failed to lock ConfigIO inner");
        let file = inner.file.try_clone()?; // std File
        Ok(File::from_std(file)) // tokio File
    }

    pub async fn read(&self) -> Result<Config, ConfigError> {
        let mut file = self.get_file()?;
        info!("Reading config file");

        let mut content = vec![];
        file.rewind().await?;
        file.read_to_end(&mut content).await?;

        if content.iter().all(u8::is_ascii_whitespace) {
            // first start, write the defaults out so there is something to edit
            let config = Config::default();
            self.save(&config).await?;
            return Ok(config);
        }

        let content = str::from_utf8(&content)?;
        let config: Config = serde_json::from_str(content)?;
        Ok(config)
    }

    pub async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let mut file = self.get_file()?;
        info!("Saving config");

        let content = serde_json::to_string_pretty(config)?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_file_is_initialized_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("treadmill-remote.json");
        let config_io = ConfigIO::new_sync(Some(path.clone())).unwrap();

        assert_eq!(config_io.read().await.unwrap(), Config::default());

        let written: Config = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, Config::default());
        assert!(std::fs::read_to_string(&path).unwrap().contains("\"bridgeUrl\""));
    }

    #[tokio::test]
    async fn saved_config_is_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("treadmill-remote.json");
        let config_io = ConfigIO::new_sync(Some(path.clone())).unwrap();

        let config = Config {
            bridge_url: String::from("ws://127.0.0.1:9999"),
            request_timeout_ms: None,
            database_path: Some(dir.path().join("db.sqlite")),
            ..Config::default()
        };
        config_io.save(&config).await.unwrap();
        assert_eq!(config_io.read().await.unwrap(), config);

        // shorter content must not leave a tail of the previous content behind
        config_io.save(&Config::default()).await.unwrap();
        let reopened = ConfigIO::new_sync(Some(path)).unwrap();
        assert_eq!(reopened.read().await.unwrap(), Config::default());
    }

    #[tokio::test]
    async fn invalid_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("treadmill-remote.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config_io = ConfigIO::new_sync(Some(path)).unwrap();
        assert!(matches!(config_io.read().await, Err(ConfigError::JsonError { .. })));
    }
}
