use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::device::connection::ConnectionOptions;
use crate::device::constants::{
    BRIDGE_READY_DEADLINE, BRIDGE_READY_MARKER, DEFAULT_BRIDGE_URL, DEFAULT_SPEED, MAX_SPEED,
    POLL_DELAY, REQUEST_DEADLINE, SPEED_STEP,
};
use crate::device::treadmill::TreadmillSettings;

/// How to launch the bridge process. Without it the bridge is expected to be running already.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeCommandConfig {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub ready_marker: String,
    pub ready_timeout_ms: u64,
}

impl Default for BridgeCommandConfig {
    fn default() -> Self {
        BridgeCommandConfig {
            program: String::from("python3"),
            args: vec![String::from("./wsserver.py")],
            cwd: Some(PathBuf::from("./server")),
            ready_marker: String::from(BRIDGE_READY_MARKER),
            ready_timeout_ms: BRIDGE_READY_DEADLINE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub bridge_url: String,
    pub bridge: Option<BridgeCommandConfig>,
    pub poll_interval_ms: u64,
    // null waits forever
    pub request_timeout_ms: Option<u64>,
    pub speed_step: u8,
    pub default_speed: u8,
    pub max_speed: u8,
    // None uses the data directory of the os
    pub database_path: Option<PathBuf>,
}

impl Config {
    pub fn treadmill_settings(&self) -> TreadmillSettings {
        let max_speed = self.max_speed.min(MAX_SPEED);

        TreadmillSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            speed_step: self.speed_step.max(1),
            default_speed: self.default_speed.min(max_speed),
            max_speed,
        }
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bridge_url: String::from(DEFAULT_BRIDGE_URL),
            bridge: None,
            poll_interval_ms: POLL_DELAY,
            request_timeout_ms: Some(REQUEST_DEADLINE),
            speed_step: SPEED_STEP,
            default_speed: DEFAULT_SPEED,
            max_speed: MAX_SPEED,
            database_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{"bridgeUrl": "ws://localhost:9000"}"#).unwrap();
        assert_eq!(config, Config { bridge_url: String::from("ws://localhost:9000"), ..Config::default() });
    }

    #[test]
    fn null_timeout_disables_it() {
        let config: Config = serde_json::from_str(r#"{"requestTimeoutMs": null}"#).unwrap();
        assert_eq!(config.connection_options().request_timeout, None);
        assert_eq!(Config::default().connection_options().request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn settings_stay_within_device_bounds() {
        let config = Config { max_speed: 200, default_speed: 100, speed_step: 0, ..Config::default() };
        let settings = config.treadmill_settings();

        assert_eq!(settings.max_speed, MAX_SPEED);
        assert_eq!(settings.default_speed, MAX_SPEED);
        assert_eq!(settings.speed_step, 1);
    }

    #[test]
    fn bridge_command_is_partially_configurable() {
        let config: Config = serde_json::from_str(r#"{"bridge": {"program": "wsbridge"}}"#).unwrap();
        let bridge = config.bridge.unwrap();
        assert_eq!(bridge.program, "wsbridge");
        assert_eq!(bridge.ready_marker, BRIDGE_READY_MARKER);
    }
}
