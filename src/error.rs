use std::io;
use std::str::Utf8Error;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinError;
use tokio_tungstenite::tungstenite;
use serde_json;

use crate::device::types::ConnectionState;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Socket level failures. Fatal while starting up, surfaced to the caller of a round trip afterwards.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open connection to bridge at {url}: {source}")]
    Connect { url: String, source: tungstenite::Error },

    #[error("Failed to send frame to bridge: {source}")]
    Send { source: tungstenite::Error },

    #[error("Failed to encode request: {source}")]
    Encode { #[from] source: serde_json::Error },

    #[error("Connection to bridge is not open (state: {state:?})")]
    NotOpen { state: ConnectionState },

    #[error("Connection to bridge ended while awaiting the response to {method}")]
    ConnectionLost { method: String },

    #[error("The bridge did not answer {method} within {}", humantime::format_duration(*.timeout))]
    Timeout { method: String, timeout: Duration },
}

/// Malformed or unexpected frames. Never fatal.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Received a frame that is not valid JSON: {source}")]
    Malformed { source: serde_json::Error },

    #[error("Received a frame without a correlation id")]
    MissingId,

    #[error("Received a response for unknown correlation id {id}")]
    Unmatched { id: String },

    #[error("Failed to decode stats payload: {source}")]
    InvalidStats { source: serde_json::Error },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Session database error (sqlite): {source}")]
    Sqlite { #[from] source: rusqlite::Error },

    #[error("Failed to create database directory: {source}")]
    CreateDirectory { source: io::Error },

    #[error("Failed to join storage task: {source}")]
    Join { #[from] source: JoinError },

    #[error("Stored timestamp {value:?} could not be parsed: {source}")]
    InvalidTimestamp { value: String, source: chrono::ParseError },
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with bridge: {source}")]
    Transport { #[from] source: TransportError },

    #[error("Unexpected response from bridge: {source}")]
    Protocol { #[from] source: ProtocolError },

    #[error("Failed to record session: {source}")]
    Storage { #[from] source: StorageError },
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to spawn bridge process {program:?}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("Bridge process exited before reporting readiness")]
    ExitedBeforeReady,

    #[error("Bridge process did not report readiness within {}", humantime::format_duration(*.timeout))]
    ReadyTimeout { timeout: Duration },

    #[error("Failed to read bridge output: {source}")]
    Output { #[from] source: io::Error },
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start application (bridge): {source}")]
    Bridge { #[from] source: BridgeError },

    #[error("Failed to start application (transport): {source}")]
    Transport { #[from] source: TransportError },

    #[error("Failed to start application (storage): {source}")]
    Storage { #[from] source: StorageError },

    #[error("Device command failed: {source}")]
    Device { #[from] source: DeviceError },

    #[error("Terminal input failed: {source}")]
    Input { #[from] source: io::Error },
}
