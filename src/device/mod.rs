pub mod constants;
pub mod types;
pub mod protocol;
pub mod pending;
pub mod connection;
pub mod events;
pub(crate) mod poller;
pub mod treadmill;
