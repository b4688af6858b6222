use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use chrono::Utc;
use log::{debug, info, warn};
use serde_json::json;

use crate::device::connection::Transport;
use crate::device::constants::{DEFAULT_SPEED, MAX_SPEED, MIN_SPEED, POLL_DELAY, SPEED_STEP};
use crate::device::events::{DeviceEvent, EventBus};
use crate::device::poller::{fetch_stats, poll_stats_task, PollTask};
use crate::device::protocol::Method;
use crate::device::types::{DeviceState, StatsSnapshot};
use crate::error::DeviceError;
use crate::session::recorder::SessionRecorder;
use crate::session::types::SessionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreadmillSettings {
    pub poll_interval: Duration,
    pub speed_step: u8,
    pub default_speed: u8,
    pub max_speed: u8,
}

impl Default for TreadmillSettings {
    fn default() -> Self {
        TreadmillSettings {
            poll_interval: Duration::from_millis(POLL_DELAY),
            speed_step: SPEED_STEP,
            default_speed: DEFAULT_SPEED,
            max_speed: MAX_SPEED,
        }
    }
}

/// Device operations on top of the bridge connection.
///
/// `run` and `stop` are idempotent and serialized with each other. While running, a background
/// task keeps `stats` fresh; it is cancelled by `stop` once the final stats have been fetched.
pub struct Treadmill {
    transport: Arc<dyn Transport>,
    events: Arc<EventBus>,
    recorder: SessionRecorder,
    settings: TreadmillSettings,
    state: Arc<Mutex<DeviceState>>,
    // Some while running
    poll_task: tokio::sync::Mutex<Option<PollTask>>,
}

impl Treadmill {
    pub fn new(
        transport: Arc<dyn Transport>,
        events: Arc<EventBus>,
        recorder: SessionRecorder,
        settings: TreadmillSettings,
    ) -> Self {
        let state = DeviceState {
            current_speed: settings.default_speed.min(settings.max_speed),
            ..DeviceState::default()
        };

        Treadmill {
            transport,
            events,
            recorder,
            settings,
            state: Arc::new(Mutex::new(state)),
            poll_task: tokio::sync::Mutex::new(None),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().expect("Failed to lock device state")
    }

    pub fn snapshot(&self) -> DeviceState {
        self.lock_state().clone()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }

    pub async fn connect(&self) -> Result<(), DeviceError> {
        self.transport.request(Method::Connect, None).await?;
        self.lock_state().link_established = true;
        info!("Device link established");

        self.events.emit(DeviceEvent::LinkEstablished);
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), DeviceError> {
        self.transport.request(Method::Disconnect, None).await?;
        info!("Device link released");
        Ok(())
    }

    pub async fn get_stats(&self) -> Result<StatsSnapshot, DeviceError> {
        let stats = fetch_stats(self.transport.as_ref()).await?;
        // last write wins against the poll
        self.lock_state().stats = Some(stats);

        self.events.emit(DeviceEvent::StatusUpdated);
        Ok(stats)
    }

    async fn set_speed(&self, speed: u8) -> Result<u8, DeviceError> {
        self.transport.request(Method::SetSpeed, Some(json!({ "speed": speed }))).await?;
        self.events.emit(DeviceEvent::SpeedChanged(speed));
        Ok(speed)
    }

    pub async fn increase_speed(&self) -> Result<u8, DeviceError> {
        let speed = {
            let mut state = self.lock_state();
            state.current_speed = state.current_speed
                .saturating_add(self.settings.speed_step)
                .min(self.settings.max_speed);
            state.current_speed
        };

        self.set_speed(speed).await
    }

    pub async fn decrease_speed(&self) -> Result<u8, DeviceError> {
        let speed = {
            let mut state = self.lock_state();
            state.current_speed = state.current_speed
                .saturating_sub(self.settings.speed_step)
                .max(MIN_SPEED);
            state.current_speed
        };

        self.set_speed(speed).await
    }

    pub async fn run(&self) -> Result<(), DeviceError> {
        let mut poll_task = self.poll_task.lock().await;

        if self.lock_state().running {
            debug!("Already running");
            return Ok(());
        }

        self.transport.request(Method::Run, None).await?;

        {
            let mut state = self.lock_state();
            state.running = true;
            state.started_at = Some(Utc::now());
        }

        *poll_task = Some(poll_stats_task(
            self.transport.clone(),
            self.state.clone(),
            self.events.clone(),
            self.settings.poll_interval,
        ));

        info!("Running");
        Ok(())
    }

    /// Returns the recorded session, or None if the belt was not running.
    pub async fn stop(&self) -> Result<Option<SessionRecord>, DeviceError> {
        let mut poll_task = self.poll_task.lock().await;

        if !self.lock_state().running {
            debug!("Not running");
            return Ok(None);
        }

        self.transport.request(Method::Stop, None).await?;

        // the end-of-run reading, a value from an earlier poll might be stale
        let final_stats = fetch_stats(self.transport.as_ref()).await;

        {
            let mut state = self.lock_state();
            state.running = false;
            if let Some(task) = poll_task.take() {
                // detached; it only logs from here on
                drop(task.cancel());
            }
            if let Ok(stats) = &final_stats {
                state.stats = Some(*stats);
            }
        }

        let final_stats = match final_stats {
            Ok(stats) => stats,
            Err(err) => {
                warn!("Stopped without final stats, session not recorded: {}", err);
                self.events.emit(DeviceEvent::StatusUpdated);
                return Err(err);
            },
        };

        let record = match self.recorder.record(&final_stats).await {
            Ok(record) => record,
            Err(err) => {
                warn!("Stopped, but the session could not be recorded: {}", err);
                self.events.emit(DeviceEvent::StatusUpdated);
                return Err(err.into());
            },
        };

        {
            let mut state = self.lock_state();
            state.stats = None;
            state.current_speed = self.settings.default_speed.min(self.settings.max_speed);
            state.started_at = None;
        }

        info!("Stopped");
        self.events.emit(DeviceEvent::StatusUpdated);
        Ok(Some(record))
    }
}
