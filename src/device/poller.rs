use std::sync::{Arc, Mutex};
use std::time::Duration;
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::device::connection::Transport;
use crate::device::events::{DeviceEvent, EventBus};
use crate::device::protocol::Method;
use crate::device::types::{DeviceState, StatsSnapshot};
use crate::error::DeviceError;

pub(crate) async fn fetch_stats(transport: &dyn Transport) -> Result<StatsSnapshot, DeviceError> {
    let result = transport.request(Method::GetStats, None).await?;
    Ok(StatsSnapshot::from_result(result)?)
}

/// Handle to the background stats poll. Cancelling it is the running -> stopped transition.
pub(crate) struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollTask {
    /// Does not interrupt a `get_stats` that is already in flight, its result is discarded instead.
    /// Call while holding the device state lock so that a late result can not slip in.
    pub(crate) fn cancel(self) -> JoinHandle<()> {
        self.cancel.cancel();
        self.handle
    }
}

pub(crate) fn poll_stats_task(
    transport: Arc<dyn Transport>,
    state: Arc<Mutex<DeviceState>>,
    events: Arc<EventBus>,
    interval: Duration,
) -> PollTask {
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    let handle = spawn(async move {
        info!("Polling stats every {}", humantime::format_duration(interval));

        'mainloop: loop {
            if task_cancel.is_cancelled() {
                break 'mainloop;
            }

            match fetch_stats(transport.as_ref()).await {
                Ok(stats) => {
                    {
                        let mut state = state.lock().expect("Failed to lock device state");
                        if task_cancel.is_cancelled() {
                            debug!("Discarding stats that arrived after stop: {:?}", stats);
                            break 'mainloop;
                        }
                        state.stats = Some(stats);
                    }
                    events.emit(DeviceEvent::StatusUpdated);
                },
                Err(err) => {
                    // try again next interval, the bridge may recover
                    warn!("Polling stats failed: {}", err);
                },
            }

            tokio::select! {
                _ = task_cancel.cancelled() => {
                    break 'mainloop;
                },
                _ = sleep(interval) => {},
            }
        }

        info!("Stopped polling stats");
    });

    PollTask { cancel, handle }
}
