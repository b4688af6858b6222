use std::sync::Arc;
use chrono::Local;
use log::info;
use tokio::task::spawn_blocking;

use crate::device::events::{DeviceEvent, EventBus};
use crate::device::types::StatsSnapshot;
use crate::error::StorageError;
use crate::session::store::SessionStore;
use crate::session::types::{NewSession, ReportWindow, SessionRecord, SessionSummary};

/// Persists one summary per finished session and answers report queries.
///
/// Storage calls are blocking (sqlite) and run on the blocking thread pool.
#[derive(Clone)]
pub struct SessionRecorder {
    store: Arc<dyn SessionStore>,
    events: Arc<EventBus>,
}

impl SessionRecorder {
    pub fn new(store: Arc<dyn SessionStore>, events: Arc<EventBus>) -> Self {
        SessionRecorder { store, events }
    }

    pub async fn record(&self, stats: &StatsSnapshot) -> Result<SessionRecord, StorageError> {
        let session = NewSession::from(stats);
        let store = self.store.clone();

        let record = spawn_blocking(move || store.create(&session)).await??;
        info!(
            "Recorded session {}: distance {}, steps {}, duration {}s",
            record.id, record.distance, record.steps, record.duration,
        );

        self.events.emit(DeviceEvent::SessionCreated(record.clone()));
        Ok(record)
    }

    // recomputed on every call, nothing is cached
    pub async fn aggregate(&self, window: ReportWindow) -> Result<SessionSummary, StorageError> {
        let range = window.range(Local::now());
        let store = self.store.clone();

        spawn_blocking(move || store.aggregate(&range)).await?
    }

    pub async fn sessions(&self) -> Result<Vec<SessionRecord>, StorageError> {
        let store = self.store.clone();
        spawn_blocking(move || store.all()).await?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use crate::device::events::EventKind;
    use crate::session::store::SqliteSessionStore;
    use super::*;

    fn stats(distance: f64, elapsed_time: u32, steps: u32) -> StatsSnapshot {
        StatsSnapshot { distance, elapsed_time, speed: 16.0, state_code: 1, steps }
    }

    #[tokio::test]
    async fn record_persists_and_notifies() {
        let events = Arc::new(EventBus::new());
        let created = Arc::new(Mutex::new(Vec::new()));
        let created2 = created.clone();
        events.subscribe(EventKind::SessionCreated, move |event| {
            if let DeviceEvent::SessionCreated(record) = event {
                created2.lock().unwrap().push(record.clone());
            }
        });

        let recorder = SessionRecorder::new(Arc::new(SqliteSessionStore::open_in_memory().unwrap()), events);
        let record = recorder.record(&stats(900.0, 200, 1000)).await.unwrap();

        assert_eq!((record.distance, record.steps, record.duration), (900.0, 1000, 200));
        assert_eq!(*created.lock().unwrap(), vec![record.clone()]);
        assert_eq!(recorder.sessions().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn today_includes_a_session_recorded_now() {
        let recorder = SessionRecorder::new(
            Arc::new(SqliteSessionStore::open_in_memory().unwrap()),
            Arc::new(EventBus::new()),
        );
        assert_eq!(recorder.aggregate(ReportWindow::Today).await.unwrap(), SessionSummary::default());

        recorder.record(&stats(500.0, 120, 600)).await.unwrap();
        recorder.record(&stats(900.0, 200, 1000)).await.unwrap();

        let expected = SessionSummary { distance: 1400.0, steps: 1600, duration: 320, sessions: 2 };
        assert_eq!(recorder.aggregate(ReportWindow::All).await.unwrap(), expected);
        assert_eq!(recorder.aggregate(ReportWindow::Today).await.unwrap(), expected);
    }
}
