use std::collections::HashMap;
use std::sync::Mutex;
use log::debug;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::device::protocol::{new_correlation_id, ResponseFrame};
use crate::error::ProtocolError;

/// Requests that have been sent to the bridge and are awaiting their response, by correlation id.
///
/// Dropping a completion handle (see `fail_all`) wakes its receiver with a `RecvError`, which the
/// connection reports as a lost connection.
#[derive(Debug, Default)]
pub struct PendingRequests {
    inner: Mutex<HashMap<String, oneshot::Sender<Value>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        PendingRequests::default()
    }

    pub fn register(&self) -> (String, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().expect("Failed to lock pending requests");

        let mut id = new_correlation_id();
        while inner.contains_key(&id) {
            debug!("Correlation id {} is already pending, generating another", id);
            id = new_correlation_id();
        }

        inner.insert(id.clone(), tx);
        (id, rx)
    }

    /// Resolves the pending request matching the frame. Returns the id that was resolved.
    pub fn dispatch(&self, text: &str) -> Result<String, ProtocolError> {
        let frame = ResponseFrame::parse(text)?;

        let sender = self.inner.lock()
            .expect("Failed to lock pending requests")
            .remove(&frame.id);

        match sender {
            None => Err(ProtocolError::Unmatched { id: frame.id }),
            Some(sender) => {
                // the receiver is gone if the caller timed out in the meantime
                if sender.send(frame.result).is_err() {
                    debug!("Caller for {} stopped waiting before the response arrived", frame.id);
                }
                Ok(frame.id)
            },
        }
    }

    pub fn evict(&self, id: &str) -> bool {
        self.inner.lock()
            .expect("Failed to lock pending requests")
            .remove(id)
            .is_some()
    }

    pub fn fail_all(&self) -> usize {
        let mut inner = self.inner.lock().expect("Failed to lock pending requests");
        let count = inner.len();
        inner.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("Failed to lock pending requests").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
