use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use futures::channel::mpsc::{unbounded, UnboundedReceiver};
use log::debug;

use crate::session::types::SessionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SpeedChanged,
    StatusUpdated,
    LinkEstablished,
    SessionCreated,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::SpeedChanged,
        EventKind::StatusUpdated,
        EventKind::LinkEstablished,
        EventKind::SessionCreated,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    SpeedChanged(u8),
    StatusUpdated,
    LinkEstablished,
    SessionCreated(SessionRecord),
}

impl DeviceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DeviceEvent::SpeedChanged(_) => EventKind::SpeedChanged,
            DeviceEvent::StatusUpdated => EventKind::StatusUpdated,
            DeviceEvent::LinkEstablished => EventKind::LinkEstablished,
            DeviceEvent::SessionCreated(_) => EventKind::SessionCreated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&DeviceEvent) + Send + Sync>;

/// Synchronous publish/subscribe for device state changes.
///
/// Handlers run on the emitting task, in subscription order, before `emit` returns. Nothing is
/// queued: a subscriber only sees events emitted after it subscribed.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock()
            .expect("Failed to lock event subscribers")
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().expect("Failed to lock event subscribers");

        for handlers in subscribers.values_mut() {
            if let Some(index) = handlers.iter().position(|(handler_id, _)| *handler_id == id) {
                handlers.remove(index);
                return true;
            }
        }

        false
    }

    pub fn emit(&self, event: DeviceEvent) {
        // handlers are cloned out so that they may (un)subscribe without deadlocking
        let handlers: Vec<Handler> = match self.subscribers.lock()
            .expect("Failed to lock event subscribers")
            .get(&event.kind())
        {
            Some(handlers) => handlers.iter().map(|(_, handler)| handler.clone()).collect(),
            None => Vec::new(),
        };

        debug!("Emitting {:?} to {} subscriber(s)", event, handlers.len());
        for handler in handlers {
            handler(&event);
        }
    }

    /// Forwards the given kinds of events to a channel, for consumers living on another task.
    pub fn subscribe_channel(&self, kinds: &[EventKind]) -> (Vec<SubscriptionId>, UnboundedReceiver<DeviceEvent>) {
        let (sender, receiver) = unbounded();

        let ids = kinds.iter().map(|kind| {
            let sender = sender.clone();
            self.subscribe(*kind, move |event| {
                // the receiver may have been dropped by a consumer that did not unsubscribe
                let _ = sender.unbounded_send(event.clone());
            })
        }).collect();

        (ids, receiver)
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use super::*;

    fn recording_bus() -> (EventBus, Arc<Mutex<Vec<String>>>) {
        (EventBus::new(), Arc::new(Mutex::new(Vec::new())))
    }

    #[test]
    fn delivers_in_subscription_order() {
        let (bus, log) = recording_bus();

        for name in ["first", "second", "third"] {
            let log = log.clone();
            bus.subscribe(EventKind::SpeedChanged, move |event| {
                log.lock().unwrap().push(format!("{} {:?}", name, event));
            });
        }

        bus.emit(DeviceEvent::SpeedChanged(20));

        assert_eq!(*log.lock().unwrap(), vec![
            "first SpeedChanged(20)",
            "second SpeedChanged(20)",
            "third SpeedChanged(20)",
        ]);
    }

    #[test]
    fn only_matching_kind_is_notified() {
        let (bus, log) = recording_bus();
        let log2 = log.clone();
        bus.subscribe(EventKind::LinkEstablished, move |_| log2.lock().unwrap().push("link".into()));

        bus.emit(DeviceEvent::StatusUpdated);
        assert!(log.lock().unwrap().is_empty());

        bus.emit(DeviceEvent::LinkEstablished);
        assert_eq!(*log.lock().unwrap(), vec!["link"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let (bus, log) = recording_bus();
        let log2 = log.clone();
        let id = bus.subscribe(EventKind::StatusUpdated, move |_| log2.lock().unwrap().push("status".into()));

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));

        bus.emit(DeviceEvent::StatusUpdated);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn late_subscribers_get_no_replay() {
        let (bus, log) = recording_bus();
        bus.emit(DeviceEvent::StatusUpdated);

        let log2 = log.clone();
        bus.subscribe(EventKind::StatusUpdated, move |_| log2.lock().unwrap().push("status".into()));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn handlers_may_unsubscribe_themselves() {
        let bus = Arc::new(EventBus::new());
        let calls = Arc::new(AtomicU64::new(0));
        let own_id = Arc::new(Mutex::new(None));

        let id = {
            let handler_bus = bus.clone();
            let calls = calls.clone();
            let own_id = own_id.clone();
            bus.subscribe(EventKind::StatusUpdated, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = own_id.lock().unwrap().take() {
                    handler_bus.unsubscribe(id);
                }
            })
        };
        *own_id.lock().unwrap() = Some(id);

        bus.emit(DeviceEvent::StatusUpdated);
        bus.emit(DeviceEvent::StatusUpdated);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn channel_subscription_forwards_events() {
        let bus = EventBus::new();
        let (ids, mut receiver) = bus.subscribe_channel(&[EventKind::SpeedChanged, EventKind::StatusUpdated]);
        assert_eq!(ids.len(), 2);

        bus.emit(DeviceEvent::SpeedChanged(24));
        bus.emit(DeviceEvent::LinkEstablished);
        bus.emit(DeviceEvent::StatusUpdated);

        assert_eq!(receiver.next().await, Some(DeviceEvent::SpeedChanged(24)));
        assert_eq!(receiver.next().await, Some(DeviceEvent::StatusUpdated));
    }
}
