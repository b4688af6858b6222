use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::device::constants::REQUEST_DEADLINE;
use crate::device::pending::PendingRequests;
use crate::device::protocol::{Method, RequestFrame};
use crate::device::types::ConnectionState;
use crate::error::{ProtocolError, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = tokio::sync::Mutex<SplitSink<WsStream, Message>>;

/// A correlated request/response channel to the bridge.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: Method, params: Option<Value>) -> Result<Value, TransportError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectionOptions {
    /// None waits for a response forever
    pub request_timeout: Option<Duration>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions {
            request_timeout: Some(Duration::from_millis(REQUEST_DEADLINE)),
        }
    }
}

struct Shared {
    pending: PendingRequests,
    state: Mutex<ConnectionState>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.lock().expect("Failed to lock connection state")
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().expect("Failed to lock connection state") = state;
    }

    // Leaving Open fails every request that is still waiting, nothing will answer them anymore
    fn end(&self, state: ConnectionState) {
        self.set_state(state);
        let failed = self.pending.fail_all();
        if failed > 0 {
            warn!("Connection {:?}; failed {} pending request(s)", state, failed);
        }
    }
}

/// The single websocket connection to the bridge process.
pub struct BridgeConnection {
    sink: WsSink,
    shared: Arc<Shared>,
    options: ConnectionOptions,
    cancel: CancellationToken,
    read_task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeConnection {
    pub async fn open(url: &str, options: ConnectionOptions) -> Result<Self, TransportError> {
        let shared = Arc::new(Shared {
            pending: PendingRequests::new(),
            state: Mutex::new(ConnectionState::Disconnected),
        });

        shared.set_state(ConnectionState::Connecting);
        info!("Connecting to bridge at {}...", url);

        let stream = match connect_async(url).await {
            Ok((stream, _response)) => stream,
            Err(source) => {
                shared.set_state(ConnectionState::Errored);
                return Err(TransportError::Connect { url: url.to_string(), source });
            },
        };

        shared.set_state(ConnectionState::Open);
        info!("Connected to bridge");

        let (sink, stream) = stream.split();
        let cancel = CancellationToken::new();
        let read_task_handle = read_frames_task(cancel.clone(), stream, shared.clone());

        Ok(BridgeConnection {
            sink: tokio::sync::Mutex::new(sink),
            shared,
            options,
            cancel,
            read_task_handle: Mutex::new(Some(read_task_handle)),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    pub async fn close(&self) {
        if self.shared.state() == ConnectionState::Open {
            info!("Closing connection to bridge");
            let mut sink = self.sink.lock().await;
            if let Err(err) = sink.send(Message::Close(None)).await {
                debug!("Failed to send close frame: {:?}", err);
            }
        }

        self.cancel.cancel();
        self.shared.end(ConnectionState::Closed);

        let handle = self.read_task_handle.lock()
            .expect("Failed to lock read frames task handle")
            .take();

        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!("Failed to join read frames task: {:?}", err);
            }
        }
    }

    async fn send_frame(&self, frame: &RequestFrame) -> Result<(), TransportError> {
        let text = serde_json::to_string(frame)?;
        let mut sink = self.sink.lock().await;

        // checked under the sink lock so a concurrent close is observed
        let state = self.shared.state();
        if state != ConnectionState::Open {
            return Err(TransportError::NotOpen { state });
        }

        if let Err(source) = sink.send(Message::Text(text)).await {
            self.shared.end(ConnectionState::Errored);
            return Err(TransportError::Send { source });
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for BridgeConnection {
    async fn request(&self, method: Method, params: Option<Value>) -> Result<Value, TransportError> {
        let state = self.shared.state();
        if state != ConnectionState::Open {
            return Err(TransportError::NotOpen { state });
        }

        let (id, response) = self.shared.pending.register();
        let frame = RequestFrame { id: id.clone(), method, params };
        debug!("-> {} {}", id, method);

        if let Err(err) = self.send_frame(&frame).await {
            self.shared.pending.evict(&id);
            return Err(err);
        }

        let received = match self.options.request_timeout {
            None => response.await,
            Some(deadline) => match timeout(deadline, response).await {
                Ok(received) => received,
                Err(_) => {
                    self.shared.pending.evict(&id);
                    warn!("Request {} ({}) timed out, evicted", id, method);
                    return Err(TransportError::Timeout { method: method.to_string(), timeout: deadline });
                },
            },
        };

        match received {
            Ok(result) => {
                debug!("<- {} {}", id, method);
                Ok(result)
            },
            Err(_) => Err(TransportError::ConnectionLost { method: method.to_string() }),
        }
    }
}

impl Drop for BridgeConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn handle_text_frame(shared: &Shared, text: &str) {
    match shared.pending.dispatch(text) {
        Ok(_) => {},
        Err(ProtocolError::MissingId) => {
            debug!("Dropping frame without correlation id: {}", text);
        },
        Err(err) => {
            warn!("Dropping frame from bridge: {}", err);
        },
    }
}

fn read_frames_task(cancel: CancellationToken, mut stream: SplitStream<WsStream>, shared: Arc<Shared>) -> JoinHandle<()> {
    spawn(async move {
        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => handle_text_frame(&shared, &text),
                    Some(Ok(Message::Close(frame))) => {
                        info!("Bridge closed the connection: {:?}", frame);
                        shared.end(ConnectionState::Closed);
                        break 'mainloop;
                    },
                    Some(Ok(other)) => {
                        debug!("Ignoring non-text frame: {:?}", other);
                    },
                    Some(Err(err)) => {
                        warn!("Connection to bridge failed: {}", err);
                        shared.end(ConnectionState::Errored);
                        break 'mainloop;
                    },
                    None => {
                        info!("Disconnected from bridge");
                        shared.end(ConnectionState::Closed);
                        break 'mainloop;
                    },
                },
            }
        }
    })
}
