//! Live import progress over WebSocket, with a polling fallback
//!
//! The channel owns one background task driving an explicit connection
//! state machine: `Disconnected -> Connecting -> Connected`, detouring
//! through `ReconnectScheduled` on connection loss. The subscription set is
//! durable channel state: every successful (re)connect re-issues it, so a
//! dropped socket never silently loses a subscription.
//!
//! Per-batch updates arrive in server order; each update is the
//! authoritative latest state for its batch, not a delta. Updates for
//! different batches carry no ordering guarantee relative to each other.

pub mod protocol;

use crate::config::ProgressConfig;
use crate::error::{PublishError, Result};
use crate::import::ImportOrchestrator;
use cip_common::types::{ImportStatus, ProgressUpdate};
use futures_util::{SinkExt, StreamExt};
use protocol::{ClientMessage, ServerMessage};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the internal event fan-out
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    ReconnectScheduled,
}

/// Callbacks invoked from the channel's background task.
///
/// All methods default to no-ops so implementors override only what they
/// need.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, _update: &ProgressUpdate) {}
    fn on_complete(&self, _update: &ProgressUpdate) {}
    fn on_error(&self, _batch_id: Option<&str>, _message: &str) {}
    fn on_heartbeat(&self) {}
}

/// Observer that ignores everything
pub struct NullObserver;

impl ProgressObserver for NullObserver {}

/// Event fanned out to channel subscribers
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Latest state for one batch; terminal status means the batch is done
    Progress(ProgressUpdate),
    /// Error scoped to one batch, or channel-wide when `batch_id` is `None`
    Error {
        batch_id: Option<String>,
        message: String,
    },
}

enum Command {
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    Close,
}

/// Handle to the progress channel task
pub struct ProgressChannel {
    command_tx: mpsc::UnboundedSender<Command>,
    events_tx: broadcast::Sender<ChannelEvent>,
    state: Arc<Mutex<ChannelState>>,
    terminated: Arc<AtomicBool>,
    config: ProgressConfig,
}

impl ProgressChannel {
    /// Start the channel against a `ws://` / `wss://` progress URL.
    ///
    /// Returns immediately; connection establishment (and any reconnects)
    /// happen in the background task.
    pub fn connect(
        url: String,
        config: ProgressConfig,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = Arc::new(Mutex::new(ChannelState::Disconnected));
        let terminated = Arc::new(AtomicBool::new(false));

        let driver = Driver {
            url,
            config: config.clone(),
            observer,
            command_rx,
            events_tx: events_tx.clone(),
            state: Arc::clone(&state),
            terminated: Arc::clone(&terminated),
            subscriptions: BTreeSet::new(),
        };
        tokio::spawn(driver.run());

        Self {
            command_tx,
            events_tx,
            state,
            terminated,
            config,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ChannelState {
        self.state
            .lock()
            .map(|guard| *guard)
            .unwrap_or(ChannelState::Disconnected)
    }

    /// Subscribe to updates for these batches. The subscription survives
    /// reconnects until explicitly removed.
    pub fn subscribe(&self, batch_ids: Vec<String>) {
        let _ = self.command_tx.send(Command::Subscribe(batch_ids));
    }

    /// Remove batches from the subscription set
    pub fn unsubscribe(&self, batch_ids: Vec<String>) {
        let _ = self.command_tx.send(Command::Unsubscribe(batch_ids));
    }

    /// Receive a stream of channel events
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events_tx.subscribe()
    }

    /// Close the channel, cancelling the background task and clearing the
    /// subscription set
    pub fn close(&self) {
        let _ = self.command_tx.send(Command::Close);
    }

    /// Subscribe to one batch and wait until it reaches a terminal status.
    ///
    /// Timing out is distinct from the batch failing: on `WaitTimeout` the
    /// import may still be running.
    pub async fn wait_for_batch_completion(
        &self,
        batch_id: &str,
        timeout: Duration,
    ) -> Result<ProgressUpdate> {
        let mut events = self.events();
        // The task may have already given up before this waiter subscribed;
        // events sent earlier are not replayed, so check the flag directly
        if self.terminated.load(Ordering::SeqCst) {
            return Err(PublishError::ReconnectExhausted {
                attempts: self.config.max_reconnect_attempts,
            });
        }
        self.subscribe(vec![batch_id.to_string()]);

        let deadline = Instant::now() + timeout;
        loop {
            let event = match tokio::time::timeout_at(deadline, events.recv()).await {
                Err(_) => return Err(PublishError::wait_timeout(batch_id)),
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(PublishError::ChannelClosed {
                        batch_id: batch_id.to_string(),
                    })
                },
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!(batch_id = %batch_id, skipped, "Progress events lagged");
                    continue;
                },
                Ok(Ok(event)) => event,
            };

            match event {
                ChannelEvent::Progress(update)
                    if update.batch_id == batch_id && update.status.is_terminal() =>
                {
                    return Ok(update);
                },
                ChannelEvent::Progress(_) => {},
                ChannelEvent::Error {
                    batch_id: Some(ref errored),
                    ref message,
                } if errored.as_str() == batch_id => {
                    return Err(PublishError::api(message.clone()));
                },
                ChannelEvent::Error { batch_id: None, .. } => {
                    return Err(PublishError::ReconnectExhausted {
                        attempts: self.config.max_reconnect_attempts,
                    });
                },
                ChannelEvent::Error { .. } => {},
            }
        }
    }
}

enum SessionEnd {
    /// Caller asked to close; stop for good
    Closed,
    /// Socket dropped; schedule a reconnect
    Dropped,
}

struct Driver {
    url: String,
    config: ProgressConfig,
    observer: Arc<dyn ProgressObserver>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    events_tx: broadcast::Sender<ChannelEvent>,
    state: Arc<Mutex<ChannelState>>,
    terminated: Arc<AtomicBool>,
    subscriptions: BTreeSet<String>,
}

impl Driver {
    async fn run(mut self) {
        let mut reconnect_attempts: u32 = 0;

        loop {
            self.set_state(ChannelState::Connecting);

            let connected =
                tokio::time::timeout(
                    self.config.connect_timeout(),
                    connect_async(self.url.as_str()),
                )
                .await;

            match connected {
                Ok(Ok((ws, _response))) => {
                    reconnect_attempts = 0;
                    self.set_state(ChannelState::Connected);
                    info!(url = %self.url, "Progress channel connected");

                    match self.drive_session(ws).await {
                        SessionEnd::Closed => {
                            self.shutdown();
                            return;
                        },
                        SessionEnd::Dropped => {},
                    }
                },
                Ok(Err(err)) => {
                    warn!(url = %self.url, error = %err, "Progress channel connect failed");
                },
                Err(_) => {
                    warn!(url = %self.url, "Progress channel connect timed out");
                },
            }

            if reconnect_attempts >= self.config.max_reconnect_attempts {
                let message = format!(
                    "progress channel gave up after {} reconnect attempts",
                    reconnect_attempts
                );
                warn!(url = %self.url, "{}", message);
                self.observer.on_error(None, &message);
                let _ = self.events_tx.send(ChannelEvent::Error {
                    batch_id: None,
                    message,
                });
                self.shutdown();
                return;
            }

            self.set_state(ChannelState::ReconnectScheduled);
            let backoff = self.config.backoff_for_attempt(reconnect_attempts);
            reconnect_attempts += 1;
            debug!(
                attempt = reconnect_attempts,
                backoff_ms = backoff.as_millis() as u64,
                "Reconnect scheduled"
            );

            if self.wait_backoff(backoff).await {
                self.shutdown();
                return;
            }
        }
    }

    /// Serve commands while waiting out the backoff. Returns true when the
    /// channel was closed during the wait.
    async fn wait_backoff(&mut self, backoff: Duration) -> bool {
        let deadline = Instant::now() + backoff;
        loop {
            match tokio::time::timeout_at(deadline, self.command_rx.recv()).await {
                Err(_) => return false,
                Ok(Some(Command::Subscribe(ids))) => {
                    self.subscriptions.extend(ids);
                },
                Ok(Some(Command::Unsubscribe(ids))) => {
                    for id in &ids {
                        self.subscriptions.remove(id);
                    }
                },
                Ok(Some(Command::Close)) | Ok(None) => return true,
            }
        }
    }

    async fn drive_session(&mut self, mut ws: WsStream) -> SessionEnd {
        // Re-issue the durable subscription set on every (re)connect
        if !self.subscriptions.is_empty() {
            let resubscribe = ClientMessage::Subscribe {
                batch_ids: self.subscriptions.iter().cloned().collect(),
            };
            if self.send_client_message(&mut ws, &resubscribe).await.is_err() {
                return SessionEnd::Dropped;
            }
        }

        // Application-level keepalive alongside the WS-level ping/pong, so
        // intermediaries that drop idle connections see traffic
        let mut keepalive = tokio::time::interval(self.config.ping_interval());
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; consume it
        keepalive.tick().await;

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(Command::Subscribe(ids)) => {
                        self.subscriptions.extend(ids.iter().cloned());
                        let msg = ClientMessage::Subscribe { batch_ids: ids };
                        if self.send_client_message(&mut ws, &msg).await.is_err() {
                            return SessionEnd::Dropped;
                        }
                    },
                    Some(Command::Unsubscribe(ids)) => {
                        for id in &ids {
                            self.subscriptions.remove(id);
                        }
                        let msg = ClientMessage::Unsubscribe { batch_ids: ids };
                        if self.send_client_message(&mut ws, &msg).await.is_err() {
                            return SessionEnd::Dropped;
                        }
                    },
                    Some(Command::Close) | None => {
                        let _ = ws.close(None).await;
                        return SessionEnd::Closed;
                    },
                },
                _ = keepalive.tick() => {
                    if self.send_client_message(&mut ws, &ClientMessage::Ping).await.is_err() {
                        return SessionEnd::Dropped;
                    }
                },
                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_server_text(&text),
                    Some(Ok(Message::Ping(payload))) => {
                        if ws.send(Message::Pong(payload)).await.is_err() {
                            return SessionEnd::Dropped;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Progress channel socket closed by peer");
                        return SessionEnd::Dropped;
                    },
                    Some(Ok(_)) => {},
                    Some(Err(err)) => {
                        warn!(error = %err, "Progress channel read failed");
                        return SessionEnd::Dropped;
                    },
                },
            }
        }
    }

    async fn send_client_message(
        &self,
        ws: &mut WsStream,
        message: &ClientMessage,
    ) -> std::result::Result<(), ()> {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "Failed to encode client message");
                return Ok(());
            },
        };
        ws.send(Message::Text(text)).await.map_err(|err| {
            warn!(error = %err, "Progress channel send failed");
        })
    }

    fn handle_server_text(&self, text: &str) {
        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "Unparseable progress message; skipping");
                return;
            },
        };

        match message {
            ServerMessage::Progress { update } => {
                self.observer.on_progress(&update);
                let _ = self.events_tx.send(ChannelEvent::Progress(update));
            },
            ServerMessage::Complete { mut update } => {
                // Completion is delivered to waiters as a terminal progress
                // event so they need only one code path
                if !update.status.is_terminal() {
                    update.status = ImportStatus::Completed;
                }
                self.observer.on_complete(&update);
                let _ = self.events_tx.send(ChannelEvent::Progress(update));
            },
            ServerMessage::InitialState { batches } => {
                for update in batches {
                    self.observer.on_progress(&update);
                    let _ = self.events_tx.send(ChannelEvent::Progress(update));
                }
            },
            ServerMessage::Error { batch_id, message } => {
                self.observer.on_error(batch_id.as_deref(), &message);
                let _ = self.events_tx.send(ChannelEvent::Error { batch_id, message });
            },
            ServerMessage::Heartbeat => {
                self.observer.on_heartbeat();
            },
        }
    }

    fn set_state(&self, next: ChannelState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = next;
        }
    }

    fn shutdown(&mut self) {
        self.subscriptions.clear();
        self.terminated.store(true, Ordering::SeqCst);
        self.set_state(ChannelState::Disconnected);
    }
}

/// Poll a batch to completion through the status endpoint.
///
/// Fallback with the same caller-visible contract as
/// [`ProgressChannel::wait_for_batch_completion`], for destinations where
/// the WebSocket cannot be opened.
pub async fn poll_batch_to_completion(
    orchestrator: &ImportOrchestrator,
    kind: &str,
    batch_id: &str,
    interval: Duration,
    timeout: Duration,
    observer: &dyn ProgressObserver,
) -> Result<ProgressUpdate> {
    let deadline = Instant::now() + timeout;

    loop {
        let update = orchestrator.get_status(kind, batch_id).await?;

        if update.status.is_terminal() {
            observer.on_complete(&update);
            return Ok(update);
        }
        observer.on_progress(&update);

        if Instant::now() + interval > deadline {
            return Err(PublishError::wait_timeout(batch_id));
        }
        tokio::time::sleep(interval).await;
    }
}
