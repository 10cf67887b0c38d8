//! Connection manager for the session socket.
//!
//! DESIGN
//! ======
//! One background task owns the socket. Callers talk to it through a
//! cloneable [`ConnectionHandle`] (outbound commands) and read inbound text
//! plus lifecycle transitions from a single ordered event channel, so
//! messages and reconnects are observed in the order they happened.
//!
//! LIFECYCLE
//! =========
//! 1. `Connecting` → first attempt; the auth token rides in the URL query
//! 2. `Open` → retry counter reset, `Opened` emitted, text pumped both ways
//! 3. Unexpected close → `Dropped` emitted, `Reconnecting { attempt }` after a
//!    fixed delay, up to `max_retries` times
//! 4. Retries exhausted → `Failed` (terminal); explicit close → `Closed`
//!
//! Outbound commands issued while the socket is not open are dropped. The
//! owner resyncs on every `Opened`, and autosave is periodic, so nothing is
//! queued across an outage.

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::codec::{Command, encode_command};
use crate::config::SessionConfig;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid session url: {0}")]
    InvalidUrl(String),
    #[error("websocket error: {0}")]
    Ws(#[from] Box<tokio_tungstenite::tungstenite::Error>),
    #[error("connection closed")]
    Closed,
}

// =============================================================================
// TRANSPORT SEAM
// =============================================================================

/// An open bidirectional text socket.
#[async_trait]
pub trait Link: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound text message. `None` once the peer has closed.
    ///
    /// Must be cancel safe: the connection task races it against outbound
    /// sends.
    async fn next_text(&mut self) -> Option<Result<String, TransportError>>;

    async fn close(&mut self);
}

/// Opens [`Link`]s. Implemented over tokio-tungstenite for production and by
/// channel-backed fakes in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Link>, TransportError>;
}

/// WebSocket connector backed by `tokio_tungstenite::connect_async`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Link>, TransportError> {
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Ws(Box::new(e)))?;
        Ok(Box::new(WsLink { stream }))
    }
}

struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Link for WsLink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Ws(Box::new(e)))
    }

    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => debug!(len = bytes.len(), "ws: skipping non-utf8 binary message"),
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(TransportError::Ws(Box::new(e)))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "ws: close handshake failed");
        }
    }
}

/// Build the per-session socket URL: `{base}/room/{name}/?token={token}`.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] when `base` is not an absolute
/// hierarchical URL.
pub fn session_url(base: &str, room: &str, token: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(base).map_err(|e| TransportError::InvalidUrl(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| TransportError::InvalidUrl(base.to_owned()))?
        .pop_if_empty()
        .extend(["room", room, ""]);
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

// =============================================================================
// STATE / EVENTS
// =============================================================================

/// Lifecycle of the session socket as observed by the rest of the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    /// Waiting to make retry number `attempt` (1-based).
    Reconnecting { attempt: u32 },
    /// Retries exhausted. Terminal.
    Failed,
    /// Closed on request. Terminal.
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

/// Ordered stream item from the connection task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The socket (re)opened. Missed events are not replayed, so the owner
    /// must resync.
    Opened,
    /// Raw inbound text.
    Message(String),
    /// The socket closed unexpectedly; a retry is scheduled if any remain.
    Dropped,
    /// Retries exhausted.
    Failed,
}

/// Bounded fixed-interval retry schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failure before giving up.
    pub max_retries: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self { max_retries: config.reconnect_attempts, interval: config.reconnect_interval }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Send side used by every component that issues commands.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Fire and forget. Never fails; undeliverable commands are dropped.
    fn send(&self, command: Command);

    /// Send and wait until the command has been written to the socket.
    /// Returns `false` when it was dropped or `within` elapsed first.
    async fn send_confirmed(&self, command: Command, within: Duration) -> bool;
}

struct Outbound {
    text: String,
    ack: Option<oneshot::Sender<()>>,
}

/// Cloneable sender into the connection task.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    state: watch::Receiver<ConnectionState>,
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound").field("len", &self.text.len()).finish()
    }
}

impl ConnectionHandle {
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn push(&self, command: &Command, ack: Option<oneshot::Sender<()>>) {
        let outbound = Outbound { text: encode_command(command), ack };
        if self.outbound.send(outbound).is_err() {
            debug!(command = command.tag(), "connection task gone; dropping command");
        }
    }
}

#[async_trait]
impl CommandSink for ConnectionHandle {
    fn send(&self, command: Command) {
        self.push(&command, None);
    }

    async fn send_confirmed(&self, command: Command, within: Duration) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.push(&command, Some(ack_tx));
        matches!(tokio::time::timeout(within, ack_rx).await, Ok(Ok(())))
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Owner side of a running connection task.
#[derive(Debug)]
pub struct Connection {
    handle: ConnectionHandle,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Connection {
    #[must_use]
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// Next lifecycle or message event. `None` once the task has exited.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.events.recv().await
    }

    /// Close the socket and wait for the task to exit. Idempotent.
    pub async fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            if shutdown.send(()).is_err() {
                debug!("ws: connection task already gone");
            }
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "connection task ended abnormally");
            }
        }
    }
}

/// Spawn the connection task and start connecting to `url`.
#[must_use]
pub fn spawn_connection(connector: Arc<dyn Connector>, url: Url, policy: RetryPolicy) -> Connection {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let task = tokio::spawn(run_connection(
        connector,
        url,
        policy,
        outbound_rx,
        events_tx,
        state_tx,
        shutdown_rx,
    ));

    Connection {
        handle: ConnectionHandle { outbound: outbound_tx, state: state_rx },
        events: events_rx,
        shutdown: Some(shutdown_tx),
        task: Some(task),
    }
}

enum PumpExit {
    Dropped,
    Shutdown,
}

async fn run_connection(
    connector: Arc<dyn Connector>,
    url: Url,
    policy: RetryPolicy,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    state_tx: watch::Sender<ConnectionState>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let path = url.path().to_owned();
    let mut failures: u32 = 0;

    loop {
        let attempt = tokio::select! {
            result = connector.connect(&url) => result,
            _ = &mut shutdown => break,
        };

        match attempt {
            Ok(mut link) => {
                failures = 0;
                drop_stale_outbound(&mut outbound_rx);
                state_tx.send_replace(ConnectionState::Open);
                info!(%path, "ws: connected");
                if events_tx.send(ConnectionEvent::Opened).is_err() {
                    link.close().await;
                    break;
                }

                match pump(link.as_mut(), &mut outbound_rx, &events_tx, &mut shutdown).await {
                    PumpExit::Shutdown => {
                        link.close().await;
                        break;
                    }
                    PumpExit::Dropped => {
                        warn!(%path, "ws: connection dropped");
                        if events_tx.send(ConnectionEvent::Dropped).is_err() {
                            debug!("ws: no owner listening for the drop");
                        }
                    }
                }
            }
            Err(e) => {
                warn!(%path, attempt = failures, error = %e, "ws: connect failed");
            }
        }

        if failures >= policy.max_retries {
            error!(%path, retries = policy.max_retries, "ws: reconnect attempts exhausted");
            state_tx.send_replace(ConnectionState::Failed);
            if events_tx.send(ConnectionEvent::Failed).is_err() {
                debug!("ws: no owner listening for the failure");
            }
            return;
        }

        failures += 1;
        state_tx.send_replace(ConnectionState::Reconnecting { attempt: failures });
        if !wait_before_retry(policy.interval, &mut outbound_rx, &mut shutdown).await {
            break;
        }
    }

    state_tx.send_replace(ConnectionState::Closed);
    info!(%path, "ws: closed");
}

/// Relay text until the socket drops or shutdown is requested.
async fn pump(
    link: &mut dyn Link,
    outbound_rx: &mut mpsc::UnboundedReceiver<Outbound>,
    events_tx: &mpsc::UnboundedSender<ConnectionEvent>,
    shutdown: &mut oneshot::Receiver<()>,
) -> PumpExit {
    loop {
        tokio::select! {
            _ = &mut *shutdown => return PumpExit::Shutdown,
            inbound = link.next_text() => match inbound {
                Some(Ok(text)) => {
                    if events_tx.send(ConnectionEvent::Message(text)).is_err() {
                        return PumpExit::Shutdown;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "ws: receive failed");
                    return PumpExit::Dropped;
                }
                None => return PumpExit::Dropped,
            },
            outbound = outbound_rx.recv() => {
                let Some(Outbound { text, ack }) = outbound else {
                    return PumpExit::Shutdown;
                };
                if let Err(e) = link.send_text(text).await {
                    warn!(error = %e, "ws: send failed");
                    return PumpExit::Dropped;
                }
                if let Some(ack) = ack {
                    if ack.send(()).is_err() {
                        debug!("ws: confirmation arrived after the sender gave up");
                    }
                }
            }
        }
    }
}

/// Sleep for `interval`, dropping any commands issued meanwhile. Returns
/// `false` when shutdown was requested.
async fn wait_before_retry(
    interval: Duration,
    outbound_rx: &mut mpsc::UnboundedReceiver<Outbound>,
    shutdown: &mut oneshot::Receiver<()>,
) -> bool {
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return true,
            _ = &mut *shutdown => return false,
            outbound = outbound_rx.recv() => match outbound {
                Some(_) => debug!("ws: not connected; dropping command"),
                None => return false,
            },
        }
    }
}

fn drop_stale_outbound(outbound_rx: &mut mpsc::UnboundedReceiver<Outbound>) {
    let mut dropped = 0_usize;
    while outbound_rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!(dropped, "ws: dropped commands issued while not connected");
    }
}
