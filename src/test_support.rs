//! In-memory stand-ins for the socket and the command sink.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::net::api::{ApiError, CatalogPage, CatalogQuery, Report, RoomApi, RoomTicket};
use crate::net::codec::{Command, decode_command};
use crate::net::connection::{CommandSink, Connector, Link, TransportError};
use crate::net::types::ItemId;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::DEBUG).try_init();
}

// =============================================================
// Channel-backed transport
// =============================================================

/// Server side of an accepted fake socket.
pub struct ServerEnd {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn push(&self, command: &str, data: Value) {
        let text = wire::encode_envelope(&wire::Envelope::new(command, data));
        let _ = self.to_client.send(text);
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.to_client.send(text.to_owned());
    }

    /// Next command written by the client, waiting if needed.
    pub async fn recv(&mut self) -> Option<Command> {
        let text = self.from_client.recv().await?;
        decode_command(&text).ok()
    }

    /// Every command already written by the client.
    pub fn drain(&mut self) -> Vec<Command> {
        let mut out = Vec::new();
        while let Ok(text) = self.from_client.try_recv() {
            if let Ok(command) = decode_command(&text) {
                out.push(command);
            }
        }
        out
    }
}

struct ChannelLink {
    to_server: mpsc::UnboundedSender<String>,
    from_server: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Link for ChannelLink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.to_server.send(text).map_err(|_| TransportError::Closed)
    }

    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        self.from_server.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.from_server.close();
    }
}

/// Connector that accepts or refuses attempts from a script. Attempts past
/// the end of the script are refused.
pub struct FakeConnector {
    script: Mutex<VecDeque<bool>>,
    attempts: AtomicUsize,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

impl FakeConnector {
    pub fn new(script: impl IntoIterator<Item = bool>) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Self { script: Mutex::new(script.into_iter().collect()), attempts: AtomicUsize::new(0), accepted };
        (Arc::new(connector), rx)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _url: &Url) -> Result<Box<dyn Link>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let accept = self.script.lock().expect("script lock").pop_front().unwrap_or(false);
        if !accept {
            return Err(TransportError::Closed);
        }
        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();
        let _ = self.accepted.send(ServerEnd { to_client, from_client });
        Ok(Box::new(ChannelLink { to_server, from_server }))
    }
}

// =============================================================
// Recording sink
// =============================================================

/// Sink that records every command in send order.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Command>>,
    refuse_confirm: AtomicBool,
}

impl RecordingSink {
    /// A sink whose confirmed sends never get confirmed.
    pub fn unconfirmed() -> Self {
        Self { sent: Mutex::new(Vec::new()), refuse_confirm: AtomicBool::new(true) }
    }

    /// Start or stop confirming sends, like a socket coming back or going away.
    pub fn set_confirming(&self, confirming: bool) {
        self.refuse_confirm.store(!confirming, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn take(&self) -> Vec<Command> {
        std::mem::take(&mut *self.sent.lock().expect("sent lock"))
    }
}

#[async_trait]
impl CommandSink for RecordingSink {
    fn send(&self, command: Command) {
        self.sent.lock().expect("sent lock").push(command);
    }

    async fn send_confirmed(&self, command: Command, within: Duration) -> bool {
        self.send(command);
        if self.refuse_confirm.load(Ordering::SeqCst) {
            tokio::time::sleep(within).await;
            return false;
        }
        true
    }
}

// =============================================================
// Room API double
// =============================================================

/// Room API that records calls as `"op:room[:arg]"` strings.
#[derive(Default)]
pub struct FakeRoomApi {
    calls: Mutex<Vec<String>>,
    failing: bool,
}

impl FakeRoomApi {
    /// An API whose every call fails with a 500.
    pub fn failing() -> Self {
        Self { calls: Mutex::new(Vec::new()), failing: true }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: String) -> Result<(), ApiError> {
        let path = call.clone();
        self.calls.lock().expect("calls lock").push(call);
        if self.failing {
            return Err(ApiError::Status { method: reqwest::Method::POST, path, status: 500, body: String::new() });
        }
        Ok(())
    }
}

#[async_trait]
impl RoomApi for FakeRoomApi {
    async fn join(&self, room: &str, _password: &str) -> Result<(), ApiError> {
        self.record(format!("join:{room}"))
    }

    async fn membership(&self, room: &str) -> Result<RoomTicket, ApiError> {
        self.record(format!("membership:{room}"))?;
        Ok(RoomTicket { is_host: true, token: "t0ken".into(), message: String::new() })
    }

    async fn leave(&self, room: &str) -> Result<(), ApiError> {
        self.record(format!("leave:{room}"))
    }

    async fn add_item(&self, room: &str, item_id: ItemId) -> Result<(), ApiError> {
        self.record(format!("add_item:{room}:{item_id}"))
    }

    async fn remove_item(&self, room: &str, item_id: ItemId) -> Result<(), ApiError> {
        self.record(format!("remove_item:{room}:{item_id}"))
    }

    async fn browse_items(&self, query: &CatalogQuery) -> Result<CatalogPage, ApiError> {
        self.record(format!("browse_items:{}", query.search.as_deref().unwrap_or_default()))?;
        Ok(CatalogPage::default())
    }

    async fn export_report(&self, room: &str) -> Result<Report, ApiError> {
        self.record(format!("export_report:{room}"))?;
        Ok(Report { filename: format!("{room}_report"), bytes: b"report".to_vec() })
    }
}
