//! Session client: one owner task per open session view.
//!
//! DESIGN
//! ======
//! `SessionClient::open` spawns an actor that exclusively owns the session
//! state, the draft controller, the presence timers and the connection. The
//! public handle talks to it with request messages and observes it through a
//! `watch` of [`SessionSnapshot`]s, so no state is shared between tasks.
//!
//! The actor's `select!` loop waits on:
//! - requests from the handle (navigation, input, host actions, close)
//! - connection events (open, message, drop, failure) in arrival order
//! - the autosave tick
//! - the pending draft snapshot deadline
//!
//! LIFECYCLE
//! =========
//! 1. Open → connect; every `Opened` resyncs participants, phase and items
//! 2. Events fold into `Session`; phase entry side effects fire once
//! 3. `IN_PROGRESS` binds the draft to an item; leaving it flushes the draft
//! 4. Close → final flush, presence stopped, socket closed
//! 5. Retries exhausted → teardown and `ClientError::ConnectionFailed`

#[cfg(test)]
#[path = "client_test.rs"]
mod client_test;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::{SessionConfig, timer_period};
use crate::net::api::{ApiError, CatalogPage, CatalogQuery, Report, RoomApi, RoomTicket};
use crate::net::codec::{Command, Event, decode_event};
use crate::net::connection::{
    CommandSink, Connection, ConnectionEvent, ConnectionState, Connector, RetryPolicy, TransportError, session_url,
    spawn_connection,
};
use crate::net::types::{ChatMessage, DraftFields, Item, ItemId, ItemResult, Participant, Phase, Role, UserRating};
use crate::presence::PresenceLoop;
use crate::state::draft::{Draft, DraftAutosave, DraftError, DraftField, DraftStatus};
use crate::state::phase_view::{ActionError, Controls, HostAction, PhaseView};
use crate::state::session::Session;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Reconnect attempts are exhausted. The view must be reopened.
    #[error("connection lost and could not be re-established; reload the session")]
    ConnectionFailed,
    #[error("session view is closed")]
    Closed,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("item {0} is not in the session")]
    UnknownItem(ItemId),
    #[error("{what} is not available while {phase}")]
    Unavailable { what: &'static str, phase: Phase },
}

/// Who is opening which session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionParams {
    pub room: String,
    /// Per-session socket token.
    pub token: String,
    pub role: Role,
}

impl SessionParams {
    #[must_use]
    pub fn from_ticket(room: impl Into<String>, ticket: &RoomTicket) -> Self {
        Self { room: room.into(), token: ticket.token.clone(), role: Role::from_is_host(ticket.is_host) }
    }
}

/// Everything a view renders, published after every change.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub room: String,
    pub phase: Phase,
    pub role: Role,
    pub connection: ConnectionState,
    pub participants: Vec<Participant>,
    pub items: Vec<Item>,
    pub log: Vec<ChatMessage>,
    pub final_results: Vec<ItemResult>,
    pub user_results: Vec<UserRating>,
    pub active_item: Option<ItemId>,
    pub draft: Option<DraftFields>,
    pub draft_status: Option<DraftStatus>,
    pub controls: Controls,
}

type Reply<T = ()> = oneshot::Sender<Result<T, ClientError>>;

enum Request {
    SelectItem { item_id: ItemId, reply: Reply },
    StepItem { forward: bool, reply: Reply },
    UpdateField { field: DraftField, value: String, reply: Reply },
    Perform { action: HostAction, reply: Reply },
    Close { reply: oneshot::Sender<()> },
}

// =============================================================================
// HANDLE
// =============================================================================

/// Handle to one open session view.
pub struct SessionClient {
    room: String,
    requests: mpsc::UnboundedSender<Request>,
    snapshots: watch::Receiver<SessionSnapshot>,
    api: Arc<dyn RoomApi>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient").field("room", &self.room).finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Open a session view and start connecting. Returns immediately; use
    /// [`SessionClient::wait_until_open`] before offering interactive
    /// controls.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when the socket URL can not be
    /// built from `config.ws_url`.
    pub fn open(
        config: &SessionConfig,
        params: SessionParams,
        connector: Arc<dyn Connector>,
        api: Arc<dyn RoomApi>,
    ) -> Result<Self, ClientError> {
        let url = session_url(&config.ws_url, &params.room, &params.token)?;
        let span = info_span!("session", room = %params.room, view = %Uuid::new_v4());

        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (actor, snapshots) = span.in_scope(|| {
            info!(path = url.path(), role = ?params.role, "opening session view");
            let connection = spawn_connection(connector, url, RetryPolicy::from_config(config));
            SessionActor::new(config, &params, connection)
        });
        let task = tokio::spawn(actor.run(requests_rx).instrument(span));

        Ok(Self { room: params.room, requests: requests_tx, snapshots, api, task: Some(task) })
    }

    /// Join `room` over HTTP, look up the socket token and role, and open
    /// the view.
    ///
    /// # Errors
    ///
    /// Propagates HTTP failures and URL errors.
    pub async fn enter(
        config: &SessionConfig,
        room: &str,
        password: &str,
        connector: Arc<dyn Connector>,
        api: Arc<dyn RoomApi>,
    ) -> Result<Self, ClientError> {
        api.join(room, password).await?;
        let ticket = api.membership(room).await?;
        Self::open(config, SessionParams::from_ticket(room, &ticket), connector, api)
    }

    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Wait until the socket is open for the first time.
    ///
    /// # Errors
    ///
    /// [`ClientError::ConnectionFailed`] when every attempt failed and
    /// [`ClientError::Closed`] when the view was closed first.
    pub async fn wait_until_open(&self) -> Result<(), ClientError> {
        let mut snapshots = self.snapshots.clone();
        let state = match snapshots
            .wait_for(|s| matches!(s.connection, ConnectionState::Open) || s.connection.is_terminal())
            .await
        {
            Ok(snapshot) => snapshot.connection,
            Err(_) => return Err(self.gone()),
        };
        match state {
            ConnectionState::Open => Ok(()),
            ConnectionState::Failed => Err(ClientError::ConnectionFailed),
            _ => Err(ClientError::Closed),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.snapshots.borrow().connection
    }

    /// Bind the rating form to `item_id` (flushing the current draft first).
    ///
    /// # Errors
    ///
    /// Fails outside `IN_PROGRESS`, for items not in the session, and once
    /// the view is gone.
    pub async fn select_item(&self, item_id: ItemId) -> Result<(), ClientError> {
        self.request(|reply| Request::SelectItem { item_id, reply }).await
    }

    /// Step to the next curated item. Stays put on the last one.
    ///
    /// # Errors
    ///
    /// Same as [`SessionClient::select_item`].
    pub async fn next_item(&self) -> Result<(), ClientError> {
        self.request(|reply| Request::StepItem { forward: true, reply }).await
    }

    /// Step to the previous curated item. Stays put on the first one.
    ///
    /// # Errors
    ///
    /// Same as [`SessionClient::select_item`].
    pub async fn previous_item(&self) -> Result<(), ClientError> {
        self.request(|reply| Request::StepItem { forward: false, reply }).await
    }

    /// Apply local input to the active draft.
    ///
    /// # Errors
    ///
    /// [`ClientError::Draft`] while the draft is loading, with no active
    /// item, or for an invalid score.
    pub async fn update_field(&self, field: DraftField, value: impl Into<String>) -> Result<(), ClientError> {
        let value = value.into();
        self.request(|reply| Request::UpdateField { field, value, reply }).await
    }

    /// Issue a host control.
    ///
    /// # Errors
    ///
    /// [`ClientError::Action`] for members or actions not offered in the
    /// current phase.
    pub async fn perform(&self, action: HostAction) -> Result<(), ClientError> {
        self.request(|reply| Request::Perform { action, reply }).await
    }

    /// Curate an item into the session, then reload the item list.
    ///
    /// # Errors
    ///
    /// Fails for members, outside `STARTING`, and on HTTP errors.
    pub async fn add_item(&self, item_id: ItemId) -> Result<(), ClientError> {
        self.ensure_curation()?;
        self.api.add_item(&self.room, item_id).await?;
        self.perform(HostAction::LoadItems).await
    }

    /// Remove a curated item, then reload the item list.
    ///
    /// # Errors
    ///
    /// Fails for members, outside `STARTING`, and on HTTP errors.
    pub async fn remove_item(&self, item_id: ItemId) -> Result<(), ClientError> {
        self.ensure_curation()?;
        self.api.remove_item(&self.room, item_id).await?;
        self.perform(HostAction::LoadItems).await
    }

    /// Search the catalog while curating.
    ///
    /// # Errors
    ///
    /// Propagates HTTP failures.
    pub async fn browse_items(&self, query: &CatalogQuery) -> Result<CatalogPage, ClientError> {
        Ok(self.api.browse_items(query).await?)
    }

    /// Download the session report.
    ///
    /// # Errors
    ///
    /// Fails before `FINISHED` and on HTTP errors.
    pub async fn export_report(&self) -> Result<Report, ClientError> {
        let phase = self.snapshots.borrow().phase;
        if phase != Phase::Finished {
            return Err(ClientError::Unavailable { what: "report export", phase });
        }
        Ok(self.api.export_report(&self.room).await?)
    }

    /// Leave the room over HTTP, then close the view. The view stays open
    /// when the leave call fails.
    ///
    /// # Errors
    ///
    /// Propagates the HTTP failure.
    pub async fn leave(&mut self) -> Result<(), ClientError> {
        self.api.leave(&self.room).await?;
        self.close().await;
        Ok(())
    }

    /// Flush the draft, stop every timer and close the socket. Idempotent.
    pub async fn close(&mut self) {
        let (reply, done) = oneshot::channel();
        if self.requests.send(Request::Close { reply }).is_ok() {
            if done.await.is_err() {
                debug!("session task ended before acknowledging close");
            }
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "session task ended abnormally");
            }
        }
    }

    fn ensure_curation(&self) -> Result<(), ClientError> {
        let snapshot = self.snapshots.borrow();
        if !snapshot.role.is_host() {
            return Err(ActionError::NotHost.into());
        }
        if !snapshot.controls.items_editable {
            return Err(ClientError::Unavailable { what: "item curation", phase: snapshot.phase });
        }
        Ok(())
    }

    async fn request(&self, make: impl FnOnce(Reply) -> Request) -> Result<(), ClientError> {
        let (reply, response) = oneshot::channel();
        self.requests.send(make(reply)).map_err(|_| self.gone())?;
        response.await.map_err(|_| self.gone())?
    }

    fn gone(&self) -> ClientError {
        if self.snapshots.borrow().connection == ConnectionState::Failed {
            ClientError::ConnectionFailed
        } else {
            ClientError::Closed
        }
    }
}

// =============================================================================
// ACTOR
// =============================================================================

struct SessionActor {
    session: Session,
    role: Role,
    connection: Connection,
    sink: Arc<dyn CommandSink>,
    draft: DraftAutosave,
    presence: Option<PresenceLoop>,
    config: SessionConfig,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl SessionActor {
    fn new(
        config: &SessionConfig,
        params: &SessionParams,
        connection: Connection,
    ) -> (Self, watch::Receiver<SessionSnapshot>) {
        let sink: Arc<dyn CommandSink> = Arc::new(connection.handle());
        let draft = DraftAutosave::new(sink.clone(), config.draft_snapshot_timeout, config.flush_confirm_timeout);
        let session = Session::new(params.room.clone(), config.log_capacity);
        let (snapshots, snapshots_rx) = watch::channel(placeholder_snapshot());
        let actor = Self {
            session,
            role: params.role,
            connection,
            sink,
            draft,
            presence: None,
            config: config.clone(),
            snapshots,
        };
        actor.publish();
        (actor, snapshots_rx)
    }

    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        self.presence = Some(PresenceLoop::spawn(
            self.sink.clone(),
            self.config.ping_interval,
            self.config.roster_interval,
        ));
        let autosave_every = timer_period(self.config.autosave_interval);
        let mut autosave = tokio::time::interval_at(Instant::now() + autosave_every, autosave_every);
        autosave.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut connection_state = self.connection.handle().subscribe();

        loop {
            // The snapshot can only arrive over an open socket.
            let draft_deadline =
                self.draft.loading_deadline().filter(|_| self.connection.state() == ConnectionState::Open);
            tokio::select! {
                request = requests.recv() => match request {
                    Some(Request::Close { reply }) => {
                        self.shutdown().await;
                        if reply.send(()).is_err() {
                            debug!("close requester went away");
                        }
                        break;
                    }
                    Some(request) => self.handle_request(request).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                event = self.connection.next_event() => match event {
                    Some(ConnectionEvent::Failed) | None => {
                        self.fail().await;
                        break;
                    }
                    Some(event) => self.handle_connection_event(event).await,
                },
                Ok(()) = connection_state.changed() => {}
                _ = autosave.tick() => {
                    self.draft.flush();
                }
                () = tokio::time::sleep_until(draft_deadline.unwrap_or_else(Instant::now)), if draft_deadline.is_some() => {
                    self.draft.expire_loading(Instant::now());
                }
            }
            self.publish();
        }
        self.publish();
    }

    // -------------------------------------------------------------------------
    // connection events
    // -------------------------------------------------------------------------

    async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened => self.resync().await,
            ConnectionEvent::Message(text) => match decode_event(&text) {
                Ok(event) => {
                    debug!(event = event.kind(), "inbound event");
                    self.apply(event).await;
                }
                Err(e) => warn!(error = %e, "discarding undecodable message"),
            },
            ConnectionEvent::Dropped => info!("connection dropped; waiting for reconnect"),
            ConnectionEvent::Failed => {}
        }
    }

    /// Missed events are not replayed after a reconnect, so re-request
    /// everything and catch the draft up.
    async fn resync(&mut self) {
        info!("connection open; resyncing session");
        self.sink.send(Command::GetUsers);
        self.sink.send(Command::GetRoomState);
        self.sink.send(Command::LoadItems);
        self.draft.resync().await;
    }

    async fn apply(&mut self, event: Event) {
        let transition = self.session.apply(event);
        for command in transition.commands {
            self.sink.send(command);
        }
        if let Some(change) = transition.phase_change {
            if change.from == Phase::InProgress {
                self.draft.deactivate();
            }
            if change.to == Phase::InProgress {
                self.ensure_active_item().await;
            }
        } else if transition.items_changed && self.session.phase() == Phase::InProgress {
            self.ensure_active_item().await;
        }
        if let Some(snapshot) = transition.draft {
            self.draft.apply_snapshot(snapshot);
        }
    }

    /// Keep the draft bound to a curated item while rating.
    async fn ensure_active_item(&mut self) {
        let active = self.draft.active_item();
        if active.is_some_and(|id| self.session.item(id).is_some()) {
            return;
        }
        match self.session.items().first().map(|item| item.id) {
            Some(first) => self.draft.set_active_item(first).await,
            None => {
                if active.is_some() {
                    self.draft.deactivate();
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // requests
    // -------------------------------------------------------------------------

    /// Handle one request, publishing the resulting snapshot before the
    /// caller is answered.
    async fn handle_request(&mut self, request: Request) {
        let (result, reply) = match request {
            Request::SelectItem { item_id, reply } => (self.select_item(item_id).await, reply),
            Request::StepItem { forward, reply } => (self.step_item(forward).await, reply),
            Request::UpdateField { field, value, reply } => {
                (self.draft.update_field(field, &value).map_err(ClientError::from), reply)
            }
            Request::Perform { action, reply } => (self.perform(action), reply),
            Request::Close { reply } => {
                if reply.send(()).is_err() {
                    debug!("close requester went away");
                }
                return;
            }
        };
        self.publish();
        if reply.send(result).is_err() {
            debug!("requester went away before the reply");
        }
    }

    fn ensure_navigable(&self) -> Result<(), ClientError> {
        let phase = self.session.phase();
        if PhaseView::new(phase, self.role).controls().can_navigate_items {
            Ok(())
        } else {
            Err(ClientError::Unavailable { what: "item navigation", phase })
        }
    }

    async fn select_item(&mut self, item_id: ItemId) -> Result<(), ClientError> {
        self.ensure_navigable()?;
        if self.session.item(item_id).is_none() {
            return Err(ClientError::UnknownItem(item_id));
        }
        self.draft.set_active_item(item_id).await;
        Ok(())
    }

    async fn step_item(&mut self, forward: bool) -> Result<(), ClientError> {
        self.ensure_navigable()?;
        let items = self.session.items();
        let Some(last) = items.len().checked_sub(1) else {
            return Ok(());
        };
        let target = match self.draft.active_item().and_then(|id| self.session.item_position(id)) {
            Some(position) if forward => (position + 1).min(last),
            Some(position) => position.saturating_sub(1),
            None => 0,
        };
        let item_id = items[target].id;
        self.draft.set_active_item(item_id).await;
        Ok(())
    }

    fn perform(&self, action: HostAction) -> Result<(), ClientError> {
        let commands = PhaseView::new(self.session.phase(), self.role).authorize(action)?;
        info!(?action, "host action");
        for command in commands {
            self.sink.send(command);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // teardown
    // -------------------------------------------------------------------------

    async fn stop_presence(&mut self) {
        if let Some(mut presence) = self.presence.take() {
            presence.stop().await;
        }
    }

    async fn shutdown(&mut self) {
        self.stop_presence().await;
        if self.connection.state() == ConnectionState::Open && self.draft.draft().is_some_and(Draft::needs_save) {
            if !self.draft.flush_confirmed().await {
                warn!("final draft flush was not confirmed");
            }
        }
        self.connection.close().await;
        info!("session view closed");
    }

    async fn fail(&mut self) {
        error!("connection failed permanently; session view needs a reload");
        self.stop_presence().await;
        self.connection.close().await;
    }

    // -------------------------------------------------------------------------
    // snapshots
    // -------------------------------------------------------------------------

    fn snapshot(&self) -> SessionSnapshot {
        let phase = self.session.phase();
        let draft = self.draft.draft();
        SessionSnapshot {
            room: self.session.name().to_owned(),
            phase,
            role: self.role,
            connection: self.connection.state(),
            participants: self.session.participants().to_vec(),
            items: self.session.items().to_vec(),
            log: self.session.log().cloned().collect(),
            final_results: self.session.final_results().to_vec(),
            user_results: self.session.user_results().to_vec(),
            active_item: draft.map(Draft::item_id),
            draft: draft.map(|d| d.fields().clone()),
            draft_status: draft.map(Draft::status),
            controls: PhaseView::new(phase, self.role).controls(),
        }
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

fn placeholder_snapshot() -> SessionSnapshot {
    SessionSnapshot {
        room: String::new(),
        phase: Phase::Waiting,
        role: Role::Member,
        connection: ConnectionState::Connecting,
        participants: Vec::new(),
        items: Vec::new(),
        log: Vec::new(),
        final_results: Vec::new(),
        user_results: Vec::new(),
        active_item: None,
        draft: None,
        draft_status: None,
        controls: Controls::default(),
    }
}
