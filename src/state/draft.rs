//! Draft autosave for the rating form.
//!
//! SYSTEM CONTEXT
//! ==============
//! Exactly one draft is active at a time, bound to the on-screen item. The
//! controller flushes it on the autosave tick and before every item switch,
//! and asks the service for the next item's stored copy only after the
//! previous flush was written.
//!
//! STATES
//! ======
//! - `Loading`: the snapshot for the item was requested; edits are rejected
//!   until it arrives or the deadline passes. A loading draft is never
//!   flushed, so an empty form can not overwrite the stored copy.
//! - `Hydrated`: filled from the service's snapshot.
//! - `Empty`: the snapshot did not arrive in time; editing starts blank. An
//!   empty draft is saved only once the participant has typed into it.
//!
//! OUTAGES
//! =======
//! A switch whose flush was not written keeps the previous draft as a pending
//! save. [`DraftAutosave::resync`] re-sends pending saves after a reconnect and
//! re-requests the active item's copy if it never arrived.

#[cfg(test)]
#[path = "draft_test.rs"]
mod draft_test;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::net::codec::Command;
use crate::net::connection::CommandSink;
use crate::net::types::{DraftFields, DraftSnapshot, ItemId, SCORE_RANGE};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("no item is active")]
    NoActiveItem,
    #[error("draft for item {0} is still loading")]
    Loading(ItemId),
    #[error("score must be between 1 and 10, got {0:?}")]
    InvalidScore(String),
    #[error("unknown draft field {0:?}")]
    UnknownField(String),
}

/// One editable field of the rating form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DraftField {
    Color,
    Foam,
    Smell,
    Taste,
    Opinion,
    Score,
}

impl DraftField {
    pub const ALL: [Self; 6] = [Self::Color, Self::Foam, Self::Smell, Self::Taste, Self::Opinion, Self::Score];

    /// Form field name as the service spells it.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Foam => "foam",
            Self::Smell => "smell",
            Self::Taste => "taste",
            Self::Opinion => "opinion",
            Self::Score => "note",
        }
    }

    /// # Errors
    ///
    /// Returns [`DraftError::UnknownField`] for names outside the form.
    pub fn parse(name: &str) -> Result<Self, DraftError> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == name || (*field == Self::Score && name == "score"))
            .ok_or_else(|| DraftError::UnknownField(name.to_owned()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DraftStatus {
    Empty,
    Loading,
    Hydrated,
}

/// The active item's form buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Draft {
    item_id: ItemId,
    fields: DraftFields,
    status: DraftStatus,
    edited: bool,
    deadline: Instant,
}

impl Draft {
    #[must_use]
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    #[must_use]
    pub fn fields(&self) -> &DraftFields {
        &self.fields
    }

    #[must_use]
    pub fn status(&self) -> DraftStatus {
        self.status
    }

    /// Whether local input changed the draft since it was activated.
    #[must_use]
    pub fn is_edited(&self) -> bool {
        self.edited
    }

    #[must_use]
    pub fn is_editable(&self) -> bool {
        self.status != DraftStatus::Loading
    }

    /// Whether a save would carry anything the service should store. A
    /// blank draft that nobody typed into must not overwrite the stored copy.
    #[must_use]
    pub fn needs_save(&self) -> bool {
        match self.status {
            DraftStatus::Loading => false,
            DraftStatus::Empty => self.edited,
            DraftStatus::Hydrated => true,
        }
    }

    fn save_command(&self) -> Command {
        Command::SaveForm { item_id: self.item_id, fields: self.fields.clone() }
    }
}

/// Owns the active draft and its save schedule.
pub struct DraftAutosave {
    sink: Arc<dyn CommandSink>,
    snapshot_timeout: Duration,
    flush_timeout: Duration,
    draft: Option<Draft>,
    /// Drafts left behind by a switch whose flush was never written.
    pending: Vec<Draft>,
    /// Items whose snapshot was requested and not yet answered, oldest first.
    requested: VecDeque<ItemId>,
}

impl std::fmt::Debug for DraftAutosave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftAutosave")
            .field("draft", &self.draft)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl DraftAutosave {
    #[must_use]
    pub fn new(sink: Arc<dyn CommandSink>, snapshot_timeout: Duration, flush_timeout: Duration) -> Self {
        Self { sink, snapshot_timeout, flush_timeout, draft: None, pending: Vec::new(), requested: VecDeque::new() }
    }

    #[must_use]
    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    #[must_use]
    pub fn active_item(&self) -> Option<ItemId> {
        self.draft.as_ref().map(Draft::item_id)
    }

    /// Items with a save still waiting for the connection.
    #[must_use]
    pub fn pending_items(&self) -> Vec<ItemId> {
        self.pending.iter().map(Draft::item_id).collect()
    }

    /// When the pending snapshot wait ends, if one is pending.
    #[must_use]
    pub fn loading_deadline(&self) -> Option<Instant> {
        self.draft
            .as_ref()
            .filter(|draft| draft.status == DraftStatus::Loading)
            .map(|draft| draft.deadline)
    }

    /// Bind the form to `item_id`: flush the previous draft, wait for the
    /// flush to be written, then request the stored copy for the new item.
    /// Selecting the already active item does nothing.
    ///
    /// An unwritten flush is kept as a pending save. Returning to an item
    /// with a pending save restores it locally instead of fetching.
    pub async fn set_active_item(&mut self, item_id: ItemId) {
        if self.active_item() == Some(item_id) {
            return;
        }
        if let Some(previous) = self.draft.take().filter(Draft::needs_save) {
            let confirmed = self.sink.send_confirmed(previous.save_command(), self.flush_timeout).await;
            if confirmed {
                self.pending.retain(|draft| draft.item_id != previous.item_id);
            } else {
                warn!(item = previous.item_id, "draft flush before switch was not confirmed; keeping it pending");
                self.keep_pending(previous);
            }
        }
        if let Some(index) = self.pending.iter().position(|draft| draft.item_id == item_id) {
            self.draft = Some(self.pending.remove(index));
            debug!(item = item_id, "draft restored from pending save");
            return;
        }
        self.request_snapshot(item_id);
        debug!(item = item_id, "draft loading");
    }

    fn keep_pending(&mut self, draft: Draft) {
        self.pending.retain(|pending| pending.item_id != draft.item_id);
        self.pending.push(draft);
    }

    fn request_snapshot(&mut self, item_id: ItemId) {
        self.sink.send(Command::GetFormData(item_id));
        self.requested.push_back(item_id);
        self.draft = Some(Draft {
            item_id,
            fields: DraftFields::default(),
            status: DraftStatus::Loading,
            edited: false,
            deadline: Instant::now() + self.snapshot_timeout,
        });
    }

    /// Apply local input to the active draft.
    ///
    /// # Errors
    ///
    /// Rejects input with no active item, while the draft is loading, and
    /// scores outside 1..=10 (an empty score clears it).
    pub fn update_field(&mut self, field: DraftField, value: &str) -> Result<(), DraftError> {
        let draft = self.draft.as_mut().ok_or(DraftError::NoActiveItem)?;
        if !draft.is_editable() {
            return Err(DraftError::Loading(draft.item_id));
        }
        let fields = &mut draft.fields;
        match field {
            DraftField::Color => fields.color = value.to_owned(),
            DraftField::Foam => fields.foam = value.to_owned(),
            DraftField::Smell => fields.smell = value.to_owned(),
            DraftField::Taste => fields.taste = value.to_owned(),
            DraftField::Opinion => fields.opinion = value.to_owned(),
            DraftField::Score => fields.score = parse_score(value)?,
        }
        draft.edited = true;
        Ok(())
    }

    /// Hydrate the active draft from the service's copy. Returns whether the
    /// snapshot was used.
    ///
    /// Snapshots for another item are stale and dropped. A snapshot without
    /// an item id answers the oldest outstanding request. A snapshot arriving
    /// after the deadline still hydrates the draft unless the participant has
    /// started typing.
    pub fn apply_snapshot(&mut self, snapshot: DraftSnapshot) -> bool {
        let answered = self.answered_item(snapshot.item_id);
        let Some(draft) = self.draft.as_mut() else {
            debug!("draft snapshot with no active item");
            return false;
        };
        if answered.is_some_and(|id| id != draft.item_id) {
            debug!(item = ?answered, active = draft.item_id, "stale draft snapshot");
            return false;
        }
        if draft.edited {
            debug!(item = draft.item_id, "keeping local edits over late snapshot");
            return false;
        }
        draft.fields = snapshot.fields;
        draft.status = DraftStatus::Hydrated;
        true
    }

    /// Retire the request a snapshot answers. Replies come back in request
    /// order, so everything requested before it was answered or lost.
    fn answered_item(&mut self, item_id: Option<ItemId>) -> Option<ItemId> {
        match item_id {
            Some(id) => {
                if let Some(index) = self.requested.iter().position(|requested| *requested == id) {
                    self.requested.drain(..=index);
                }
                Some(id)
            }
            None => self.requested.pop_front(),
        }
    }

    /// Fall back to an empty editable draft once the snapshot wait is over.
    /// Returns whether the draft changed state.
    pub fn expire_loading(&mut self, now: Instant) -> bool {
        match self.draft.as_mut() {
            Some(draft) if draft.status == DraftStatus::Loading && draft.deadline <= now => {
                warn!(item = draft.item_id, "draft snapshot timed out; starting empty");
                draft.status = DraftStatus::Empty;
                true
            }
            _ => false,
        }
    }

    /// Send the active draft. Returns whether a save was issued.
    pub fn flush(&self) -> bool {
        match self.draft.as_ref().filter(|draft| draft.needs_save()) {
            Some(draft) => {
                self.sink.send(draft.save_command());
                true
            }
            None => false,
        }
    }

    /// Send the active draft and wait until it is written. Returns `false`
    /// when nothing was sent or the write was not confirmed in time.
    pub async fn flush_confirmed(&self) -> bool {
        match self.draft.as_ref().filter(|draft| draft.needs_save()) {
            Some(draft) => self.sink.send_confirmed(draft.save_command(), self.flush_timeout).await,
            None => false,
        }
    }

    /// Catch up after a reconnect. Pending saves go out first and stay
    /// pending until written. Then the active item's copy is requested again
    /// if it never arrived, or the active draft is flushed.
    pub async fn resync(&mut self) {
        for draft in std::mem::take(&mut self.pending) {
            if self.sink.send_confirmed(draft.save_command(), self.flush_timeout).await {
                debug!(item = draft.item_id, "pending draft saved");
            } else {
                warn!(item = draft.item_id, "pending draft save was not confirmed");
                self.pending.push(draft);
            }
        }
        // Replies to requests sent before the drop are lost with the socket.
        self.requested.clear();
        let refetch = self.draft.as_ref().filter(|draft| !draft.needs_save()).map(Draft::item_id);
        match refetch {
            Some(item_id) => {
                info!(item = item_id, "re-requesting draft snapshot");
                self.request_snapshot(item_id);
            }
            None => {
                self.flush();
            }
        }
    }

    /// Flush and release the active draft.
    pub fn deactivate(&mut self) {
        self.flush();
        self.draft = None;
    }
}

fn parse_score(value: &str) -> Result<Option<u8>, DraftError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<u8>() {
        Ok(score) if SCORE_RANGE.contains(&score) => Ok(Some(score)),
        _ => Err(DraftError::InvalidScore(value.to_owned())),
    }
}
