//! Phase-dependent controls.
//!
//! Maps `(phase, role)` to the actions and editability a view should offer.
//! This is advisory: the room service enforces permissions on its side.

#[cfg(test)]
#[path = "phase_view_test.rs"]
mod phase_view_test;

use crate::net::codec::Command;
use crate::net::types::{Phase, Role};

/// A host-only control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostAction {
    /// Re-request the session phase.
    RefreshSession,
    /// Reload the curated item list.
    LoadItems,
    /// WAITING -> STARTING.
    OpenSelection,
    /// Begin (or resume) rating.
    StartTasting,
    /// IN_PROGRESS -> STARTING to revise the item list.
    ReturnToSelection,
    /// IN_PROGRESS -> FINISHED.
    FinishTasting,
    /// Request the aggregate and per-participant results.
    LoadResults,
}

impl HostAction {
    /// Commands the action sends, in order.
    #[must_use]
    pub fn commands(self) -> Vec<Command> {
        match self {
            Self::RefreshSession => vec![Command::GetRoomState],
            Self::LoadItems => vec![Command::LoadItems],
            Self::OpenSelection | Self::ReturnToSelection => vec![Command::ChangePhase(Phase::Starting)],
            Self::StartTasting => vec![Command::ChangePhase(Phase::InProgress)],
            Self::FinishTasting => vec![Command::ChangePhase(Phase::Finished)],
            Self::LoadResults => vec![Command::GetUserRatings, Command::GetFinalRatings],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("only the host can do that")]
    NotHost,
    #[error("{action:?} is not available while {phase}")]
    Unavailable { action: HostAction, phase: Phase },
}

/// What a view should enable for one `(phase, role)` pair.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Controls {
    pub host_actions: Vec<HostAction>,
    /// The curated list can be changed (host, STARTING).
    pub items_editable: bool,
    /// The participant's own draft can be edited.
    pub draft_editable: bool,
    /// Stepping through items is offered.
    pub can_navigate_items: bool,
    pub show_results: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseView {
    pub phase: Phase,
    pub role: Role,
}

impl PhaseView {
    #[must_use]
    pub fn new(phase: Phase, role: Role) -> Self {
        Self { phase, role }
    }

    #[must_use]
    pub fn controls(self) -> Controls {
        Controls {
            host_actions: if self.role.is_host() { host_actions(self.phase) } else { Vec::new() },
            items_editable: self.role.is_host() && self.phase == Phase::Starting,
            draft_editable: self.phase == Phase::InProgress,
            can_navigate_items: self.phase == Phase::InProgress,
            show_results: self.phase == Phase::Finished,
        }
    }

    #[must_use]
    pub fn is_enabled(self, action: HostAction) -> bool {
        self.role.is_host() && host_actions(self.phase).contains(&action)
    }

    /// Commands for `action` if the local participant may issue it now.
    ///
    /// # Errors
    ///
    /// [`ActionError::NotHost`] for members, [`ActionError::Unavailable`] when
    /// the phase does not offer the action.
    pub fn authorize(self, action: HostAction) -> Result<Vec<Command>, ActionError> {
        if !self.role.is_host() {
            return Err(ActionError::NotHost);
        }
        if !self.is_enabled(action) {
            return Err(ActionError::Unavailable { action, phase: self.phase });
        }
        Ok(action.commands())
    }
}

fn host_actions(phase: Phase) -> Vec<HostAction> {
    let mut actions = vec![HostAction::RefreshSession];
    match phase {
        Phase::Waiting => actions.extend([HostAction::LoadItems, HostAction::OpenSelection, HostAction::StartTasting]),
        Phase::Starting => actions.extend([HostAction::LoadItems, HostAction::StartTasting]),
        Phase::InProgress => {
            actions.extend([HostAction::LoadItems, HostAction::ReturnToSelection, HostAction::FinishTasting]);
        }
        Phase::Finished => actions.push(HostAction::LoadResults),
    }
    actions
}
