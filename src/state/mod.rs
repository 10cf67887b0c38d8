//! Client-side state modules.
//!
//! SYSTEM CONTEXT
//! ==============
//! `session` folds inbound events into the local session projection, `draft`
//! owns the active rating form and its autosave, and `phase_view` derives the
//! controls a view offers for the current phase and role.

pub mod draft;
pub mod phase_view;
pub mod session;
