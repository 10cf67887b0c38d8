//! Session synchronization client for group tasting rooms.
//!
//! A participant's view of one live session: the socket connection with
//! bounded reconnects, the typed command/event codec, the local session
//! projection, the autosaved rating draft, phase-dependent controls, and the
//! presence timers. [`client::SessionClient`] ties them together.

pub mod client;
pub mod config;
pub mod net;
pub mod presence;
pub mod state;

#[cfg(test)]
mod test_support;

pub use client::{ClientError, SessionClient, SessionParams, SessionSnapshot};
pub use config::SessionConfig;
