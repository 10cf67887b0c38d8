//! Networking modules for the session socket and HTTP collaborators.
//!
//! SYSTEM CONTEXT
//! ==============
//! `connection` owns the socket lifecycle, `codec` turns socket text into
//! typed commands and events (with `parse` doing the tolerant payload reads),
//! `api` covers the REST calls, and `types` defines the shared domain schema.

pub mod api;
pub mod codec;
pub mod connection;
mod parse;
pub mod types;
