//! Session core for a hidden-role party game played around a shared record
//! store.
//!
//! Every client holds the same two shared tables (one game row, its
//! participant rows) and converges on them through a per-session change feed:
//! attaching takes a full read plus two filtered subscriptions, and a
//! background pump keeps the local projection current by applying row events
//! idempotently. On top of that sit the rejoin/recovery protocol (restore a
//! remembered identity without duplicating rows), the guarded phase
//! transitions of a round, and a small local history of recently played
//! sessions.

pub mod config;
pub mod dao;
pub mod engine;
/// Classified service-level errors.
pub mod error;
pub mod feed;
pub mod services;
pub mod session_store;
pub mod state;
