//! # storm-sync — Cascade synchronization protocol
//!
//! Server-side coordination of the step-by-step cascade replay a client
//! performs: per-spin [`SyncSession`] state machine, acknowledgment
//! processing with salted hash validation, desync detection, and typed
//! recovery planning.
//!
//! ## State machine
//!
//! ```text
//! init → broadcasting ⇄ paused
//!        broadcasting → recovering → synchronized → broadcasting
//!        broadcasting → resyncing → broadcasting
//!        * → completed | failed
//! ```
//!
//! Transport (WebSocket fan-out, timers) lives in `storm-server`; this
//! crate is pure state and validation so the whole protocol is unit
//! testable without sockets.

pub mod recovery;
pub mod session;
pub mod synchronizer;
pub mod validator;

pub use recovery::*;
pub use session::*;
pub use synchronizer::*;
pub use validator::*;
