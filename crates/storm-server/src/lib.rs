//! # storm-server — Hosting surface
//!
//! The outward face of the game server:
//!
//! - **HTTP**: spin, history, wallet, and health routes (actix-web)
//! - **WebSocket**: the cascade-sync transport — step broadcast with
//!   acknowledgment timeouts and retries, heartbeats, and full cleanup on
//!   disconnect (actix-ws upgrade on the same port)
//!
//! Every outbound payload is a serialized snapshot; no internal pointers
//! ever cross the socket.

pub mod http;
pub mod protocol;
pub mod state;
pub mod transport;

pub use http::*;
pub use protocol::*;
pub use state::*;
pub use transport::*;
