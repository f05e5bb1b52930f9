//! # storm-session — Per-player session authority
//!
//! One [`GameSession`] per logged-in player: the seed chain feeding the
//! engine, free-spin counters, the accumulated multiplier, running stats,
//! and the set of active sync sessions. The [`SessionManager`] owns the
//! directory and orchestrates the spin pipeline — debit → engine → credit →
//! counters → persist — inside the player's serialization region.

pub mod manager;
pub mod session;

pub use manager::*;
pub use session::*;
