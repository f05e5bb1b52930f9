//! # storm-engine — Deterministic cluster-pays spin engine
//!
//! Computes the complete outcome of a spin: initial 6×5 grid, the ordered
//! chain of cascade steps (match → remove → drop → refill), random
//! multiplier injections, free-spin triggers, and the monetary result.
//!
//! Fully reproducible: for identical `(bet, mode, accumulated multiplier,
//! rng seed, timestamp)` every field of the [`SpinResult`] — every cluster,
//! every step, every hash — is bit-identical across runs and platforms.
//!
//! ## Architecture
//!
//! ```text
//! GridEngine::compute_spin
//!     │
//!     ├── GridGenerator (per-mode weighted fill)
//!     ├── find_clusters (maximal 4-connected components, ≥8)
//!     ├── resolve_cascade (remove → gravity drop → refill)
//!     ├── random multiplier injection (canonical probability table)
//!     └── SpinResult (per-step + total validation hashes)
//! ```

pub mod cascade;
pub mod clusters;
pub mod engine;
pub mod generator;
pub mod spin;

pub use cascade::*;
pub use clusters::*;
pub use engine::*;
pub use generator::*;
pub use spin::*;
