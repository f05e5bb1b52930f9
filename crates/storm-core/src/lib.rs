//! # storm-core — Core types for the Infinity Storm game server
//!
//! Shared vocabulary for every other crate in the workspace:
//!
//! - **Symbols**: the closed set of grid symbols (high-pay, gems, scatter)
//! - **Grid**: the 6×5 column-major playfield with per-cell multipliers
//! - **Money**: fixed-point amounts with 2 fractional digits
//! - **Config**: the canonical gameplay and protocol configuration block
//! - **Hashing**: canonical SHA-256 content hashing for validation hashes
//!
//! ## Architecture
//!
//! ```text
//! GameConfig (weights, paytable, caps, timers)
//!     │
//!     ├── Symbol / SymbolKind (closed symbol set)
//!     ├── Grid / Cell / Position (6×5, column-major, gravity toward row 4)
//!     ├── Amount (i64 hundredths, no floating-point currency)
//!     └── ContentHasher (salted SHA-256 over canonical bytes)
//! ```

pub mod config;
pub mod error;
pub mod grid;
pub mod hash;
pub mod money;
pub mod symbol;

pub use config::*;
pub use error::*;
pub use grid::*;
pub use hash::*;
pub use money::*;
pub use symbol::*;
