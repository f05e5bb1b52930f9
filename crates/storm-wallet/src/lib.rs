//! # storm-wallet — Balance authority and transaction ledger
//!
//! Atomic bet/win/purchase/adjustment operations under a per-player
//! serialization guarantee: for a given player, transactions are totally
//! ordered and concurrent debits see each other's effects; across players,
//! operations run in parallel.
//!
//! Every mutation appends a signed [`WalletTransaction`] whose
//! `balance_after = balance_before + amount`; the full ledger replays to
//! the stored balance ("balance consistency").

pub mod transaction;
pub mod wallet;

pub use transaction::*;
pub use wallet::*;
