//! The wallet: balance mutations and ledger queries

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use uuid::Uuid;

use storm_core::{Amount, StormError};

use crate::transaction::{TxKind, TxPage, TxQuery, WalletTransaction};

/// Wallet failure
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("unknown player {0}")]
    PlayerNotFound(Uuid),

    #[error("player {0} already has an account")]
    AccountExists(Uuid),
}

impl From<WalletError> for StormError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::InsufficientFunds { required, available } => {
                StormError::InsufficientFunds { required, available }
            }
            WalletError::InvalidAmount(msg) => StormError::InvalidBet(msg),
            WalletError::PlayerNotFound(id) => StormError::SessionNotFound(id.to_string()),
            WalletError::AccountExists(id) => {
                StormError::Storage(format!("account exists: {id}"))
            }
        }
    }
}

/// Balance consistency audit result
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub valid: bool,
    pub transactions_validated: usize,
    pub stored_balance: Amount,
    pub replayed_balance: Amount,
    /// Index of the first broken chain link, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_mismatch: Option<usize>,
}

/// Per-player account state; mutated only under its own mutex
struct Account {
    balance: Amount,
    ledger: Vec<WalletTransaction>,
}

/// The balance authority
///
/// A directory of per-player accounts. Each account carries its own lock,
/// so one player's operations are totally ordered while different players
/// proceed in parallel.
pub struct Wallet {
    accounts: RwLock<HashMap<Uuid, Arc<Mutex<Account>>>>,
}

impl Wallet {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Open an account; an opening balance is recorded as a system
    /// adjustment so the ledger replays to the balance from zero
    pub fn create_account(&self, player_id: Uuid, opening: Amount) -> Result<(), WalletError> {
        if opening.is_negative() {
            return Err(WalletError::InvalidAmount(format!(
                "opening balance {opening} is negative"
            )));
        }
        {
            let mut accounts = self.accounts.write();
            if accounts.contains_key(&player_id) {
                return Err(WalletError::AccountExists(player_id));
            }
            accounts.insert(
                player_id,
                Arc::new(Mutex::new(Account {
                    balance: Amount::ZERO,
                    ledger: Vec::new(),
                })),
            );
        }
        if opening.is_positive() {
            self.process_adjustment(player_id, opening, "opening balance", "system")?;
        }
        log::info!("wallet: opened account {player_id} with {opening}");
        Ok(())
    }

    pub fn has_account(&self, player_id: Uuid) -> bool {
        self.accounts.read().contains_key(&player_id)
    }

    fn account(&self, player_id: Uuid) -> Result<Arc<Mutex<Account>>, WalletError> {
        self.accounts
            .read()
            .get(&player_id)
            .cloned()
            .ok_or(WalletError::PlayerNotFound(player_id))
    }

    /// Append a transaction under the account lock
    fn append(
        &self,
        player_id: Uuid,
        kind: TxKind,
        amount: Amount,
        reference_spin_id: Option<String>,
        actor: Option<String>,
        reason: Option<String>,
    ) -> Result<WalletTransaction, WalletError> {
        let account = self.account(player_id)?;
        let mut account = account.lock();

        let balance_before = account.balance;
        let balance_after = balance_before + amount;
        if balance_after.is_negative() {
            return Err(WalletError::InsufficientFunds {
                required: amount.abs(),
                available: balance_before,
            });
        }

        let tx = WalletTransaction {
            tx_id: Uuid::new_v4(),
            player_id,
            kind,
            amount,
            reference_spin_id,
            balance_before,
            balance_after,
            actor,
            reason,
            created_at: Utc::now(),
        };
        account.balance = balance_after;
        account.ledger.push(tx.clone());
        Ok(tx)
    }

    /// Debit a bet; requires `balance ≥ amount`
    pub fn process_bet(
        &self,
        player_id: Uuid,
        amount: Amount,
        reference_spin_id: &str,
    ) -> Result<WalletTransaction, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(format!(
                "bet must be positive, got {amount}"
            )));
        }
        self.append(
            player_id,
            TxKind::Bet,
            -amount,
            Some(reference_spin_id.to_string()),
            None,
            None,
        )
    }

    /// Credit a win
    pub fn process_win(
        &self,
        player_id: Uuid,
        amount: Amount,
        reference_spin_id: &str,
    ) -> Result<WalletTransaction, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(format!(
                "win must be positive, got {amount}"
            )));
        }
        self.append(
            player_id,
            TxKind::Win,
            amount,
            Some(reference_spin_id.to_string()),
            None,
            None,
        )
    }

    /// Debit a feature purchase
    pub fn process_purchase(
        &self,
        player_id: Uuid,
        cost: Amount,
        product: &str,
    ) -> Result<WalletTransaction, WalletError> {
        if !cost.is_positive() {
            return Err(WalletError::InvalidAmount(format!(
                "purchase cost must be positive, got {cost}"
            )));
        }
        self.append(
            player_id,
            TxKind::Purchase,
            -cost,
            None,
            None,
            Some(product.to_string()),
        )
    }

    /// Operator adjustment, either direction, recorded with actor identity
    pub fn process_adjustment(
        &self,
        player_id: Uuid,
        signed_amount: Amount,
        reason: &str,
        actor: &str,
    ) -> Result<WalletTransaction, WalletError> {
        if signed_amount.is_zero() {
            return Err(WalletError::InvalidAmount("zero adjustment".into()));
        }
        self.append(
            player_id,
            TxKind::Adjustment,
            signed_amount,
            None,
            Some(actor.to_string()),
            Some(reason.to_string()),
        )
    }

    pub fn balance(&self, player_id: Uuid) -> Result<Amount, WalletError> {
        Ok(self.account(player_id)?.lock().balance)
    }

    /// Paged, filtered history ordered by creation time
    pub fn transactions(&self, player_id: Uuid, query: &TxQuery) -> Result<TxPage, WalletError> {
        let account = self.account(player_id)?;
        let account = account.lock();

        let mut items: Vec<WalletTransaction> = account
            .ledger
            .iter()
            .filter(|tx| query.kind.is_none_or(|k| tx.kind == k))
            .cloned()
            .collect();
        if query.newest_first {
            items.reverse();
        }

        let total = items.len();
        let limit = query.limit.max(1);
        let start = (query.page.max(1) - 1) * limit;
        let items = items.into_iter().skip(start).take(limit).collect();

        Ok(TxPage {
            items,
            total,
            page: query.page.max(1),
            limit,
        })
    }

    /// Replay the full ledger and compare with the stored balance
    pub fn validate_consistency(&self, player_id: Uuid) -> Result<ConsistencyReport, WalletError> {
        let account = self.account(player_id)?;
        let account = account.lock();

        let mut replayed = Amount::ZERO;
        let mut first_mismatch = None;
        for (index, tx) in account.ledger.iter().enumerate() {
            let chained = tx.balances_consistent() && tx.balance_before == replayed;
            if !chained && first_mismatch.is_none() {
                first_mismatch = Some(index);
            }
            replayed += tx.amount;
        }

        let valid = first_mismatch.is_none() && replayed == account.balance;
        if !valid {
            log::error!(
                "wallet: consistency failure for {player_id}: replayed {replayed}, stored {}",
                account.balance
            );
        }
        Ok(ConsistencyReport {
            valid,
            transactions_validated: account.ledger.len(),
            stored_balance: account.balance,
            replayed_balance: replayed,
            first_mismatch,
        })
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}
