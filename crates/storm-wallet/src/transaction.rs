//! Wallet transaction records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storm_core::Amount;

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    /// Spin debit; amount strictly negative
    Bet,
    /// Spin credit
    Win,
    /// Operator correction, either direction
    Adjustment,
    /// Feature purchase debit
    Purchase,
}

/// One ledger entry
///
/// Immutable once appended. `amount` is signed; debits are negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub tx_id: Uuid,
    pub player_id: Uuid,
    pub kind: TxKind,
    pub amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_spin_id: Option<String>,
    pub balance_before: Amount,
    pub balance_after: Amount,
    /// Operator identity for adjustments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// Chain-local integrity: the stored balances bracket the amount
    pub fn balances_consistent(&self) -> bool {
        self.balance_after == self.balance_before + self.amount
    }
}

/// History query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<TxKind>,
    /// 1-based page index
    pub page: usize,
    pub limit: usize,
    /// Newest entries first (default)
    pub newest_first: bool,
}

impl Default for TxQuery {
    fn default() -> Self {
        Self {
            kind: None,
            page: 1,
            limit: 50,
            newest_first: true,
        }
    }
}

/// One page of history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxPage {
    pub items: Vec<WalletTransaction>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_chain_check() {
        let tx = WalletTransaction {
            tx_id: Uuid::new_v4(),
            player_id: Uuid::new_v4(),
            kind: TxKind::Bet,
            amount: Amount::from_cents(-100),
            reference_spin_id: Some("spin-1".into()),
            balance_before: Amount::from_major(10),
            balance_after: Amount::from_cents(900),
            actor: None,
            reason: None,
            created_at: Utc::now(),
        };
        assert!(tx.balances_consistent());
    }

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(serde_json::to_string(&TxKind::Bet).unwrap(), "\"bet\"");
        assert_eq!(
            serde_json::to_string(&TxKind::Adjustment).unwrap(),
            "\"adjustment\""
        );
    }
}
