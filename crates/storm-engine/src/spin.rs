//! Spin outcome types
//!
//! [`SpinResult`] is the canonical immutable outcome of one spin and the
//! sole value persisted for audit. Once finalized it is never mutated;
//! callers needing a modified view build a new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storm_core::{Amount, ContentHasher, GameMode, Grid, Position, StepTiming};

use crate::cascade::DropPattern;
use crate::clusters::Cluster;

/// A random multiplier injected during a cascade step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMultiplier {
    pub value: u32,
    /// The unmatched cell the multiplier attached to
    pub position: Position,
}

/// Advisory timings for one cascade step (server clock, monotonic offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTimings {
    /// Offset from spin start at which this step begins
    pub start_offset_ms: u64,
    pub phases: StepTiming,
    pub total_ms: u64,
}

impl StepTimings {
    pub fn at_offset(offset_ms: u64, phases: StepTiming) -> Self {
        Self {
            start_offset_ms: offset_ms,
            phases,
            total_ms: phases.total_ms(),
        }
    }
}

/// One cascade iteration: match → remove → drop → refill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeStep {
    pub step_index: u32,
    pub grid_before: Grid,
    pub matched_clusters: Vec<Cluster>,
    pub win_amount: Amount,
    pub drop_pattern: DropPattern,
    pub grid_after: Grid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_multiplier: Option<AppliedMultiplier>,
    pub timings: StepTimings,
    /// Unsalted content hash; sync sessions re-seal with their salt
    pub step_hash: String,
}

impl CascadeStep {
    /// Canonical salted content hash of this step
    ///
    /// The engine records the digest for the empty salt; the synchronizer
    /// recomputes with the session's validation salt when sealing steps.
    pub fn hash(&self, salt: &str) -> String {
        let mut hasher = ContentHasher::salted(salt)
            .uint(self.step_index as u64)
            .grid(&self.grid_before);
        for cluster in &self.matched_clusters {
            hasher = hasher
                .uint(cluster.symbol.code() as u64)
                .uint(cluster.positions.len() as u64);
            for pos in &cluster.positions {
                hasher = hasher.uint(pos.col as u64).uint(pos.row as u64);
            }
        }
        hasher = hasher.amount(self.win_amount);
        for column in &self.drop_pattern.columns {
            hasher = hasher.uint(column.column as u64);
            for fall in &column.falls {
                hasher = hasher.uint(fall.from_row as u64).uint(fall.to_row as u64);
            }
            for symbol in &column.refills {
                hasher = hasher.uint(symbol.code() as u64);
            }
        }
        match self.random_multiplier {
            Some(applied) => {
                hasher = hasher
                    .uint(applied.value as u64)
                    .uint(applied.position.col as u64)
                    .uint(applied.position.row as u64);
            }
            None => hasher = hasher.uint(0),
        }
        hasher.grid(&self.grid_after).finish()
    }
}

/// The canonical immutable outcome of one spin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinResult {
    pub spin_id: String,
    pub bet_amount: Amount,
    pub rng_seed: u64,
    pub game_mode: GameMode,
    pub initial_grid: Grid,
    pub cascade_steps: Vec<CascadeStep>,
    /// Sum of step wins before the total multiplier
    pub base_win: Amount,
    pub total_multiplier: u32,
    /// `base_win × total_multiplier`, clamped to the per-spin cap
    pub total_win: Amount,
    pub scatter_count: u32,
    pub free_spins_triggered: bool,
    pub free_spins_awarded: u32,
    /// Sum of multiplier values fired this spin in free mode; feeds the
    /// session accumulator
    pub free_spin_multiplier_earned: u32,
    pub validation_hash: String,
    pub timestamp: DateTime<Utc>,
}

impl SpinResult {
    /// Recompute the total validation hash from current content
    ///
    /// Constant after finalize: `verify()` recomputes and compares.
    pub fn compute_validation_hash(&self) -> String {
        let mut hasher = ContentHasher::new()
            .text(&self.spin_id)
            .amount(self.bet_amount)
            .grid(&self.initial_grid);
        for step in &self.cascade_steps {
            hasher = hasher.text(&step.step_hash);
        }
        hasher
            .amount(self.total_win)
            .uint(self.rng_seed)
            .int(self.timestamp.timestamp_millis())
            .finish()
    }

    /// Re-derive the hash and compare with the sealed value
    pub fn verify(&self) -> bool {
        self.validation_hash == self.compute_validation_hash()
    }

    pub fn is_win(&self) -> bool {
        self.total_win.is_positive()
    }

    /// Win minus bet
    pub fn net_result(&self) -> Amount {
        self.total_win - self.bet_amount
    }

    /// Win-to-bet ratio, reporting only
    pub fn win_multiplier(&self) -> f64 {
        if self.bet_amount.is_zero() {
            0.0
        } else {
            self.total_win.cents() as f64 / self.bet_amount.cents() as f64
        }
    }

    pub fn cascade_count(&self) -> usize {
        self.cascade_steps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_core::{GameConfig, Symbol};

    fn bare_result() -> SpinResult {
        let mut result = SpinResult {
            spin_id: "spin-test".into(),
            bet_amount: Amount::from_major(1),
            rng_seed: 42,
            game_mode: GameMode::Base,
            initial_grid: Grid::filled(Symbol::TimeGem),
            cascade_steps: Vec::new(),
            base_win: Amount::ZERO,
            total_multiplier: 1,
            total_win: Amount::ZERO,
            scatter_count: 0,
            free_spins_triggered: false,
            free_spins_awarded: 0,
            free_spin_multiplier_earned: 0,
            validation_hash: String::new(),
            timestamp: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        };
        result.validation_hash = result.compute_validation_hash();
        result
    }

    #[test]
    fn test_validation_hash_stable() {
        let result = bare_result();
        assert!(result.verify());
        assert_eq!(result.validation_hash, result.compute_validation_hash());
    }

    #[test]
    fn test_validation_hash_detects_tampering() {
        let mut result = bare_result();
        result.total_win = Amount::from_major(5000);
        assert!(!result.verify());
    }

    #[test]
    fn test_serde_preserves_hash() {
        let result = bare_result();
        let json = serde_json::to_string(&result).unwrap();
        let back: SpinResult = serde_json::from_str(&json).unwrap();
        assert!(back.verify());
        assert_eq!(back, result);
    }

    #[test]
    fn test_net_result_and_ratio() {
        let mut result = bare_result();
        result.total_win = Amount::from_cents(250);
        assert_eq!(result.net_result(), Amount::from_cents(150));
        assert!((result.win_multiplier() - 2.5).abs() < f64::EPSILON);
        assert!(result.is_win());
    }

    #[test]
    fn test_step_timings_accumulate() {
        let phases = GameConfig::default().step_timing;
        let t0 = StepTimings::at_offset(0, phases);
        let t1 = StepTimings::at_offset(t0.total_ms, phases);
        assert_eq!(t1.start_offset_ms, phases.total_ms());
        assert!(t1.start_offset_ms > t0.start_offset_ms);
    }
}
