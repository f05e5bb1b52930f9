//! Game and protocol configuration
//!
//! Every gameplay number lives here: spawn weights, the payout table, the
//! scatter thresholds, the random-multiplier table, caps, and protocol
//! timers. The `Default` impl is the reference configuration the test suite
//! asserts against. Immutable after startup; share via `Arc<GameConfig>`.

use serde::{Deserialize, Serialize};

use crate::error::{StormError, StormResult};
use crate::symbol::Symbol;

/// Game mode for a spin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Base,
    Free,
}

impl GameMode {
    pub fn is_free(self) -> bool {
        self == GameMode::Free
    }
}

/// Spawn weights for one mode, insertion-ordered
///
/// Kept as an ordered list rather than a map so weighted selection is
/// deterministic for a given table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolWeights(pub Vec<(Symbol, u32)>);

impl SymbolWeights {
    pub fn entries(&self) -> &[(Symbol, u32)] {
        &self.0
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|&(_, w)| w as u64).sum()
    }

    /// Share of total weight held by high-pay symbols
    pub fn high_pay_ratio(&self) -> f64 {
        let high: u64 = self
            .0
            .iter()
            .filter(|(s, _)| s.is_high_pay())
            .map(|&(_, w)| w as u64)
            .sum();
        high as f64 / self.total() as f64
    }
}

/// Per-mode spawn distributions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightTables {
    pub base: SymbolWeights,
    pub free_spins: SymbolWeights,
}

/// Payout values per cluster-size bucket, bet-relative with divisor 20
///
/// `pays` holds the values for buckets 8, 10, 12 in that order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClusterPays {
    pub pays: [i64; 3],
}

/// The complete payout table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutTable {
    /// Cluster pays per non-scatter symbol, insertion-ordered
    pub clusters: Vec<(Symbol, ClusterPays)>,
    /// Scatter pays for counts 4, 5, 6+
    pub scatter: [i64; 3],
}

impl PayoutTable {
    /// Bucket a cluster size: greatest threshold ≤ size, of {8, 10, 12}
    pub fn bucket(size: usize) -> Option<usize> {
        match size {
            0..=7 => None,
            8..=9 => Some(0),
            10..=11 => Some(1),
            _ => Some(2),
        }
    }

    /// Bet-relative payout value for a cluster (to be divided by 20)
    pub fn cluster_pay(&self, symbol: Symbol, size: usize) -> i64 {
        let Some(bucket) = Self::bucket(size) else {
            return 0;
        };
        self.clusters
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, p)| p.pays[bucket])
            .unwrap_or(0)
    }

    /// Bet-relative payout value for a scatter count (to be divided by 20)
    pub fn scatter_pay(&self, count: usize) -> i64 {
        match count {
            0..=3 => 0,
            4 => self.scatter[0],
            5 => self.scatter[1],
            _ => self.scatter[2],
        }
    }
}

/// Scatter thresholds and free-spin awards
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScatterConfig {
    /// Scatter count that triggers free spins in base mode
    pub trigger_count: usize,
    /// Scatter count that retriggers during free spins
    pub retrigger_count: usize,
    /// Spins awarded on trigger
    pub initial_award: u32,
    /// Spins added on retrigger
    pub retrigger_award: u32,
}

/// Random multiplier feature configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomMultiplierConfig {
    /// Multiplier values and weights, insertion-ordered
    pub table: Vec<(u32, u32)>,
    /// Per-cascade trigger chance in base mode
    pub base_chance: f64,
    /// Per-cascade trigger chance during free spins
    pub free_chance: f64,
    /// Maximum injections per spin in base mode (0 = disabled)
    pub base_per_spin_cap: u32,
}

/// Advisory per-phase durations for cascade step timing (milliseconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTiming {
    pub win_highlight_ms: u64,
    pub symbol_removal_ms: u64,
    pub symbol_drop_ms: u64,
    pub symbol_refill_ms: u64,
}

impl StepTiming {
    pub fn total_ms(&self) -> u64 {
        self.win_highlight_ms + self.symbol_removal_ms + self.symbol_drop_ms + self.symbol_refill_ms
    }
}

/// Cascade synchronization protocol timers
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProtocolTimers {
    pub broadcast_timeout_ms: u64,
    pub ack_timeout_ms: u64,
    pub max_retry_attempts: u32,
    pub heartbeat_interval_ms: u64,
    pub sync_tolerance_ms: u64,
    /// Reject client phase durations below this floor
    pub step_min_phase_ms: u64,
}

/// The canonical configuration block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub symbol_weights: WeightTables,
    pub payout_table: PayoutTable,
    pub scatter: ScatterConfig,
    pub random_multiplier: RandomMultiplierConfig,
    /// Largest accepted bet
    pub max_bet: crate::money::Amount,
    /// Hard cascade-depth cap; reaching it is a fatal engine error
    pub max_cascade_depth: u32,
    /// Per-spin win cap as a bet multiplier
    pub max_win_cap_multiplier: i64,
    /// Informational; asserted by the statistical test suite
    pub rtp_target: f64,
    pub step_timing: StepTiming,
    pub timers: ProtocolTimers,
}

impl GameConfig {
    /// Export as pretty JSON
    pub fn to_json(&self) -> StormResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Import from JSON, validating table shape
    pub fn from_json(json: &str) -> StormResult<Self> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation: every non-scatter symbol must be weighted and
    /// paid in both modes
    pub fn validate(&self) -> StormResult<()> {
        for table in [&self.symbol_weights.base, &self.symbol_weights.free_spins] {
            if table.total() == 0 {
                return Err(StormError::Serialization("empty weight table".into()));
            }
        }
        for symbol in Symbol::ALL {
            if symbol.is_scatter() {
                continue;
            }
            if !self.payout_table.clusters.iter().any(|(s, _)| *s == symbol) {
                return Err(StormError::Serialization(format!(
                    "missing payout row for {}",
                    symbol.name()
                )));
            }
        }
        if self.max_cascade_depth == 0 {
            return Err(StormError::Serialization("max_cascade_depth must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            symbol_weights: WeightTables {
                base: SymbolWeights(vec![
                    (Symbol::TimeGem, 140),
                    (Symbol::SpaceGem, 135),
                    (Symbol::MindGem, 130),
                    (Symbol::PowerGem, 120),
                    (Symbol::RealityGem, 110),
                    (Symbol::SoulGem, 100),
                    (Symbol::ThanosWeapon, 95),
                    (Symbol::ScarletWitch, 70),
                    (Symbol::Thanos, 60),
                    (Symbol::InfinityGlove, 40),
                ]),
                free_spins: SymbolWeights(vec![
                    (Symbol::TimeGem, 120),
                    (Symbol::SpaceGem, 118),
                    (Symbol::MindGem, 115),
                    (Symbol::PowerGem, 108),
                    (Symbol::RealityGem, 100),
                    (Symbol::SoulGem, 92),
                    (Symbol::ThanosWeapon, 115),
                    (Symbol::ScarletWitch, 95),
                    (Symbol::Thanos, 97),
                    (Symbol::InfinityGlove, 40),
                ]),
            },
            payout_table: PayoutTable {
                clusters: vec![
                    (Symbol::TimeGem, ClusterPays { pays: [8, 15, 40] }),
                    (Symbol::SpaceGem, ClusterPays { pays: [9, 18, 45] }),
                    (Symbol::MindGem, ClusterPays { pays: [10, 20, 50] }),
                    (Symbol::PowerGem, ClusterPays { pays: [12, 25, 60] }),
                    (Symbol::RealityGem, ClusterPays { pays: [15, 30, 75] }),
                    (Symbol::SoulGem, ClusterPays { pays: [20, 40, 100] }),
                    (Symbol::ThanosWeapon, ClusterPays { pays: [40, 100, 300] }),
                    (Symbol::ScarletWitch, ClusterPays { pays: [50, 120, 400] }),
                    (Symbol::Thanos, ClusterPays { pays: [80, 200, 500] }),
                ],
                scatter: [60, 100, 2000],
            },
            scatter: ScatterConfig {
                trigger_count: 4,
                retrigger_count: 4,
                initial_award: 15,
                retrigger_award: 5,
            },
            random_multiplier: RandomMultiplierConfig {
                table: vec![
                    (2, 600),
                    (3, 500),
                    (4, 360),
                    (5, 240),
                    (6, 160),
                    (8, 80),
                    (10, 40),
                    (20, 16),
                    (100, 3),
                    (500, 1),
                ],
                base_chance: 0.10,
                free_chance: 0.18,
                base_per_spin_cap: 2,
            },
            max_bet: crate::money::Amount::from_major(100),
            max_cascade_depth: 20,
            max_win_cap_multiplier: 5000,
            rtp_target: 0.965,
            step_timing: StepTiming {
                win_highlight_ms: 600,
                symbol_removal_ms: 300,
                symbol_drop_ms: 400,
                symbol_refill_ms: 300,
            },
            timers: ProtocolTimers {
                broadcast_timeout_ms: 5000,
                ack_timeout_ms: 3000,
                max_retry_attempts: 3,
                heartbeat_interval_ms: 30000,
                sync_tolerance_ms: 1000,
                step_min_phase_ms: 16,
            },
        }
    }
}
