//! The spin engine
//!
//! `compute_spin` is pure CPU-bound code: all randomness is drawn from the
//! seeded stream derived from the spin's `rng_seed`, so the entire outcome
//! is reproducible from the input tuple. No global state, no clock reads —
//! the caller supplies the timestamp.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use storm_core::{Amount, Cell, GameConfig, GameMode, Grid, Position};
use storm_rng::SpinRng;

use crate::cascade::resolve_cascade;
use crate::clusters::{find_clusters, matched_mask, Cluster};
use crate::generator::GridGenerator;
use crate::spin::{AppliedMultiplier, CascadeStep, SpinResult, StepTimings};

/// Engine failure
#[derive(Error, Debug)]
pub enum EngineError {
    /// Rejected before any state mutation
    #[error("invalid bet: {0}")]
    InvalidBet(String),

    /// Integrity failure mid-spin; the enclosing transaction must roll back
    #[error("cascade depth cap {0} reached; aborting spin")]
    MaxCascadeDepth(u32),
}

impl EngineError {
    /// Fatal errors abort the wallet transaction and refund the bet
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::MaxCascadeDepth(_))
    }
}

/// Input tuple of one spin
#[derive(Debug, Clone)]
pub struct SpinParams {
    pub spin_id: String,
    pub bet: Amount,
    pub mode: GameMode,
    /// Session accumulator at spin start; 1 in base mode
    pub accumulated_multiplier: u32,
    pub rng_seed: u64,
    pub timestamp: DateTime<Utc>,
}

/// The deterministic cluster-pays engine
///
/// Carries configuration and the grid generator explicitly; no hidden
/// globals.
pub struct GridEngine {
    config: Arc<GameConfig>,
    generator: GridGenerator,
}

impl GridEngine {
    pub fn new(config: Arc<GameConfig>) -> Self {
        let generator = GridGenerator::new(config.clone());
        Self { config, generator }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Compute the complete outcome of one spin
    pub fn compute_spin(&self, params: SpinParams) -> Result<SpinResult, EngineError> {
        self.check_bet(params.bet)?;

        let mut rng = SpinRng::seeded(params.rng_seed);
        let initial_grid = self.generator.generate(params.mode, &mut rng);
        let scatter_count = initial_grid.scatter_positions().len();

        let mut grid = initial_grid;
        let mut steps: Vec<CascadeStep> = Vec::new();
        let mut base_win = Amount::ZERO;
        let mut earned_multiplier = 0u32;
        let mut injections = 0u32;
        let mut offset_ms = 0u64;

        loop {
            let clusters = find_clusters(&grid);
            if clusters.is_empty() {
                break;
            }
            let step_index = steps.len() as u32;
            if step_index >= self.config.max_cascade_depth {
                log::warn!(
                    "spin {}: cascade depth cap {} reached",
                    params.spin_id,
                    self.config.max_cascade_depth
                );
                return Err(EngineError::MaxCascadeDepth(self.config.max_cascade_depth));
            }

            let grid_before = grid;

            // Step win: cluster pays × highest in-cluster cell multiplier
            let mut step_win = Amount::ZERO;
            for cluster in &clusters {
                let pay = self
                    .config
                    .payout_table
                    .cluster_pay(cluster.symbol, cluster.size());
                let cluster_multiplier = cluster
                    .positions
                    .iter()
                    .map(|&p| grid.cell(p).multiplier)
                    .max()
                    .unwrap_or(1);
                step_win += params.bet.mul_div(pay, 20) * cluster_multiplier as i64;
            }
            base_win += step_win;

            // Random multiplier injection
            let random_multiplier =
                self.roll_multiplier(&mut grid, &clusters, params.mode, injections, &mut rng);
            if let Some(applied) = random_multiplier {
                injections += 1;
                if params.mode.is_free() {
                    earned_multiplier += applied.value;
                }
            }

            // Remove, drop, refill
            let (grid_after, drop_pattern) =
                resolve_cascade(&grid, &clusters, &self.generator, params.mode, &mut rng);

            let timings = StepTimings::at_offset(offset_ms, self.config.step_timing);
            offset_ms += timings.total_ms;

            let mut step = CascadeStep {
                step_index,
                grid_before,
                matched_clusters: clusters,
                win_amount: step_win,
                drop_pattern,
                grid_after,
                random_multiplier,
                timings,
                step_hash: String::new(),
            };
            step.step_hash = step.hash("");
            steps.push(step);
            grid = grid_after;
        }

        // Free-spin triggers are evaluated on the initial grid only;
        // scatters landing mid-cascade are inert
        let (free_spins_triggered, free_spins_awarded) = match params.mode {
            GameMode::Base if scatter_count >= self.config.scatter.trigger_count => {
                (true, self.config.scatter.initial_award)
            }
            GameMode::Free if scatter_count >= self.config.scatter.retrigger_count => {
                (true, self.config.scatter.retrigger_award)
            }
            _ => (false, 0),
        };

        // Totalize: the accumulator applies per spin, never per step
        let total_multiplier = match params.mode {
            GameMode::Base => params.accumulated_multiplier.max(1),
            GameMode::Free => params.accumulated_multiplier.max(1) * earned_multiplier.max(1),
        };
        let uncapped = base_win * total_multiplier as i64;
        let cap = params.bet * self.config.max_win_cap_multiplier;
        let total_win = uncapped.min(cap);
        if uncapped > cap {
            log::info!(
                "spin {}: win {} clamped to cap {}",
                params.spin_id,
                uncapped,
                cap
            );
        }

        let mut result = SpinResult {
            spin_id: params.spin_id,
            bet_amount: params.bet,
            rng_seed: params.rng_seed,
            game_mode: params.mode,
            initial_grid,
            cascade_steps: steps,
            base_win,
            total_multiplier,
            total_win,
            scatter_count: scatter_count as u32,
            free_spins_triggered,
            free_spins_awarded,
            free_spin_multiplier_earned: earned_multiplier,
            validation_hash: String::new(),
            timestamp: params.timestamp,
        };
        result.validation_hash = result.compute_validation_hash();

        log::debug!(
            "spin {}: {} cascades, base {}, x{}, total {}",
            result.spin_id,
            result.cascade_count(),
            result.base_win,
            result.total_multiplier,
            result.total_win
        );
        Ok(result)
    }

    /// Recompute a recorded spin from its recorded inputs
    ///
    /// The accumulator input is recoverable from the totals:
    /// `total_multiplier = accumulated × max(1, earned)`.
    pub fn replay(&self, recorded: &SpinResult) -> Result<SpinResult, EngineError> {
        let accumulated =
            recorded.total_multiplier / recorded.free_spin_multiplier_earned.max(1);
        self.compute_spin(SpinParams {
            spin_id: recorded.spin_id.clone(),
            bet: recorded.bet_amount,
            mode: recorded.game_mode,
            accumulated_multiplier: accumulated,
            rng_seed: recorded.rng_seed,
            timestamp: recorded.timestamp,
        })
    }

    /// Audit check: does a recomputation reproduce the sealed hash?
    pub fn verify_replay(&self, recorded: &SpinResult) -> Result<bool, EngineError> {
        let recomputed = self.replay(recorded)?;
        Ok(recomputed.validation_hash == recorded.validation_hash)
    }

    /// Bet validation; callers run this before any debit
    pub fn check_bet(&self, bet: Amount) -> Result<(), EngineError> {
        if !bet.is_positive() {
            return Err(EngineError::InvalidBet(format!(
                "bet must be positive, got {bet}"
            )));
        }
        if bet > self.config.max_bet {
            return Err(EngineError::InvalidBet(format!(
                "bet {bet} exceeds maximum {}",
                self.config.max_bet
            )));
        }
        Ok(())
    }

    /// Roll the per-cascade random multiplier
    ///
    /// When fired, the value attaches to a deterministically chosen
    /// unmatched non-scatter cell: candidates are enumerated column-major
    /// and indexed by one draw from the spin stream.
    fn roll_multiplier(
        &self,
        grid: &mut Grid,
        clusters: &[Cluster],
        mode: GameMode,
        injections_so_far: u32,
        rng: &mut SpinRng,
    ) -> Option<AppliedMultiplier> {
        let feature = &self.config.random_multiplier;
        let chance = match mode {
            GameMode::Base => feature.base_chance,
            GameMode::Free => feature.free_chance,
        };
        let capped = mode == GameMode::Base && injections_so_far >= feature.base_per_spin_cap;
        if capped || !rng.chance(chance) {
            return None;
        }
        let value = *rng.weighted_pick(&feature.table)?;

        let mask = matched_mask(clusters);
        let candidates: Vec<Position> = Grid::positions()
            .filter(|p| !mask[p.col as usize][p.row as usize])
            .filter(|&p| !grid.symbol(p).is_scatter())
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let index = rng.int_in_range(0, candidates.len() as i64 - 1) as usize;
        let position = candidates[index];
        let cell = grid.cell(position);
        grid.set(
            position,
            Cell::with_multiplier(cell.symbol, cell.multiplier.saturating_mul(value)),
        );
        Some(AppliedMultiplier { value, position })
    }
}
