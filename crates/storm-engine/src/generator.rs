//! Grid generation from per-mode spawn weights

use std::sync::Arc;

use storm_core::{Cell, GameConfig, GameMode, Grid, Symbol, SymbolWeights};
use storm_rng::SpinRng;

/// Weighted grid generator
///
/// Populates cells by weighted selection from the configured table for the
/// active mode. The free-spins table skews toward high-pay symbols.
pub struct GridGenerator {
    config: Arc<GameConfig>,
}

impl GridGenerator {
    pub fn new(config: Arc<GameConfig>) -> Self {
        Self { config }
    }

    fn weights(&self, mode: GameMode) -> &SymbolWeights {
        match mode {
            GameMode::Base => &self.config.symbol_weights.base,
            GameMode::Free => &self.config.symbol_weights.free_spins,
        }
    }

    /// Draw one symbol from the mode's spawn distribution
    ///
    /// Also the refill stream: emptied cells refill through this same draw.
    pub fn draw(&self, mode: GameMode, rng: &mut SpinRng) -> Symbol {
        let table = self.weights(mode);
        // Table is validated non-empty at config load
        *rng.weighted_pick(table.entries()).unwrap_or(&Symbol::TimeGem)
    }

    /// Generate a full grid, filling cells in column-major order
    pub fn generate(&self, mode: GameMode, rng: &mut SpinRng) -> Grid {
        Grid::from_fn(|_, _| Cell::new(self.draw(mode, rng)))
    }
}
