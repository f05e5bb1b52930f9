//! Cascade resolution: remove matched cells, drop survivors, refill
//!
//! Gravity pulls symbols toward higher row indices. Survivors keep their
//! relative order within a column and settle into the deepest rows; refills
//! enter at row 0 and fall into the remaining gaps, drawn from the seeded
//! refill stream in column-major order.

use serde::{Deserialize, Serialize};

use storm_core::{Cell, GameMode, Grid, Symbol, GRID_COLS, GRID_ROWS};
use storm_rng::SpinRng;

use crate::clusters::{matched_mask, Cluster};
use crate::generator::GridGenerator;

/// One surviving symbol's fall within a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fall {
    pub from_row: u8,
    pub to_row: u8,
}

/// Per-column drop record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDrop {
    pub column: u8,
    /// Survivor movements, top to bottom
    pub falls: Vec<Fall>,
    /// Symbols refilled into rows `0..refills.len()`, top to bottom
    pub refills: Vec<Symbol>,
}

/// The complete drop pattern of one cascade step
///
/// Only columns with cleared cells appear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropPattern {
    pub columns: Vec<ColumnDrop>,
}

impl DropPattern {
    pub fn refill_count(&self) -> usize {
        self.columns.iter().map(|c| c.refills.len()).sum()
    }
}

/// Clear matched cells, apply gravity, refill from the RNG stream
///
/// Returns the settled grid and the drop pattern describing it. Attached
/// cell multipliers travel with their surviving cells; refills enter bare.
pub fn resolve_cascade(
    grid: &Grid,
    clusters: &[Cluster],
    generator: &GridGenerator,
    mode: GameMode,
    rng: &mut SpinRng,
) -> (Grid, DropPattern) {
    let mask = matched_mask(clusters);
    let mut settled = *grid;
    let mut pattern = DropPattern::default();

    for col in 0..GRID_COLS {
        let cleared = (0..GRID_ROWS).filter(|&row| mask[col][row]).count();
        if cleared == 0 {
            continue;
        }

        // Survivors keep order and settle into the deepest rows
        let survivors: Vec<(usize, Cell)> = (0..GRID_ROWS)
            .filter(|&row| !mask[col][row])
            .map(|row| (row, grid.column(col)[row]))
            .collect();

        let mut falls = Vec::new();
        let column = settled.column_mut(col);
        for (offset, &(from_row, cell)) in survivors.iter().enumerate() {
            let to_row = cleared + offset;
            column[to_row] = cell;
            if to_row != from_row {
                falls.push(Fall {
                    from_row: from_row as u8,
                    to_row: to_row as u8,
                });
            }
        }

        // Refill the vacated top rows; draw order is column-major
        let mut refills = Vec::with_capacity(cleared);
        for row in 0..cleared {
            let symbol = generator.draw(mode, rng);
            column[row] = Cell::new(symbol);
            refills.push(symbol);
        }

        pattern.columns.push(ColumnDrop {
            column: col as u8,
            falls,
            refills,
        });
    }

    (settled, pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use storm_core::{GameConfig, Position};

    fn generator() -> GridGenerator {
        GridGenerator::new(Arc::new(GameConfig::default()))
    }

    /// A fabricated cluster covering the given positions
    fn cluster_at(symbol: Symbol, positions: &[(usize, usize)]) -> Cluster {
        let mut positions: Vec<Position> =
            positions.iter().map(|&(c, r)| Position::new(c, r)).collect();
        positions.sort();
        Cluster { symbol, positions }
    }

    #[test]
    fn test_survivors_keep_order_and_sink() {
        // Column 0 top-to-bottom: Time, Space, Mind, Power, Reality.
        // Clear rows 1 and 3 (Space, Power).
        let mut grid = Grid::filled(Symbol::SoulGem);
        let symbols = [
            Symbol::TimeGem,
            Symbol::SpaceGem,
            Symbol::MindGem,
            Symbol::PowerGem,
            Symbol::RealityGem,
        ];
        for (row, &s) in symbols.iter().enumerate() {
            grid.set(Position::new(0, row), Cell::new(s));
        }
        let cluster = cluster_at(Symbol::SpaceGem, &[(0, 1), (0, 3)]);

        let (settled, pattern) =
            resolve_cascade(&grid, &[cluster], &generator(), GameMode::Base, &mut SpinRng::seeded(1));

        // Deepest rows hold Time, Mind, Reality in original order
        assert_eq!(settled.symbol(Position::new(0, 2)), Symbol::TimeGem);
        assert_eq!(settled.symbol(Position::new(0, 3)), Symbol::MindGem);
        assert_eq!(settled.symbol(Position::new(0, 4)), Symbol::RealityGem);

        assert_eq!(pattern.columns.len(), 1);
        let drop = &pattern.columns[0];
        assert_eq!(drop.column, 0);
        assert_eq!(drop.refills.len(), 2);
        // Reality at row 4 never moved; Time 0→2, Mind 2→3
        assert_eq!(
            drop.falls,
            vec![
                Fall { from_row: 0, to_row: 2 },
                Fall { from_row: 2, to_row: 3 },
            ]
        );
        // Refills landed at the vacated top rows
        assert_eq!(settled.symbol(Position::new(0, 0)), drop.refills[0]);
        assert_eq!(settled.symbol(Position::new(0, 1)), drop.refills[1]);
    }

    #[test]
    fn test_untouched_columns_not_recorded() {
        let grid = Grid::filled(Symbol::MindGem);
        let cluster = cluster_at(
            Symbol::MindGem,
            &[(2, 0), (2, 1), (2, 2), (2, 3), (2, 4), (3, 0), (3, 1), (3, 2)],
        );
        let (_, pattern) =
            resolve_cascade(&grid, &[cluster], &generator(), GameMode::Base, &mut SpinRng::seeded(2));
        let columns: Vec<u8> = pattern.columns.iter().map(|c| c.column).collect();
        assert_eq!(columns, vec![2, 3]);
    }

    #[test]
    fn test_multiplier_travels_with_cell() {
        let mut grid = Grid::filled(Symbol::SoulGem);
        grid.set(
            Position::new(0, 0),
            Cell::with_multiplier(Symbol::Thanos, 10),
        );
        // Clear rows 1..=4 of column 0
        let cluster = cluster_at(Symbol::SoulGem, &[(0, 1), (0, 2), (0, 3), (0, 4)]);
        let (settled, _) =
            resolve_cascade(&grid, &[cluster], &generator(), GameMode::Base, &mut SpinRng::seeded(3));
        // The boosted Thanos cell sank to the bottom, multiplier intact
        let landed = settled.cell(Position::new(0, 4));
        assert_eq!(landed.symbol, Symbol::Thanos);
        assert_eq!(landed.multiplier, 10);
    }

    #[test]
    fn test_refill_is_deterministic() {
        let grid = Grid::filled(Symbol::TimeGem);
        let cluster = cluster_at(
            Symbol::TimeGem,
            &[(0, 0), (0, 1), (0, 2), (0, 3), (0, 4), (1, 0), (1, 1), (1, 2)],
        );
        let gen = generator();
        let (a, pa) =
            resolve_cascade(&grid, std::slice::from_ref(&cluster), &gen, GameMode::Base, &mut SpinRng::seeded(9));
        let (b, pb) =
            resolve_cascade(&grid, std::slice::from_ref(&cluster), &gen, GameMode::Base, &mut SpinRng::seeded(9));
        assert_eq!(a, b);
        assert_eq!(pa, pb);
    }

    #[test]
    fn test_no_floating_cells_after_resolution() {
        // Clearing an interior block must never leave a gap below a symbol;
        // by construction rows fill bottom-up, so just assert the shape holds
        let grid = Grid::filled(Symbol::PowerGem);
        let cluster = cluster_at(
            Symbol::PowerGem,
            &[(1, 1), (1, 2), (2, 1), (2, 2), (3, 1), (3, 2), (4, 1), (4, 2)],
        );
        let (settled, pattern) =
            resolve_cascade(&grid, &[cluster], &generator(), GameMode::Base, &mut SpinRng::seeded(4));
        // Every column still has 5 cells and refill totals match cleared count
        assert_eq!(pattern.refill_count(), 8);
        assert_eq!(settled.iter().count(), 30);
    }
}
