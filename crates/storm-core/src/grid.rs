//! The 6×5 playfield
//!
//! Column-major indexing: `grid[col][row]`. Row 0 is the top of a column;
//! gravity drops symbols toward higher row indices. Cells may carry a
//! multiplier attached by the random-multiplier feature; a multiplier of 1
//! means none.

use serde::{Deserialize, Serialize};

use crate::symbol::Symbol;

/// Number of columns (reels)
pub const GRID_COLS: usize = 6;
/// Number of rows per column
pub const GRID_ROWS: usize = 5;
/// Total cell count
pub const GRID_CELLS: usize = GRID_COLS * GRID_ROWS;

/// A grid position (column, row)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub col: u8,
    pub row: u8,
}

impl Position {
    pub fn new(col: usize, row: usize) -> Self {
        debug_assert!(col < GRID_COLS && row < GRID_ROWS);
        Self {
            col: col as u8,
            row: row as u8,
        }
    }

    /// Orthogonal neighbours inside the grid
    pub fn neighbours(self) -> impl Iterator<Item = Position> {
        let (col, row) = (self.col as i16, self.row as i16);
        [(col - 1, row), (col + 1, row), (col, row - 1), (col, row + 1)]
            .into_iter()
            .filter(|&(c, r)| {
                c >= 0 && r >= 0 && (c as usize) < GRID_COLS && (r as usize) < GRID_ROWS
            })
            .map(|(c, r)| Position {
                col: c as u8,
                row: r as u8,
            })
    }
}

/// One grid cell: a symbol plus an optional attached multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub symbol: Symbol,
    /// Attached win multiplier; 1 = none
    #[serde(default = "default_multiplier", skip_serializing_if = "is_default_multiplier")]
    pub multiplier: u32,
}

fn default_multiplier() -> u32 {
    1
}

fn is_default_multiplier(m: &u32) -> bool {
    *m == 1
}

impl Cell {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            multiplier: 1,
        }
    }

    pub fn with_multiplier(symbol: Symbol, multiplier: u32) -> Self {
        Self { symbol, multiplier }
    }

    pub fn has_multiplier(self) -> bool {
        self.multiplier > 1
    }
}

/// The 6×5 grid, column-major
///
/// Serializes as the bare array of columns, matching the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid {
    cells: [[Cell; GRID_ROWS]; GRID_COLS],
}

impl Grid {
    /// Grid filled with a single symbol (test and scaffolding use)
    pub fn filled(symbol: Symbol) -> Self {
        Self {
            cells: [[Cell::new(symbol); GRID_ROWS]; GRID_COLS],
        }
    }

    /// Build from a generator called in column-major order
    pub fn from_fn(mut f: impl FnMut(usize, usize) -> Cell) -> Self {
        let mut grid = Grid::filled(Symbol::TimeGem);
        for col in 0..GRID_COLS {
            for row in 0..GRID_ROWS {
                grid.cells[col][row] = f(col, row);
            }
        }
        grid
    }

    pub fn cell(&self, pos: Position) -> Cell {
        self.cells[pos.col as usize][pos.row as usize]
    }

    pub fn symbol(&self, pos: Position) -> Symbol {
        self.cell(pos).symbol
    }

    pub fn set(&mut self, pos: Position, cell: Cell) {
        self.cells[pos.col as usize][pos.row as usize] = cell;
    }

    pub fn column(&self, col: usize) -> &[Cell; GRID_ROWS] {
        &self.cells[col]
    }

    pub fn column_mut(&mut self, col: usize) -> &mut [Cell; GRID_ROWS] {
        &mut self.cells[col]
    }

    /// All positions in column-major order
    pub fn positions() -> impl Iterator<Item = Position> {
        (0..GRID_COLS).flat_map(|col| (0..GRID_ROWS).map(move |row| Position::new(col, row)))
    }

    /// All cells with their positions, column-major
    pub fn iter(&self) -> impl Iterator<Item = (Position, Cell)> + '_ {
        Self::positions().map(move |pos| (pos, self.cell(pos)))
    }

    /// Count of cells holding `symbol`
    pub fn count(&self, symbol: Symbol) -> usize {
        self.iter().filter(|(_, c)| c.symbol == symbol).count()
    }

    /// Positions of every scatter on the grid
    pub fn scatter_positions(&self) -> Vec<Position> {
        self.iter()
            .filter(|(_, c)| c.symbol.is_scatter())
            .map(|(p, _)| p)
            .collect()
    }
}
