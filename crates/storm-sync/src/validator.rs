//! Structural, physics, and hash validation of grids and cascade steps

use serde::{Deserialize, Serialize};
use thiserror::Error;

use storm_core::{ContentHasher, Grid, Position, Symbol, GRID_COLS, GRID_ROWS};
use storm_engine::{CascadeStep, MIN_CLUSTER_SIZE};

/// Desync classification reported by clients or detected server-side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesyncType {
    HashMismatch,
    TimingError,
    GridInconsistency,
}

/// Validation failure
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("grid structure: {0}")]
    Structure(String),

    #[error("cluster invalid: {0}")]
    Cluster(String),

    #[error("drop pattern invalid: {0}")]
    Drop(String),

    #[error("step hash mismatch at step {step_index}: expected {expected}, got {actual}")]
    HashMismatch {
        step_index: u32,
        expected: String,
        actual: String,
    },

    #[error("timing invalid: {0}")]
    Timing(String),
}

impl ValidationError {
    /// Desync classification of this failure
    pub fn desync_type(&self) -> DesyncType {
        match self {
            ValidationError::HashMismatch { .. } => DesyncType::HashMismatch,
            ValidationError::Timing(_) => DesyncType::TimingError,
            _ => DesyncType::GridInconsistency,
        }
    }
}

/// A client-reported grid: may contain holes mid-animation
///
/// Column-major like [`Grid`]; `None` is an empty cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientGrid(pub Vec<Vec<Option<Symbol>>>);

impl ClientGrid {
    /// Snapshot of a full server grid (symbols only)
    pub fn from_grid(grid: &Grid) -> Self {
        let columns = (0..GRID_COLS)
            .map(|col| grid.column(col).iter().map(|c| Some(c.symbol)).collect())
            .collect();
        ClientGrid(columns)
    }

    /// Rebuild a full grid; `None` when dimensions are off or holes remain
    pub fn to_grid(&self) -> Option<Grid> {
        validate_grid_structure(self).ok()?;
        let mut cells = Vec::with_capacity(GRID_COLS * GRID_ROWS);
        for column in &self.0 {
            for cell in column {
                cells.push((*cell)?);
            }
        }
        let mut iter = cells.into_iter();
        Some(Grid::from_fn(|_, _| {
            storm_core::Cell::new(iter.next().unwrap_or(Symbol::TimeGem))
        }))
    }
}

/// Dimensions, known symbols, and the floating-column rule
///
/// After gravity no empty cell may sit below a filled one: scanning a
/// column top-down, once a symbol appears every deeper cell is filled.
pub fn validate_grid_structure(grid: &ClientGrid) -> Result<(), ValidationError> {
    if grid.0.len() != GRID_COLS {
        return Err(ValidationError::Structure(format!(
            "expected {GRID_COLS} columns, got {}",
            grid.0.len()
        )));
    }
    for (col, column) in grid.0.iter().enumerate() {
        if column.len() != GRID_ROWS {
            return Err(ValidationError::Structure(format!(
                "column {col}: expected {GRID_ROWS} rows, got {}",
                column.len()
            )));
        }
        let mut seen_symbol = false;
        for (row, cell) in column.iter().enumerate() {
            match cell {
                Some(_) => seen_symbol = true,
                None if seen_symbol => {
                    return Err(ValidationError::Structure(format!(
                        "column {col}: floating symbols above empty row {row}"
                    )));
                }
                None => {}
            }
        }
    }
    Ok(())
}

/// 4-connectivity, symbol agreement, and minimum size of a claimed cluster
pub fn validate_cluster(
    grid: &Grid,
    positions: &[Position],
    symbol: Symbol,
) -> Result<(), ValidationError> {
    if positions.len() < MIN_CLUSTER_SIZE {
        return Err(ValidationError::Cluster(format!(
            "size {} below minimum {MIN_CLUSTER_SIZE}",
            positions.len()
        )));
    }
    if symbol.is_scatter() {
        return Err(ValidationError::Cluster("scatters do not cluster".into()));
    }
    for &pos in positions {
        if grid.symbol(pos) != symbol {
            return Err(ValidationError::Cluster(format!(
                "cell ({}, {}) holds {}, not {}",
                pos.col,
                pos.row,
                grid.symbol(pos).name(),
                symbol.name()
            )));
        }
    }

    // Connectivity: flood from the first member, stay within the set
    let mut remaining: Vec<Position> = positions.to_vec();
    remaining.sort();
    remaining.dedup();
    if remaining.len() != positions.len() {
        return Err(ValidationError::Cluster("duplicate positions".into()));
    }
    let mut reached = vec![false; remaining.len()];
    let mut stack = vec![0usize];
    reached[0] = true;
    while let Some(at) = stack.pop() {
        for neighbour in remaining[at].neighbours() {
            if let Ok(idx) = remaining.binary_search(&neighbour) {
                if !reached[idx] {
                    reached[idx] = true;
                    stack.push(idx);
                }
            }
        }
    }
    if reached.iter().any(|&r| !r) {
        return Err(ValidationError::Cluster("positions not 4-connected".into()));
    }
    Ok(())
}

/// Drop physics: survivors keep order and sink, refills stay on top
pub fn validate_drop(
    grid_before: &Grid,
    cleared: &[Position],
    grid_after: &Grid,
) -> Result<(), ValidationError> {
    for col in 0..GRID_COLS {
        let cleared_rows: Vec<usize> = cleared
            .iter()
            .filter(|p| p.col as usize == col)
            .map(|p| p.row as usize)
            .collect();
        let survivors: Vec<Symbol> = (0..GRID_ROWS)
            .filter(|row| !cleared_rows.contains(row))
            .map(|row| grid_before.column(col)[row].symbol)
            .collect();

        // Survivors must occupy the deepest rows in original order
        let refill_count = cleared_rows.len();
        for (offset, &expected) in survivors.iter().enumerate() {
            let row = refill_count + offset;
            let actual = grid_after.column(col)[row].symbol;
            if actual != expected {
                return Err(ValidationError::Drop(format!(
                    "column {col} row {row}: expected surviving {}, found {}",
                    expected.name(),
                    actual.name()
                )));
            }
        }
    }
    Ok(())
}

/// Recompute a step's salted hash and compare
pub fn validate_step_hash(
    step: &CascadeStep,
    salt: &str,
    claimed: &str,
) -> Result<(), ValidationError> {
    let expected = step.hash(salt);
    if expected != claimed {
        return Err(ValidationError::HashMismatch {
            step_index: step.step_index,
            expected,
            actual: claimed.to_string(),
        });
    }
    Ok(())
}

/// Salted grid-state hash used by ad-hoc grid validation requests
pub fn grid_state_hash(grid: &Grid, salt: &str) -> String {
    ContentHasher::salted(salt).grid(grid).finish()
}

/// Client step timing checks
///
/// `client_times_ms` are the client's per-step start timestamps. They must
/// be strictly monotonic, no phase may complete implausibly fast, and each
/// inter-step delta must stay within `tolerance_ms` of the server's
/// advisory duration once `network_delay_ms` of skew is discounted.
pub fn validate_timing(
    steps: &[CascadeStep],
    client_times_ms: &[i64],
    network_delay_ms: i64,
    tolerance_ms: i64,
    min_phase_ms: i64,
) -> Result<(), ValidationError> {
    if client_times_ms.len() != steps.len() {
        return Err(ValidationError::Timing(format!(
            "expected {} timestamps, got {}",
            steps.len(),
            client_times_ms.len()
        )));
    }
    for window in client_times_ms.windows(2) {
        if window[1] <= window[0] {
            return Err(ValidationError::Timing(format!(
                "timestamps not monotonic: {} then {}",
                window[0], window[1]
            )));
        }
    }
    for (index, window) in client_times_ms.windows(2).enumerate() {
        let observed = window[1] - window[0];
        if observed < min_phase_ms {
            return Err(ValidationError::Timing(format!(
                "step {index} completed in {observed}ms, below the {min_phase_ms}ms floor"
            )));
        }
        let advertised = steps[index].timings.total_ms as i64;
        let skewed = (observed - network_delay_ms - advertised).abs();
        if skewed > tolerance_ms {
            return Err(ValidationError::Timing(format!(
                "step {index} delta {observed}ms deviates {skewed}ms from advisory {advertised}ms"
            )));
        }
    }
    Ok(())
}
