use pinocchio::error::ProgramError;

use crate::error::GridError;
use crate::engine::{available_base, fill_cell, FillOutcome, FillRequest, FillSide, Settlement};
use crate::math::{checked_add, checked_sub};
use crate::state::{CellId, Grid};

#[derive(Clone, Copy, Debug)]
pub struct BatchRequest<'a> {
    pub grid_id: u64,
    pub cells: &'a [CellId],
    pub amounts: &'a [u64],
    pub max_total: u64,
    pub min_total: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchOutcome {
    pub filled_base: u64,
    pub quote_volume: u64,
    pub fee: u64,
    pub protocol_fee: u64,
    pub cells_filled: u16,
    pub settlement: Settlement,
}

impl BatchOutcome {
    fn new(side: FillSide) -> Self {
        Self {
            filled_base: 0,
            quote_volume: 0,
            fee: 0,
            protocol_fee: 0,
            cells_filled: 0,
            settlement: Settlement::new(side),
        }
    }

    fn record(&mut self, fill: &FillOutcome) -> Result<(), ProgramError> {
        self.filled_base = checked_add(self.filled_base, fill.filled_base)?;
        self.quote_volume = checked_add(self.quote_volume, fill.quote_volume)?;
        self.fee = checked_add(self.fee, fill.fee)?;
        self.protocol_fee = checked_add(self.protocol_fee, fill.protocol_fee)?;
        self.cells_filled = self.cells_filled.saturating_add(1);
        self.settlement.add(fill)
    }
}

/// Fills `req.cells` in the given order until `req.max_total` is reached.
pub fn fill_batch(grid: &mut Grid, side: FillSide, req: &BatchRequest<'_>) -> Result<BatchOutcome, ProgramError> {
    if req.cells.is_empty() {
        return Err(GridError::InvalidOrderCount.into());
    }
    if req.cells.len() != req.amounts.len() {
        return Err(GridError::InvalidInstruction.into());
    }
    if req.grid_id != grid.id {
        return Err(GridError::GridMismatch.into());
    }
    if !grid.is_active() {
        return Err(GridError::GridCanceled.into());
    }

    let mut working = grid.clone();
    let mut remaining = req.max_total;
    let mut outcome = BatchOutcome::new(side);

    for (id, amount) in req.cells.iter().zip(req.amounts.iter()) {
        if remaining == 0 {
            break;
        }
        if id.grid_id != req.grid_id {
            return Err(GridError::GridMismatch.into());
        }

        let cell = working.cell(*id)?;
        if available_base(&working, cell, side)? == 0 {
            continue;
        }
        let base_amount = (*amount).min(remaining);
        if base_amount == 0 {
            continue;
        }

        let fill_req = FillRequest {
            cell: *id,
            base_amount,
            min_amount: 0,
        };
        let filled = match fill_cell(&mut working, side, &fill_req) {
            Ok(filled) => filled,
            Err(err) if err == ProgramError::from(GridError::DustAmount) => continue,
            Err(err) => return Err(err),
        };
        remaining = checked_sub(remaining, filled.filled_base)?;
        outcome.record(&filled)?;
    }

    if outcome.filled_base == 0 || outcome.filled_base < req.min_total {
        return Err(GridError::Slippage.into());
    }

    *grid = working;
    Ok(outcome)
}
