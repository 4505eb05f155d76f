use pinocchio::{error::ProgramError, ProgramResult};

use crate::constants::{PRICE_SCALE, ROUTE_NATIVE_IN, ROUTE_NATIVE_OUT};
use crate::error::GridError;
use crate::math::{calc_fee, checked_add, checked_sub, mul_div, mul_div_rounding_up, split_fee};
use crate::state::{CellId, Currency, Grid, GridCell};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillSide {
    Ask, // taker buys base
    Bid,
}

impl FillSide {
    pub fn input(self) -> Currency {
        match self {
            FillSide::Ask => Currency::Quote,
            FillSide::Bid => Currency::Base,
        }
    }

    pub fn output(self) -> Currency {
        match self {
            FillSide::Ask => Currency::Base,
            FillSide::Bid => Currency::Quote,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FillRequest {
    pub cell: CellId,
    pub base_amount: u64,
    pub min_amount: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FillOutcome {
    pub filled_base: u64,
    pub quote_volume: u64,
    pub fee: u64,
    pub protocol_fee: u64,
    pub maker_fee: u64,
}

impl FillOutcome {
    pub fn taker_in(&self, side: FillSide) -> Result<u64, ProgramError> {
        match side {
            FillSide::Ask => checked_add(self.quote_volume, self.fee),
            FillSide::Bid => Ok(self.filled_base),
        }
    }

    pub fn taker_out(&self, side: FillSide) -> Result<u64, ProgramError> {
        match side {
            FillSide::Ask => Ok(self.filled_base),
            FillSide::Bid => checked_sub(self.quote_volume, self.fee),
        }
    }
}

/// Native-asset override requested by the taker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CurrencyRoute {
    pub native_in: bool,
    pub native_out: bool,
}

impl CurrencyRoute {
    pub fn from_flags(flags: u8) -> Result<Self, ProgramError> {
        if flags & !(ROUTE_NATIVE_IN | ROUTE_NATIVE_OUT) != 0 {
            return Err(GridError::InvalidInstruction.into());
        }
        Ok(Self {
            native_in: flags & ROUTE_NATIVE_IN != 0,
            native_out: flags & ROUTE_NATIVE_OUT != 0,
        })
    }

    pub fn flags(self) -> u8 {
        let mut flags = 0;
        if self.native_in {
            flags |= ROUTE_NATIVE_IN;
        }
        if self.native_out {
            flags |= ROUTE_NATIVE_OUT;
        }
        flags
    }

    /// A routed leg must trade the wrapped native mint, and one must be configured.
    pub fn check(self, grid: &Grid, side: FillSide, native_mint: Option<&[u8; 32]>) -> ProgramResult {
        for (routed, currency) in [(self.native_in, side.input()), (self.native_out, side.output())] {
            if routed && native_mint != Some(grid.mint(currency)) {
                return Err(GridError::CurrencyMismatch.into());
            }
        }
        Ok(())
    }
}

/// Moves funds between one counterparty and a grid's vaults.
pub trait Custody {
    fn debit(&mut self, currency: Currency, amount: u64) -> ProgramResult;

    fn credit(&mut self, currency: Currency, amount: u64) -> ProgramResult;

    fn wrap_native(&mut self, _currency: Currency, _amount: u64) -> ProgramResult {
        Err(GridError::CurrencyMismatch.into())
    }

    fn unwrap_native(&mut self, _currency: Currency) -> ProgramResult {
        Err(GridError::CurrencyMismatch.into())
    }
}

/// Net taker flows of one or more fills on the same side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub side: FillSide,
    pub taker_in: u64,
    pub taker_out: u64,
}

impl Settlement {
    pub fn new(side: FillSide) -> Self {
        Self {
            side,
            taker_in: 0,
            taker_out: 0,
        }
    }

    pub fn add(&mut self, outcome: &FillOutcome) -> ProgramResult {
        self.taker_in = checked_add(self.taker_in, outcome.taker_in(self.side)?)?;
        self.taker_out = checked_add(self.taker_out, outcome.taker_out(self.side)?)?;
        Ok(())
    }

    pub fn settle<C: Custody>(&self, custody: &mut C, route: CurrencyRoute) -> ProgramResult {
        let input = self.side.input();
        let output = self.side.output();
        if self.taker_in > 0 {
            if route.native_in {
                custody.wrap_native(input, self.taker_in)?;
            }
            custody.debit(input, self.taker_in)?;
        }
        if self.taker_out > 0 {
            custody.credit(output, self.taker_out)?;
            if route.native_out {
                custody.unwrap_native(output)?;
            }
        }
        Ok(())
    }
}

// ask fills draw an ask cell's native leg at `price` and a bid cell's cross leg at
// `rev_price`; bid fills mirror that
fn draws_native(cell: &GridCell, side: FillSide) -> bool {
    cell.is_ask == (side == FillSide::Ask)
}

fn used_price(cell: &GridCell, native: bool) -> u64 {
    if native {
        cell.price
    } else {
        cell.rev_price
    }
}

/// Base amount a fill on `side` can take from `cell` right now.
pub fn available_base(grid: &Grid, cell: &GridCell, side: FillSide) -> Result<u64, ProgramError> {
    let native = draws_native(cell, side);
    if !native && grid.oneshot {
        return Ok(0);
    }
    let source = if native {
        cell.native_balance
    } else {
        cell.cross_balance
    };
    match side {
        FillSide::Ask => Ok(source),
        FillSide::Bid => mul_div(source, PRICE_SCALE, used_price(cell, native)),
    }
}

/// Fills one cell and returns what was traded.
pub fn fill_cell(grid: &mut Grid, side: FillSide, req: &FillRequest) -> Result<FillOutcome, ProgramError> {
    if !grid.is_active() {
        return Err(GridError::GridCanceled.into());
    }
    let cell = grid.cell(req.cell)?.clone();
    let native = draws_native(&cell, side);
    if !native && grid.oneshot {
        return Err(GridError::OneshotReverseFill.into());
    }

    let filled_base = req.base_amount.min(available_base(grid, &cell, side)?);
    if filled_base == 0 || filled_base < req.min_amount {
        return Err(GridError::Slippage.into());
    }

    match side {
        FillSide::Ask => fill_ask(grid, req.cell, &cell, native, filled_base),
        FillSide::Bid => fill_bid(grid, req.cell, &cell, native, filled_base),
    }
}

pub fn fill(
    grid: &mut Grid,
    side: FillSide,
    req: &FillRequest,
    route: CurrencyRoute,
    native_mint: Option<&[u8; 32]>,
) -> Result<(FillOutcome, Settlement), ProgramError> {
    route.check(grid, side, native_mint)?;
    let outcome = fill_cell(grid, side, req)?;
    let mut settlement = Settlement::new(side);
    settlement.add(&outcome)?;
    Ok((outcome, settlement))
}

/// New quote balance after crediting `credit`, and the part sent to profits.
fn credit_quote(grid: &Grid, current: u64, credit: u64, quota_price: u64) -> Result<(u64, u64), ProgramError> {
    if grid.compound {
        return Ok((checked_add(current, credit)?, 0));
    }

    let quota = grid.quota(quota_price)?;
    if current >= quota {
        return Ok((current, credit));
    }
    let next = checked_add(current, credit)?;
    if next > quota {
        Ok((quota, next - quota))
    } else {
        Ok((next, 0))
    }
}

fn fill_ask(
    grid: &mut Grid,
    id: CellId,
    cell: &GridCell,
    native: bool,
    filled_base: u64,
) -> Result<FillOutcome, ProgramError> {
    let price = used_price(cell, native);
    // taker pays: round against the taker
    let quote_volume = mul_div_rounding_up(filled_base, price, PRICE_SCALE)?;
    let fee = calc_fee(quote_volume, grid.fee_ppm)?;
    let (protocol_fee, maker_fee) = split_fee(fee);
    checked_add(quote_volume, fee)?;

    let (base_src, quote_dst, quota_price) = if native {
        (cell.native_balance, cell.cross_balance, cell.rev_price)
    } else {
        (cell.cross_balance, cell.native_balance, cell.price)
    };
    let base_src = checked_sub(base_src, filled_base)?;
    let (quote_dst, to_profit) = credit_quote(grid, quote_dst, checked_add(quote_volume, maker_fee)?, quota_price)?;
    let profits = checked_add(grid.profits_quote, to_profit)?;
    let protocol = checked_add(grid.protocol_fees.quote, protocol_fee)?;

    let target = grid.cell_mut(id)?;
    if native {
        target.native_balance = base_src;
        target.cross_balance = quote_dst;
    } else {
        target.cross_balance = base_src;
        target.native_balance = quote_dst;
    }
    grid.profits_quote = profits;
    grid.protocol_fees.quote = protocol;

    Ok(FillOutcome {
        filled_base,
        quote_volume,
        fee,
        protocol_fee,
        maker_fee,
    })
}

fn fill_bid(
    grid: &mut Grid,
    id: CellId,
    cell: &GridCell,
    native: bool,
    filled_base: u64,
) -> Result<FillOutcome, ProgramError> {
    let price = used_price(cell, native);
    // taker receives: round against the taker
    let quote_volume = mul_div(filled_base, price, PRICE_SCALE)?;
    if quote_volume == 0 {
        return Err(GridError::DustAmount.into());
    }
    let fee = calc_fee(quote_volume, grid.fee_ppm)?;
    let (protocol_fee, maker_fee) = split_fee(fee);
    checked_sub(quote_volume, fee)?;

    // compound grids keep the maker fee inside the cell
    let (drain, to_profit) = if grid.compound {
        (checked_sub(quote_volume, maker_fee)?, 0)
    } else {
        (quote_volume, maker_fee)
    };

    let (quote_src, base_dst) = if native {
        (cell.native_balance, cell.cross_balance)
    } else {
        (cell.cross_balance, cell.native_balance)
    };
    let quote_src = checked_sub(quote_src, drain)?;
    let base_dst = checked_add(base_dst, filled_base)?;
    let profits = checked_add(grid.profits_quote, to_profit)?;
    let protocol = checked_add(grid.protocol_fees.quote, protocol_fee)?;

    let target = grid.cell_mut(id)?;
    if native {
        target.native_balance = quote_src;
        target.cross_balance = base_dst;
    } else {
        target.cross_balance = quote_src;
        target.native_balance = base_dst;
    }
    grid.profits_quote = profits;
    grid.protocol_fees.quote = protocol;

    Ok(FillOutcome {
        filled_base,
        quote_volume,
        fee,
        protocol_fee,
        maker_fee,
    })
}
