use borsh::{BorshDeserialize, BorshSerialize};
use pinocchio::error::ProgramError;

use crate::constants::{MAX_FEE_PPM, MAX_ORDERS_PER_SIDE, PRICE_SCALE};
use crate::error::GridError;
use crate::math::{checked_add, checked_sub, mul_div};
use crate::state::{CellId, Config, Currency, Grid, GridCell, GridStatus, ProtocolFees};
use crate::strategy::{LadderBook, PricingStrategy, StrategyParam};

/// One side of a placement.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LadderOrder {
    pub count: u16,
    pub strategy: StrategyParam,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct GridOrder {
    /// Ignored for oneshot grids, which pay the configured oneshot rate.
    pub fee_ppm: u32,
    pub compound: bool,
    pub oneshot: bool,
    pub base_amount_per_order: u64,
    pub asks: Option<LadderOrder>,
    pub bids: Option<LadderOrder>,
}

/// Addresses a new grid is bound to.
#[derive(Clone, Copy, Debug)]
pub struct GridAccounts {
    pub owner: [u8; 32],
    pub base_mint: [u8; 32],
    pub quote_mint: [u8; 32],
    pub base_vault: [u8; 32],
    pub quote_vault: [u8; 32],
    pub signer: [u8; 32],
    pub signer_bump: u8,
}

/// Funds the maker must deposit for a placement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Deposit {
    pub base: u64,
    pub quote: u64,
}

/// Funds released back to the maker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Refund {
    pub base: u64,
    pub quote: u64,
}

impl Refund {
    fn add(&mut self, base: u64, quote: u64) -> Result<(), ProgramError> {
        self.base = checked_add(self.base, base)?;
        self.quote = checked_add(self.quote, quote)?;
        Ok(())
    }
}

fn side_count(side: &Option<LadderOrder>) -> Result<u16, ProgramError> {
    match side {
        None => Ok(0),
        Some(ladder) if ladder.count == 0 || ladder.count as usize > MAX_ORDERS_PER_SIDE => {
            Err(GridError::InvalidOrderCount.into())
        }
        Some(ladder) => Ok(ladder.count),
    }
}

fn build_cells(
    ladders: &LadderBook,
    grid_id: u64,
    is_ask: bool,
    count: u16,
    base_amount: u64,
) -> Result<Vec<GridCell>, ProgramError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let rungs = ladders.rungs(is_ask, grid_id, count)?;
    let mut cells = Vec::with_capacity(rungs.len());
    for (index, (price, rev_price)) in (0u16..).zip(rungs) {
        let native_balance = if is_ask {
            base_amount
        } else {
            mul_div(base_amount, price, PRICE_SCALE)?
        };
        if native_balance == 0 {
            return Err(GridError::DustAmount.into());
        }
        cells.push(GridCell {
            index,
            is_ask,
            price,
            rev_price,
            native_balance,
            cross_balance: 0,
        });
    }
    Ok(cells)
}

/// Builds a new grid and the deposit that funds it.
///
/// `engine` is the identity allowed to register ladders, the program id on chain.
pub fn place_grid(
    config: &Config,
    engine: &[u8; 32],
    id: u64,
    accounts: &GridAccounts,
    order: &GridOrder,
) -> Result<(Grid, Deposit), ProgramError> {
    if config.paused {
        return Err(GridError::Paused.into());
    }
    if order.base_amount_per_order == 0 {
        return Err(GridError::ZeroAmount.into());
    }
    if accounts.base_mint == accounts.quote_mint {
        return Err(GridError::CurrencyMismatch.into());
    }
    let fee_ppm = if order.oneshot {
        config.oneshot_fee_ppm
    } else {
        order.fee_ppm
    };
    if fee_ppm > MAX_FEE_PPM {
        return Err(GridError::InvalidFee.into());
    }

    let ask_count = side_count(&order.asks)?;
    let bid_count = side_count(&order.bids)?;
    if ask_count == 0 && bid_count == 0 {
        return Err(GridError::InvalidOrderCount.into());
    }

    let mut ladders = LadderBook::new(*engine, id);
    for (is_ask, side) in [(true, &order.asks), (false, &order.bids)] {
        if let Some(ladder) = side {
            ladder
                .strategy
                .validate_params(is_ask, order.base_amount_per_order, ladder.count)?;
            ladders.create_ladder(engine, is_ask, id, ladder.strategy)?;
        }
    }

    let asks = build_cells(&ladders, id, true, ask_count, order.base_amount_per_order)?;
    let bids = build_cells(&ladders, id, false, bid_count, order.base_amount_per_order)?;
    let mut deposit = Deposit::default();
    for cell in asks.iter().chain(bids.iter()) {
        let (base, quote) = cell.holdings();
        deposit.base = checked_add(deposit.base, base)?;
        deposit.quote = checked_add(deposit.quote, quote)?;
    }

    let grid = Grid {
        owner: accounts.owner,
        id,
        status: GridStatus::Active,
        base_mint: accounts.base_mint,
        quote_mint: accounts.quote_mint,
        base_vault: accounts.base_vault,
        quote_vault: accounts.quote_vault,
        signer: accounts.signer,
        signer_bump: accounts.signer_bump,
        fee_ppm,
        compound: order.compound,
        oneshot: order.oneshot,
        base_amount_per_order: order.base_amount_per_order,
        profits_quote: 0,
        protocol_fees: ProtocolFees::default(),
        ladders,
        asks,
        bids,
    };
    Ok((grid, deposit))
}

fn assert_owner(grid: &Grid, caller: &[u8; 32]) -> Result<(), ProgramError> {
    if &grid.owner != caller {
        return Err(GridError::NotGridOwner.into());
    }
    Ok(())
}

/// Zeroes one cell and returns what it held. The cell stays addressable.
pub fn cancel_cell(grid: &mut Grid, caller: &[u8; 32], id: CellId) -> Result<Refund, ProgramError> {
    assert_owner(grid, caller)?;
    if !grid.is_active() {
        return Err(GridError::GridCanceled.into());
    }
    let cell = grid.cell_mut(id)?;
    if cell.is_empty() {
        return Err(GridError::NothingToCancel.into());
    }
    let (base, quote) = cell.holdings();
    cell.native_balance = 0;
    cell.cross_balance = 0;
    Ok(Refund { base, quote })
}

/// Zeroes every cell, pays out the profit balance and closes the grid to fills.
///
/// Protocol fees stay behind for the admin.
pub fn cancel_grid(grid: &mut Grid, caller: &[u8; 32]) -> Result<Refund, ProgramError> {
    assert_owner(grid, caller)?;
    if !grid.is_active() {
        return Err(GridError::GridCanceled.into());
    }

    let mut refund = Refund::default();
    for cell in grid.asks.iter().chain(grid.bids.iter()) {
        let (base, quote) = cell.holdings();
        refund.add(base, quote)?;
    }
    refund.add(0, grid.profits_quote)?;

    for cell in grid.asks.iter_mut().chain(grid.bids.iter_mut()) {
        cell.native_balance = 0;
        cell.cross_balance = 0;
    }
    grid.profits_quote = 0;
    grid.status = GridStatus::Canceled;
    Ok(refund)
}

fn clamp_withdrawal(available: u64, amount: u64) -> Result<u64, ProgramError> {
    let amount = if amount == 0 { available } else { amount.min(available) };
    if amount == 0 {
        return Err(GridError::NoProfits.into());
    }
    Ok(amount)
}

/// Takes up to `amount` of quote profit, or all of it when `amount` is zero.
pub fn withdraw_profits(grid: &mut Grid, caller: &[u8; 32], amount: u64) -> Result<u64, ProgramError> {
    assert_owner(grid, caller)?;
    let available = grid.profits();
    let amount = clamp_withdrawal(available, amount)?;
    grid.profits_quote = checked_sub(available, amount)?;
    Ok(amount)
}

/// Admin withdrawal of accrued protocol fees in `currency`; zero takes all.
pub fn withdraw_protocol_fees(
    config: &Config,
    grid: &mut Grid,
    caller: &[u8; 32],
    currency: Currency,
    amount: u64,
) -> Result<u64, ProgramError> {
    if &config.admin != caller {
        return Err(GridError::NotAdmin.into());
    }
    let amount = clamp_withdrawal(grid.protocol_fees.get(currency), amount)?;
    grid.protocol_fees.take(currency, amount)?;
    Ok(amount)
}
