use borsh::{BorshDeserialize, BorshSerialize};
use pinocchio::{error::ProgramError, ProgramResult};

use crate::constants::{ASK_SPACE_FLAG, MAX_ORDERS_PER_SIDE, PRICE_SCALE};
use crate::error::GridError;
use crate::math::{checked_add, checked_sub, mul_div};
use crate::strategy::LadderBook;

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug)]
pub struct Config {
    pub admin: [u8; 32],
    pub paused: bool,
    /// Fee rate charged by oneshot grids, set by the protocol rather than the maker.
    pub oneshot_fee_ppm: u32,
    /// Wrapped mint of the chain's native asset; `None` disables native routing.
    pub native_mint: Option<[u8; 32]>,
    pub next_grid_id: u64,
    pub bump: u8,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Currency {
    Base,
    Quote,
}

/// Identity of a cell. Packed into a single `u128` only on the wire.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellId {
    pub grid_id: u64,
    pub index: u16,
    pub is_ask: bool,
}

impl CellId {
    pub fn ask(grid_id: u64, index: u16) -> Self {
        Self {
            grid_id,
            index,
            is_ask: true,
        }
    }

    pub fn bid(grid_id: u64, index: u16) -> Self {
        Self {
            grid_id,
            index,
            is_ask: false,
        }
    }

    /// `grid_id` in the high word; the low word carries the ask-space flag and index.
    pub fn pack(self) -> u128 {
        let mut low = self.index as u64;
        if self.is_ask {
            low |= ASK_SPACE_FLAG;
        }
        ((self.grid_id as u128) << 64) | low as u128
    }

    pub fn unpack(raw: u128) -> Result<Self, ProgramError> {
        let grid_id = (raw >> 64) as u64;
        let low = raw as u64;
        let index = u16::try_from(low & !ASK_SPACE_FLAG).map_err(|_| GridError::CellNotFound)?;
        Ok(Self {
            grid_id,
            index,
            is_ask: Self::is_ask_space(raw),
        })
    }

    pub fn is_ask_space(raw: u128) -> bool {
        (raw as u64) & ASK_SPACE_FLAG != 0
    }
}

/// `native_balance` is base for ask cells and quote for bid cells.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct GridCell {
    pub index: u16,
    pub is_ask: bool,
    pub price: u64,
    pub rev_price: u64,
    pub native_balance: u64,
    pub cross_balance: u64,
}

impl GridCell {
    pub fn native_currency(&self) -> Currency {
        if self.is_ask {
            Currency::Base
        } else {
            Currency::Quote
        }
    }

    pub fn holdings(&self) -> (u64, u64) {
        if self.is_ask {
            (self.native_balance, self.cross_balance)
        } else {
            (self.cross_balance, self.native_balance)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.native_balance == 0 && self.cross_balance == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellView {
    pub native_balance: u64,
    pub cross_balance: u64,
    pub price: u64,
    pub rev_price: u64,
}

/// Protocol fees accrued by a grid, per currency.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProtocolFees {
    pub base: u64,
    pub quote: u64,
}

impl ProtocolFees {
    pub fn get(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Base => self.base,
            Currency::Quote => self.quote,
        }
    }

    pub fn accrue(&mut self, currency: Currency, amount: u64) -> ProgramResult {
        let slot = self.slot_mut(currency);
        *slot = checked_add(*slot, amount)?;
        Ok(())
    }

    pub fn take(&mut self, currency: Currency, amount: u64) -> ProgramResult {
        let slot = self.slot_mut(currency);
        *slot = checked_sub(*slot, amount)?;
        Ok(())
    }

    fn slot_mut(&mut self, currency: Currency) -> &mut u64 {
        match currency {
            Currency::Base => &mut self.base,
            Currency::Quote => &mut self.quote,
        }
    }
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridStatus {
    Active,
    Canceled,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    pub owner: [u8; 32],
    pub id: u64,
    pub status: GridStatus,
    pub base_mint: [u8; 32],
    pub quote_mint: [u8; 32],
    pub base_vault: [u8; 32],
    pub quote_vault: [u8; 32],
    pub signer: [u8; 32],
    pub signer_bump: u8,
    pub fee_ppm: u32,
    pub compound: bool,
    pub oneshot: bool,
    pub base_amount_per_order: u64,
    pub profits_quote: u64,
    pub protocol_fees: ProtocolFees,
    pub ladders: LadderBook,
    pub asks: Vec<GridCell>,
    pub bids: Vec<GridCell>,
}

impl Grid {
    pub fn is_active(&self) -> bool {
        self.status == GridStatus::Active
    }

    pub fn can_place(&self) -> bool {
        self.asks.len() <= MAX_ORDERS_PER_SIDE && self.bids.len() <= MAX_ORDERS_PER_SIDE
    }

    pub fn mint(&self, currency: Currency) -> &[u8; 32] {
        match currency {
            Currency::Base => &self.base_mint,
            Currency::Quote => &self.quote_mint,
        }
    }

    pub fn cell(&self, id: CellId) -> Result<&GridCell, ProgramError> {
        if id.grid_id != self.id {
            return Err(GridError::CellNotFound.into());
        }
        let side = if id.is_ask { &self.asks } else { &self.bids };
        side.get(id.index as usize).ok_or(GridError::CellNotFound.into())
    }

    pub fn cell_mut(&mut self, id: CellId) -> Result<&mut GridCell, ProgramError> {
        if id.grid_id != self.id {
            return Err(GridError::CellNotFound.into());
        }
        let side = if id.is_ask { &mut self.asks } else { &mut self.bids };
        side.get_mut(id.index as usize).ok_or(GridError::CellNotFound.into())
    }

    pub fn cell_balances(&self, id: CellId) -> Result<CellView, ProgramError> {
        let cell = self.cell(id)?;
        Ok(CellView {
            native_balance: cell.native_balance,
            cross_balance: cell.cross_balance,
            price: cell.price,
            rev_price: cell.rev_price,
        })
    }

    pub fn profits(&self) -> u64 {
        self.profits_quote
    }

    /// Quote needed to buy back one full order of base at `price`.
    pub fn quota(&self, price: u64) -> Result<u64, ProgramError> {
        mul_div(self.base_amount_per_order, price, PRICE_SCALE)
    }

    pub fn add_profits(&mut self, amount: u64) -> ProgramResult {
        self.profits_quote = checked_add(self.profits_quote, amount)?;
        Ok(())
    }

    /// `(base, quote)` the grid's vaults owe to the maker and the protocol.
    pub fn engine_held(&self) -> Result<(u64, u64), ProgramError> {
        let mut base = self.protocol_fees.base;
        let mut quote = checked_add(self.protocol_fees.quote, self.profits_quote)?;
        for cell in self.asks.iter().chain(self.bids.iter()) {
            let (b, q) = cell.holdings();
            base = checked_add(base, b)?;
            quote = checked_add(quote, q)?;
        }
        Ok((base, quote))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::strategy::{Linear, StrategyParam};

    pub(crate) fn cell(index: u16, is_ask: bool, price: u64, rev_price: u64, native: u64) -> GridCell {
        GridCell {
            index,
            is_ask,
            price,
            rev_price,
            native_balance: native,
            cross_balance: 0,
        }
    }

    pub(crate) fn sample_grid(compound: bool) -> Grid {
        let mut ladders = LadderBook::new([8u8; 32], 7);
        ladders
            .create_ladder(
                &[8u8; 32],
                true,
                7,
                StrategyParam::Linear(Linear {
                    price0: 1_000_000_000,
                    gap: 100_000_000,
                }),
            )
            .expect("ask ladder");
        ladders
            .create_ladder(
                &[8u8; 32],
                false,
                7,
                StrategyParam::Linear(Linear {
                    price0: 1_000_000_000,
                    gap: -100_000_000,
                }),
            )
            .expect("bid ladder");
        Grid {
            owner: [1u8; 32],
            id: 7,
            status: GridStatus::Active,
            base_mint: [5u8; 32],
            quote_mint: [6u8; 32],
            base_vault: [2u8; 32],
            quote_vault: [3u8; 32],
            signer: [4u8; 32],
            signer_bump: 200,
            fee_ppm: 10_000,
            compound,
            oneshot: false,
            base_amount_per_order: 100,
            profits_quote: 0,
            protocol_fees: ProtocolFees::default(),
            ladders,
            asks: vec![cell(0, true, 1_000_000_000, 900_000_000, 100)],
            bids: vec![cell(0, false, 1_000_000_000, 1_100_000_000, 100)],
        }
    }

    #[test]
    fn test_cell_id_pack_roundtrip() {
        let ask = CellId::ask(42, 3);
        let raw = ask.pack();
        assert_eq!(raw >> 64, 42);
        assert!(CellId::is_ask_space(raw));
        assert_eq!(CellId::unpack(raw).expect("unpack"), ask);

        let bid = CellId::bid(u64::MAX, u16::MAX);
        let raw = bid.pack();
        assert!(!CellId::is_ask_space(raw));
        assert_eq!(CellId::unpack(raw).expect("unpack"), bid);
    }

    #[test]
    fn test_cell_id_unpack_rejects_wide_index() {
        let raw = (1u128 << 64) | (1u128 << 20);
        let err = CellId::unpack(raw).expect_err("must fail");
        assert_eq!(err, GridError::CellNotFound.into());
    }

    #[test]
    fn test_grid_active_and_can_place() {
        let mut grid = sample_grid(false);
        assert!(grid.is_active());
        assert!(grid.can_place());

        grid.status = GridStatus::Canceled;
        assert!(!grid.is_active());

        grid.asks = vec![cell(0, true, 1, 1, 1); MAX_ORDERS_PER_SIDE + 1];
        assert!(!grid.can_place());
    }

    #[test]
    fn test_grid_cell_lookup() {
        let grid = sample_grid(false);
        assert_eq!(grid.cell(CellId::ask(7, 0)).expect("ask").price, 1_000_000_000);
        assert_eq!(grid.cell(CellId::bid(7, 0)).expect("bid").rev_price, 1_100_000_000);

        let err = grid.cell(CellId::ask(7, 1)).expect_err("index");
        assert_eq!(err, GridError::CellNotFound.into());
        let err = grid.cell(CellId::ask(8, 0)).expect_err("grid");
        assert_eq!(err, GridError::CellNotFound.into());
    }

    #[test]
    fn test_grid_view_and_engine_held() {
        let mut grid = sample_grid(false);
        grid.asks[0].cross_balance = 30;
        grid.bids[0].cross_balance = 4;
        grid.profits_quote = 5;
        grid.protocol_fees.accrue(Currency::Quote, 2).expect("accrue");

        let view = grid.cell_balances(CellId::ask(7, 0)).expect("view");
        assert_eq!(view.native_balance, 100);
        assert_eq!(view.cross_balance, 30);
        assert_eq!(grid.profits(), 5);
        // base: 100 ask + 4 bid cross; quote: 30 ask cross + 100 bid + 5 + 2
        assert_eq!(grid.engine_held().expect("sum"), (104, 137));
    }

    #[test]
    fn test_protocol_fees_take_underflow() {
        let mut fees = ProtocolFees::default();
        fees.accrue(Currency::Quote, 3).expect("accrue");
        let err = fees.take(Currency::Quote, 4).expect_err("must fail");
        assert_eq!(err, GridError::MathOverflow.into());
        fees.take(Currency::Quote, 3).expect("take");
        assert_eq!(fees.get(Currency::Quote), 0);
    }

    #[test]
    fn test_grid_borsh_roundtrip() {
        let grid = sample_grid(true);
        let data = borsh::to_vec(&grid).expect("serialize");
        let decoded = Grid::try_from_slice(&data).expect("deserialize");
        assert_eq!(decoded, grid);
    }
}
