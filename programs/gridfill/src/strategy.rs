use borsh::{BorshDeserialize, BorshSerialize};
use pinocchio::{error::ProgramError, ProgramResult};

use crate::constants::{MAX_PRICE, PRICE_SCALE, RATIO_SCALE};
use crate::error::GridError;
use crate::math::mul_div;

pub trait PricingStrategy {
    /// Checks that the ladder can carry `count` rungs of `base_amount` each.
    fn validate_params(&self, is_ask: bool, base_amount: u64, count: u16) -> ProgramResult;

    fn price(&self, is_ask: bool, index: u16) -> Result<u64, ProgramError>;

    /// Price one rung before rung 0, on the side of the spread.
    fn price_before_first(&self, is_ask: bool) -> Result<u64, ProgramError>;

    fn reverse_price(&self, is_ask: bool, index: u16) -> Result<u64, ProgramError> {
        match index.checked_sub(1) {
            Some(prev) => self.price(is_ask, prev),
            None => self.price_before_first(is_ask),
        }
    }

    /// Prices of rungs `0..count`.
    fn prices(&self, is_ask: bool, count: u16) -> Result<Vec<u64>, ProgramError> {
        (0..count).map(|i| self.price(is_ask, i)).collect()
    }
}

/// `price(i) = price0 + gap * i`.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Linear {
    pub price0: u64,
    pub gap: i64,
}

impl Linear {
    fn check_direction(&self, is_ask: bool) -> ProgramResult {
        if (is_ask && self.gap <= 0) || (!is_ask && self.gap >= 0) {
            return Err(GridError::InvalidStrategyParams.into());
        }
        Ok(())
    }

    fn positive_price(v: i128) -> Result<u64, ProgramError> {
        if v <= 0 {
            return Err(GridError::InvalidStrategyParams.into());
        }
        u64::try_from(v).map_err(|_| GridError::MathOverflow.into())
    }
}

impl PricingStrategy for Linear {
    fn validate_params(&self, is_ask: bool, base_amount: u64, count: u16) -> ProgramResult {
        if count == 0 || self.price0 == 0 || self.price0 >= MAX_PRICE {
            return Err(GridError::InvalidStrategyParams.into());
        }
        self.check_direction(is_ask)?;

        let last = self.price(is_ask, count - 1)?;
        // ask: fails when |gap| >= price0
        let before_first = self.price_before_first(is_ask)?;
        if last > MAX_PRICE || before_first > MAX_PRICE {
            return Err(GridError::InvalidStrategyParams.into());
        }

        let lowest = if is_ask { before_first } else { last };
        if mul_div(base_amount, lowest, PRICE_SCALE)? == 0 {
            return Err(GridError::DustAmount.into());
        }
        Ok(())
    }

    fn price(&self, is_ask: bool, index: u16) -> Result<u64, ProgramError> {
        self.check_direction(is_ask)?;
        let step = i128::from(self.gap) * i128::from(index);
        Self::positive_price(i128::from(self.price0) + step)
    }

    fn price_before_first(&self, is_ask: bool) -> Result<u64, ProgramError> {
        self.check_direction(is_ask)?;
        Self::positive_price(i128::from(self.price0) - i128::from(self.gap))
    }
}

/// `price(i) = price(i - 1) * ratio / RATIO_SCALE`, floored at every step.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometric {
    pub price0: u64,
    pub ratio: u64,
}

impl Geometric {
    fn check_direction(&self, is_ask: bool) -> ProgramResult {
        if (is_ask && self.ratio <= RATIO_SCALE) || (!is_ask && (self.ratio >= RATIO_SCALE || self.ratio == 0)) {
            return Err(GridError::InvalidStrategyParams.into());
        }
        Ok(())
    }
}

impl PricingStrategy for Geometric {
    fn validate_params(&self, is_ask: bool, base_amount: u64, count: u16) -> ProgramResult {
        if count == 0 || self.price0 == 0 || self.price0 >= MAX_PRICE {
            return Err(GridError::InvalidStrategyParams.into());
        }
        self.check_direction(is_ask)?;

        let mut prev = self.price0;
        for _ in 1..count {
            let next = mul_div(prev, self.ratio, RATIO_SCALE)?;
            // flooring can stall a slow ladder at small prices
            if next == 0 || next > MAX_PRICE || (is_ask && next <= prev) || (!is_ask && next >= prev) {
                return Err(GridError::InvalidStrategyParams.into());
            }
            prev = next;
        }

        let before_first = self.price_before_first(is_ask)?;
        if before_first == 0 || before_first > MAX_PRICE {
            return Err(GridError::InvalidStrategyParams.into());
        }

        // an ask's cross leg is bought back at the reverse price of rung 0
        let reverse_floor = if is_ask { before_first } else { prev };
        for price in [self.price0, prev, reverse_floor] {
            if mul_div(base_amount, price, PRICE_SCALE)? == 0 {
                return Err(GridError::DustAmount.into());
            }
        }
        Ok(())
    }

    fn price(&self, is_ask: bool, index: u16) -> Result<u64, ProgramError> {
        self.check_direction(is_ask)?;
        let mut price = self.price0;
        for _ in 0..index {
            price = mul_div(price, self.ratio, RATIO_SCALE)?;
        }
        if price == 0 {
            return Err(GridError::InvalidStrategyParams.into());
        }
        Ok(price)
    }

    fn prices(&self, is_ask: bool, count: u16) -> Result<Vec<u64>, ProgramError> {
        self.check_direction(is_ask)?;
        let mut out = Vec::with_capacity(count as usize);
        let mut price = self.price0;
        for index in 0..count {
            if index > 0 {
                price = mul_div(price, self.ratio, RATIO_SCALE)?;
            }
            if price == 0 {
                return Err(GridError::InvalidStrategyParams.into());
            }
            out.push(price);
        }
        Ok(out)
    }

    fn price_before_first(&self, is_ask: bool) -> Result<u64, ProgramError> {
        self.check_direction(is_ask)?;
        mul_div(self.price0, RATIO_SCALE, self.ratio)
    }
}

/// Wire form of a ladder: which generator, and its parameters.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyParam {
    Linear(Linear),
    Geometric(Geometric),
}

impl PricingStrategy for StrategyParam {
    fn validate_params(&self, is_ask: bool, base_amount: u64, count: u16) -> ProgramResult {
        match self {
            StrategyParam::Linear(s) => s.validate_params(is_ask, base_amount, count),
            StrategyParam::Geometric(s) => s.validate_params(is_ask, base_amount, count),
        }
    }

    fn price(&self, is_ask: bool, index: u16) -> Result<u64, ProgramError> {
        match self {
            StrategyParam::Linear(s) => s.price(is_ask, index),
            StrategyParam::Geometric(s) => s.price(is_ask, index),
        }
    }

    fn price_before_first(&self, is_ask: bool) -> Result<u64, ProgramError> {
        match self {
            StrategyParam::Linear(s) => s.price_before_first(is_ask),
            StrategyParam::Geometric(s) => s.price_before_first(is_ask),
        }
    }

    fn prices(&self, is_ask: bool, count: u16) -> Result<Vec<u64>, ProgramError> {
        match self {
            StrategyParam::Linear(s) => s.prices(is_ask, count),
            StrategyParam::Geometric(s) => s.prices(is_ask, count),
        }
    }
}

/// At most one ladder per side; only `engine` may register.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct LadderBook {
    pub engine: [u8; 32],
    pub grid_id: u64,
    pub ask: Option<StrategyParam>,
    pub bid: Option<StrategyParam>,
}

impl LadderBook {
    pub fn new(engine: [u8; 32], grid_id: u64) -> Self {
        Self {
            engine,
            grid_id,
            ask: None,
            bid: None,
        }
    }

    pub fn create_ladder(
        &mut self,
        caller: &[u8; 32],
        is_ask: bool,
        grid_id: u64,
        strategy: StrategyParam,
    ) -> ProgramResult {
        if caller != &self.engine {
            return Err(GridError::Unauthorized.into());
        }
        if grid_id != self.grid_id {
            return Err(GridError::GridMismatch.into());
        }
        let slot = if is_ask { &mut self.ask } else { &mut self.bid };
        if slot.is_some() {
            return Err(GridError::DuplicateLadder.into());
        }
        *slot = Some(strategy);
        Ok(())
    }

    fn ladder(&self, is_ask: bool, grid_id: u64) -> Result<&StrategyParam, ProgramError> {
        if grid_id != self.grid_id {
            return Err(GridError::GridMismatch.into());
        }
        let slot = if is_ask { &self.ask } else { &self.bid };
        slot.as_ref().ok_or(GridError::LadderNotFound.into())
    }

    pub fn price(&self, is_ask: bool, grid_id: u64, index: u16) -> Result<u64, ProgramError> {
        self.ladder(is_ask, grid_id)?.price(is_ask, index)
    }

    pub fn reverse_price(&self, is_ask: bool, grid_id: u64, index: u16) -> Result<u64, ProgramError> {
        self.ladder(is_ask, grid_id)?.reverse_price(is_ask, index)
    }

    /// `(price, reverse_price)` of rungs `0..count`, built in one pass.
    pub fn rungs(&self, is_ask: bool, grid_id: u64, count: u16) -> Result<Vec<(u64, u64)>, ProgramError> {
        let ladder = self.ladder(is_ask, grid_id)?;
        let prices = ladder.prices(is_ask, count)?;
        let mut prev = ladder.price_before_first(is_ask)?;
        let mut out = Vec::with_capacity(prices.len());
        for price in prices {
            out.push((price, prev));
            prev = price;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(price0: u64, gap: i64) -> StrategyParam {
        StrategyParam::Linear(Linear { price0, gap })
    }

    fn geometric(price0: u64, ratio: u64) -> StrategyParam {
        StrategyParam::Geometric(Geometric { price0, ratio })
    }

    fn prices(s: &StrategyParam, is_ask: bool, count: u16) -> Vec<u64> {
        (0..count).map(|i| s.price(is_ask, i).expect("price")).collect()
    }

    fn reverse_prices(s: &StrategyParam, is_ask: bool, count: u16) -> Vec<u64> {
        (0..count).map(|i| s.reverse_price(is_ask, i).expect("reverse")).collect()
    }

    #[test]
    fn test_linear_ask_prices_and_reverse() {
        let s = linear(1_000_000_000, 100_000_000);
        s.validate_params(true, 1_000, 3).expect("valid");
        assert_eq!(prices(&s, true, 3), vec![1_000_000_000, 1_100_000_000, 1_200_000_000]);
        assert_eq!(reverse_prices(&s, true, 3), vec![900_000_000, 1_000_000_000, 1_100_000_000]);
    }

    #[test]
    fn test_linear_bid_prices_and_reverse() {
        let s = linear(1_000_000_000, -100_000_000);
        s.validate_params(false, 1_000, 3).expect("valid");
        assert_eq!(prices(&s, false, 3), vec![1_000_000_000, 900_000_000, 800_000_000]);
        assert_eq!(reverse_prices(&s, false, 3), vec![1_100_000_000, 1_000_000_000, 900_000_000]);
    }

    #[test]
    fn test_geometric_ask_prices() {
        let s = geometric(1_000_000_000, 1_100_000_000);
        s.validate_params(true, 1_000, 3).expect("valid");
        assert_eq!(prices(&s, true, 3), vec![1_000_000_000, 1_100_000_000, 1_210_000_000]);
        assert_eq!(s.reverse_price(true, 0).expect("ok"), 909_090_909);
    }

    #[test]
    fn test_geometric_bid_prices_and_reverse() {
        let s = geometric(1_000_000_000, 900_000_000);
        s.validate_params(false, 1_000, 3).expect("valid");
        assert_eq!(prices(&s, false, 3), vec![1_000_000_000, 900_000_000, 810_000_000]);
        assert_eq!(reverse_prices(&s, false, 3), vec![1_111_111_111, 1_000_000_000, 900_000_000]);
    }

    #[test]
    fn test_validate_rejects_zero_count_and_zero_price() {
        let err = linear(1_000, 1).validate_params(true, 1_000_000_000, 0).expect_err("must fail");
        assert_eq!(err, GridError::InvalidStrategyParams.into());
        let err = linear(0, 1).validate_params(true, 1_000_000_000, 1).expect_err("must fail");
        assert_eq!(err, GridError::InvalidStrategyParams.into());
        let err = geometric(0, 2 * RATIO_SCALE).validate_params(true, 1_000_000_000, 1).expect_err("must fail");
        assert_eq!(err, GridError::InvalidStrategyParams.into());
    }

    #[test]
    fn test_validate_rejects_wrong_direction() {
        let err = linear(1_000_000_000, -1).validate_params(true, 1_000, 2).expect_err("must fail");
        assert_eq!(err, GridError::InvalidStrategyParams.into());
        let err = linear(1_000_000_000, 1).validate_params(false, 1_000, 2).expect_err("must fail");
        assert_eq!(err, GridError::InvalidStrategyParams.into());
        let err = geometric(1_000_000_000, RATIO_SCALE).validate_params(true, 1_000, 2).expect_err("must fail");
        assert_eq!(err, GridError::InvalidStrategyParams.into());
        let err = geometric(1_000_000_000, RATIO_SCALE).validate_params(false, 1_000, 2).expect_err("must fail");
        assert_eq!(err, GridError::InvalidStrategyParams.into());
        let err = geometric(1_000_000_000, 0).validate_params(false, 1_000, 2).expect_err("must fail");
        assert_eq!(err, GridError::InvalidStrategyParams.into());
    }

    #[test]
    fn test_validate_linear_ask_gap_not_below_price0() {
        let err = linear(1_000, 1_000).validate_params(true, 1_000_000_000, 1).expect_err("must fail");
        assert_eq!(err, GridError::InvalidStrategyParams.into());
    }

    #[test]
    fn test_validate_linear_bid_last_rung_must_stay_positive() {
        let err = linear(1, -2).validate_params(false, 1_000_000_000, 2).expect_err("must fail");
        assert_eq!(err, GridError::InvalidStrategyParams.into());
        let err = linear(100, -50).validate_params(false, 1_000_000_000_000, 3).expect_err("must fail");
        assert_eq!(err, GridError::InvalidStrategyParams.into());
    }

    #[test]
    fn test_validate_rejects_price_ceiling() {
        let err = linear(MAX_PRICE, 1).validate_params(true, 1, 1).expect_err("must fail");
        assert_eq!(err, GridError::InvalidStrategyParams.into());
        let err = linear(MAX_PRICE - 10, 5).validate_params(true, 1, 4).expect_err("must fail");
        assert_eq!(err, GridError::InvalidStrategyParams.into());
    }

    #[test]
    fn test_validate_rejects_dust() {
        // 10 base at a price of 90 / PRICE_SCALE rounds to zero quote
        let err = linear(100, 10).validate_params(true, 10, 2).expect_err("must fail");
        assert_eq!(err, GridError::DustAmount.into());
        let err = linear(100, -10).validate_params(false, 10, 2).expect_err("must fail");
        assert_eq!(err, GridError::DustAmount.into());
        let err = geometric(100, 1_500_000_000).validate_params(true, 10, 2).expect_err("must fail");
        assert_eq!(err, GridError::DustAmount.into());
    }

    #[test]
    fn test_validate_geometric_ask_checks_reverse_of_first_rung() {
        // rung 0 quotes 1 unit, but buying back at 100 / 1.5 = 66 quotes nothing
        let s = geometric(100, 1_500_000_000);
        assert_eq!(s.price_before_first(true).expect("ok"), 66);
        let err = s.validate_params(true, 10_000_000, 1).expect_err("must fail");
        assert_eq!(err, GridError::DustAmount.into());
        s.validate_params(true, 20_000_000, 1).expect("66 * 2e7 clears one unit");
    }

    #[test]
    fn test_prices_match_per_rung_pricing() {
        for (s, is_ask) in [
            (geometric(1_000_000_000, 1_010_000_000), true),
            (geometric(1_000_000_000, 990_000_000), false),
            (linear(1_000_000_000, 1_000_000), true),
            (linear(1_000_000_000, -1_000_000), false),
        ] {
            s.validate_params(is_ask, 1_000_000, 100).expect("valid");
            assert_eq!(s.prices(is_ask, 100).expect("ladder"), prices(&s, is_ask, 100));
        }
    }

    #[test]
    fn test_ladder_book_rungs_pair_reverse_prices() {
        let engine = [9u8; 32];
        let mut book = LadderBook::new(engine, 4);
        book.create_ladder(&engine, false, 4, geometric(1_000_000_000, 900_000_000))
            .expect("bid");
        assert_eq!(
            book.rungs(false, 4, 3).expect("rungs"),
            vec![
                (1_000_000_000, 1_111_111_111),
                (900_000_000, 1_000_000_000),
                (810_000_000, 900_000_000),
            ]
        );
        let err = book.rungs(true, 4, 1).expect_err("missing");
        assert_eq!(err, GridError::LadderNotFound.into());
    }

    #[test]
    fn test_validate_geometric_rejects_stalled_ladder() {
        // 10 * 1.01 floors back to 10
        let err = geometric(10, 1_010_000_000).validate_params(true, u64::MAX / 4, 2).expect_err("must fail");
        assert_eq!(err, GridError::InvalidStrategyParams.into());
    }

    #[test]
    fn test_ladder_book_registers_once_per_side() {
        let engine = [9u8; 32];
        let mut book = LadderBook::new(engine, 4);
        let ask = linear(1_000_000_000, 100_000_000);
        let bid = geometric(900_000_000, 900_000_000);

        book.create_ladder(&engine, true, 4, ask).expect("ask");
        book.create_ladder(&engine, false, 4, bid).expect("bid");
        assert_eq!(book.price(true, 4, 2).expect("ok"), 1_200_000_000);
        assert_eq!(book.reverse_price(false, 4, 1).expect("ok"), 900_000_000);

        let err = book.create_ladder(&engine, true, 4, ask).expect_err("duplicate");
        assert_eq!(err, GridError::DuplicateLadder.into());
    }

    #[test]
    fn test_ladder_book_rejects_foreign_caller_and_grid() {
        let mut book = LadderBook::new([9u8; 32], 4);
        let err = book
            .create_ladder(&[1u8; 32], true, 4, linear(1_000, 1))
            .expect_err("unauthorized");
        assert_eq!(err, GridError::Unauthorized.into());
        let err = book
            .create_ladder(&[9u8; 32], true, 5, linear(1_000, 1))
            .expect_err("mismatch");
        assert_eq!(err, GridError::GridMismatch.into());
        let err = book.price(true, 4, 0).expect_err("missing");
        assert_eq!(err, GridError::LadderNotFound.into());
    }
}
