use borsh::{BorshDeserialize, BorshSerialize};
use pinocchio::{error::ProgramError, AccountView, Address, ProgramResult};
use solana_msg::msg;

use crate::batch::{fill_batch, BatchRequest};
use crate::constants::{CONFIG_SEED, CONFIG_SPACE, GRID_SIGNER_SEED_PREFIX, MAX_FEE_PPM};
use crate::custody::{
    assert_system_program, assert_token_account, assert_token_program, assert_vault, claim_config_account,
    vault_payout, TokenCustody,
};
use crate::engine::{self, CurrencyRoute, Custody, FillRequest, FillSide};
use crate::error::GridError;
use crate::instruction::{BatchFillParams, FillParams, GridInstruction, PlaceGridParams};
use crate::lifecycle::{self, GridAccounts, Refund};
use crate::state::{CellId, Config, Currency, Grid};

pub fn process_instruction(
    program_id: &Address,
    accounts: &[AccountView],
    instruction_data: &[u8],
) -> ProgramResult {
    let ix = GridInstruction::try_from_slice(instruction_data).map_err(|_| GridError::InvalidInstruction)?;

    match ix {
        GridInstruction::InitializeConfig {
            oneshot_fee_ppm,
            native_mint,
        } => initialize_config(program_id, accounts, oneshot_fee_ppm, native_mint),
        GridInstruction::SetPause { paused } => set_pause(program_id, accounts, paused),
        GridInstruction::SetOneshotFee { oneshot_fee_ppm } => set_oneshot_fee(program_id, accounts, oneshot_fee_ppm),
        GridInstruction::PlaceGrid(params) => place_grid(program_id, accounts, params),
        GridInstruction::FillAsAsk(params) => fill_single(program_id, accounts, FillSide::Ask, params),
        GridInstruction::FillAsBid(params) => fill_single(program_id, accounts, FillSide::Bid, params),
        GridInstruction::FillAsAskBatch(params) => fill_many(program_id, accounts, FillSide::Ask, params),
        GridInstruction::FillAsBidBatch(params) => fill_many(program_id, accounts, FillSide::Bid, params),
        GridInstruction::CancelCell { cell_id } => cancel_cell(program_id, accounts, cell_id),
        GridInstruction::CancelGrid => cancel_grid(program_id, accounts),
        GridInstruction::WithdrawProfits { amount } => withdraw_profits(program_id, accounts, amount),
        GridInstruction::WithdrawProtocolFees { currency, amount } => {
            withdraw_protocol_fees(program_id, accounts, currency, amount)
        }
    }
}

fn next_account<'a>(it: &mut core::slice::Iter<'a, AccountView>) -> Result<&'a AccountView, ProgramError> {
    it.next().ok_or(GridError::InvalidInstruction.into())
}

fn assert_program_owned(program_id: &Address, ai: &AccountView) -> ProgramResult {
    if !ai.owned_by(program_id) {
        return Err(GridError::InvalidAccountOwner.into());
    }
    Ok(())
}

fn assert_address_matches(ai: &AccountView, expected: &[u8; 32]) -> ProgramResult {
    if ai.address().as_array() != expected {
        return Err(GridError::InvalidInstruction.into());
    }
    Ok(())
}

/// State accounts are created zeroed by the client; anything else is already in use.
fn assert_uninitialized(ai: &AccountView) -> ProgramResult {
    let data = ai.try_borrow()?;
    if data.iter().any(|b| *b != 0) {
        return Err(GridError::InvalidInstruction.into());
    }
    Ok(())
}

fn assert_pda(ai: &AccountView, seeds: &[&[u8]], program_id: &Address, err: GridError) -> ProgramResult {
    let expected = solana_address::Address::create_program_address(seeds, program_id).map_err(|_| err)?;
    if ai.address() != &expected {
        return Err(err.into());
    }
    Ok(())
}

fn decode_state<T: BorshDeserialize>(data: &[u8]) -> Result<T, ProgramError> {
    // trailing zero padding is expected
    T::deserialize(&mut &data[..]).map_err(|_| GridError::InvalidInstruction.into())
}

fn encode_state<T: BorshSerialize>(data: &mut [u8], state: &T) -> ProgramResult {
    let out = borsh::to_vec(state).map_err(|_| GridError::InvalidInstruction)?;
    if out.len() > data.len() {
        return Err(GridError::AccountDataTooSmall.into());
    }

    data[..out.len()].copy_from_slice(&out);
    for b in data[out.len()..].iter_mut() {
        *b = 0;
    }
    Ok(())
}

fn read_state<T: BorshDeserialize>(ai: &AccountView) -> Result<T, ProgramError> {
    let data = ai.try_borrow()?;
    decode_state(&data)
}

fn write_state<T: BorshSerialize>(ai: &AccountView, state: &T) -> ProgramResult {
    let mut data = ai.try_borrow_mut()?;
    encode_state(&mut data, state)
}

/// Reads the config, which must live at the program's `["config"]` address.
fn load_config(program_id: &Address, config_ai: &AccountView) -> Result<Config, ProgramError> {
    assert_program_owned(program_id, config_ai)?;
    let config: Config = read_state(config_ai)?;
    assert_pda(
        config_ai,
        &[CONFIG_SEED, &[config.bump]],
        program_id,
        GridError::InvalidConfigAccount,
    )?;
    Ok(config)
}

/// Loads the config for an admin-only instruction: admin, config.
fn admin_config<'a>(
    program_id: &Address,
    accounts: &'a [AccountView],
) -> Result<(&'a AccountView, &'a AccountView, Config), ProgramError> {
    let mut it = accounts.iter();
    let admin = next_account(&mut it)?;
    let config_ai = next_account(&mut it)?;

    if !admin.is_signer() {
        return Err(GridError::NotAdmin.into());
    }

    let config = load_config(program_id, config_ai)?;
    if config.admin != admin.address().to_bytes() {
        return Err(GridError::NotAdmin.into());
    }
    Ok((admin, config_ai, config))
}

fn initialize_config(
    program_id: &Address,
    accounts: &[AccountView],
    oneshot_fee_ppm: u32,
    native_mint: Option<[u8; 32]>,
) -> ProgramResult {
    if oneshot_fee_ppm > MAX_FEE_PPM {
        return Err(GridError::InvalidFee.into());
    }

    // admin, config, [system_program]
    let mut it = accounts.iter();
    let admin = next_account(&mut it)?;
    let config_ai = next_account(&mut it)?;
    let system_program = it.next();

    if !admin.is_signer() {
        return Err(GridError::NotAdmin.into());
    }
    let (expected, bump) = solana_address::Address::try_find_program_address(&[CONFIG_SEED], program_id)
        .ok_or(GridError::InvalidConfigAccount)?;
    if config_ai.address() != &expected {
        return Err(GridError::InvalidConfigAccount.into());
    }
    if !config_ai.owned_by(program_id) {
        let system_program = system_program.ok_or(GridError::InvalidInstruction)?;
        assert_system_program(system_program)?;
        claim_config_account(system_program, config_ai, program_id, CONFIG_SPACE, bump)?;
    }
    assert_uninitialized(config_ai)?;

    let config = Config {
        admin: admin.address().to_bytes(),
        paused: false,
        oneshot_fee_ppm,
        native_mint,
        next_grid_id: 1,
        bump,
    };

    write_state(config_ai, &config)?;
    msg!("config initialized: oneshot_fee_ppm={} native={}", oneshot_fee_ppm, native_mint.is_some());
    Ok(())
}

fn set_pause(program_id: &Address, accounts: &[AccountView], paused: bool) -> ProgramResult {
    let (_, config_ai, mut config) = admin_config(program_id, accounts)?;
    config.paused = paused;
    write_state(config_ai, &config)?;
    msg!("paused={}", paused);
    Ok(())
}

fn set_oneshot_fee(program_id: &Address, accounts: &[AccountView], oneshot_fee_ppm: u32) -> ProgramResult {
    if oneshot_fee_ppm > MAX_FEE_PPM {
        return Err(GridError::InvalidFee.into());
    }

    let (_, config_ai, mut config) = admin_config(program_id, accounts)?;
    config.oneshot_fee_ppm = oneshot_fee_ppm;
    write_state(config_ai, &config)?;
    msg!("oneshot_fee_ppm={}", oneshot_fee_ppm);
    Ok(())
}

fn place_grid(program_id: &Address, accounts: &[AccountView], params: PlaceGridParams) -> ProgramResult {
    // owner, config, grid, token_program, base_mint, quote_mint, owner_base, owner_quote,
    // base_vault, quote_vault, grid_signer
    let mut it = accounts.iter();
    let owner = next_account(&mut it)?;
    let config_ai = next_account(&mut it)?;
    let grid_ai = next_account(&mut it)?;
    let token_program = next_account(&mut it)?;
    let base_mint = next_account(&mut it)?;
    let quote_mint = next_account(&mut it)?;
    let owner_base = next_account(&mut it)?;
    let owner_quote = next_account(&mut it)?;
    let base_vault = next_account(&mut it)?;
    let quote_vault = next_account(&mut it)?;
    let grid_signer = next_account(&mut it)?;
    assert_token_program(token_program)?;
    for ai in [base_mint, quote_mint, owner_base, owner_quote, base_vault, quote_vault] {
        assert_token_account(token_program, ai)?;
    }

    if !owner.is_signer() {
        return Err(GridError::NotGridOwner.into());
    }
    let mut config = load_config(program_id, config_ai)?;
    assert_program_owned(program_id, grid_ai)?;
    assert_uninitialized(grid_ai)?;

    let grid_id = config.next_grid_id;
    let owner_key = owner.address().to_bytes();
    let grid_id_seed = grid_id.to_le_bytes();
    assert_pda(
        grid_signer,
        &[GRID_SIGNER_SEED_PREFIX, &owner_key, &grid_id_seed, &[params.signer_bump]],
        program_id,
        GridError::InvalidGridSigner,
    )?;
    let signer_key = grid_signer.address().to_bytes();
    assert_vault(base_vault, &base_mint.address().to_bytes(), &signer_key)?;
    assert_vault(quote_vault, &quote_mint.address().to_bytes(), &signer_key)?;
    let grid_accounts = GridAccounts {
        owner: owner_key,
        base_mint: base_mint.address().to_bytes(),
        quote_mint: quote_mint.address().to_bytes(),
        base_vault: base_vault.address().to_bytes(),
        quote_vault: quote_vault.address().to_bytes(),
        signer: signer_key,
        signer_bump: params.signer_bump,
    };
    let (grid, deposit) = lifecycle::place_grid(
        &config,
        &program_id.to_bytes(),
        grid_id,
        &grid_accounts,
        &params.order,
    )?;
    if !grid.can_place() {
        return Err(GridError::InvalidOrderCount.into());
    }

    config.next_grid_id = config.next_grid_id.checked_add(1).ok_or(GridError::MathOverflow)?;
    write_state(config_ai, &config)?;
    write_state(grid_ai, &grid)?;

    let mut custody = TokenCustody {
        grid: &grid,
        token_program,
        authority: owner,
        user_base: owner_base,
        user_quote: owner_quote,
        base_vault,
        quote_vault,
        grid_signer,
        system_program: None,
    };
    if deposit.base > 0 {
        custody.debit(Currency::Base, deposit.base)?;
    }
    if deposit.quote > 0 {
        custody.debit(Currency::Quote, deposit.quote)?;
    }

    msg!(
        "place grid={} asks={} bids={} deposit_base={} deposit_quote={}",
        grid.id,
        grid.asks.len(),
        grid.bids.len(),
        deposit.base,
        deposit.quote
    );
    Ok(())
}

/// Accounts shared by every fill instruction.
struct FillAccounts<'a> {
    taker: &'a AccountView,
    config: Config,
    grid_ai: &'a AccountView,
    grid: Grid,
    token_program: &'a AccountView,
    taker_base: &'a AccountView,
    taker_quote: &'a AccountView,
    base_vault: &'a AccountView,
    quote_vault: &'a AccountView,
    grid_signer: &'a AccountView,
    system_program: Option<&'a AccountView>,
}

impl<'a> FillAccounts<'a> {
    // taker, config, grid, token_program, taker_base, taker_quote, base_vault, quote_vault,
    // grid_signer, [system_program]
    fn load(program_id: &Address, accounts: &'a [AccountView]) -> Result<Self, ProgramError> {
        let mut it = accounts.iter();
        let taker = next_account(&mut it)?;
        let config_ai = next_account(&mut it)?;
        let grid_ai = next_account(&mut it)?;
        let token_program = next_account(&mut it)?;
        let taker_base = next_account(&mut it)?;
        let taker_quote = next_account(&mut it)?;
        let base_vault = next_account(&mut it)?;
        let quote_vault = next_account(&mut it)?;
        let grid_signer = next_account(&mut it)?;
        let system_program = it.next();
        assert_token_program(token_program)?;
        for ai in [taker_base, taker_quote, base_vault, quote_vault] {
            assert_token_account(token_program, ai)?;
        }
        if let Some(system_program) = system_program {
            assert_system_program(system_program)?;
        }

        if !taker.is_signer() {
            return Err(GridError::InvalidInstruction.into());
        }
        let config = load_config(program_id, config_ai)?;
        assert_program_owned(program_id, grid_ai)?;
        if config.paused {
            return Err(GridError::Paused.into());
        }

        let grid: Grid = read_state(grid_ai)?;
        assert_address_matches(base_vault, &grid.base_vault)?;
        assert_address_matches(quote_vault, &grid.quote_vault)?;
        assert_address_matches(grid_signer, &grid.signer)?;

        Ok(Self {
            taker,
            config,
            grid_ai,
            grid,
            token_program,
            taker_base,
            taker_quote,
            base_vault,
            quote_vault,
            grid_signer,
            system_program,
        })
    }

    fn custody(&self) -> TokenCustody<'_> {
        TokenCustody {
            grid: &self.grid,
            token_program: self.token_program,
            authority: self.taker,
            user_base: self.taker_base,
            user_quote: self.taker_quote,
            base_vault: self.base_vault,
            quote_vault: self.quote_vault,
            grid_signer: self.grid_signer,
            system_program: self.system_program,
        }
    }
}

fn side_label(side: FillSide) -> &'static str {
    match side {
        FillSide::Ask => "fill_as_ask",
        FillSide::Bid => "fill_as_bid",
    }
}

fn fill_single(program_id: &Address, accounts: &[AccountView], side: FillSide, params: FillParams) -> ProgramResult {
    let mut ctx = FillAccounts::load(program_id, accounts)?;
    let route = CurrencyRoute::from_flags(params.route)?;
    let req = FillRequest {
        cell: params.cell()?,
        base_amount: params.base_amount,
        min_amount: params.min_amount,
    };

    let (outcome, settlement) = engine::fill(&mut ctx.grid, side, &req, route, ctx.config.native_mint.as_ref())?;
    // grid state lands before any token moves
    write_state(ctx.grid_ai, &ctx.grid)?;
    settlement.settle(&mut ctx.custody(), route)?;

    msg!(
        "{} grid={} cell={} base={} quote={} fee={}",
        side_label(side),
        req.cell.grid_id,
        req.cell.index,
        outcome.filled_base,
        outcome.quote_volume,
        outcome.fee
    );
    Ok(())
}

fn fill_many(
    program_id: &Address,
    accounts: &[AccountView],
    side: FillSide,
    params: BatchFillParams,
) -> ProgramResult {
    let mut ctx = FillAccounts::load(program_id, accounts)?;
    let route = CurrencyRoute::from_flags(params.route)?;
    route.check(&ctx.grid, side, ctx.config.native_mint.as_ref())?;
    let cells = params.cells()?;
    let req = BatchRequest {
        grid_id: params.grid_id,
        cells: &cells,
        amounts: &params.amounts,
        max_total: params.max_total,
        min_total: params.min_total,
    };

    let outcome = fill_batch(&mut ctx.grid, side, &req)?;
    write_state(ctx.grid_ai, &ctx.grid)?;
    outcome.settlement.settle(&mut ctx.custody(), route)?;

    msg!(
        "{}_batch grid={} cells={} base={} quote={} fee={}",
        side_label(side),
        params.grid_id,
        outcome.cells_filled,
        outcome.filled_base,
        outcome.quote_volume,
        outcome.fee
    );
    Ok(())
}

/// Accounts of an owner cancellation.
struct OwnerAccounts<'a> {
    owner: &'a AccountView,
    grid_ai: &'a AccountView,
    grid: Grid,
    token_program: &'a AccountView,
    base_vault: &'a AccountView,
    quote_vault: &'a AccountView,
    owner_base: &'a AccountView,
    owner_quote: &'a AccountView,
    grid_signer: &'a AccountView,
}

impl<'a> OwnerAccounts<'a> {
    // owner, grid, token_program, base_vault, quote_vault, owner_base, owner_quote, grid_signer
    fn load(program_id: &Address, accounts: &'a [AccountView]) -> Result<Self, ProgramError> {
        let mut it = accounts.iter();
        let owner = next_account(&mut it)?;
        let grid_ai = next_account(&mut it)?;
        let token_program = next_account(&mut it)?;
        let base_vault = next_account(&mut it)?;
        let quote_vault = next_account(&mut it)?;
        let owner_base = next_account(&mut it)?;
        let owner_quote = next_account(&mut it)?;
        let grid_signer = next_account(&mut it)?;
        assert_token_program(token_program)?;
        for ai in [base_vault, quote_vault, owner_base, owner_quote] {
            assert_token_account(token_program, ai)?;
        }

        if !owner.is_signer() {
            return Err(GridError::NotGridOwner.into());
        }
        assert_program_owned(program_id, grid_ai)?;

        let grid: Grid = read_state(grid_ai)?;
        assert_address_matches(base_vault, &grid.base_vault)?;
        assert_address_matches(quote_vault, &grid.quote_vault)?;
        assert_address_matches(grid_signer, &grid.signer)?;

        Ok(Self {
            owner,
            grid_ai,
            grid,
            token_program,
            base_vault,
            quote_vault,
            owner_base,
            owner_quote,
            grid_signer,
        })
    }

    fn pay(&self, refund: Refund) -> ProgramResult {
        let mut custody = TokenCustody {
            grid: &self.grid,
            token_program: self.token_program,
            authority: self.owner,
            user_base: self.owner_base,
            user_quote: self.owner_quote,
            base_vault: self.base_vault,
            quote_vault: self.quote_vault,
            grid_signer: self.grid_signer,
            system_program: None,
        };
        if refund.base > 0 {
            custody.credit(Currency::Base, refund.base)?;
        }
        if refund.quote > 0 {
            custody.credit(Currency::Quote, refund.quote)?;
        }
        Ok(())
    }
}

fn cancel_cell(program_id: &Address, accounts: &[AccountView], cell_id: u128) -> ProgramResult {
    let mut ctx = OwnerAccounts::load(program_id, accounts)?;
    let cell = CellId::unpack(cell_id)?;

    let refund = lifecycle::cancel_cell(&mut ctx.grid, &ctx.owner.address().to_bytes(), cell)?;
    write_state(ctx.grid_ai, &ctx.grid)?;
    ctx.pay(refund)?;

    msg!(
        "cancel cell grid={} cell={} base={} quote={}",
        ctx.grid.id,
        cell.index,
        refund.base,
        refund.quote
    );
    Ok(())
}

fn cancel_grid(program_id: &Address, accounts: &[AccountView]) -> ProgramResult {
    let mut ctx = OwnerAccounts::load(program_id, accounts)?;

    let refund = lifecycle::cancel_grid(&mut ctx.grid, &ctx.owner.address().to_bytes())?;
    write_state(ctx.grid_ai, &ctx.grid)?;
    ctx.pay(refund)?;

    msg!("cancel grid={} base={} quote={}", ctx.grid.id, refund.base, refund.quote);
    Ok(())
}

fn withdraw_profits(program_id: &Address, accounts: &[AccountView], amount: u64) -> ProgramResult {
    // owner, grid, token_program, quote_vault, owner_quote, grid_signer
    let mut it = accounts.iter();
    let owner = next_account(&mut it)?;
    let grid_ai = next_account(&mut it)?;
    let token_program = next_account(&mut it)?;
    let quote_vault = next_account(&mut it)?;
    let owner_quote = next_account(&mut it)?;
    let grid_signer = next_account(&mut it)?;
    assert_token_program(token_program)?;
    assert_token_account(token_program, quote_vault)?;
    assert_token_account(token_program, owner_quote)?;

    if !owner.is_signer() {
        return Err(GridError::NotGridOwner.into());
    }
    assert_program_owned(program_id, grid_ai)?;

    let mut grid: Grid = read_state(grid_ai)?;
    assert_address_matches(quote_vault, &grid.quote_vault)?;
    assert_address_matches(grid_signer, &grid.signer)?;

    let paid = lifecycle::withdraw_profits(&mut grid, &owner.address().to_bytes(), amount)?;
    write_state(grid_ai, &grid)?;
    vault_payout(token_program, quote_vault, owner_quote, grid_signer, &grid, paid)?;

    msg!("withdraw profits grid={} amount={}", grid.id, paid);
    Ok(())
}

fn withdraw_protocol_fees(
    program_id: &Address,
    accounts: &[AccountView],
    currency: Currency,
    amount: u64,
) -> ProgramResult {
    // admin, config, grid, token_program, vault, admin_token, grid_signer
    let (admin, _, config) = admin_config(program_id, accounts)?;
    let mut it = accounts.iter().skip(2);
    let grid_ai = it.next().ok_or(GridError::InvalidInstruction)?;
    let token_program = it.next().ok_or(GridError::InvalidInstruction)?;
    let vault = it.next().ok_or(GridError::InvalidInstruction)?;
    let admin_token = it.next().ok_or(GridError::InvalidInstruction)?;
    let grid_signer = it.next().ok_or(GridError::InvalidInstruction)?;
    assert_program_owned(program_id, grid_ai)?;
    assert_token_program(token_program)?;
    assert_token_account(token_program, vault)?;
    assert_token_account(token_program, admin_token)?;

    let mut grid: Grid = read_state(grid_ai)?;
    let expected_vault = match currency {
        Currency::Base => grid.base_vault,
        Currency::Quote => grid.quote_vault,
    };
    assert_address_matches(vault, &expected_vault)?;
    assert_address_matches(grid_signer, &grid.signer)?;

    let paid = lifecycle::withdraw_protocol_fees(&config, &mut grid, &admin.address().to_bytes(), currency, amount)?;
    write_state(grid_ai, &grid)?;
    vault_payout(token_program, vault, admin_token, grid_signer, &grid, paid)?;

    msg!("withdraw protocol fees grid={} amount={}", grid.id, paid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::funded_grid;

    fn config() -> Config {
        Config {
            admin: [9u8; 32],
            paused: true,
            oneshot_fee_ppm: 700,
            native_mint: Some([3u8; 32]),
            next_grid_id: 42,
            bump: 253,
        }
    }

    #[test]
    fn test_state_roundtrip_through_padded_account() {
        let grid = funded_grid(false);
        let mut data = vec![0xAAu8; 4_096];
        encode_state(&mut data, &grid).expect("encode");

        let used = borsh::to_vec(&grid).expect("serialize").len();
        assert!(data[used..].iter().all(|b| *b == 0));
        let decoded: Grid = decode_state(&data).expect("decode");
        assert_eq!(decoded, grid);
    }

    #[test]
    fn test_state_rejects_small_account() {
        let mut data = vec![0u8; 16];
        let err = encode_state(&mut data, &funded_grid(true)).expect_err("too small");
        assert_eq!(err, GridError::AccountDataTooSmall.into());
    }

    #[test]
    fn test_config_fits_reserved_space() {
        let mut data = vec![0u8; CONFIG_SPACE as usize];
        encode_state(&mut data, &config()).expect("encode");
        let decoded: Config = decode_state(&data).expect("decode");
        assert_eq!(decoded.bump, 253);
        assert_eq!(decoded.next_grid_id, 42);
        assert_eq!(decoded.native_mint, Some([3u8; 32]));
    }

    #[test]
    fn test_config_address_depends_on_program() {
        let a = Address::new_from_array([1u8; 32]);
        let b = Address::new_from_array([2u8; 32]);
        let (pa, bump_a) = solana_address::Address::try_find_program_address(&[CONFIG_SEED], &a).expect("pda");
        let (pb, _) = solana_address::Address::try_find_program_address(&[CONFIG_SEED], &b).expect("pda");
        assert_ne!(pa, pb);
        let again = solana_address::Address::create_program_address(&[CONFIG_SEED, &[bump_a]], &a).expect("pda");
        assert_eq!(again, pa);
    }
}
