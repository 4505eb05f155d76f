use pinocchio::{
    cpi::{self, Seed, Signer},
    error::ProgramError,
    instruction::{InstructionAccount, InstructionView},
    AccountView, Address, ProgramResult,
};

use crate::constants::{CONFIG_SEED, GRID_SIGNER_SEED_PREFIX};
use crate::engine::Custody;
use crate::error::GridError;
use crate::state::{Currency, Grid};

const TOKEN_TRANSFER_IX: u8 = 3; // spl-token TokenInstruction::Transfer
const TOKEN_CLOSE_ACCOUNT_IX: u8 = 9;
const TOKEN_SYNC_NATIVE_IX: u8 = 17;
const SYSTEM_ASSIGN_IX: u32 = 1;
const SYSTEM_TRANSFER_IX: u32 = 2;
const SYSTEM_ALLOCATE_IX: u32 = 8;

pub const SPL_TOKEN_PROGRAM_ID: [u8; 32] = [
    6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172, 28, 180, 133, 237, 95, 91, 55,
    145, 58, 140, 245, 133, 126, 255, 0, 169,
];
pub const SPL_TOKEN_2022_PROGRAM_ID: [u8; 32] = [
    6, 221, 246, 225, 238, 117, 143, 222, 24, 66, 93, 188, 228, 108, 205, 218, 182, 26, 252, 77, 131, 185, 13,
    39, 254, 189, 249, 40, 216, 161, 139, 252,
];
const SYSTEM_PROGRAM_ID: [u8; 32] = [0u8; 32];

pub fn assert_token_program(token_program: &AccountView) -> ProgramResult {
    let pid = token_program.address().to_bytes();
    if pid != SPL_TOKEN_PROGRAM_ID && pid != SPL_TOKEN_2022_PROGRAM_ID {
        return Err(GridError::InvalidTokenProgram.into());
    }
    Ok(())
}

pub fn assert_token_account(token_program: &AccountView, ai: &AccountView) -> ProgramResult {
    if !ai.owned_by(token_program.address()) {
        return Err(GridError::InvalidTokenAccount.into());
    }
    Ok(())
}

pub fn assert_system_program(system_program: &AccountView) -> ProgramResult {
    if system_program.address().as_array() != &SYSTEM_PROGRAM_ID {
        return Err(GridError::InvalidInstruction.into());
    }
    Ok(())
}

/// `(mint, owner)` from the head of an SPL token account.
pub fn token_account_fields(data: &[u8]) -> Result<([u8; 32], [u8; 32]), ProgramError> {
    if data.len() < 64 {
        return Err(GridError::InvalidTokenAccount.into());
    }
    let mut mint = [0u8; 32];
    let mut owner = [0u8; 32];
    mint.copy_from_slice(&data[..32]);
    owner.copy_from_slice(&data[32..64]);
    Ok((mint, owner))
}

pub fn assert_vault(vault: &AccountView, mint: &[u8; 32], authority: &[u8; 32]) -> ProgramResult {
    let data = vault.try_borrow()?;
    let (vault_mint, vault_owner) = token_account_fields(&data)?;
    if &vault_mint != mint || &vault_owner != authority {
        return Err(GridError::VaultMismatch.into());
    }
    Ok(())
}

/// Allocates and assigns the config PDA. The client funds it beforehand.
pub fn claim_config_account(
    system_program: &AccountView,
    config: &AccountView,
    program_id: &Address,
    space: u64,
    bump: u8,
) -> ProgramResult {
    let bump_seed = [bump];
    let seeds = [Seed::from(CONFIG_SEED), Seed::from(&bump_seed)];
    let signers = [Signer::from(&seeds)];
    let metas = [InstructionAccount::writable_signer(config.address())];

    let mut data = [0u8; 12];
    data[..4].copy_from_slice(&SYSTEM_ALLOCATE_IX.to_le_bytes());
    data[4..].copy_from_slice(&space.to_le_bytes());
    let ix = InstructionView {
        program_id: system_program.address(),
        accounts: &metas,
        data: &data,
    };
    cpi::invoke_signed_with_bounds::<1>(&ix, &[config], &signers)?;

    let mut data = [0u8; 36];
    data[..4].copy_from_slice(&SYSTEM_ASSIGN_IX.to_le_bytes());
    data[4..].copy_from_slice(program_id.as_array());
    let ix = InstructionView {
        program_id: system_program.address(),
        accounts: &metas,
        data: &data,
    };
    cpi::invoke_signed_with_bounds::<1>(&ix, &[config], &signers)
}

fn transfer_ix_data(amount: u64) -> [u8; 9] {
    let mut data = [0u8; 9];
    data[0] = TOKEN_TRANSFER_IX;
    data[1..].copy_from_slice(&amount.to_le_bytes());
    data
}

/// Transfer authorized by a transaction signer.
pub fn token_transfer(
    token_program: &AccountView,
    source: &AccountView,
    destination: &AccountView,
    authority: &AccountView,
    amount: u64,
) -> ProgramResult {
    let data = transfer_ix_data(amount);
    let metas = [
        InstructionAccount::writable(source.address()),
        InstructionAccount::writable(destination.address()),
        InstructionAccount::readonly_signer(authority.address()),
    ];
    let ix = InstructionView {
        program_id: token_program.address(),
        accounts: &metas,
        data: &data,
    };

    let views = [source, destination, authority];
    cpi::invoke(&ix, &views)
}

/// Pays `amount` out of one of `grid`'s vaults, signed by the grid signer.
pub fn vault_payout(
    token_program: &AccountView,
    vault: &AccountView,
    destination: &AccountView,
    grid_signer: &AccountView,
    grid: &Grid,
    amount: u64,
) -> ProgramResult {
    let data = transfer_ix_data(amount);
    let metas = [
        InstructionAccount::writable(vault.address()),
        InstructionAccount::writable(destination.address()),
        InstructionAccount::readonly_signer(grid_signer.address()),
    ];
    let ix = InstructionView {
        program_id: token_program.address(),
        accounts: &metas,
        data: &data,
    };

    let grid_id_seed = grid.id.to_le_bytes();
    let bump_seed = [grid.signer_bump];
    let signer_seeds = [
        Seed::from(GRID_SIGNER_SEED_PREFIX),
        Seed::from(&grid.owner[..]),
        Seed::from(&grid_id_seed[..]),
        Seed::from(&bump_seed),
    ];
    let signers = [Signer::from(&signer_seeds)];

    let views = [vault, destination, grid_signer];
    cpi::invoke_signed_with_bounds::<3>(&ix, &views, &signers)
}

/// `system_program` is only needed for native routing.
pub struct TokenCustody<'a> {
    pub grid: &'a Grid,
    pub token_program: &'a AccountView,
    pub authority: &'a AccountView,
    pub user_base: &'a AccountView,
    pub user_quote: &'a AccountView,
    pub base_vault: &'a AccountView,
    pub quote_vault: &'a AccountView,
    pub grid_signer: &'a AccountView,
    pub system_program: Option<&'a AccountView>,
}

impl<'a> TokenCustody<'a> {
    fn accounts(&self, currency: Currency) -> (&'a AccountView, &'a AccountView) {
        match currency {
            Currency::Base => (self.user_base, self.base_vault),
            Currency::Quote => (self.user_quote, self.quote_vault),
        }
    }
}

impl Custody for TokenCustody<'_> {
    fn debit(&mut self, currency: Currency, amount: u64) -> ProgramResult {
        let (user, vault) = self.accounts(currency);
        token_transfer(self.token_program, user, vault, self.authority, amount)
    }

    fn credit(&mut self, currency: Currency, amount: u64) -> ProgramResult {
        let (user, vault) = self.accounts(currency);
        vault_payout(self.token_program, vault, user, self.grid_signer, self.grid, amount)
    }

    fn wrap_native(&mut self, currency: Currency, amount: u64) -> ProgramResult {
        let system_program = self.system_program.ok_or(ProgramError::from(GridError::CurrencyMismatch))?;
        let (user, _) = self.accounts(currency);

        let mut data = [0u8; 12];
        data[..4].copy_from_slice(&SYSTEM_TRANSFER_IX.to_le_bytes());
        data[4..].copy_from_slice(&amount.to_le_bytes());
        let metas = [
            InstructionAccount::writable_signer(self.authority.address()),
            InstructionAccount::writable(user.address()),
        ];
        let ix = InstructionView {
            program_id: system_program.address(),
            accounts: &metas,
            data: &data,
        };
        cpi::invoke(&ix, &[self.authority, user])?;

        let data = [TOKEN_SYNC_NATIVE_IX];
        let metas = [InstructionAccount::writable(user.address())];
        let ix = InstructionView {
            program_id: self.token_program.address(),
            accounts: &metas,
            data: &data,
        };
        cpi::invoke(&ix, &[user])
    }

    fn unwrap_native(&mut self, currency: Currency) -> ProgramResult {
        if self.system_program.is_none() {
            return Err(GridError::CurrencyMismatch.into());
        }
        let (user, _) = self.accounts(currency);

        let data = [TOKEN_CLOSE_ACCOUNT_IX];
        let metas = [
            InstructionAccount::writable(user.address()),
            InstructionAccount::writable(self.authority.address()),
            InstructionAccount::readonly_signer(self.authority.address()),
        ];
        let ix = InstructionView {
            program_id: self.token_program.address(),
            accounts: &metas,
            data: &data,
        };
        cpi::invoke(&ix, &[user, self.authority, self.authority])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_ix_data_layout() {
        let data = transfer_ix_data(0x0102_0304_0506_0708);
        assert_eq!(data[0], TOKEN_TRANSFER_IX);
        assert_eq!(&data[1..], &[8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_token_account_fields_reads_mint_and_owner() {
        let mut data = vec![0u8; 165];
        data[..32].copy_from_slice(&[5u8; 32]);
        data[32..64].copy_from_slice(&[4u8; 32]);
        data[64..72].copy_from_slice(&77u64.to_le_bytes());
        assert_eq!(token_account_fields(&data).expect("fields"), ([5u8; 32], [4u8; 32]));
    }

    #[test]
    fn test_token_account_fields_rejects_short_data() {
        let err = token_account_fields(&[0u8; 63]).expect_err("short");
        assert_eq!(err, GridError::InvalidTokenAccount.into());
    }
}
