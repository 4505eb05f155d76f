#![allow(clippy::result_large_err)]
#![allow(unexpected_cfgs)]

pub mod batch;
pub mod constants;
pub mod custody;
pub mod engine;
pub mod error;
pub mod instruction;
pub mod lifecycle;
pub mod math;
pub mod processor;
pub mod state;
pub mod strategy;

#[cfg(not(feature = "no-entrypoint"))]
mod entrypoint {
    use pinocchio::{entrypoint, AccountView, Address, ProgramResult};

    entrypoint!(process_instruction);

    fn process_instruction(
        program_id: &Address,
        accounts: &[AccountView],
        instruction_data: &[u8],
    ) -> ProgramResult {
        crate::processor::process_instruction(program_id, accounts, instruction_data)
    }
}
