use pinocchio::error::ProgramError;

use crate::constants::{FEE_DENOMINATOR, PROTOCOL_FEE_SHIFT};
use crate::error::GridError;

fn u128_to_u64(v: u128) -> Result<u64, ProgramError> {
    u64::try_from(v).map_err(|_| GridError::MathOverflow.into())
}

/// `floor(a * b / denom)`.
pub fn mul_div(a: u64, b: u64, denom: u64) -> Result<u64, ProgramError> {
    if denom == 0 {
        return Err(GridError::DivisionByZero.into());
    }
    let n = (a as u128) * (b as u128);
    u128_to_u64(n / denom as u128)
}

/// `ceil(a * b / denom)`.
pub fn mul_div_rounding_up(a: u64, b: u64, denom: u64) -> Result<u64, ProgramError> {
    if denom == 0 {
        return Err(GridError::DivisionByZero.into());
    }
    let n = (a as u128) * (b as u128);
    let d = denom as u128;
    let mut q = n / d;
    if n % d != 0 {
        q += 1;
    }
    u128_to_u64(q)
}

pub fn calc_fee(volume: u64, fee_ppm: u32) -> Result<u64, ProgramError> {
    mul_div(volume, fee_ppm as u64, FEE_DENOMINATOR)
}

/// Splits a fee into `(protocol_fee, maker_fee)`. The maker absorbs the rounding.
pub fn split_fee(total_fee: u64) -> (u64, u64) {
    let protocol_fee = total_fee >> PROTOCOL_FEE_SHIFT;
    (protocol_fee, total_fee - protocol_fee)
}

pub fn checked_add(a: u64, b: u64) -> Result<u64, ProgramError> {
    a.checked_add(b).ok_or(GridError::MathOverflow.into())
}

pub fn checked_sub(a: u64, b: u64) -> Result<u64, ProgramError> {
    a.checked_sub(b).ok_or(GridError::MathOverflow.into())
}

pub fn sum_u64<I: IntoIterator<Item = u64>>(values: I) -> Result<u64, ProgramError> {
    values.into_iter().try_fold(0u64, checked_add)
}
