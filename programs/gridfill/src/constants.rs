/// Fixed-point scale of every price: `quote = base * price / PRICE_SCALE`.
pub const PRICE_SCALE: u64 = 1_000_000_000;

/// Fixed-point scale of geometric ladder ratios.
pub const RATIO_SCALE: u64 = 1_000_000_000;

/// Fees are quoted in parts-per-million of traded quote volume.
pub const FEE_DENOMINATOR: u64 = 1_000_000;

/// 10%.
pub const MAX_FEE_PPM: u32 = 100_000;

/// Protocol keeps `fee >> PROTOCOL_FEE_SHIFT` of every fee, i.e. a quarter.
pub const PROTOCOL_FEE_SHIFT: u32 = 2;

pub const MAX_ORDERS_PER_SIDE: usize = 100;

/// Ceiling for any rung price, including the extrapolated reverse price of rung 0.
pub const MAX_PRICE: u64 = 1 << 62;

/// Bit set in the low word of a packed cell id when the cell lives in ask space.
pub const ASK_SPACE_FLAG: u64 = 1 << 63;

/// `route` flag: the taker pays with the native asset.
pub const ROUTE_NATIVE_IN: u8 = 1;
/// `route` flag: the taker is paid in the native asset.
pub const ROUTE_NATIVE_OUT: u8 = 2;

pub const GRID_SIGNER_SEED_PREFIX: &[u8] = b"grid_signer";
pub const CONFIG_SEED: &[u8] = b"config";

/// Bytes reserved for the config account.
pub const CONFIG_SPACE: u64 = 128;
