use pinocchio::error::ProgramError;

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridError {
    InvalidInstruction = 1,
    NotAdmin = 2,
    NotGridOwner = 3,
    Paused = 4,
    GridCanceled = 5,
    InvalidFee = 6,
    InvalidOrderCount = 7,
    CellNotFound = 8,
    ZeroAmount = 9,
    MathOverflow = 10,
    DivisionByZero = 11,
    DustAmount = 12,
    NoProfits = 13,
    AccountDataTooSmall = 14,
    InvalidAccountOwner = 15,
    InvalidTokenProgram = 16,
    InvalidTokenAccount = 17,
    InvalidStrategyParams = 18,
    DuplicateLadder = 19,
    Unauthorized = 20,
    LadderNotFound = 21,
    // filled amount is zero or below the caller's floor
    Slippage = 22,
    // native-asset override without a matching adapter
    CurrencyMismatch = 23,
    OneshotReverseFill = 24,
    GridMismatch = 25,
    NothingToCancel = 26,
    InvalidConfigAccount = 27,
    InvalidGridSigner = 28,
    // vault holds the wrong mint or is not owned by the grid signer
    VaultMismatch = 29,
}

impl From<GridError> for ProgramError {
    fn from(value: GridError) -> Self {
        ProgramError::Custom(value as u32)
    }
}
