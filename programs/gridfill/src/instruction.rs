use borsh::{BorshDeserialize, BorshSerialize};
use pinocchio::error::ProgramError;

use crate::lifecycle::GridOrder;
use crate::state::{CellId, Currency};

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug)]
pub struct PlaceGridParams {
    pub signer_bump: u8,
    pub order: GridOrder,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug)]
pub struct FillParams {
    pub cell_id: u128, // CellId::pack
    pub base_amount: u64,
    pub min_amount: u64,
    pub route: u8, // ROUTE_NATIVE_IN | ROUTE_NATIVE_OUT
}

impl FillParams {
    pub fn cell(&self) -> Result<CellId, ProgramError> {
        CellId::unpack(self.cell_id)
    }
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug)]
pub struct BatchFillParams {
    pub grid_id: u64,
    pub cell_ids: Vec<u128>,
    pub amounts: Vec<u64>,
    pub max_total: u64,
    pub min_total: u64,
    pub route: u8,
}

impl BatchFillParams {
    pub fn cells(&self) -> Result<Vec<CellId>, ProgramError> {
        self.cell_ids.iter().map(|raw| CellId::unpack(*raw)).collect()
    }
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug)]
pub enum GridInstruction {
    /// admin, config
    InitializeConfig {
        oneshot_fee_ppm: u32,
        native_mint: Option<[u8; 32]>,
    },
    /// admin, config
    SetPause {
        paused: bool,
    },
    /// admin, config
    SetOneshotFee {
        oneshot_fee_ppm: u32,
    },
    /// owner, config, grid, token_program, base_mint, quote_mint, owner_base, owner_quote,
    /// base_vault, quote_vault, grid_signer
    PlaceGrid(PlaceGridParams),
    /// taker, config, grid, token_program, taker_base, taker_quote, base_vault,
    /// quote_vault, grid_signer, [system_program]
    FillAsAsk(FillParams),
    /// same accounts as `FillAsAsk`
    FillAsBid(FillParams),
    /// same accounts as `FillAsAsk`
    FillAsAskBatch(BatchFillParams),
    /// same accounts as `FillAsAsk`
    FillAsBidBatch(BatchFillParams),
    /// owner, grid, token_program, base_vault, quote_vault, owner_base, owner_quote, grid_signer
    CancelCell {
        cell_id: u128,
    },
    /// same accounts as `CancelCell`
    CancelGrid,
    /// owner, grid, token_program, quote_vault, owner_quote, grid_signer
    WithdrawProfits {
        amount: u64,
    },
    /// admin, config, grid, token_program, vault, admin_token, grid_signer
    WithdrawProtocolFees {
        currency: Currency,
        amount: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LadderOrder;
    use crate::strategy::{Geometric, Linear, StrategyParam};

    #[test]
    fn test_instruction_roundtrip_place_grid() {
        let ix = GridInstruction::PlaceGrid(PlaceGridParams {
            signer_bump: 254,
            order: GridOrder {
                fee_ppm: 500,
                compound: true,
                oneshot: false,
                base_amount_per_order: 1_000_000,
                asks: Some(LadderOrder {
                    count: 2,
                    strategy: StrategyParam::Linear(Linear {
                        price0: 1_100_000_000,
                        gap: 100_000_000,
                    }),
                }),
                bids: Some(LadderOrder {
                    count: 2,
                    strategy: StrategyParam::Geometric(Geometric {
                        price0: 900_000_000,
                        ratio: 900_000_000,
                    }),
                }),
            },
        });

        let data = borsh::to_vec(&ix).expect("serialize");
        let decoded = GridInstruction::try_from_slice(&data).expect("deserialize");

        match decoded {
            GridInstruction::PlaceGrid(params) => {
                assert_eq!(params.signer_bump, 254);
                assert_eq!(params.order.fee_ppm, 500);
                assert_eq!(params.order.base_amount_per_order, 1_000_000);
                let bids = params.order.bids.expect("bids");
                assert_eq!(bids.count, 2);
                assert_eq!(
                    bids.strategy,
                    StrategyParam::Geometric(Geometric {
                        price0: 900_000_000,
                        ratio: 900_000_000,
                    })
                );
            }
            _ => panic!("unexpected variant"),
        }
    }

    #[test]
    fn test_instruction_fill_unpacks_cell_id() {
        let ix = GridInstruction::FillAsBid(FillParams {
            cell_id: CellId::ask(12, 3).pack(),
            base_amount: 42,
            min_amount: 40,
            route: 2,
        });

        let data = borsh::to_vec(&ix).expect("serialize");
        let decoded = GridInstruction::try_from_slice(&data).expect("deserialize");

        match decoded {
            GridInstruction::FillAsBid(params) => {
                assert_eq!(params.cell().expect("cell"), CellId::ask(12, 3));
                assert_eq!(params.base_amount, 42);
                assert_eq!(params.min_amount, 40);
                assert_eq!(params.route, 2);
            }
            _ => panic!("unexpected variant"),
        }
    }

    #[test]
    fn test_instruction_batch_cells() {
        let params = BatchFillParams {
            grid_id: 12,
            cell_ids: vec![CellId::bid(12, 0).pack(), CellId::ask(12, 1).pack()],
            amounts: vec![500, 1_000],
            max_total: 1_500,
            min_total: 1,
            route: 0,
        };
        assert_eq!(params.cells().expect("cells"), vec![CellId::bid(12, 0), CellId::ask(12, 1)]);

        let bad = BatchFillParams {
            cell_ids: vec![1u128 << 40],
            ..params
        };
        assert!(bad.cells().is_err());
    }

    #[test]
    fn test_instruction_roundtrip_withdraw_protocol_fees() {
        let ix = GridInstruction::WithdrawProtocolFees {
            currency: Currency::Quote,
            amount: 888,
        };
        let data = borsh::to_vec(&ix).expect("serialize");
        let decoded = GridInstruction::try_from_slice(&data).expect("deserialize");

        match decoded {
            GridInstruction::WithdrawProtocolFees { currency, amount } => {
                assert_eq!(currency, Currency::Quote);
                assert_eq!(amount, 888);
            }
            _ => panic!("unexpected variant"),
        }
    }

    #[test]
    fn test_instruction_rejects_garbage() {
        assert!(GridInstruction::try_from_slice(&[200]).is_err());
    }
}
