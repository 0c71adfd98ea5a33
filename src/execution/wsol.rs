//! Wrapped-SOL lifecycle around the swap.

use crate::decision::mints::SOL_MINT;
use crate::errors::{ErrorKind, ExecutionError, ExecutionResult};
use crate::execution::ata::{associated_token_address, close_account, create_ata_idempotent, sync_native, TOKEN_PROGRAM_ID};
use crate::types::Pubkey;
use solana_sdk::instruction::Instruction;
use solana_sdk::system_instruction;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WsolLifecycle {
    pub wsol_ata: Option<Pubkey>,
    pub pre_swap: Vec<Instruction>,
    pub post_swap: Vec<Instruction>,
}

impl WsolLifecycle {
    pub fn is_empty(&self) -> bool {
        self.pre_swap.is_empty() && self.post_swap.is_empty()
    }
}

pub fn involves_sol(input_mint: &Pubkey, output_mint: &Pubkey) -> bool {
    *input_mint == SOL_MINT || *output_mint == SOL_MINT
}

/// Wrap before the swap when SOL is sold, and always close the WSOL account
/// afterwards so residual wrapped lamports come back as native SOL.
pub fn wsol_lifecycle(
    authority: &Pubkey,
    payer: &Pubkey,
    input_mint: &Pubkey,
    output_mint: &Pubkey,
    wrap_lamports: Option<u64>,
) -> ExecutionResult<WsolLifecycle> {
    if !involves_sol(input_mint, output_mint) {
        return Ok(WsolLifecycle::default());
    }

    let wsol_ata = associated_token_address(authority, &SOL_MINT, &TOKEN_PROGRAM_ID);
    let (_, create) = create_ata_idempotent(payer, authority, &SOL_MINT, &TOKEN_PROGRAM_ID);
    let mut pre_swap = vec![create];

    if *input_mint == SOL_MINT {
        let lamports = wrap_lamports.ok_or_else(|| {
            ExecutionError::new(ErrorKind::DataUnavailable, "wrap amount is required when selling SOL")
        })?;
        pre_swap.push(system_instruction::transfer(authority, &wsol_ata, lamports));
        pre_swap.push(sync_native(&wsol_ata));
    }

    Ok(WsolLifecycle {
        wsol_ata: Some(wsol_ata),
        pre_swap,
        post_swap: vec![close_account(&wsol_ata, authority, authority)],
    })
}
