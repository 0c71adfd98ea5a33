//! Orca Whirlpool exit instructions and swap tick-array derivation.

use crate::execution::ata::{associated_token_address, create_ata_idempotent, TOKEN_PROGRAM_ID};
use crate::execution::ports::PositionSnapshot;
use crate::types::Pubkey;
use solana_sdk::instruction::{AccountMeta, Instruction};

pub const WHIRLPOOL_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc");
pub const MEMO_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

const DECREASE_LIQUIDITY_V2: [u8; 8] = [58, 127, 188, 62, 79, 82, 196, 96];
const COLLECT_FEES_V2: [u8; 8] = [207, 117, 95, 191, 229, 180, 226, 15];

/// Ticks covered by one tick array, per unit of tick spacing.
pub const TICK_ARRAY_SIZE: i32 = 88;
pub const MAX_SWAP_TICK_ARRAYS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhirlpoolExit {
    /// Create-if-missing for the position token and both pool token accounts
    pub conditional_ata_ixs: Vec<Instruction>,
    pub remove_liquidity_ix: Instruction,
    pub collect_fees_ix: Instruction,
    pub position_token_account: Pubkey,
    pub token_owner_account_a: Pubkey,
    pub token_owner_account_b: Pubkey,
}

/// Remove all liquidity with zero minimums, then collect fees.
pub fn build_exit_instructions(snapshot: &PositionSnapshot, authority: &Pubkey, payer: &Pubkey) -> WhirlpoolExit {
    let s = snapshot;
    let position_token_account = associated_token_address(authority, &s.position_mint, &TOKEN_PROGRAM_ID);
    let owner_a = associated_token_address(authority, &s.token_mint_a, &s.token_program_a);
    let owner_b = associated_token_address(authority, &s.token_mint_b, &s.token_program_b);

    let conditional_ata_ixs = vec![
        create_ata_idempotent(payer, authority, &s.position_mint, &TOKEN_PROGRAM_ID).1,
        create_ata_idempotent(payer, authority, &s.token_mint_a, &s.token_program_a).1,
        create_ata_idempotent(payer, authority, &s.token_mint_b, &s.token_program_b).1,
    ];

    let mut remove_data = Vec::with_capacity(8 + 16 + 8 + 8 + 1);
    remove_data.extend_from_slice(&DECREASE_LIQUIDITY_V2);
    remove_data.extend_from_slice(&s.liquidity.to_le_bytes());
    remove_data.extend_from_slice(&0u64.to_le_bytes());
    remove_data.extend_from_slice(&0u64.to_le_bytes());
    // remaining accounts info: None
    remove_data.push(0);

    let remove_liquidity_ix = Instruction {
        program_id: WHIRLPOOL_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(s.whirlpool, false),
            AccountMeta::new_readonly(s.token_program_a, false),
            AccountMeta::new_readonly(s.token_program_b, false),
            AccountMeta::new_readonly(MEMO_PROGRAM_ID, false),
            AccountMeta::new_readonly(*authority, true),
            AccountMeta::new(s.position, false),
            AccountMeta::new_readonly(position_token_account, false),
            AccountMeta::new_readonly(s.token_mint_a, false),
            AccountMeta::new_readonly(s.token_mint_b, false),
            AccountMeta::new(owner_a, false),
            AccountMeta::new(owner_b, false),
            AccountMeta::new(s.token_vault_a, false),
            AccountMeta::new(s.token_vault_b, false),
            AccountMeta::new(s.tick_array_lower, false),
            AccountMeta::new(s.tick_array_upper, false),
        ],
        data: remove_data,
    };

    let mut collect_data = COLLECT_FEES_V2.to_vec();
    collect_data.push(0);

    let collect_fees_ix = Instruction {
        program_id: WHIRLPOOL_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new_readonly(s.whirlpool, false),
            AccountMeta::new_readonly(*authority, true),
            AccountMeta::new(s.position, false),
            AccountMeta::new_readonly(position_token_account, false),
            AccountMeta::new_readonly(s.token_mint_a, false),
            AccountMeta::new_readonly(s.token_mint_b, false),
            AccountMeta::new(owner_a, false),
            AccountMeta::new(s.token_vault_a, false),
            AccountMeta::new(owner_b, false),
            AccountMeta::new(s.token_vault_b, false),
            AccountMeta::new_readonly(s.token_program_a, false),
            AccountMeta::new_readonly(s.token_program_b, false),
            AccountMeta::new_readonly(MEMO_PROGRAM_ID, false),
        ],
        data: collect_data,
    };

    WhirlpoolExit {
        conditional_ata_ixs,
        remove_liquidity_ix,
        collect_fees_ix,
        position_token_account,
        token_owner_account_a: owner_a,
        token_owner_account_b: owner_b,
    }
}

/// First tick of the array holding `tick`, shifted by `offset` arrays.
pub fn tick_array_start_index(tick: i32, tick_spacing: u16, offset: i32) -> i32 {
    let ticks_per_array = i32::from(tick_spacing) * TICK_ARRAY_SIZE;
    (tick.div_euclid(ticks_per_array) + offset) * ticks_per_array
}

pub fn tick_array_address(whirlpool: &Pubkey, start_tick_index: i32) -> Pubkey {
    let start = start_tick_index.to_string();
    Pubkey::find_program_address(
        &[b"tick_array", whirlpool.as_ref(), start.as_bytes()],
        &WHIRLPOOL_PROGRAM_ID,
    )
    .0
}

/// Start indices of the arrays a swap walks through, in traversal order.
pub fn swap_tick_array_starts(tick_current_index: i32, tick_spacing: u16, a_to_b: bool) -> Vec<i32> {
    (0..MAX_SWAP_TICK_ARRAYS as i32)
        .map(|n| if a_to_b { -n } else { n })
        .map(|offset| tick_array_start_index(tick_current_index, tick_spacing, offset))
        .collect()
}
