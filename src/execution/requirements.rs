//! Lamport cost projection for one exit transaction.

use crate::decision::mints::SOL_MINT;
use crate::execution::ata::{associated_token_address, TOKEN_ACCOUNT_LEN, TOKEN_PROGRAM_ID};
use crate::execution::ports::{AccountLookup, PositionSnapshot, RentSource};
use crate::execution::wsol::involves_sol;
use crate::types::Pubkey;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRequirements {
    pub rent_lamports: u64,
    /// Associated token accounts that do not exist yet
    pub ata_count: u32,
    pub tx_fee_lamports: u64,
    pub priority_fee_lamports: u64,
    pub buffer_lamports: u64,
    /// rent + tx fee + priority fee + buffer
    pub total_required_lamports: u64,
}

impl FeeRequirements {
    /// Everything except the reserve buffer.
    pub fn projected_cost_lamports(&self) -> u64 {
        self.total_required_lamports.saturating_sub(self.buffer_lamports)
    }
}

#[derive(Debug, Clone)]
pub struct RequirementsInput<'a> {
    pub snapshot: &'a PositionSnapshot,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub authority: Pubkey,
    pub tx_fee_lamports: u64,
    pub compute_unit_limit: u32,
    pub compute_unit_price_micro_lamports: u64,
    pub buffer_lamports: u64,
}

/// `ceil(limit * price / 1e6)`: the price is in micro-lamports per unit.
pub fn priority_fee_lamports(compute_unit_limit: u32, compute_unit_price_micro_lamports: u64) -> u64 {
    let micro = u128::from(compute_unit_limit) * u128::from(compute_unit_price_micro_lamports);
    u64::try_from(micro.div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

/// Token accounts the exit touches, deduplicated, in first-seen order.
pub fn required_atas(
    snapshot: &PositionSnapshot,
    input_mint: &Pubkey,
    output_mint: &Pubkey,
    authority: &Pubkey,
) -> Vec<Pubkey> {
    let mut atas: Vec<Pubkey> = Vec::new();
    let mut add = |mint: &Pubkey, program: &Pubkey| {
        let ata = associated_token_address(authority, mint, program);
        if !atas.contains(&ata) {
            atas.push(ata);
        }
    };

    add(&snapshot.position_mint, &TOKEN_PROGRAM_ID);
    add(&snapshot.token_mint_a, &snapshot.token_program_a);
    add(&snapshot.token_mint_b, &snapshot.token_program_b);
    if *input_mint != SOL_MINT {
        add(input_mint, &TOKEN_PROGRAM_ID);
    }
    if *output_mint != SOL_MINT {
        add(output_mint, &TOKEN_PROGRAM_ID);
    }
    if involves_sol(input_mint, output_mint) {
        add(&SOL_MINT, &TOKEN_PROGRAM_ID);
    }
    atas
}

pub async fn compute_execution_requirements(
    input: &RequirementsInput<'_>,
    accounts: &dyn AccountLookup,
    rent: &dyn RentSource,
) -> Result<FeeRequirements> {
    let atas = required_atas(input.snapshot, &input.input_mint, &input.output_mint, &input.authority);

    let mut missing: u32 = 0;
    for ata in &atas {
        if !accounts.account_exists(ata).await? {
            missing += 1;
        }
    }

    let token_account_rent = rent.minimum_balance_for_rent_exemption(TOKEN_ACCOUNT_LEN).await?;
    let rent_lamports = token_account_rent.saturating_mul(u64::from(missing));
    let priority = priority_fee_lamports(input.compute_unit_limit, input.compute_unit_price_micro_lamports);

    let total = rent_lamports
        .saturating_add(input.tx_fee_lamports)
        .saturating_add(priority)
        .saturating_add(input.buffer_lamports);

    debug!(
        "Execution requirements: {} of {} ATAs missing, total {} lamports",
        missing,
        atas.len(),
        total
    );

    Ok(FeeRequirements {
        rent_lamports,
        ata_count: missing,
        tx_fee_lamports: input.tx_fee_lamports,
        priority_fee_lamports: priority,
        buffer_lamports: input.buffer_lamports,
        total_required_lamports: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::mints::USDC_DEVNET_MINT;
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct Existing(HashSet<Pubkey>);

    #[async_trait]
    impl AccountLookup for Existing {
        async fn account_exists(&self, address: &Pubkey) -> Result<bool> {
            Ok(self.0.contains(address))
        }
    }

    struct FixedRent(u64);

    #[async_trait]
    impl RentSource for FixedRent {
        async fn minimum_balance_for_rent_exemption(&self, _data_len: usize) -> Result<u64> {
            Ok(self.0)
        }
    }

    fn snapshot() -> PositionSnapshot {
        PositionSnapshot {
            cluster: crate::types::Cluster::Devnet,
            whirlpool: Pubkey::new_unique(),
            position: Pubkey::new_unique(),
            position_mint: Pubkey::new_unique(),
            current_tick_index: 0,
            lower_tick_index: -64,
            upper_tick_index: 64,
            tick_spacing: 64,
            liquidity: 1,
            token_mint_a: SOL_MINT,
            token_mint_b: USDC_DEVNET_MINT,
            token_vault_a: Pubkey::new_unique(),
            token_vault_b: Pubkey::new_unique(),
            token_program_a: TOKEN_PROGRAM_ID,
            token_program_b: TOKEN_PROGRAM_ID,
            tick_array_lower: Pubkey::new_unique(),
            tick_array_upper: Pubkey::new_unique(),
            remove_preview: None,
            observed_slot: 1,
        }
    }

    #[test]
    fn test_priority_fee_rounds_up() {
        assert_eq!(priority_fee_lamports(600_000, 10_000), 6_000);
        assert_eq!(priority_fee_lamports(1, 1), 1);
        assert_eq!(priority_fee_lamports(0, 10_000), 0);
    }

    #[test]
    fn test_required_atas_are_deduplicated() {
        let s = snapshot();
        let authority = Pubkey::new_unique();
        // position, SOL (pool A == WSOL), USDC: swap mints collapse onto the pool ones
        let atas = required_atas(&s, &SOL_MINT, &USDC_DEVNET_MINT, &authority);
        assert_eq!(atas.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_atas_priced_at_rent() {
        let s = snapshot();
        let authority = Pubkey::new_unique();
        let position_ata = associated_token_address(&authority, &s.position_mint, &TOKEN_PROGRAM_ID);
        let lookup = Existing(HashSet::from([position_ata]));

        let input = RequirementsInput {
            snapshot: &s,
            input_mint: SOL_MINT,
            output_mint: USDC_DEVNET_MINT,
            authority,
            tx_fee_lamports: 5_000,
            compute_unit_limit: 600_000,
            compute_unit_price_micro_lamports: 10_000,
            buffer_lamports: 1_000_000,
        };
        let req = compute_execution_requirements(&input, &lookup, &FixedRent(2_039_280)).await.unwrap();

        assert_eq!(req.ata_count, 2);
        assert_eq!(req.rent_lamports, 4_078_560);
        assert_eq!(req.priority_fee_lamports, 6_000);
        assert_eq!(req.total_required_lamports, 4_078_560 + 5_000 + 6_000 + 1_000_000);
        assert_eq!(req.projected_cost_lamports(), 4_078_560 + 5_000 + 6_000);
    }
}
