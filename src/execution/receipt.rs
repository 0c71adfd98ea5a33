//! Idempotent execution receipt: address derivation, record instruction,
//! account decoding and post-send verification.

use crate::decision::attestation::digests_equal;
use crate::errors::{DecodeError, ErrorKind, ExecutionError, ExecutionResult};
use crate::types::{ExitDirection, Pubkey};
use serde::{Deserialize, Serialize};
use serde_json::json;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::system_program;

pub const RECEIPT_SEED: &[u8] = b"receipt";
pub const RECORD_EXECUTION_DISCRIMINATOR: [u8; 8] = [231, 245, 144, 129, 178, 195, 89, 160];
pub const RECORD_EXECUTION_DATA_LEN: usize = 77;
pub const RECEIPT_ACCOUNT_LEN: usize = 126;

pub const RECEIPT_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("A81Xsuwg5zrT1sgvkncemfWqQ8nymwHS3e7ExM4YnXMm");

/// Receipt PDA and bump for one `(authority, position mint, epoch)`.
pub fn derive_receipt_address(
    program_id: &Pubkey,
    authority: &Pubkey,
    position_mint: &Pubkey,
    epoch: u32,
) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[RECEIPT_SEED, authority.as_ref(), position_mint.as_ref(), &epoch.to_le_bytes()],
        program_id,
    )
}

pub fn record_execution_data(
    epoch: u32,
    direction: ExitDirection,
    position_mint: &Pubkey,
    attestation_hash: &[u8; 32],
) -> [u8; RECORD_EXECUTION_DATA_LEN] {
    let mut data = [0u8; RECORD_EXECUTION_DATA_LEN];
    data[..8].copy_from_slice(&RECORD_EXECUTION_DISCRIMINATOR);
    data[8..12].copy_from_slice(&epoch.to_le_bytes());
    data[12] = direction.code();
    data[13..45].copy_from_slice(position_mint.as_ref());
    data[45..77].copy_from_slice(attestation_hash);
    data
}

pub fn record_execution_ix(
    program_id: &Pubkey,
    authority: &Pubkey,
    position_mint: &Pubkey,
    epoch: u32,
    direction: ExitDirection,
    attestation_hash: &[u8; 32],
) -> Instruction {
    let (receipt, _) = derive_receipt_address(program_id, authority, position_mint, epoch);
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*authority, true),
            AccountMeta::new(receipt, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: record_execution_data(epoch, direction, position_mint, attestation_hash).to_vec(),
    }
}

/// Receipt state persisted by the receipt program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptAccount {
    pub authority: Pubkey,
    pub position_mint: Pubkey,
    pub epoch: u32,
    pub direction: u8,
    pub attestation_hash: [u8; 32],
    pub slot: u64,
    pub unix_ts: i64,
    pub bump: u8,
}

impl ReceiptAccount {
    /// Decode from raw account data, discriminator included.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < RECEIPT_ACCOUNT_LEN {
            return Err(DecodeError::AccountTooShort {
                needed: RECEIPT_ACCOUNT_LEN,
                actual: data.len(),
            });
        }
        let bytes32 = |at: usize| -> [u8; 32] {
            let mut out = [0u8; 32];
            out.copy_from_slice(&data[at..at + 32]);
            out
        };
        let u64_at = |at: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&data[at..at + 8]);
            b
        };
        let mut epoch = [0u8; 4];
        epoch.copy_from_slice(&data[72..76]);

        Ok(Self {
            authority: Pubkey::new_from_array(bytes32(8)),
            position_mint: Pubkey::new_from_array(bytes32(40)),
            epoch: u32::from_le_bytes(epoch),
            direction: data[76],
            attestation_hash: bytes32(77),
            slot: u64::from_le_bytes(u64_at(109)),
            unix_ts: i64::from_le_bytes(u64_at(117)),
            bump: data[125],
        })
    }

    pub fn summary(&self) -> String {
        format!(
            "authority={} positionMint={} epoch={} direction={} attestationHash={} slot={} unixTs={} bump={}",
            self.authority,
            self.position_mint,
            self.epoch,
            self.direction,
            hex::encode(self.attestation_hash),
            self.slot,
            self.unix_ts,
            self.bump
        )
    }
}

/// What the local side expects the receipt to contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedReceipt {
    pub authority: Pubkey,
    pub position_mint: Pubkey,
    pub epoch: u32,
    pub direction: ExitDirection,
    pub attestation_hash: [u8; 32],
}

/// Every field must match exactly; any difference is an integrity failure.
pub fn verify_receipt(receipt: &ReceiptAccount, expected: &ExpectedReceipt) -> ExecutionResult<()> {
    let mut mismatched: Vec<&str> = Vec::new();
    if receipt.authority != expected.authority {
        mismatched.push("authority");
    }
    if receipt.position_mint != expected.position_mint {
        mismatched.push("positionMint");
    }
    if receipt.epoch != expected.epoch {
        mismatched.push("epoch");
    }
    if receipt.direction != expected.direction.code() {
        mismatched.push("direction");
    }
    if !digests_equal(&receipt.attestation_hash, &expected.attestation_hash) {
        mismatched.push("attestationHash");
    }

    if mismatched.is_empty() {
        return Ok(());
    }
    Err(ExecutionError::new(
        ErrorKind::ReceiptMismatch,
        format!("Receipt fields differ from local attestation: {}", mismatched.join(", ")),
    )
    .with_debug(json!({
        "mismatched": mismatched,
        "receipt": receipt.summary(),
        "expectedAttestationHash": hex::encode(expected.attestation_hash),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_account(r: &ReceiptAccount) -> Vec<u8> {
        let mut data = vec![0u8; RECEIPT_ACCOUNT_LEN];
        data[8..40].copy_from_slice(r.authority.as_ref());
        data[40..72].copy_from_slice(r.position_mint.as_ref());
        data[72..76].copy_from_slice(&r.epoch.to_le_bytes());
        data[76] = r.direction;
        data[77..109].copy_from_slice(&r.attestation_hash);
        data[109..117].copy_from_slice(&r.slot.to_le_bytes());
        data[117..125].copy_from_slice(&r.unix_ts.to_le_bytes());
        data[125] = r.bump;
        data
    }

    fn receipt() -> ReceiptAccount {
        ReceiptAccount {
            authority: Pubkey::new_unique(),
            position_mint: Pubkey::new_unique(),
            epoch: 19_675,
            direction: 1,
            attestation_hash: [7u8; 32],
            slot: 123_456,
            unix_ts: 1_700_000_000,
            bump: 254,
        }
    }

    fn expected_for(r: &ReceiptAccount) -> ExpectedReceipt {
        ExpectedReceipt {
            authority: r.authority,
            position_mint: r.position_mint,
            epoch: r.epoch,
            direction: ExitDirection::Up,
            attestation_hash: r.attestation_hash,
        }
    }

    #[test]
    fn test_program_id_matches_config_default() {
        assert_eq!(RECEIPT_PROGRAM_ID.to_string(), crate::config::DEFAULT_RECEIPT_PROGRAM_ID);
    }

    #[test]
    fn test_pda_is_deterministic_per_epoch() {
        let program = RECEIPT_PROGRAM_ID;
        let authority = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let a = derive_receipt_address(&program, &authority, &mint, 10);
        assert_eq!(a, derive_receipt_address(&program, &authority, &mint, 10));
        assert_ne!(a.0, derive_receipt_address(&program, &authority, &mint, 11).0);
    }

    #[test]
    fn test_record_instruction_layout() {
        let program = RECEIPT_PROGRAM_ID;
        let authority = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let ix = record_execution_ix(&program, &authority, &mint, 42, ExitDirection::Down, &[9u8; 32]);

        assert_eq!(ix.data.len(), 77);
        assert_eq!(&ix.data[..8], &RECORD_EXECUTION_DISCRIMINATOR);
        assert_eq!(&ix.data[8..12], &42u32.to_le_bytes());
        assert_eq!(ix.data[12], 0);
        assert_eq!(&ix.data[13..45], mint.as_ref());
        assert_eq!(&ix.data[45..], &[9u8; 32]);

        let (pda, _) = derive_receipt_address(&program, &authority, &mint, 42);
        assert_eq!(ix.accounts[1].pubkey, pda);
        assert!(ix.accounts[0].is_signer && ix.accounts[0].is_writable);
    }

    #[test]
    fn test_decode_account() {
        let r = receipt();
        assert_eq!(ReceiptAccount::decode(&encode_account(&r)).unwrap(), r);
        assert_eq!(
            ReceiptAccount::decode(&[0u8; 100]),
            Err(DecodeError::AccountTooShort { needed: 126, actual: 100 })
        );
    }

    #[test]
    fn test_verify_matches_and_mismatches() {
        let r = receipt();
        assert!(verify_receipt(&r, &expected_for(&r)).is_ok());

        let mut wrong = expected_for(&r);
        wrong.attestation_hash[0] ^= 1;
        wrong.epoch += 1;
        let err = verify_receipt(&r, &wrong).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ReceiptMismatch);
        assert!(!err.retryable());
        assert!(err.message.contains("epoch"));
        assert!(err.message.contains("attestationHash"));
    }
}
