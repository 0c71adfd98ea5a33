//! Deterministic attestation codec.
//!
//! An attestation is the canonical, fixed-layout byte encoding of one exit's
//! intent. Its SHA-256 digest is bound into the on-chain receipt, so the
//! layout below is a wire contract: any change requires a new version byte.
//!
//! | field                  | bytes | encoding          |
//! |------------------------|-------|-------------------|
//! | version                | 1     | u8                |
//! | cluster                | 1     | u8                |
//! | authority              | 32    | address           |
//! | position               | 32    | address           |
//! | position mint          | 32    | address           |
//! | pool                   | 32    | address           |
//! | epoch                  | 4     | u32 LE            |
//! | direction              | 1     | u8                |
//! | current tick           | 4     | i32 LE            |
//! | lower tick             | 4     | i32 LE            |
//! | upper tick             | 4     | i32 LE            |
//! | slippage cap bps       | 2     | u16 LE            |
//! | quote input mint       | 32    | address           |
//! | quote output mint      | 32    | address           |
//! | quote in amount        | 8     | u64 LE            |
//! | quote min out amount   | 8     | u64 LE            |
//! | quote quoted-at (sec)  | 8     | i64 LE            |
//! | swap planned           | 1     | u8                |
//! | swap skip reason       | 1     | u8                |
//! | swap router            | 1     | u8                |

use crate::decision::swap::{SwapRouter, SwapSkipReason};
use crate::errors::DecodeError;
use crate::types::{Cluster, ExitDirection, Pubkey};
use serde::{Deserialize, Serialize};
use solana_sdk::hash::hash;

pub const ATTESTATION_VERSION: u8 = 2;
pub const ATTESTATION_LEN: usize = 240;

/// An address as supplied by a caller: raw bytes or base58 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddressInput {
    Text(String),
    Bytes(Vec<u8>),
}

impl AddressInput {
    /// Decode to exactly 32 bytes.
    pub fn to_bytes(&self) -> Result<[u8; 32], DecodeError> {
        match self {
            AddressInput::Bytes(bytes) => {
                <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| DecodeError::WrongLength(bytes.len()))
            }
            AddressInput::Text(text) => decode_base58_address(text),
        }
    }
}

impl From<Pubkey> for AddressInput {
    fn from(key: Pubkey) -> Self {
        AddressInput::Bytes(key.to_bytes().to_vec())
    }
}

impl From<&Pubkey> for AddressInput {
    fn from(key: &Pubkey) -> Self {
        AddressInput::Bytes(key.to_bytes().to_vec())
    }
}

impl From<[u8; 32]> for AddressInput {
    fn from(bytes: [u8; 32]) -> Self {
        AddressInput::Bytes(bytes.to_vec())
    }
}

impl From<&str> for AddressInput {
    fn from(text: &str) -> Self {
        AddressInput::Text(text.to_string())
    }
}

pub(crate) fn decode_base58_address(text: &str) -> Result<[u8; 32], DecodeError> {
    let bytes = bs58::decode(text)
        .into_vec()
        .map_err(|_| DecodeError::InvalidBase58(text.to_string()))?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| DecodeError::WrongLength(bytes.len()))
}

/// Everything an exit commits to before it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationInput {
    pub cluster: Cluster,
    pub authority: AddressInput,
    pub position: AddressInput,
    pub position_mint: AddressInput,
    pub pool: AddressInput,
    pub epoch: u32,
    pub direction: ExitDirection,
    pub current_tick_index: i32,
    pub lower_tick_index: i32,
    pub upper_tick_index: i32,
    pub slippage_bps_cap: u16,
    pub quote_input_mint: AddressInput,
    pub quote_output_mint: AddressInput,
    pub quote_in_amount: u64,
    pub quote_min_out_amount: u64,
    pub quote_quoted_at_unix_sec: i64,
    pub swap_planned: bool,
    pub swap_skip_reason: SwapSkipReason,
    pub swap_router: SwapRouter,
}

/// Encode the attestation into its fixed 240-byte layout.
pub fn encode(input: &AttestationInput) -> Result<[u8; ATTESTATION_LEN], DecodeError> {
    let mut out = [0u8; ATTESTATION_LEN];
    let mut w = Writer { buf: &mut out, at: 0 };

    w.put(&[ATTESTATION_VERSION, input.cluster.code()]);
    w.put(&input.authority.to_bytes()?);
    w.put(&input.position.to_bytes()?);
    w.put(&input.position_mint.to_bytes()?);
    w.put(&input.pool.to_bytes()?);
    w.put(&input.epoch.to_le_bytes());
    w.put(&[input.direction.code()]);
    w.put(&input.current_tick_index.to_le_bytes());
    w.put(&input.lower_tick_index.to_le_bytes());
    w.put(&input.upper_tick_index.to_le_bytes());
    w.put(&input.slippage_bps_cap.to_le_bytes());
    w.put(&input.quote_input_mint.to_bytes()?);
    w.put(&input.quote_output_mint.to_bytes()?);
    w.put(&input.quote_in_amount.to_le_bytes());
    w.put(&input.quote_min_out_amount.to_le_bytes());
    w.put(&input.quote_quoted_at_unix_sec.to_le_bytes());
    w.put(&[
        u8::from(input.swap_planned),
        input.swap_skip_reason.code(),
        input.swap_router.code(),
    ]);

    debug_assert_eq!(w.at, ATTESTATION_LEN);
    Ok(out)
}

struct Writer<'a> {
    buf: &'a mut [u8; ATTESTATION_LEN],
    at: usize,
}

impl Writer<'_> {
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.at..self.at + bytes.len()].copy_from_slice(bytes);
        self.at += bytes.len();
    }
}

/// SHA-256 over arbitrary bytes.
pub fn hash_payload(bytes: &[u8]) -> [u8; 32] {
    hash(bytes).to_bytes()
}

/// Encode then hash.
pub fn attestation_hash(input: &AttestationInput) -> Result<[u8; 32], DecodeError> {
    Ok(hash_payload(&encode(input)?))
}

/// Constant-time equality for digests.
pub fn digests_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}
