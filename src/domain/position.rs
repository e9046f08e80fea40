//! Position (trove) identity and ledger state.

use crate::domain::{Address, Decimal, InterestRate};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 256-bit position identifier, big-endian.
///
/// The zero id doubles as the "no hint" marker in the rate-ordered list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionId([u8; 32]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid position id '{0}'")]
pub struct PositionIdParseError(pub String);

impl PositionId {
    pub const ZERO: PositionId = PositionId([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PositionId(bytes)
    }

    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        PositionId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// First bytes of the id, for progress messages and logs.
    pub fn short(&self) -> String {
        format!("0x{}…", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for PositionId {
    type Err = PositionIdParseError;

    /// Accepts `0x`-prefixed hex (up to 64 digits, left-padded) or a decimal
    /// integer that fits in 64 bits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PositionIdParseError(s.to_string());
        if let Some(hex_part) = s.strip_prefix("0x") {
            if hex_part.is_empty() || hex_part.len() > 64 {
                return Err(err());
            }
            let padded = format!("{:0>64}", hex_part);
            let bytes = hex::decode(padded).map_err(|_| err())?;
            let mut out = [0u8; 32];
            out.copy_from_slice(&bytes);
            return Ok(PositionId(out));
        }
        s.parse::<u64>().map(PositionId::from_u64).map_err(|_| err())
    }
}

impl Serialize for PositionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PositionId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PositionId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// ABI-encode `(owner, index)` as two 32-byte words.
///
/// The owner is left-padded to a full word and the index is a big-endian
/// uint256, so no (owner, index) pair shares an encoding with another.
pub fn encode_owner_index(owner: &Address, index: u64) -> [u8; 64] {
    let mut encoded = [0u8; 64];
    encoded[12..32].copy_from_slice(&owner.to_bytes());
    encoded[56..64].copy_from_slice(&index.to_be_bytes());
    encoded
}

/// Derive the id the ledger assigns to `owner`'s `index`-th position:
/// `keccak256(abi.encode(owner, index))`.
pub fn derive_position_id(owner: &Address, index: u64) -> PositionId {
    let mut hasher = Keccak256::new();
    hasher.update(encode_owner_index(owner, index));
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    PositionId(out)
}

/// Latest ledger state of an open position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: PositionId,
    pub collateral: Decimal,
    /// Entire debt including accrued interest.
    pub debt: Decimal,
    pub annual_interest_rate: InterestRate,
    /// Seconds since Unix epoch.
    pub last_rate_adjustment: u64,
    pub recorded_debt: Decimal,
    pub weighted_recorded_debt: Decimal,
}
