//! Domain primitives: Address, Side.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 20-byte account or contract address, held as a lowercase `0x` hex string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address '{0}': expected 0x followed by 40 hex characters")]
pub struct AddressParseError(pub String);

impl Address {
    /// Parse and normalize an address string.
    pub fn parse(addr: &str) -> Result<Self, AddressParseError> {
        let hex_part = addr
            .strip_prefix("0x")
            .or_else(|| addr.strip_prefix("0X"))
            .ok_or_else(|| AddressParseError(addr.to_string()))?;
        if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressParseError(addr.to_string()));
        }
        Ok(Address(format!("0x{}", hex_part.to_ascii_lowercase())))
    }

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(format!("0x{}", hex::encode(bytes)))
    }

    /// The all-zero address.
    pub fn zero() -> Self {
        Self::from_bytes([0u8; 20])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        // Validated on construction.
        if let Ok(bytes) = hex::decode(&self.0[2..]) {
            out.copy_from_slice(&bytes);
        }
        out
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl std::str::FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the order book a quote is built for.
///
/// Borrow-side quotes fill against lender offers; lend-side quotes fill
/// against borrower demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Borrow,
    Lend,
}

impl Side {
    pub fn parse(s: &str) -> Option<Side> {
        match s.to_ascii_lowercase().as_str() {
            "borrow" => Some(Side::Borrow),
            "lend" => Some(Side::Lend),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Borrow => write!(f, "borrow"),
            Side::Lend => write!(f, "lend"),
        }
    }
}
