//! Minimal ABI codec for static-typed contract calls.
//!
//! Every argument and return value we deal with is a static type
//! (uint256, address, bool), so a call is a 4-byte selector followed by
//! 32-byte words and a result is a flat run of words.

use crate::domain::{Address, PositionId};
use sha3::{Digest, Keccak256};
use thiserror::Error;

pub type Word = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("return data length {0} is not a multiple of 32")]
    Misaligned(usize),
    #[error("expected at least {expected} words, got {got}")]
    TooShort { expected: usize, got: usize },
    #[error("word does not fit in {0} bits")]
    Overflow(u32),
    #[error("word is not a valid {0}")]
    InvalidValue(&'static str),
}

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn encode_call(signature: &str, args: &[Word]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 * args.len());
    data.extend_from_slice(&selector(signature));
    for word in args {
        data.extend_from_slice(word);
    }
    data
}

pub fn decode_words(data: &[u8]) -> Result<Vec<Word>, AbiError> {
    if data.len() % 32 != 0 {
        return Err(AbiError::Misaligned(data.len()));
    }
    Ok(data
        .chunks_exact(32)
        .map(|chunk| {
            let mut word = [0u8; 32];
            word.copy_from_slice(chunk);
            word
        })
        .collect())
}

pub fn expect_words(words: &[Word], expected: usize) -> Result<(), AbiError> {
    if words.len() < expected {
        return Err(AbiError::TooShort {
            expected,
            got: words.len(),
        });
    }
    Ok(())
}

pub fn word_from_u128(value: u128) -> Word {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn word_from_u64(value: u64) -> Word {
    word_from_u128(value as u128)
}

pub fn word_from_address(address: &Address) -> Word {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&address.to_bytes());
    word
}

pub fn word_from_id(id: &PositionId) -> Word {
    *id.as_bytes()
}

pub fn word_to_u128(word: &Word) -> Result<u128, AbiError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow(128));
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(bytes))
}

pub fn word_to_u64(word: &Word) -> Result<u64, AbiError> {
    let value = word_to_u128(word)?;
    u64::try_from(value).map_err(|_| AbiError::Overflow(64))
}

/// Low 64 bits of a word; used for random seeds where the high bits carry no
/// meaning to us.
pub fn word_low_u64(word: &Word) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[24..]);
    u64::from_be_bytes(bytes)
}

pub fn word_to_bool(word: &Word) -> Result<bool, AbiError> {
    match word_to_u128(word) {
        Ok(0) => Ok(false),
        Ok(1) => Ok(true),
        _ => Err(AbiError::InvalidValue("bool")),
    }
}

pub fn word_to_address(word: &Word) -> Result<Address, AbiError> {
    if word[..12].iter().any(|b| *b != 0) {
        return Err(AbiError::InvalidValue("address"));
    }
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&word[12..]);
    Ok(Address::from_bytes(bytes))
}

pub fn word_to_id(word: &Word) -> PositionId {
    PositionId::from_bytes(*word)
}
