//! Token metadata carried by asset deposits
//!
//! Metadata is `abi.encode(string name, string symbol, uint8 decimals)`. It is
//! hashed into the leaf and, on first claim of a foreign token, appended to the
//! wrapped-token template to form the init code.

use serde::{Deserialize, Serialize};

const WORD: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenMetadata {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            decimals,
        }
    }

    /// ABI encoding of `(string, string, uint8)`.
    pub fn encode(&self) -> Vec<u8> {
        let name_tail = encode_string(&self.name);
        let symbol_offset = 3 * WORD + name_tail.len();

        let mut out = Vec::with_capacity(symbol_offset + padded_len(self.symbol.len()) + WORD);
        out.extend_from_slice(&word_from_usize(3 * WORD));
        out.extend_from_slice(&word_from_usize(symbol_offset));
        out.extend_from_slice(&word_from_usize(self.decimals as usize));
        out.extend_from_slice(&name_tail);
        out.extend_from_slice(&encode_string(&self.symbol));
        out
    }

    /// Decode ABI-encoded metadata. Returns `None` for malformed input.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let name_offset = read_usize(data, 0)?;
        let symbol_offset = read_usize(data, WORD)?;
        let decimals = read_usize(data, 2 * WORD)?;
        if decimals > u8::MAX as usize {
            return None;
        }

        Some(Self {
            name: read_string(data, name_offset)?,
            symbol: read_string(data, symbol_offset)?,
            decimals: decimals as u8,
        })
    }
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

fn word_from_usize(value: usize) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    word
}

fn encode_string(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(WORD + padded_len(bytes.len()));
    out.extend_from_slice(&word_from_usize(bytes.len()));
    out.extend_from_slice(bytes);
    out.resize(WORD + padded_len(bytes.len()), 0);
    out
}

fn read_usize(data: &[u8], at: usize) -> Option<usize> {
    let word = data.get(at..at.checked_add(WORD)?)?;
    // Anything above 64 bits cannot be a valid offset or length here.
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return None;
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(low)).ok()
}

fn read_string(data: &[u8], offset: usize) -> Option<String> {
    let len = read_usize(data, offset)?;
    let start = offset.checked_add(WORD)?;
    let bytes = data.get(start..start.checked_add(len)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}
