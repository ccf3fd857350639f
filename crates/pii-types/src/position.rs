//! Character addressing: `(page_num, block_num, offset)`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A textual address (position or coordinate key) could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address {input:?}: {reason}")]
pub struct AddressParseError {
    pub input: String,
    pub reason: String,
}

impl AddressParseError {
    pub fn new(input: &str, reason: &str) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Page and block of a text unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockAddress {
    pub page_num: u32,
    pub block_num: u32,
}

impl BlockAddress {
    pub fn new(page_num: u32, block_num: u32) -> Self {
        Self {
            page_num,
            block_num,
        }
    }

    pub fn at(&self, offset: usize) -> PositionRef {
        PositionRef::new(self.page_num, self.block_num, offset)
    }
}

impl fmt::Display for BlockAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} block {}", self.page_num, self.block_num)
    }
}

/// Address of one character: offset counts Unicode scalar values in the
/// block's plain text. `offset == len` is valid as an exclusive end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionRef {
    #[serde(alias = "page")]
    pub page_num: u32,
    #[serde(alias = "block")]
    pub block_num: u32,
    pub offset: usize,
}

impl PositionRef {
    pub fn new(page_num: u32, block_num: u32, offset: usize) -> Self {
        Self {
            page_num,
            block_num,
            offset,
        }
    }

    pub fn block(&self) -> BlockAddress {
        BlockAddress::new(self.page_num, self.block_num)
    }
}

impl fmt::Display for PositionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.page_num, self.block_num, self.offset)
    }
}

impl FromStr for PositionRef {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| AddressParseError::new(s, "expected \"(page,block,offset)\""))?;

        let parts: Vec<&str> = inner.split(',').collect();
        if parts.len() != 3 {
            return Err(AddressParseError::new(s, "expected three integers"));
        }
        // `u32::from_str` accepts a leading '+', the textual form does not
        if parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(AddressParseError::new(s, "components must be plain integers"));
        }

        let page_num = parts[0]
            .parse()
            .map_err(|_| AddressParseError::new(s, "page_num out of range"))?;
        let block_num = parts[1]
            .parse()
            .map_err(|_| AddressParseError::new(s, "block_num out of range"))?;
        let offset = parts[2]
            .parse()
            .map_err(|_| AddressParseError::new(s, "offset out of range"))?;

        Ok(PositionRef::new(page_num, block_num, offset))
    }
}
