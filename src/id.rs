use std::fmt;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};
use uuid::Uuid;

use crate::time::Timestamp;

const LEN: usize = 12;

/// Opaque 12 byte identifier, rendered as 24 lowercase hex digits.
///
/// The first four bytes are the big-endian creation time in seconds, the
/// remainder is random, so ids sort roughly by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(SerializeDisplay, DeserializeFromStr)]
pub struct ObjectId([u8; LEN]);

pub type UserId = ObjectId;
pub type CardId = ObjectId;

impl ObjectId {
    pub fn new() -> Self {
        let secs = Timestamp::now().unwrap_or_default().as_i64() as u32;
        let random = Uuid::new_v4();

        let mut bytes = [0u8; LEN];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..].copy_from_slice(&random.as_bytes()[..LEN - 4]);

        Self(bytes)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(fmt, "{b:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct InvalidId;

impl fmt::Display for InvalidId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "expected {} hex digits", LEN * 2)
    }
}

impl FromStr for ObjectId {
    type Err = InvalidId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != LEN * 2 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidId);
        }

        let mut bytes = [0u8; LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &s[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16).map_err(|_| InvalidId)?;
        }

        Ok(Self(bytes))
    }
}
