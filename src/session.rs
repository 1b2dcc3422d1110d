use std::fmt;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};
use uuid::Uuid;

use crate::id::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(SerializeDisplay, DeserializeFromStr)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s).map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0.hyphenated())
    }
}

/// Server-side record that keeps a user's tokens valid. Deleting it
/// revokes every token carrying its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub uid: UserId,
}

impl Session {
    pub fn new(uid: UserId) -> Self {
        Self {
            id: SessionId::new(),
            uid,
        }
    }
}
