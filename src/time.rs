use std::fmt;
use std::time::Duration;

use log::error;
use serde::{Deserialize, Serialize};

/// Seconds since the unix epoch, as carried in token claims.
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn now() -> Result<Self, ()> {
        use std::time::SystemTime;

        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|duration| duration.as_secs() as i64)
            .map(Self)
            .map_err(|e| {
                error!("couldn't get time: {e:?}");
            })
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }

    pub fn after(self, ttl: Duration) -> Self {
        Self(self.0.saturating_add(ttl.as_secs() as i64))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self(0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(fmt, "<epoch>");
        }

        use ::time::{format_description::well_known::Rfc3339, OffsetDateTime};

        let formatted = OffsetDateTime::from_unix_timestamp(self.0)
            .ok()
            .and_then(|when| when.format(&Rfc3339).ok());

        match formatted {
            Some(s) => write!(fmt, "{}", s),
            None => write!(fmt, "{}", self.0),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Timestamp::default().to_string(), "<epoch>");
        assert_eq!(
            Timestamp(1_609_372_800).to_string(),
            "2020-12-31T00:00:00Z"
        );
    }

    #[test]
    fn after_adds_ttl() {
        let t = Timestamp(100).after(Duration::from_secs(3600));
        assert_eq!(t.as_i64(), 3700);
    }
}
