use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::id::UserId;
use crate::session::SessionId;
use crate::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub uid: UserId,
    pub sid: SessionId,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signing keys plus the lifetimes of the tokens they mint.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl TokenKeys {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn mint(&self, kind: TokenKind, uid: UserId, sid: SessionId) -> Result<String, ()> {
        let now = Timestamp::now()?;
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };

        let exp = now.after(ttl);

        debug!("minting {kind:?} token for session {sid}, expires {exp}");
        self.encode(&Claims {
            uid,
            sid,
            kind,
            iat: now.as_i64(),
            exp: exp.as_i64(),
        })
    }

    pub fn mint_pair(&self, uid: UserId, sid: SessionId) -> Result<TokenPair, ()> {
        Ok(TokenPair {
            access: self.mint(TokenKind::Access, uid, sid)?,
            refresh: self.mint(TokenKind::Refresh, uid, sid)?,
        })
    }

    /// Checks signature, expiry and that the token is of the `expected` kind.
    pub fn verify(&self, expected: TokenKind, token: &str) -> Result<Claims, ()> {
        let validation = Validation::new(Algorithm::HS256);

        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("rejecting token: {e}");
            })?;

        if claims.kind != expected {
            debug!("rejecting {:?} token, wanted {expected:?}", claims.kind);
            return Err(());
        }

        Ok(claims)
    }

    fn encode(&self, claims: &Claims) -> Result<String, ()> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(
            |e| {
                error!("couldn't sign token: {e}");
            },
        )
    }
}
