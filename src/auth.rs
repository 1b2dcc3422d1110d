use std::str::FromStr;

use serde::Deserialize;
use uuid::Uuid;

/// Token taken from an `Authorization: Bearer <token>` header.
#[derive(Debug)]
pub struct Bearer(String);

#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl FromStr for Bearer {
    type Err = &'static str;

    fn from_str(header: &str) -> Result<Self, Self::Err> {
        let (scheme, token) = header
            .split_once(' ')
            .ok_or("no space in auth header")?;

        if scheme != "Bearer" {
            return Err("only bearer auth supported");
        }

        let token = token.trim();
        if token.is_empty() {
            return Err("empty bearer token");
        }

        Ok(Self(token.into()))
    }
}

impl Bearer {
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl Credentials {
    /// Stored as `salt$sha256(salt:password)`.
    pub fn calc_pwhash(&self) -> String {
        let salt = Uuid::new_v4().simple().to_string();
        salted_hash(&salt, &self.password)
    }

    pub fn matches(&self, pwhash: &str) -> bool {
        match pwhash.split_once('$') {
            Some((salt, _)) => salted_hash(salt, &self.password) == pwhash,
            None => false,
        }
    }
}

fn salted_hash(salt: &str, pass: &str) -> String {
    let digest = sha256::digest(format!("{salt}:{pass}").as_str());
    format!("{salt}${digest}")
}
