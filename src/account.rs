//! Accounts and validation records.
//!
//! An [`Account`] is the unit of authorization: an opaque identifier (the public half
//! of the credential), a salted one-way hash of the API secret, the DNS name the
//! account controls, and an optional source-address allow-list. A [`ValidationRecord`]
//! holds the challenge tokens currently served for that name.

use crate::error::Error;
use ipnetwork::IpNetwork;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;
use trust_dns_server::client::rr::{LowerName, Name};
use uuid::Uuid;

/// Bcrypt work factor for API secrets. High enough to make offline guessing
/// expensive, low enough that an update round-trip stays interactive.
pub(crate) const HASH_COST: u32 = 10;

/// Generated API secrets are 40 alphanumeric characters, ~238 bits of entropy.
const SECRET_LEN: usize = 40;

/// A registered update client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Opaque identifier presented as `X-Api-User` on updates.
    pub id: String,
    /// Bcrypt hash (salt embedded) of the API secret. The plaintext is returned to
    /// the registrant exactly once and never stored.
    pub secret_hash: String,
    /// The fully qualified validation name this account may write to.
    pub subdomain: LowerName,
    /// Source networks permitted to call `/update`. Empty means unrestricted.
    pub allowed_subnets: Vec<IpNetwork>,
}

impl Account {
    /// Mint a new account under `zone` with a fresh identifier, subdomain label and
    /// secret. Returns the account plus the plaintext secret, which the caller must
    /// hand to the registrant and then drop.
    pub fn generate(zone: &LowerName, allowed_subnets: Vec<IpNetwork>) -> Result<(Self, String), Error> {
        let id = Uuid::new_v4().to_string();
        let label = Name::from_str(&Uuid::new_v4().to_string())?;
        let subdomain = label.append_domain(&Name::from(zone))?.into();
        let secret = generate_secret();
        let secret_hash = bcrypt::hash(&secret, HASH_COST)?;
        Ok((
            Account {
                id,
                secret_hash,
                subdomain,
                allowed_subnets,
            },
            secret,
        ))
    }

    /// Constant-time comparison of a presented secret against the stored hash.
    pub fn verify_secret(&self, presented: &str) -> bool {
        bcrypt::verify(presented, &self.secret_hash).unwrap_or(false)
    }

    /// The bare label portion of [`Account::subdomain`], as shown to API clients.
    pub fn label(&self) -> String {
        Name::from(&self.subdomain)
            .iter()
            .next()
            .map(|l| String::from_utf8_lossy(l).into_owned())
            .unwrap_or_default()
    }
}

fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

/// Most recent challenge tokens for one validation name.
///
/// At most [`MAX_TXT_VALUES`] are retained so that a domain and its wildcard can be
/// validated in one overlapping issuance; each further update evicts the oldest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub subdomain: LowerName,
    /// Stored oldest-first; served in this order.
    pub values: VecDeque<String>,
}

/// Retention bound on [`ValidationRecord::values`].
pub const MAX_TXT_VALUES: usize = 2;

impl ValidationRecord {
    pub fn new(subdomain: LowerName) -> Self {
        ValidationRecord {
            subdomain,
            values: VecDeque::new(),
        }
    }

    /// Append `value`, evicting the oldest entry once the bound is reached.
    pub fn rotate_in(&mut self, value: String) {
        self.values.push_back(value);
        while self.values.len() > MAX_TXT_VALUES {
            self.values.pop_front();
        }
    }
}

/// Check that `value` is a well-formed TXT character-string: 1-255 bytes of
/// printable ASCII. Rejected values are never stored.
pub fn validate_txt_value(value: &str) -> Result<(), Error> {
    if value.is_empty() || value.len() > 255 {
        return Err(Error::InvalidTxtValue);
    }
    if !value.bytes().all(|b| (b' '..=b'~').contains(&b)) {
        return Err(Error::InvalidTxtValue);
    }
    Ok(())
}
