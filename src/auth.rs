//! The authorization guard for record updates.
//!
//! Verifies the claimed account identity, the presented API secret, and the caller's
//! source address against the account's allow-list. The externally visible outcome is
//! binary: the account on success, [`Error::Unauthorized`] otherwise. The detailed
//! deny reason goes only to the audit log, and the unknown-account path performs the
//! same bcrypt work as the known-account path so the two are not separable by timing.

use crate::account::{Account, HASH_COST};
use crate::error::Error;
use crate::store::{AccountKey, RecordStore};
use lazy_static::lazy_static;
use std::net::IpAddr;

lazy_static! {
    /// Stand-in hash verified against when the claimed account does not exist. Same
    /// cost as real account hashes so both branches cost one bcrypt verification.
    static ref DUMMY_HASH: String = bcrypt::hash("tokendns-nonexistent-account", HASH_COST)
        .expect("bcrypt hash of fixed input");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DenyReason {
    UnknownAccount,
    BadCredential,
    AddressNotAllowed,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::UnknownAccount => f.write_str("unknown account"),
            DenyReason::BadCredential => f.write_str("bad credential"),
            DenyReason::AddressNotAllowed => f.write_str("address not allowed"),
        }
    }
}

/// Check `presented_secret` and `caller` against the account claimed by
/// `claimed_id`. Pure aside from the store read; performs no mutation.
///
/// # Errors
///
/// Returns [`Error::Unauthorized`] for an unknown account, a credential mismatch, or
/// a caller outside the account's allow-list, without distinguishing which.
///
/// Returns [`Error::StoreUnavailable`] if the account lookup fails; this is surfaced
/// as a server error, not an authorization failure.
pub async fn authorize(
    store: &RecordStore,
    claimed_id: &str,
    presented_secret: &str,
    caller: IpAddr,
) -> Result<Account, Error> {
    let account = match store.get_account(AccountKey::Id(claimed_id)).await {
        Ok(account) => Some(account),
        Err(Error::NotFound) => None,
        Err(err) => return Err(err),
    };

    // Verify against the dummy hash when the account is absent: the comparison work
    // must not reveal whether the account exists. bcrypt's own comparison is
    // fixed-time in the presented secret.
    let hash = account
        .as_ref()
        .map_or(DUMMY_HASH.as_str(), |a| a.secret_hash.as_str());
    let secret_ok = bcrypt::verify(presented_secret, hash).unwrap_or(false);

    let Some(account) = account else {
        return deny(DenyReason::UnknownAccount, claimed_id, caller);
    };
    if !secret_ok {
        return deny(DenyReason::BadCredential, claimed_id, caller);
    }
    if !address_allowed(&account, caller) {
        return deny(DenyReason::AddressNotAllowed, claimed_id, caller);
    }
    Ok(account)
}

fn address_allowed(account: &Account, caller: IpAddr) -> bool {
    account.allowed_subnets.is_empty()
        || account
            .allowed_subnets
            .iter()
            .any(|network| network.contains(caller))
}

fn deny(reason: DenyReason, claimed_id: &str, caller: IpAddr) -> Result<Account, Error> {
    // Audit log entry for every deny; the caller-facing error stays uniform.
    tracing::warn!(%caller, account = claimed_id, "update denied: {reason}");
    Err(Error::Unauthorized)
}
