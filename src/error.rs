//! Error types.

use axum::extract::rejection::JsonRejection;
use std::net::IpAddr;
use trust_dns_server::proto::error::ProtoError;

/// Error enumerates the possible tokendns error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned for every failed authorization check on the
    /// [`/update` API endpoint][crate::api#update-post].
    ///
    /// Deliberately carries no detail: an unknown account, a bad credential and a
    /// disallowed source address must be indistinguishable to the caller. The
    /// specific cause is written to the audit log only.
    #[error("unauthorized")]
    Unauthorized,

    /// Returned when clients `POST` the [`/register` API endpoint][crate::api#register-post]
    /// while the operator has disabled self-registration.
    #[error("registration is disabled")]
    RegistrationDisabled,

    /// Returned when a subdomain or account is not present in the record store.
    #[error("unknown subdomain")]
    NotFound,

    /// Returned by [`RecordStore::create`][crate::store::RecordStore::create] when the
    /// generated identifier or subdomain is already taken. Registration retries with a
    /// fresh identifier; callers never see this directly.
    #[error("identifier already registered")]
    Conflict,

    /// Returned when clients `POST` the [`/update` API endpoint][crate::api#update-post]
    /// with a `txt` value that is not a valid TXT character-string (1-255 bytes of
    /// printable ASCII).
    #[error("TXT value must be 1-255 printable ASCII characters")]
    InvalidTxtValue,

    /// Returned when clients `POST` the [`/update` API endpoint][crate::api#update-post]
    /// with a `subdomain` field that does not parse as a DNS name.
    #[error("subdomain is not a valid DNS name")]
    InvalidSubdomain,

    /// Returned when a record store backend call fails or exceeds its timeout. Maps to
    /// SERVFAIL on the DNS side and HTTP 503 on the API side.
    #[error("record store unavailable")]
    StoreUnavailable,

    /// Returned when hashing or verifying credential material fails.
    #[error("credential hashing failed")]
    Hash(#[from] bcrypt::BcryptError),

    /// Returned when clients `POST` invalid JSON.
    #[error(transparent)]
    JsonExtractorRejection(#[from] JsonRejection),

    /// Returned when the [`Config::api_bind_addr`][crate::config::Config::api_bind_addr] is
    /// not a loopback address, or an address within a private network space. The HTTP API
    /// carries plaintext credentials and is intended to sit behind TLS termination or a
    /// private network.
    #[error("API bind address ({0}) must be a loopback or private IP")]
    InsecureApiBind(IpAddr),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    Io(#[from] std::io::Error),

    /// Returned when processing JSON from disk (config or persisted store state) fails
    /// due to invalid content.
    #[error("invalid JSON")]
    InvalidJson(#[from] serde_json::Error),

    /// Returned when the DNS server encounters a generic DNS protocol error.
    #[error("DNS error")]
    Dns(#[from] ProtoError),
}
