//! HTTP API for registering accounts and updating validation records.
//!
//! The API is expected to sit behind TLS termination or a private network; bind
//! addresses outside loopback/private space are rejected at startup.
//!
//! # API Endpoints
//!
//! ## `/health` (GET)
//!
//!   Returns HTTP 200 (OK) and the JSON body `{"ok":"healthy"}` when the service is
//!   operational.
//!
//! ## `/register` (POST)
//!
//!   Only served when
//!   [`Config::registration_enabled`][crate::config::Config::registration_enabled];
//!   otherwise returns HTTP 404.
//!
//!   Accepts an optional JSON request body of the form:
//!
//!   ```json
//!   { "allowfrom": [ "192.0.2.0/24", "2001:db8::/64" ] }
//!   ```
//!
//!   Allocates a new account and returns HTTP 200 (OK) with:
//!
//!   ```json
//!   {
//!     "id": "c36f50e8-...",
//!     "secret": "htB9mR9DYgcu...",
//!     "subdomain": "d420c923-...",
//!     "fulldomain": "d420c923-....acme.example.com.",
//!     "allowed_subnets": [ "192.0.2.0/24", "2001:db8::/64" ]
//!   }
//!   ```
//!
//!   The `secret` is returned exactly once; only its salted hash is stored.
//!
//! ## `/update` (POST)
//!
//!   Credentials travel in the `X-Api-User` and `X-Api-Key` headers. Expects a JSON
//!   request body of the form:
//!
//!   ```json
//!   { "subdomain": "d420c923-...", "txt": "XXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX" }
//!   ```
//!
//!   The `subdomain` must be the one assigned to the authenticated account, and the
//!   `txt` value a 1-255 byte printable-ASCII TXT payload. On success returns
//!   HTTP 200 (OK) with the post-update record state:
//!
//!   ```json
//!   { "subdomain": "d420c923-...", "values": [ "older-token", "XXXX..." ] }
//!   ```
//!
//!   Every failed check (unknown account, bad secret, source address outside the
//!   account's allow-list, subdomain not owned) returns the same HTTP 401 body.
//!   The specific reason is written to the audit log only.

mod api_error;
mod model;
mod routes;
pub mod server;

pub use server::{new, router};
