//! tokendns
//!
//! A purpose-built authoritative DNS responder for [RFC-8555][RFC-8555] [DNS-01]
//! challenge validation, in the manner of [acme-dns]. Operators NS-delegate a small
//! zone to this responder; ACME clients register an account, receive a credential
//! and a validation subdomain, and push challenge tokens through a narrow HTTP API.
//! The responder serves them back as authoritative TXT records, so certificate
//! issuance never needs write access to the real zone.
//!
//! [acme-dns]: https://github.com/joohoi/acme-dns
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//!
#![warn(clippy::pedantic)]

pub mod account;
pub mod api;
pub mod auth;
pub mod config;
pub mod dns;
pub mod error;
pub mod store;

pub use account::{Account, ValidationRecord};
pub use config::{Config, SharedConfig};
pub use dns::new as new_dns;
pub use store::{FileBackend, InMemoryBackend, RecordStore, SharedStore};
