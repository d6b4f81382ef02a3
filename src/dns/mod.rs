//! The authoritative DNS responder.
//!
//! Serves queries of class IN over UDP and TCP for the delegated validation zone
//! ([`Config::domain`][crate::config::Config::domain]) and nothing else: no recursion,
//! no wildcard matching, no zone transfer. Question names are matched exactly and
//! case-insensitively.
//!
//! # Dynamic TXT records
//!
//! A `TXT` query for `<label>.<domain>` where `<label>` is a registered account
//! subdomain answers with one TXT record per stored challenge token, in storage
//! order, flagged authoritative with a short TTL so rotations propagate quickly.
//! A registered subdomain with no provisioned tokens yet answers NOERROR with an
//! empty answer section and the zone SOA in the authority section; an unregistered
//! label answers NXDOMAIN. Tokens are provisioned through the
//! [`/update` API endpoint][crate::api#update-post].
//!
//! E.g. after an authorized client pushes `token1` for subdomain `abc123`:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 +short abc123.acme.example.com TXT
//! "token1"
//! ```
//!
//! # Static records
//!
//! `SOA` queries for the zone apex synthesize the SOA from
//! [`Config::ns_domain`][crate::config::Config::ns_domain] and
//! [`Config::ns_admin`][crate::config::Config::ns_admin], with a date-based serial.
//! `NS` queries answer from [`Config::ns_records`][crate::config::Config::ns_records],
//! and `A`/`AAAA` queries from [`Config::addrs`][crate::config::Config::addrs] (IPv4
//! values for `A`, IPv6 for `AAAA`). None of these are influenced by the HTTP API.
//!
//! # Failure behavior
//!
//! Malformed datagrams are dropped by the listener without a response. A record
//! store failure answers SERVFAIL for that query only; the listener keeps serving.
//! UDP responses that exceed the transport size are truncated with the TC flag set,
//! and the same port serves TCP for the retry.

mod handlers;
pub mod server;

pub use handlers::{Answer, Handler};
pub use server::new;
