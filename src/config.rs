use crate::error::Error;
use crate::store::file::FileBackend;
use crate::store::memory::InMemoryBackend;
use crate::store::{RecordStore, SharedStore};
use ipnetwork::IpNetwork;
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use trust_dns_server::client::rr::{LowerName, Name};

pub type SharedConfig = Arc<Config>;

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// The delegated zone apex. All dynamic validation subdomains live under this name.
    pub domain: LowerName,
    pub ns_domain: LowerName,
    pub ns_admin: String,
    /// Path to the persisted store state. When absent the store is memory-only and
    /// accounts do not survive restarts.
    pub store_state_path: Option<String>,
    pub api_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub api_timeout: Duration,
    pub dns_udp_bind_addr: SocketAddr,
    pub dns_tcp_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub dns_tcp_timeout: Duration,
    /// Bound on each store backend call; expiry degrades to SERVFAIL/HTTP 503.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_store_timeout")]
    pub store_timeout: Duration,
    /// TTL on every served record, in seconds. Kept short so rotated challenge
    /// tokens propagate quickly.
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    /// Whether `POST /register` is open. Operators pre-provisioning accounts out of
    /// band set this to false.
    #[serde(default = "default_registration_enabled")]
    pub registration_enabled: bool,
    /// Static A/AAAA answers, e.g. for the responder's own glue name.
    #[serde(default)]
    pub addrs: HashMap<LowerName, Vec<IpAddr>>,
    /// Static NS answers for the zone apex (and any other served name).
    #[serde(default)]
    pub ns_records: HashMap<LowerName, Vec<LowerName>>,
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_ttl() -> u32 {
    60
}

fn default_registration_enabled() -> bool {
    true
}

lazy_static! {
    // NOTE(XXX): Once the "ip" feature has stabilized we can use Ipv6Addr.is_unique_local[0].
    //            Presently this feature is unstable so we home-roll. See also RFC 4193[1].
    // [0]: https://doc.rust-lang.org/std/net/struct.Ipv6Addr.html#method.is_unique_local
    // [1]: https://www.rfc-editor.org/rfc/rfc4193.html
    static ref IPV6_UNIQUE_LOCAL_NETWORK: IpNetwork = IpNetwork::from_str("fc00::/7").unwrap();
}

impl Config {
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        conf.bind_addr_is_secure()?;
        Ok(conf)
    }

    /// Build the record store described by this config: file-backed when
    /// [`Config::store_state_path`] is set, memory-only otherwise.
    pub async fn record_store(&self) -> Result<SharedStore, Error> {
        let store = match &self.store_state_path {
            Some(path) => RecordStore::new(
                Box::new(FileBackend::try_from_file(path).await?),
                self.store_timeout,
            ),
            None => RecordStore::new(Box::<InMemoryBackend>::default(), self.store_timeout),
        };
        Ok(Arc::new(store))
    }

    /// The fully qualified name `<label>.<domain>` a validation subdomain is served at.
    pub fn fqdn(&self, label: &Name) -> Result<LowerName, Error> {
        Ok(label
            .clone()
            .append_domain(&Name::from(&self.domain))?
            .into())
    }

    pub fn ns_admin(&self) -> Result<Name, Error> {
        Ok(Name::from_str(&self.sanitized_ns_admin())?)
    }

    fn sanitized_ns_admin(&self) -> Cow<str> {
        match self.ns_admin.split_once('@') {
            Some((user, domain)) => {
                let user = user.replace('.', "\\.");
                Cow::Owned(format!("{user}.{domain}"))
            }
            _ => Cow::Borrowed(&self.ns_admin),
        }
    }

    fn bind_addr_is_secure(&self) -> Result<(), Error> {
        match self.api_bind_addr {
            SocketAddr::V4(v4_addr) => {
                let ip = v4_addr.ip();
                if !ip.is_loopback() && !ip.is_private() {
                    return Err(Error::InsecureApiBind(IpAddr::V4(*ip)));
                }
                Ok(())
            }
            SocketAddr::V6(v6_addr) => {
                let ip = v6_addr.ip();
                if !ip.is_loopback() && !IPV6_UNIQUE_LOCAL_NETWORK.contains(IpAddr::V6(*ip)) {
                    return Err(Error::InsecureApiBind(IpAddr::V6(*ip)));
                }
                Ok(())
            }
        }
    }
}
