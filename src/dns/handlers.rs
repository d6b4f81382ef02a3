use crate::config::SharedConfig;
use crate::error::Error;
use crate::store::SharedStore;
use lazy_static::lazy_static;
use std::net::IpAddr;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::error;
use trust_dns_proto::rr::rdata::SOA;
use trust_dns_server::authority::MessageResponseBuilder;
use trust_dns_server::client::op::{Header, MessageType, OpCode, ResponseCode};
use trust_dns_server::client::rr::rdata::TXT;
use trust_dns_server::client::rr::{LowerName, Name, RData, Record, RecordType};
use trust_dns_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

/// The per-query request handler. Stateless across queries: each query is classified
/// against the static zone data and the record store independently.
#[derive(Clone)]
pub struct Handler {
    config: SharedConfig,
    store: SharedStore,
}

/// Outcome of classifying one question.
#[derive(Debug)]
pub enum Answer {
    /// Authoritative answer records for the question.
    Records(Vec<Record>),
    /// The name exists but holds no records of the asked type: NOERROR with an
    /// empty answer section and the zone SOA in the authority section.
    NoRecords,
    /// The name does not exist: NXDOMAIN, zone SOA in the authority section.
    NxDomain,
}

lazy_static! {
    static ref SERIAL_FORMATTER: &'static [time::format_description::FormatItem<'static>] =
        format_description!(version = 2, "[year][month][day]");
}

impl Handler {
    pub fn new(config: SharedConfig, store: SharedStore) -> Self {
        Handler { config, store }
    }

    /// Classify `name`/`qtype` against the static zone data and the record store.
    ///
    /// Matching is exact and case-insensitive; there is no wildcard matching and no
    /// recursion. A registered subdomain with no provisioned values answers
    /// [`Answer::NoRecords`] rather than NXDOMAIN, since the name exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] when the record store can't be consulted;
    /// the caller maps this to SERVFAIL for this query only.
    pub async fn lookup(&self, name: &LowerName, qtype: RecordType) -> Result<Answer, Error> {
        match qtype {
            RecordType::SOA if *name == self.config.domain => {
                Ok(Answer::Records(vec![self.soa_record()?]))
            }
            RecordType::NS if self.config.ns_records.contains_key(name) => {
                Ok(Answer::Records(self.ns_records(name)))
            }
            RecordType::A | RecordType::AAAA if self.config.addrs.contains_key(name) => {
                let records = self.addr_records(name, qtype);
                if records.is_empty() {
                    // Name configured, but no address of the asked family.
                    Ok(Answer::NoRecords)
                } else {
                    Ok(Answer::Records(records))
                }
            }
            RecordType::TXT if self.in_zone(name) && *name != self.config.domain => {
                match self.store.get(name).await {
                    Ok(record) if record.values.is_empty() => Ok(Answer::NoRecords),
                    Ok(record) => Ok(Answer::Records(self.txt_records(name, record.values))),
                    Err(Error::NotFound) if self.static_name_exists(name) => {
                        Ok(Answer::NoRecords)
                    }
                    Err(Error::NotFound) => Ok(Answer::NxDomain),
                    Err(err) => Err(err),
                }
            }
            _ => {
                if self.name_exists(name).await? {
                    Ok(Answer::NoRecords)
                } else {
                    Ok(Answer::NxDomain)
                }
            }
        }
    }

    fn in_zone(&self, name: &LowerName) -> bool {
        self.config.domain.zone_of(name)
    }

    fn static_name_exists(&self, name: &LowerName) -> bool {
        *name == self.config.domain
            || self.config.addrs.contains_key(name)
            || self.config.ns_records.contains_key(name)
    }

    async fn name_exists(&self, name: &LowerName) -> Result<bool, Error> {
        if self.static_name_exists(name) {
            return Ok(true);
        }
        if !self.in_zone(name) {
            return Ok(false);
        }
        match self.store.get(name).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn soa_record(&self) -> Result<Record, Error> {
        // NB: unwraps are safe: known date format producing values that will always parse as u32.
        let serial: u32 = OffsetDateTime::now_utc()
            .format(&SERIAL_FORMATTER)
            .unwrap()
            .parse()
            .unwrap();
        let ns_admin: Name = self.config.ns_admin()?;
        // See RIPE 203[0] for recommended values.
        // [0]: https://www.ripe.net/publications/docs/ripe-203
        let soa_rdata = RData::SOA(SOA::new(
            self.config.ns_domain.clone().into(),
            ns_admin,
            serial,
            86_400,    // 24 hrs.
            7_200,     // 2 hours.
            3_600_000, // 1000 hours.
            172_800,   // 2 days.
        ));
        Ok(Record::from_rdata(
            (&self.config.domain).into(),
            self.config.ttl,
            soa_rdata,
        ))
    }

    fn txt_records(&self, name: &LowerName, values: impl IntoIterator<Item = String>) -> Vec<Record> {
        values
            .into_iter()
            .map(|value| {
                Record::from_rdata(
                    name.into(),
                    self.config.ttl,
                    RData::TXT(TXT::new(vec![value])),
                )
            })
            .collect()
    }

    fn addr_records(&self, name: &LowerName, qtype: RecordType) -> Vec<Record> {
        self.config
            .addrs
            .get(name)
            .map_or(&[][..], Vec::as_slice)
            .iter()
            .filter_map(|ip| match (qtype, ip) {
                (RecordType::A, IpAddr::V4(ipv4_addr)) => Some(RData::A(*ipv4_addr)),
                (RecordType::AAAA, IpAddr::V6(ipv6_addr)) => Some(RData::AAAA(*ipv6_addr)),
                _ => None,
            })
            .map(|rdata| Record::from_rdata(name.into(), self.config.ttl, rdata))
            .collect()
    }

    fn ns_records(&self, name: &LowerName) -> Vec<Record> {
        self.config
            .ns_records
            .get(name)
            .map_or(&[][..], Vec::as_slice)
            .iter()
            .map(|ns| {
                Record::from_rdata(name.into(), self.config.ttl, RData::NS(ns.into()))
            })
            .collect()
    }

    async fn dispatch_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response: R,
    ) -> Result<ResponseInfo, Error> {
        // If it isn't a query, return NOTIMPL.
        if request.op_code() != OpCode::Query || request.message_type() != MessageType::Query {
            return self.handle_notimpl(request, response).await;
        }

        let name = request.query().name().clone();
        let qtype = request.query().query_type();
        match self.lookup(&name, qtype).await? {
            Answer::Records(records) => self.send_records(request, response, records).await,
            Answer::NoRecords => {
                self.send_soa_authority(request, response, ResponseCode::NoError)
                    .await
            }
            Answer::NxDomain => {
                self.send_soa_authority(request, response, ResponseCode::NXDomain)
                    .await
            }
        }
    }

    async fn handle_notimpl<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> Result<ResponseInfo, Error> {
        let response = MessageResponseBuilder::from_message_request(request);
        Ok(response_handle
            .send_response(response.error_msg(request.header(), ResponseCode::NotImp))
            .await?)
    }

    async fn send_records<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
        records: Vec<Record>,
    ) -> Result<ResponseInfo, Error> {
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        let builder = MessageResponseBuilder::from_message_request(request);
        let response = builder.build(header, records.iter(), &[], &[], &[]);
        Ok(response_handle.send_response(response).await?)
    }

    /// Empty-answer response carrying the zone SOA in the authority section (for
    /// in-zone names), with the given response code.
    async fn send_soa_authority<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
        code: ResponseCode,
    ) -> Result<ResponseInfo, Error> {
        let soa = if self.in_zone(request.query().name()) {
            vec![self.soa_record()?]
        } else {
            Vec::new()
        };
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        header.set_response_code(code);
        let builder = MessageResponseBuilder::from_message_request(request);
        let response = builder.build(header, &[], &[], soa.iter(), &[]);
        Ok(response_handle.send_response(response).await?)
    }
}

#[async_trait::async_trait]
impl RequestHandler for Handler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        match self.dispatch_request(request, response_handle.clone()).await {
            Ok(info) => info,
            Err(err) => {
                // Store trouble (or any internal error) fails this query only. The
                // client still gets SERVFAIL on the wire, under the query's
                // transaction id.
                error!("error in RequestHandler: {err:?}");
                let builder = MessageResponseBuilder::from_message_request(request);
                let servfail = builder.error_msg(request.header(), ResponseCode::ServFail);
                match response_handle.send_response(servfail).await {
                    Ok(info) => info,
                    Err(send_err) => {
                        error!("failed to send SERVFAIL: {send_err:?}");
                        let mut header = Header::new();
                        header.set_response_code(ResponseCode::ServFail);
                        header.into()
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::config::Config;
    use crate::store::{InMemoryBackend, RecordStore, SharedStore};
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_config() -> SharedConfig {
        let conf: Config = serde_json::from_str(
            r#"{
                "domain": "acme.example.com",
                "ns_domain": "ns1.example.com",
                "ns_admin": "admin@example.com",
                "api_bind_addr": "127.0.0.1:3000",
                "api_timeout": 30,
                "dns_udp_bind_addr": "127.0.0.1:5353",
                "dns_tcp_bind_addr": "127.0.0.1:5353",
                "dns_tcp_timeout": 10,
                "ttl": 30,
                "addrs": {
                    "acme.example.com": ["192.0.2.10", "2001:db8::10"]
                },
                "ns_records": {
                    "acme.example.com": ["ns1.example.com"]
                }
            }"#,
        )
        .unwrap();
        Arc::new(conf)
    }

    fn test_store() -> SharedStore {
        Arc::new(RecordStore::new(
            Box::<InMemoryBackend>::default(),
            Duration::from_secs(1),
        ))
    }

    fn name(s: &str) -> LowerName {
        LowerName::from(Name::from_str(s).unwrap())
    }

    async fn register(store: &SharedStore, label: &str) -> LowerName {
        let fqdn = name(&format!("{label}.acme.example.com."));
        store
            .create(Account {
                id: format!("id-{label}"),
                secret_hash: "$2y$10$unused".to_string(),
                subdomain: fqdn.clone(),
                allowed_subnets: vec![],
            })
            .await
            .unwrap();
        fqdn
    }

    fn txt_values(answer: &Answer) -> Vec<String> {
        match answer {
            Answer::Records(records) => records
                .iter()
                .filter_map(|r| match r.data() {
                    Some(RData::TXT(txt)) => Some(
                        txt.txt_data()
                            .iter()
                            .map(|seg| String::from_utf8_lossy(seg).into_owned())
                            .collect::<String>(),
                    ),
                    _ => None,
                })
                .collect(),
            _ => panic!("expected records, got {answer:?}"),
        }
    }

    #[tokio::test]
    async fn apex_soa_is_static() {
        let handler = Handler::new(test_config(), test_store());
        let answer = handler
            .lookup(&name("acme.example.com."), RecordType::SOA)
            .await
            .unwrap();
        let Answer::Records(records) = answer else {
            panic!("expected SOA records");
        };
        assert_eq!(records.len(), 1);
        let Some(RData::SOA(soa)) = records[0].data() else {
            panic!("expected SOA rdata");
        };
        assert_eq!(soa.mname(), &Name::from_str("ns1.example.com").unwrap());
        assert_eq!(soa.refresh(), 7_200);
    }

    #[tokio::test]
    async fn apex_ns_is_static() {
        let handler = Handler::new(test_config(), test_store());
        let answer = handler
            .lookup(&name("acme.example.com."), RecordType::NS)
            .await
            .unwrap();
        let Answer::Records(records) = answer else {
            panic!("expected NS records");
        };
        assert!(matches!(records[0].data(), Some(RData::NS(_))));
    }

    #[tokio::test]
    async fn a_and_aaaa_split_by_family() {
        let handler = Handler::new(test_config(), test_store());
        let apex = name("acme.example.com.");

        let Answer::Records(a) = handler.lookup(&apex, RecordType::A).await.unwrap() else {
            panic!("expected A records");
        };
        assert_eq!(a.len(), 1);
        assert!(matches!(a[0].data(), Some(RData::A(_))));
        assert_eq!(a[0].ttl(), 30);

        let Answer::Records(aaaa) = handler.lookup(&apex, RecordType::AAAA).await.unwrap() else {
            panic!("expected AAAA records");
        };
        assert_eq!(aaaa.len(), 1);
        assert!(matches!(aaaa[0].data(), Some(RData::AAAA(_))));
    }

    #[tokio::test]
    async fn registered_empty_record_is_no_records_not_nxdomain() {
        let store = test_store();
        let fqdn = register(&store, "abc").await;
        let handler = Handler::new(test_config(), store);
        let answer = handler.lookup(&fqdn, RecordType::TXT).await.unwrap();
        assert!(matches!(answer, Answer::NoRecords));
    }

    #[tokio::test]
    async fn unregistered_subdomain_is_nxdomain() {
        let handler = Handler::new(test_config(), test_store());
        let answer = handler
            .lookup(&name("ghost.acme.example.com."), RecordType::TXT)
            .await
            .unwrap();
        assert!(matches!(answer, Answer::NxDomain));
    }

    #[tokio::test]
    async fn txt_answers_in_storage_order() {
        let store = test_store();
        let fqdn = register(&store, "abc").await;
        store.update(&fqdn, "token1".to_string()).await.unwrap();
        store.update(&fqdn, "token2".to_string()).await.unwrap();

        let handler = Handler::new(test_config(), store.clone());
        let answer = handler.lookup(&fqdn, RecordType::TXT).await.unwrap();
        assert_eq!(txt_values(&answer), ["token1", "token2"]);

        store.update(&fqdn, "token3".to_string()).await.unwrap();
        let answer = handler.lookup(&fqdn, RecordType::TXT).await.unwrap();
        assert_eq!(txt_values(&answer), ["token2", "token3"]);
    }

    #[tokio::test]
    async fn txt_lookup_ignores_query_case() {
        let store = test_store();
        let fqdn = register(&store, "abc").await;
        store.update(&fqdn, "token1".to_string()).await.unwrap();

        let handler = Handler::new(test_config(), store);
        let answer = handler
            .lookup(&name("ABC.Acme.EXAMPLE.com."), RecordType::TXT)
            .await
            .unwrap();
        assert_eq!(txt_values(&answer), ["token1"]);
    }

    #[tokio::test]
    async fn out_of_zone_name_is_nxdomain() {
        let handler = Handler::new(test_config(), test_store());
        let answer = handler
            .lookup(&name("www.other.example."), RecordType::A)
            .await
            .unwrap();
        assert!(matches!(answer, Answer::NxDomain));
    }

    #[tokio::test]
    async fn unserved_type_on_existing_name_is_no_records() {
        let store = test_store();
        let fqdn = register(&store, "abc").await;
        let handler = Handler::new(test_config(), store);

        let answer = handler.lookup(&fqdn, RecordType::MX).await.unwrap();
        assert!(matches!(answer, Answer::NoRecords));

        // Apex TXT: the name exists but serves no TXT.
        let answer = handler
            .lookup(&name("acme.example.com."), RecordType::TXT)
            .await
            .unwrap();
        assert!(matches!(answer, Answer::NoRecords));
    }

    #[tokio::test]
    async fn soa_and_ns_unaffected_by_store_contents() {
        let store = test_store();
        let fqdn = register(&store, "abc").await;
        store.update(&fqdn, "token1".to_string()).await.unwrap();

        let handler = Handler::new(test_config(), store);
        let apex = name("acme.example.com.");
        assert!(matches!(
            handler.lookup(&apex, RecordType::SOA).await.unwrap(),
            Answer::Records(_)
        ));
        assert!(matches!(
            handler.lookup(&apex, RecordType::NS).await.unwrap(),
            Answer::Records(_)
        ));
    }
}
