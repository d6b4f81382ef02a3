use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone, Default)]
pub(super) struct RegisterRequest {
    /// Source networks permitted to call `/update` for the new account. Empty or
    /// omitted means unrestricted.
    #[serde(default)]
    pub allowfrom: Vec<IpNetwork>,
}

/// The one-time registration response. `secret` is shown here and never again.
#[derive(Serialize, Debug, Clone)]
pub(super) struct RegisterResponse {
    pub id: String,
    pub secret: String,
    pub subdomain: String,
    pub fulldomain: String,
    pub allowed_subnets: Vec<IpNetwork>,
}

#[derive(Deserialize, Debug, Clone, Default, Ord, PartialOrd, Eq, PartialEq)]
pub(super) struct UpdateRequest {
    /// The account's subdomain, as a bare label or the full validation name.
    pub subdomain: String,
    pub txt: String,
}

/// Post-update record state: the challenge tokens now served, in storage order.
#[derive(Serialize, Debug, Clone, Default, Ord, PartialOrd, Eq, PartialEq)]
pub(super) struct UpdateResponse {
    pub subdomain: String,
    pub values: Vec<String>,
}
