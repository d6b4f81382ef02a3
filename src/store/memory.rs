use crate::account::{Account, ValidationRecord};
use crate::error::Error;
use crate::store::{AccountKey, Backend};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use trust_dns_server::client::rr::LowerName;

/// The full store contents as plain maps. This is also the on-disk shape used by
/// [`super::FileBackend`].
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(super) struct StoreState {
    pub(super) accounts: HashMap<String, Account>,
    /// Subdomain index into `accounts`.
    pub(super) subdomains: HashMap<LowerName, String>,
    pub(super) records: HashMap<LowerName, ValidationRecord>,
}

/// In-memory [`Backend`]: guarded maps, not durable across restarts.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: RwLock<StoreState>,
}

impl InMemoryBackend {
    /// Clone out the current contents, for serialization to disk.
    pub(super) fn snapshot(&self) -> StoreState {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl From<StoreState> for InMemoryBackend {
    fn from(state: StoreState) -> Self {
        InMemoryBackend {
            state: RwLock::new(state),
        }
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    async fn load_account(&self, key: AccountKey<'_>) -> Result<Option<Account>, Error> {
        let state = self.state.read().map_err(|_| Error::StoreUnavailable)?;
        let account = match key {
            AccountKey::Id(id) => state.accounts.get(id),
            AccountKey::Subdomain(subdomain) => state
                .subdomains
                .get(subdomain)
                .and_then(|id| state.accounts.get(id)),
        };
        Ok(account.cloned())
    }

    async fn save_account(&self, account: Account) -> Result<(), Error> {
        let mut state = self.state.write().map_err(|_| Error::StoreUnavailable)?;
        state
            .subdomains
            .insert(account.subdomain.clone(), account.id.clone());
        state.accounts.insert(account.id.clone(), account);
        Ok(())
    }

    async fn load_record(&self, subdomain: &LowerName) -> Result<Option<ValidationRecord>, Error> {
        let state = self.state.read().map_err(|_| Error::StoreUnavailable)?;
        Ok(state.records.get(subdomain).cloned())
    }

    async fn save_record(&self, record: ValidationRecord) -> Result<(), Error> {
        let mut state = self.state.write().map_err(|_| Error::StoreUnavailable)?;
        state.records.insert(record.subdomain.clone(), record);
        Ok(())
    }
}
