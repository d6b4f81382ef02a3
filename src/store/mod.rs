//! The record store: accounts, validation records, and the persistence boundary.
//!
//! [`RecordStore`] owns all synchronization. Callers share it through an [`Arc`] and
//! need no locking of their own: reads see either the pre-update or the committed
//! post-update record, never a torn intermediate. Updates to the same subdomain are
//! serialized last-committed-wins through a per-subdomain lock, so updates to
//! different subdomains proceed independently and reads are never queued behind a
//! writer at this layer.
//!
//! Durable storage sits behind the [`Backend`] trait, with two implementations:
//! [`memory::InMemoryBackend`] (not durable across restarts) and [`file::FileBackend`]
//! (JSON snapshot on disk, reloaded on startup). Every backend call is bounded by the
//! configured store timeout so a wedged backend degrades to
//! [`Error::StoreUnavailable`] instead of hanging the serving task.

use crate::account::{Account, ValidationRecord};
use crate::error::Error;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use trust_dns_server::client::rr::LowerName;

pub mod file;
pub mod memory;

#[allow(clippy::module_name_repetitions)]
pub use file::FileBackend;
#[allow(clippy::module_name_repetitions)]
pub use memory::InMemoryBackend;

/// `SharedStore` is the handle components hold on the one process-wide store.
#[allow(clippy::module_name_repetitions)]
pub type SharedStore = Arc<RecordStore>;

/// Key for account lookups: the public identifier presented on updates, or the
/// fully qualified subdomain the account controls.
#[derive(Debug, Clone, Copy)]
pub enum AccountKey<'a> {
    Id(&'a str),
    Subdomain(&'a LowerName),
}

/// The persistence boundary. Implementations store accounts keyed by identifier
/// (indexed additionally by subdomain) and validation records keyed by subdomain,
/// compared case-insensitively.
///
/// Implementations synchronize their own state internally; [`RecordStore`] layers
/// the read-modify-write coordination on top.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn load_account(&self, key: AccountKey<'_>) -> Result<Option<Account>, Error>;

    async fn save_account(&self, account: Account) -> Result<(), Error>;

    async fn load_record(&self, subdomain: &LowerName) -> Result<Option<ValidationRecord>, Error>;

    async fn save_record(&self, record: ValidationRecord) -> Result<(), Error>;
}

/// Concurrency-safe facade over a [`Backend`], enforcing the value-rotation policy
/// and the uniqueness constraints of registration.
pub struct RecordStore {
    backend: Box<dyn Backend>,
    store_timeout: Duration,
    /// Serializes registrations so two creates can't race the uniqueness check.
    create_lock: Mutex<()>,
    /// One lock per subdomain, taken only by `update`: read-modify-write on a
    /// subdomain is atomic while updates to other subdomains run concurrently.
    update_locks: Mutex<HashMap<LowerName, Arc<Mutex<()>>>>,
}

impl RecordStore {
    pub fn new(backend: Box<dyn Backend>, store_timeout: Duration) -> Self {
        RecordStore {
            backend,
            store_timeout,
            create_lock: Mutex::new(()),
            update_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the validation record for `subdomain`.
    pub async fn get(&self, subdomain: &LowerName) -> Result<ValidationRecord, Error> {
        self.bounded(self.backend.load_record(subdomain))
            .await?
            .ok_or(Error::NotFound)
    }

    /// Fetch an account by identifier or subdomain.
    pub async fn get_account(&self, key: AccountKey<'_>) -> Result<Account, Error> {
        self.bounded(self.backend.load_account(key))
            .await?
            .ok_or(Error::NotFound)
    }

    /// Persist a newly registered account along with its (initially empty)
    /// validation record. Fails with [`Error::Conflict`] if the identifier or
    /// subdomain is already taken; registration retries with fresh identifiers.
    pub async fn create(&self, account: Account) -> Result<(), Error> {
        let _guard = self.create_lock.lock().await;
        if self
            .bounded(self.backend.load_account(AccountKey::Id(&account.id)))
            .await?
            .is_some()
            || self
                .bounded(
                    self.backend
                        .load_account(AccountKey::Subdomain(&account.subdomain)),
                )
                .await?
                .is_some()
        {
            return Err(Error::Conflict);
        }
        // Record first: a failure in between leaves an orphaned empty record (which
        // a later create simply overwrites), never an account without a record.
        let record = ValidationRecord::new(account.subdomain.clone());
        self.bounded(self.backend.save_record(record)).await?;
        self.bounded(self.backend.save_account(account)).await
    }

    /// Rotate `value` into the record for `subdomain` and return the committed
    /// state. The per-subdomain lock is held across load, rotate and save, so
    /// same-subdomain updates are linearized while other subdomains are untouched.
    pub async fn update(
        &self,
        subdomain: &LowerName,
        value: String,
    ) -> Result<ValidationRecord, Error> {
        let lock = self.subdomain_lock(subdomain).await;
        let _guard = lock.lock().await;
        let mut record = self
            .bounded(self.backend.load_record(subdomain))
            .await?
            .ok_or(Error::NotFound)?;
        record.rotate_in(value);
        self.bounded(self.backend.save_record(record.clone())).await?;
        Ok(record)
    }

    async fn subdomain_lock(&self, subdomain: &LowerName) -> Arc<Mutex<()>> {
        let mut locks = self.update_locks.lock().await;
        locks.entry(subdomain.clone()).or_default().clone()
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        match timeout(self.store_timeout, op).await {
            Ok(res) => res,
            Err(_) => Err(Error::StoreUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use trust_dns_server::client::rr::Name;

    fn test_store() -> SharedStore {
        Arc::new(RecordStore::new(
            Box::<InMemoryBackend>::default(),
            Duration::from_secs(1),
        ))
    }

    fn fqdn(label: &str) -> LowerName {
        LowerName::from(Name::from_str(&format!("{label}.acme.example.com.")).unwrap())
    }

    fn test_account(label: &str) -> Account {
        Account {
            id: format!("id-{label}"),
            secret_hash: "$2y$10$unused".to_string(),
            subdomain: fqdn(label),
            allowed_subnets: vec![],
        }
    }

    /// Answers every call well after the store timeout has expired.
    struct SlowBackend;

    #[async_trait::async_trait]
    impl Backend for SlowBackend {
        async fn load_account(&self, _: AccountKey<'_>) -> Result<Option<Account>, Error> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn save_account(&self, _: Account) -> Result<(), Error> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }

        async fn load_record(
            &self,
            _: &LowerName,
        ) -> Result<Option<ValidationRecord>, Error> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn save_record(&self, _: ValidationRecord) -> Result<(), Error> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn create_then_get_roundtrip() {
        let store = test_store();
        store.create(test_account("abc")).await.unwrap();

        // Record exists but is empty until the first update.
        let record = store.get(&fqdn("abc")).await.unwrap();
        assert!(record.values.is_empty());

        let by_id = store.get_account(AccountKey::Id("id-abc")).await.unwrap();
        let by_name = store
            .get_account(AccountKey::Subdomain(&fqdn("abc")))
            .await
            .unwrap();
        assert_eq!(by_id.id, by_name.id);
    }

    #[tokio::test]
    async fn create_duplicate_is_conflict() {
        let store = test_store();
        store.create(test_account("abc")).await.unwrap();
        assert!(matches!(
            store.create(test_account("abc")).await,
            Err(Error::Conflict)
        ));

        // Same subdomain under a fresh id also conflicts.
        let mut clash = test_account("abc");
        clash.id = "other-id".to_string();
        assert!(matches!(store.create(clash).await, Err(Error::Conflict)));
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let store = test_store();
        assert!(matches!(store.get(&fqdn("nope")).await, Err(Error::NotFound)));
        assert!(matches!(
            store.get_account(AccountKey::Id("nope")).await,
            Err(Error::NotFound)
        ));
        assert!(matches!(
            store.update(&fqdn("nope"), "v".to_string()).await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn update_rotates_oldest_out() {
        let store = test_store();
        store.create(test_account("abc")).await.unwrap();

        store.update(&fqdn("abc"), "v1".to_string()).await.unwrap();
        store.update(&fqdn("abc"), "v2".to_string()).await.unwrap();
        let committed = store.update(&fqdn("abc"), "v3".to_string()).await.unwrap();

        let expected = ["v2".to_string(), "v3".to_string()];
        assert_eq!(committed.values, expected);
        assert_eq!(store.get(&fqdn("abc")).await.unwrap().values, expected);
    }

    #[tokio::test]
    async fn subdomain_lookup_is_case_insensitive() {
        let store = test_store();
        store.create(test_account("abc")).await.unwrap();
        let upper = LowerName::from(Name::from_str("ABC.ACME.Example.COM.").unwrap());
        assert!(store.get(&upper).await.is_ok());
    }

    #[tokio::test]
    async fn slow_backend_degrades_to_store_unavailable() {
        let store = RecordStore::new(Box::new(SlowBackend), Duration::from_millis(10));
        assert!(matches!(
            store.get(&fqdn("abc")).await,
            Err(Error::StoreUnavailable)
        ));
        assert!(matches!(
            store.get_account(AccountKey::Id("id-abc")).await,
            Err(Error::StoreUnavailable)
        ));
        assert!(matches!(
            store.update(&fqdn("abc"), "v".to_string()).await,
            Err(Error::StoreUnavailable)
        ));
        assert!(matches!(
            store.create(test_account("abc")).await,
            Err(Error::StoreUnavailable)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_same_subdomain_updates_commit_cleanly() {
        let store = test_store();
        store.create(test_account("abc")).await.unwrap();

        let submitted: Vec<String> = (0..8).map(|i| format!("value-{i}")).collect();
        let mut handles = Vec::new();
        for value in submitted.clone() {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update(&fqdn("abc"), value).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Whatever the interleaving, the record holds at most two of the submitted
        // values and nothing corrupted.
        let record = store.get(&fqdn("abc")).await.unwrap();
        assert_eq!(record.values.len(), 2);
        for value in &record.values {
            assert!(submitted.contains(value));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_distinct_subdomain_updates_all_succeed() {
        let store = test_store();
        let labels: Vec<String> = (0..8).map(|i| format!("sub{i}")).collect();
        for label in &labels {
            store.create(test_account(label)).await.unwrap();
        }

        let mut handles = Vec::new();
        for label in labels.clone() {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update(&fqdn(&label), format!("token-{label}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for label in &labels {
            let record = store.get(&fqdn(label)).await.unwrap();
            assert_eq!(record.values, [format!("token-{label}")]);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn updates_do_not_block_other_subdomains() {
        // One subdomain's update sits on the slow path while another subdomain's
        // update and a read complete; per-subdomain locking means neither waits.
        let store = test_store();
        store.create(test_account("fast")).await.unwrap();
        store.create(test_account("busy")).await.unwrap();

        let busy_lock = store.subdomain_lock(&fqdn("busy")).await;
        let held = busy_lock.lock().await;

        let fast = tokio::time::timeout(
            Duration::from_millis(200),
            store.update(&fqdn("fast"), "token".to_string()),
        )
        .await;
        assert!(fast.expect("other subdomains must not queue").is_ok());

        let read = tokio::time::timeout(Duration::from_millis(200), store.get(&fqdn("busy"))).await;
        assert!(read.expect("reads must not queue behind an updater").is_ok());

        drop(held);
    }
}
