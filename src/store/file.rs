//! A JSON file-backed implementation of the [`Backend`][super::Backend] trait.
//!
//! Wraps an [`InMemoryBackend`][super::memory::InMemoryBackend], persisting a snapshot
//! to a JSON file on disk after each mutation so state can be reloaded across restarts.

use crate::account::{Account, ValidationRecord};
use crate::error::Error;
use crate::store::memory::{InMemoryBackend, StoreState};
use crate::store::{AccountKey, Backend};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use trust_dns_server::client::rr::LowerName;

/// A file-backed [`Backend`]. Mutations land in memory first and are then written
/// as a JSON snapshot to the configured path; on startup the path is loaded again
/// (or created empty if missing).
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct FileBackend {
    memory: InMemoryBackend,
    path: PathBuf,
    /// Serializes snapshot writes so two saves can't interleave on disk.
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Load a [`FileBackend`] from the JSON state located at the given path, or
    /// return an Error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJson`] if the JSON state file is invalid.
    ///
    /// Returns [`Error::Io`] if the path can't be opened, read, or created.
    pub async fn try_from_file(p: &str) -> Result<Self, Error> {
        let path = PathBuf::from(p);
        let contents = match File::open(&path).await {
            Ok(mut f) => {
                let mut buf = vec![];
                f.read_to_end(&mut buf).await?;
                buf
            }
            Err(err) => match err.kind() {
                ErrorKind::NotFound => Self::write_empty_state(File::create(&path).await?).await?,
                _ => return Err(Error::Io(err)),
            },
        };

        let state: StoreState = serde_json::from_slice(&contents)?;
        Ok(Self {
            memory: InMemoryBackend::from(state),
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Write the current state as JSON next to the configured path, then rename it
    /// into place. The snapshot is taken outside any in-memory lock and the rename
    /// is atomic, so a crash mid-write leaves the previous file intact and readers
    /// are never stalled behind disk I/O.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJson`] if the state can't be serialized to JSON.
    ///
    /// Returns [`Error::Io`] if the serialized state can't be written to the backing
    /// file path.
    pub async fn save(&self) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let data = serde_json::to_string_pretty(&self.memory.snapshot())?;
        let staging = self.path.with_extension("json.tmp");
        let mut output_file = File::create(&staging).await?;
        output_file.write_all(data.as_bytes()).await?;
        output_file.flush().await?;
        output_file.sync_all().await?;
        drop(output_file);
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    async fn write_empty_state(mut f: File) -> Result<Vec<u8>, Error> {
        let default_data = serde_json::to_string_pretty(&StoreState::default())?;
        let default_bytes = default_data.as_bytes();
        f.write_all(default_bytes).await?;
        f.flush().await?;
        Ok(default_bytes.to_vec())
    }
}

#[async_trait::async_trait]
impl Backend for FileBackend {
    async fn load_account(&self, key: AccountKey<'_>) -> Result<Option<Account>, Error> {
        self.memory.load_account(key).await
    }

    async fn save_account(&self, account: Account) -> Result<(), Error> {
        self.memory.save_account(account).await?;
        self.save().await
    }

    async fn load_record(&self, subdomain: &LowerName) -> Result<Option<ValidationRecord>, Error> {
        self.memory.load_record(subdomain).await
    }

    async fn save_record(&self, record: ValidationRecord) -> Result<(), Error> {
        self.memory.save_record(record).await?;
        self.save().await
    }
}
