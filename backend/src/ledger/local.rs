use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::CreditLedger;
use crate::error::LedgerError;

const STORE_FILE_NAME: &str = "slashai.json";

/// Small JSON key/value file standing in for browser local storage.
///
/// Reads and writes never fail from the caller's point of view: problems are
/// logged and the default is used instead.
#[derive(Debug, Clone)]
pub struct LocalCounterStore {
    path: PathBuf,
}

impl LocalCounterStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(STORE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let entries = match self.load() {
            Ok(Some(entries)) => entries,
            Ok(None) => return default,
            Err(e) => {
                tracing::warn!(key, error = %e, "Error reading local store, using default");
                return default;
            }
        };

        match entries.get(key) {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                tracing::warn!(key, error = %e, "Malformed value in local store, using default");
                default
            }),
            None => default,
        }
    }

    pub fn write<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.try_write(key, value) {
            tracing::warn!(key, error = %e, "Error writing local store");
        }
    }

    fn try_write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let mut entries = match self.load() {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable local store");
                Map::new()
            }
        };
        entries.insert(key.to_string(), serde_json::to_value(value)?);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&Value::Object(entries))?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn load(&self) -> Result<Option<Map<String, Value>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        match serde_json::from_str(&raw)? {
            Value::Object(entries) => Ok(Some(entries)),
            other => anyhow::bail!("expected a JSON object, found {other}"),
        }
    }
}

/// Ledger over a [`LocalCounterStore`] key. One writer at a time per process.
pub struct LocalLedger {
    store: LocalCounterStore,
    key: String,
    lock: Mutex<()>,
}

impl LocalLedger {
    pub fn new(store: LocalCounterStore, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_balance(&self) -> u64 {
        self.store.read(&self.key, 0u64)
    }
}

#[async_trait]
impl CreditLedger for LocalLedger {
    async fn balance(&self) -> Result<u64, LedgerError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_balance())
    }

    async fn credit(&self, amount: u64) -> Result<u64, LedgerError> {
        let _guard = self.lock.lock().await;
        let balance = self.read_balance().saturating_add(amount);
        self.store.write(&self.key, &balance);
        tracing::debug!(key = %self.key, amount, balance, "Credited");
        Ok(balance)
    }

    async fn try_debit(&self, amount: u64) -> Result<u64, LedgerError> {
        let _guard = self.lock.lock().await;
        let available = self.read_balance();
        if available < amount {
            return Err(LedgerError::InsufficientCredits {
                needed: amount,
                available,
            });
        }
        let balance = available - amount;
        self.store.write(&self.key, &balance);
        tracing::debug!(key = %self.key, amount, balance, "Debited");
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::CREDITS_STORAGE_KEY;

    #[test]
    fn missing_key_reads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCounterStore::new(dir.path());
        assert_eq!(store.read("absent", 7u64), 7);
    }

    #[test]
    fn write_then_read_returns_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCounterStore::new(dir.path().join("nested"));
        store.write(CREDITS_STORAGE_KEY, &42u64);
        assert_eq!(store.read(CREDITS_STORAGE_KEY, 0u64), 42);

        let raw = fs::read_to_string(store.path()).unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed[CREDITS_STORAGE_KEY], 42);
    }

    #[test]
    fn malformed_file_reads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCounterStore::new(dir.path());
        fs::write(store.path(), "{not json").unwrap();
        assert_eq!(store.read(CREDITS_STORAGE_KEY, 0u64), 0);

        // A write replaces the corrupt file.
        store.write(CREDITS_STORAGE_KEY, &3u64);
        assert_eq!(store.read(CREDITS_STORAGE_KEY, 0u64), 3);
    }

    #[test]
    fn wrong_type_reads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCounterStore::new(dir.path());
        fs::write(store.path(), r#"{"slashai_user_credits": "lots"}"#).unwrap();
        assert_eq!(store.read(CREDITS_STORAGE_KEY, 0u64), 0);
    }

    #[test]
    fn writes_keep_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCounterStore::new(dir.path());
        store.write("a", &1u64);
        store.write("b", &2u64);
        assert_eq!(store.read("a", 0u64), 1);
        assert_eq!(store.read("b", 0u64), 2);
    }

    #[tokio::test]
    async fn debit_never_goes_negative() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LocalLedger::new(LocalCounterStore::new(dir.path()), CREDITS_STORAGE_KEY);

        assert_eq!(ledger.credit(2).await.unwrap(), 2);
        assert_eq!(ledger.try_debit(2).await.unwrap(), 0);
        let err = ledger.try_debit(1).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientCredits { needed: 1, available: 0 }
        ));
        assert_eq!(ledger.balance().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_debits_are_serialised() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(LocalLedger::new(
            LocalCounterStore::new(dir.path()),
            CREDITS_STORAGE_KEY,
        ));
        ledger.credit(5).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..12 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.try_debit(1).await.is_ok() }));
        }
        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        assert_eq!(successes, 5);
        assert_eq!(ledger.balance().await.unwrap(), 0);
    }
}
