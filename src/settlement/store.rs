//! Match record store and persistence.
//!
//! Whole-file JSON (`{match_id: Match}`), rewritten after every mutation.
//! Writes go to a sibling temp file first and are renamed into place, on
//! the blocking thread pool so async callers never stall a runtime worker.
//! A mutation is durable once its `update` has returned `Ok`.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::settlement::types::{Match, StoreError, StoreResult};

/// Thread-safe keyed store of matches.
#[derive(Clone, Default)]
pub struct MatchStore {
    inner: Arc<DashMap<String, Match>>,
    persistence_path: Option<PathBuf>,
    /// Serializes file writes.
    write_lock: Arc<Mutex<()>>,
}

impl MatchStore {
    /// In-memory store, or file-backed when `persistence_path` is set.
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Open a file-backed store, loading existing records if the file exists.
    pub fn load_from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let map: BTreeMap<String, Match> = serde_json::from_reader(reader)?;
            for (id, record) in map {
                store.inner.insert(id, record);
            }
            tracing::info!(
                path = %path.display(),
                matches = store.inner.len(),
                "Loaded match store"
            );
        }
        Ok(store)
    }

    /// Write every record to the backing file. No-op when in-memory.
    pub fn save_to_file(&self) -> StoreResult<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let map: BTreeMap<String, Match> = self
            .inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &map)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;

        tracing::debug!(path = %path.display(), matches = map.len(), "Saved match store");
        Ok(())
    }

    /// Insert a new match. Fails if the id is taken.
    pub async fn insert_new(&self, record: Match) -> StoreResult<()> {
        match self.inner.entry(record.id.clone()) {
            Entry::Occupied(e) => return Err(StoreError::AlreadyExists(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(record);
            }
        }
        self.persist().await
    }

    /// Atomic read-modify-write of one match, then persist.
    ///
    /// The record is locked for the duration of `f`; concurrent updates to
    /// the same match are serialized. When the save fails the change stays
    /// in memory and the error means the file is behind.
    pub async fn update<R>(&self, id: &str, f: impl FnOnce(&mut Match) -> R) -> StoreResult<R> {
        let result = {
            let mut entry = self
                .inner
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            f(entry.value_mut())
        };
        self.persist().await?;
        Ok(result)
    }

    /// [`save_to_file`](Self::save_to_file) on the blocking pool.
    pub async fn persist(&self) -> StoreResult<()> {
        if self.persistence_path.is_none() {
            return Ok(());
        }
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.save_to_file())
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))?
    }

    /// Snapshot of one match.
    pub fn get(&self, id: &str) -> Option<Match> {
        self.inner.get(id).map(|r| r.value().clone())
    }

    /// All matches, ordered by id.
    pub fn list(&self) -> Vec<Match> {
        let mut matches: Vec<Match> = self.inner.iter().map(|r| r.value().clone()).collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches
    }

    /// Matches not yet completed.
    pub fn active_matches(&self) -> Vec<Match> {
        self.list().into_iter().filter(|m| !m.completed).collect()
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }

    /// (active, completed) counts.
    pub fn summary(&self) -> (usize, usize) {
        let mut active = 0;
        let mut completed = 0;
        for r in self.inner.iter() {
            if r.value().completed {
                completed += 1;
            } else {
                active += 1;
            }
        }
        (active, completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use rust_decimal_macros::dec;

    fn sample(id: &str) -> Match {
        let mut addrs = BTreeMap::new();
        addrs.insert("Royals".to_string(), Address::repeat_byte(1));
        Match::new(id, "Royals vs Tigers", addrs)
    }

    #[tokio::test]
    async fn test_store_operations() {
        let store = MatchStore::new(None);
        assert!(store.get("m1").is_none());

        store.insert_new(sample("m1")).await.unwrap();
        assert!(matches!(
            store.insert_new(sample("m1")).await,
            Err(StoreError::AlreadyExists(_))
        ));

        let total = store
            .update("m1", |m| {
                m.total_bet_amount += dec!(1.5);
                m.total_bet_amount
            })
            .await
            .unwrap();
        assert_eq!(total, dec!(1.5));
        assert!(matches!(store.update("nope", |_| ()).await, Err(StoreError::NotFound(_))));

        store.insert_new(sample("m0")).await.unwrap();
        store.update("m0", |m| m.completed = true).await.unwrap();
        assert_eq!(store.summary(), (1, 1));
        assert_eq!(store.list()[0].id, "m0");
        assert_eq!(store.active_matches().len(), 1);
    }

    #[tokio::test]
    async fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("matches.json");

        let store = MatchStore::new(Some(path.clone()));
        store.insert_new(sample("m1")).await.unwrap();
        store.update("m1", |m| m.total_bet_amount = dec!(0.25)).await.unwrap();

        let loaded = MatchStore::load_from_file(&path).unwrap();
        let record = loaded.get("m1").unwrap();
        assert_eq!(record.total_bet_amount, dec!(0.25));
        assert_eq!(record.deposit_addresses["Royals"], Address::repeat_byte(1));
    }

    #[tokio::test]
    async fn test_failed_save_reports_error_and_keeps_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matches.json");
        let store = MatchStore::new(Some(path.clone()));
        store.insert_new(sample("m1")).await.unwrap();

        // The temp file cannot be created over a directory.
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();
        let err = store.update("m1", |m| m.completed = true).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(store.get("m1").unwrap().completed);

        let on_disk = MatchStore::load_from_file(&path).unwrap();
        assert!(!on_disk.get("m1").unwrap().completed);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MatchStore::load_from_file(dir.path().join("absent.json")).unwrap();
        assert_eq!(store.count(), 0);
    }
}
