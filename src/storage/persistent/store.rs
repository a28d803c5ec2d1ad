use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::file_lock::DirLock;
use super::wal::WriteAheadLog;
use super::PersistentConfig;
use crate::config::CraftConfig;
use crate::path::DataPath;
use crate::storage::{
    DocumentStore, InMemoryDocumentStore, StorageError, TransactionCommit, TransactionFn,
};
use crate::subscription::Subscription;

/// Name of the log file inside the data directory.
pub const WAL_FILE: &str = "craftable.wal";

/// Document store that survives restarts.
///
/// Reads, transactions and subscriptions behave exactly as on
/// [`InMemoryDocumentStore`]; every committed mutation is also appended to a
/// write-ahead log in the data directory before it becomes visible.
#[derive(Debug)]
pub struct PersistentDocumentStore {
    inner: InMemoryDocumentStore,
    wal: Arc<WriteAheadLog>,
    cfg: PersistentConfig,
    /// Log size that triggers the next automatic compaction.
    compact_at: AtomicU64,
    dir: PathBuf,
    _lock: DirLock,
}

impl PersistentDocumentStore {
    /// Open (or create) a store in `dir` with default transaction settings.
    ///
    /// # Errors
    /// `Io` if the directory is locked by another process or the log cannot be
    /// read, `InvalidPath` for an invalid configuration.
    pub fn open(dir: impl AsRef<Path>, cfg: PersistentConfig) -> Result<Self, StorageError> {
        Self::open_with(dir, cfg, &CraftConfig::default())
    }

    /// Open (or create) a store in `dir`, taking the retry budget and
    /// subscription settings from `craft`.
    ///
    /// # Errors
    /// See [`Self::open`].
    pub fn open_with(dir: impl AsRef<Path>, cfg: PersistentConfig, craft: &CraftConfig) -> Result<Self, StorageError> {
        let cfg = cfg.validate()?;
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let lock = DirLock::acquire(&dir)?;

        let (wal, recovery) = WriteAheadLog::open(&dir.join(WAL_FILE), cfg.sync_on_write)?;
        let inner = InMemoryDocumentStore::from_config(craft);
        for entry in &recovery.entries {
            inner.replay(&entry.mutation)?;
        }
        info!(
            dir = %dir.display(),
            entries = recovery.entries.len(),
            discarded_bytes = recovery.discarded_bytes,
            "Opened persistent store"
        );

        let wal = Arc::new(wal);
        let inner = inner.with_sink(Box::new(Arc::clone(&wal)));
        Ok(Self {
            inner,
            wal,
            compact_at: AtomicU64::new(cfg.max_wal_size),
            cfg,
            dir,
            _lock: lock,
        })
    }

    /// The data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current size of the write-ahead log in bytes.
    pub fn wal_size(&self) -> Result<u64, StorageError> {
        Ok(self.wal.size_bytes()?)
    }

    /// Copy of the whole tree.
    pub fn export(&self) -> Result<Value, StorageError> {
        self.inner.export()
    }

    /// Rewrite the log as a snapshot of the current tree.
    ///
    /// Automatic compaction next runs once the log reaches twice the
    /// snapshot size, or [`PersistentConfig::max_wal_size`] if that is larger.
    ///
    /// # Errors
    /// `Io` if the new log cannot be written. The old log is kept in that case.
    pub fn compact(&self) -> Result<(), StorageError> {
        let before = self.wal.size_bytes()?;
        self.inner
            .with_frozen_tree(|root| self.wal.rewrite(root).map_err(StorageError::from))?;
        let after = self.wal.size_bytes()?;
        let next = self.cfg.max_wal_size.max(after.saturating_mul(2));
        self.compact_at.store(next, Ordering::Relaxed);
        info!(before, after, next, "Compacted write-ahead log");
        Ok(())
    }

    fn maybe_compact(&self) {
        let limit = self.compact_at.load(Ordering::Relaxed);
        match self.wal.size_bytes() {
            Ok(size) if size > limit => {
                debug!(size, limit, "Write-ahead log over limit");
                // The write itself is already durable. Back off so a failing
                // compaction is not retried on every write.
                if let Err(e) = self.compact() {
                    let next = size.saturating_mul(2);
                    self.compact_at.store(next, Ordering::Relaxed);
                    warn!(error = %e, size, next, "Write-ahead log compaction failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not read write-ahead log size"),
        }
    }
}

impl DocumentStore for PersistentDocumentStore {
    fn read(&self, path: &DataPath) -> Result<Option<Value>, StorageError> {
        self.inner.read(path)
    }

    fn write(&self, path: &DataPath, value: Value) -> Result<(), StorageError> {
        self.inner.write(path, value)?;
        self.maybe_compact();
        Ok(())
    }

    fn update(&self, path: &DataPath, children: Vec<(String, Value)>) -> Result<(), StorageError> {
        self.inner.update(path, children)?;
        self.maybe_compact();
        Ok(())
    }

    fn transact(&self, path: &DataPath, update: &mut TransactionFn<'_>) -> Result<TransactionCommit, StorageError> {
        let commit = self.inner.transact(path, update)?;
        if commit.committed {
            self.maybe_compact();
        }
        Ok(commit)
    }

    fn subscribe(&self, path: &DataPath) -> Result<Subscription, StorageError> {
        self.inner.subscribe(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn path(raw: &str) -> DataPath {
        DataPath::parse(raw).unwrap()
    }

    fn fast() -> PersistentConfig {
        PersistentConfig {
            sync_on_write: false,
            ..PersistentConfig::default()
        }
    }

    #[test]
    fn test_reopen_replays_writes() {
        let dir = tempdir().unwrap();
        {
            let store = PersistentDocumentStore::open(dir.path(), fast()).unwrap();
            store.write(&path("posts/p1/title"), json!("Cowl")).unwrap();
            store
                .update(&path("users/u1"), vec![("boards/Knits/description".to_string(), json!("wip"))])
                .unwrap();
            store
                .transact(&path("posts/p1/likes"), &mut |_| {
                    crate::storage::TransactionOutcome::Commit(json!(1))
                })
                .unwrap();
        }

        let store = PersistentDocumentStore::open(dir.path(), fast()).unwrap();
        assert_eq!(store.read(&path("posts/p1")).unwrap(), Some(json!({"title": "Cowl", "likes": 1})));
        assert_eq!(
            store.read(&path("users/u1/boards/Knits/description")).unwrap(),
            Some(json!("wip"))
        );
    }

    #[test]
    fn test_directory_is_exclusive() {
        let dir = tempdir().unwrap();
        let _first = PersistentDocumentStore::open(dir.path(), fast()).unwrap();
        let err = PersistentDocumentStore::open(dir.path(), fast()).unwrap_err();
        assert!(matches!(err, StorageError::Io(ref e) if e.kind() == std::io::ErrorKind::WouldBlock));
    }

    #[test]
    fn test_directory_reopens_after_store_drops() {
        let dir = tempdir().unwrap();
        let first = PersistentDocumentStore::open(dir.path(), fast()).unwrap();
        first.write(&path("posts/p1/title"), json!("Cowl")).unwrap();
        drop(first);

        let second = PersistentDocumentStore::open(dir.path(), fast()).unwrap();
        assert_eq!(second.read(&path("posts/p1/title")).unwrap(), Some(json!("Cowl")));
    }

    fn small_log() -> PersistentConfig {
        PersistentConfig {
            sync_on_write: false,
            max_wal_size: PersistentConfig::MIN_WAL_SIZE,
        }
    }

    #[test]
    fn test_compaction_keeps_state() {
        let dir = tempdir().unwrap();
        {
            let store = PersistentDocumentStore::open(dir.path(), small_log()).unwrap();
            for i in 0..500 {
                store
                    .write(&path(&format!("posts/p{}/title", i % 20)), json!(format!("title {i}")))
                    .unwrap();
            }
            assert!(store.wal_size().unwrap() <= PersistentConfig::MIN_WAL_SIZE);
        }

        let store = PersistentDocumentStore::open(dir.path(), small_log()).unwrap();
        let posts = store.read(&path("posts")).unwrap().unwrap();
        assert_eq!(posts.as_object().unwrap().len(), 20);
        for k in 0..20 {
            assert_eq!(
                store.read(&path(&format!("posts/p{k}/title"))).unwrap(),
                Some(json!(format!("title {}", 480 + k)))
            );
        }
    }

    #[test]
    fn test_snapshot_over_limit_is_not_recompacted_every_write() {
        let dir = tempdir().unwrap();
        let store = PersistentDocumentStore::open(dir.path(), small_log()).unwrap();
        for i in 0..200 {
            store.write(&path(&format!("posts/p{i}/title")), json!("a fairly long title")).unwrap();
        }
        store.compact().unwrap();
        let snapshot = store.wal_size().unwrap();
        assert!(snapshot > PersistentConfig::MIN_WAL_SIZE);

        store.write(&path("posts/p0/title"), json!("b fairly long title")).unwrap();
        assert!(store.wal_size().unwrap() > snapshot + 50);
    }

    #[test]
    fn test_failed_compaction_backs_off() {
        let dir = tempdir().unwrap();
        let store = PersistentDocumentStore::open(dir.path(), small_log()).unwrap();
        // A directory where the staging file goes makes every rewrite fail.
        fs::create_dir(dir.path().join("craftable.wal.compact")).unwrap();

        for i in 0..100 {
            store.write(&path(&format!("posts/p{i}/title")), json!("a fairly long title")).unwrap();
        }
        let size = store.wal_size().unwrap();
        assert!(size > PersistentConfig::MIN_WAL_SIZE);
        assert!(store.compact().is_err());
        assert!(store.compact_at.load(Ordering::Relaxed) > size);

        drop(store);
        let store = PersistentDocumentStore::open(dir.path(), small_log()).unwrap();
        let posts = store.read(&path("posts")).unwrap().unwrap();
        assert_eq!(posts.as_object().unwrap().len(), 100);
    }

    #[test]
    fn test_compaction_of_tree_larger_than_one_entry() {
        const BLOB: usize = 9 << 20;
        let dir = tempdir().unwrap();
        {
            let store = PersistentDocumentStore::open(dir.path(), fast()).unwrap();
            for i in 0..8 {
                store
                    .write(&path(&format!("posts/p{i}/imageBase64")), json!("a".repeat(BLOB)))
                    .unwrap();
            }
            store.compact().unwrap();
            store.write(&path("posts/p8/imageBase64"), json!("a".repeat(BLOB))).unwrap();
        }

        let store = PersistentDocumentStore::open(dir.path(), fast()).unwrap();
        let posts = store.read(&path("posts")).unwrap().unwrap();
        let posts = posts.as_object().unwrap();
        assert_eq!(posts.len(), 9);
        for post in posts.values() {
            assert_eq!(post["imageBase64"].as_str().unwrap().len(), BLOB);
        }
    }
}
