//! Write-Ahead Log (WAL) for durability.
//!
//! Every mutation is appended to the log before it is applied to the
//! in-memory tree. On open the log is read back in full; a torn or corrupt
//! tail (a crash mid-append) is cut off so later appends stay readable.
//!
//! # Format
//! ```text
//! [Header: magic + version]
//! [Entry 1: version + length + JSON + CRC32]
//! [Entry 2: ...]
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Cursor, Error as IoError, ErrorKind, Result as IoResult, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::codec;
use crate::path::DataPath;
use crate::storage::{CommitSink, Mutation, StorageError};

/// Encoded-size budget for one snapshot entry written by compaction.
const SNAPSHOT_CHUNK: usize = codec::MAX_ENTRY_SIZE / 2;

/// A sink that only counts bytes.
struct ByteCount(usize);

impl Write for ByteCount {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

fn encoded_len(value: &Value) -> usize {
    let mut count = ByteCount(0);
    // Writing a Value into a counter cannot fail.
    let _ = serde_json::to_writer(&mut count, value);
    count.0
}

/// Mutations that rebuild `root` from an empty tree, each encoding to
/// roughly `chunk` bytes or less.
///
/// Objects too large for one entry are split by child: large children are
/// split recursively, small ones are batched into `Merge`s. A single leaf
/// larger than `chunk` is emitted as-is.
fn snapshot_mutations(root: &Value, chunk: usize) -> Vec<Mutation> {
    let mut out = Vec::new();
    split_snapshot(DataPath::root(), root, chunk, &mut out);
    out
}

fn split_snapshot(path: DataPath, value: &Value, chunk: usize, out: &mut Vec<Mutation>) {
    let children = match value {
        Value::Null => return,
        Value::Object(children) if encoded_len(value) > chunk => children,
        _ => {
            out.push(Mutation::Set {
                path,
                value: value.clone(),
            });
            return;
        }
    };

    let mut batch = Vec::new();
    let mut batch_len = 0;
    for (key, child) in children {
        let child_len = encoded_len(child) + key.len();
        if child_len > chunk {
            split_snapshot(path.child_trusted(key), child, chunk, out);
            continue;
        }
        if batch_len + child_len > chunk && !batch.is_empty() {
            out.push(Mutation::Merge {
                path: path.clone(),
                children: std::mem::take(&mut batch),
            });
            batch_len = 0;
        }
        batch.push((DataPath::root().child_trusted(key), child.clone()));
        batch_len += child_len;
    }
    if !batch.is_empty() {
        out.push(Mutation::Merge {
            path,
            children: batch,
        });
    }
}

/// One logged mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing, starting at 1.
    pub sequence: u64,
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
    /// The committed change.
    pub mutation: Mutation,
}

/// What was found in an existing log.
#[derive(Debug, Default)]
pub struct Recovery {
    /// Valid entries, in log order.
    pub entries: Vec<WalEntry>,
    /// Bytes cut from the end because they did not form a valid entry.
    pub discarded_bytes: u64,
}

#[derive(Debug)]
struct WalWriter {
    file: File,
    len: u64,
    sequence: u64,
}

/// Append-only log file.
#[derive(Debug)]
pub struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<WalWriter>,
    sync_on_write: bool,
}

impl WriteAheadLog {
    /// Open or create the log at `path`, returning the entries already in it.
    ///
    /// # Errors
    /// I/O errors, or `InvalidData` if the file exists but is not a Craftable
    /// log.
    pub fn open(path: &Path, sync_on_write: bool) -> IoResult<(Self, Recovery)> {
        let existing = match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        let (recovery, valid_len, sequence) = match existing {
            Some(bytes) if !bytes.is_empty() => Self::recover(&bytes)?,
            _ => {
                let mut file = File::create(path)?;
                codec::write_header(&mut file)?;
                file.sync_all()?;
                (Recovery::default(), codec::HEADER_LEN, 0)
            }
        };

        let file = OpenOptions::new().append(true).open(path)?;
        if recovery.discarded_bytes > 0 {
            warn!(
                path = %path.display(),
                discarded_bytes = recovery.discarded_bytes,
                kept_entries = recovery.entries.len(),
                "Truncating corrupt write-ahead log tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        let wal = Self {
            path: path.to_path_buf(),
            writer: Mutex::new(WalWriter {
                file,
                len: valid_len,
                sequence,
            }),
            sync_on_write,
        };
        Ok((wal, recovery))
    }

    /// Decode entries until the first frame that does not check out.
    fn recover(bytes: &[u8]) -> IoResult<(Recovery, u64, u64)> {
        let mut cursor = Cursor::new(bytes);
        codec::read_header(&mut cursor)?;

        let mut recovery = Recovery::default();
        let mut valid_len = cursor.position();
        let mut sequence = 0;
        loop {
            match codec::decode::<WalEntry>(&mut cursor) {
                Ok(entry) if entry.sequence > sequence => {
                    sequence = entry.sequence;
                    valid_len = cursor.position();
                    recovery.entries.push(entry);
                }
                Ok(entry) => {
                    warn!(sequence = entry.sequence, after = sequence, "Out-of-order WAL entry");
                    break;
                }
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    warn!(error = %e, offset = valid_len, "Corrupt WAL entry");
                    break;
                }
            }
        }
        recovery.discarded_bytes = bytes.len() as u64 - valid_len;
        Ok((recovery, valid_len, sequence))
    }

    /// Append a mutation and return its sequence number.
    ///
    /// A failed append leaves the file as it was.
    pub fn append(&self, mutation: &Mutation) -> IoResult<u64> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| IoError::other("poisoned lock: wal.append"))?;

        let entry = WalEntry {
            sequence: writer.sequence + 1,
            timestamp: Utc::now(),
            mutation: mutation.clone(),
        };
        let frame = codec::encode(&entry)?;

        // One write per frame so a failure can be rolled back by length.
        let mut written = writer.file.write_all(&frame);
        if written.is_ok() && self.sync_on_write {
            written = writer.file.sync_data();
        }
        if let Err(e) = written {
            let len = writer.len;
            if let Err(rollback) = writer.file.set_len(len) {
                warn!(error = %rollback, "Failed to roll back partial WAL append");
            }
            return Err(e);
        }

        writer.len += frame.len() as u64;
        writer.sequence = entry.sequence;
        Ok(entry.sequence)
    }

    /// Replace the log with a snapshot of `root`.
    ///
    /// The snapshot is split into entries of at most [`SNAPSHOT_CHUNK`]
    /// encoded bytes, so a tree larger than one frame can still be compacted.
    /// The new log is written beside the old one and renamed over it, so a
    /// crash leaves one of the two intact. Sequence numbers keep increasing.
    pub fn rewrite(&self, root: &Value) -> IoResult<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| IoError::other("poisoned lock: wal.rewrite"))?;

        let timestamp = Utc::now();
        let mut sequence = writer.sequence;
        let mut len = codec::HEADER_LEN;

        let staging = self.path.with_extension("wal.compact");
        {
            let mut out = BufWriter::new(File::create(&staging)?);
            codec::write_header(&mut out)?;
            for mutation in snapshot_mutations(root, SNAPSHOT_CHUNK) {
                sequence += 1;
                let frame = codec::encode(&WalEntry {
                    sequence,
                    timestamp,
                    mutation,
                })?;
                out.write_all(&frame)?;
                len += frame.len() as u64;
            }
            let file = out.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&staging, &self.path)?;

        writer.file = OpenOptions::new().append(true).open(&self.path)?;
        writer.len = len;
        writer.sequence = sequence;
        Ok(())
    }

    /// Sequence number of the last appended entry (0 for an empty log).
    pub fn current_sequence(&self) -> IoResult<u64> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| IoError::other("poisoned lock: wal.sequence"))?;
        Ok(writer.sequence)
    }

    /// Size of the log file in bytes.
    pub fn size_bytes(&self) -> IoResult<u64> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| IoError::other("poisoned lock: wal.size"))?;
        Ok(writer.len)
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CommitSink for WriteAheadLog {
    fn record(&self, mutation: &Mutation) -> Result<(), StorageError> {
        self.append(mutation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn set(path: &str, value: serde_json::Value) -> Mutation {
        Mutation::Set {
            path: DataPath::parse(path).unwrap(),
            value,
        }
    }

    #[test]
    fn test_append_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("craftable.wal");

        {
            let (wal, recovery) = WriteAheadLog::open(&path, true).unwrap();
            assert!(recovery.entries.is_empty());
            assert_eq!(wal.append(&set("posts/p1/title", json!("Cowl"))).unwrap(), 1);
            assert_eq!(wal.append(&set("posts/p1/likes", json!(0))).unwrap(), 2);
            assert_eq!(wal.current_sequence().unwrap(), 2);
        }

        let (wal, recovery) = WriteAheadLog::open(&path, true).unwrap();
        assert_eq!(recovery.entries.len(), 2);
        assert_eq!(recovery.discarded_bytes, 0);
        assert_eq!(recovery.entries[0].mutation, set("posts/p1/title", json!("Cowl")));
        assert_eq!(wal.append(&set("posts/p1/likes", json!(1))).unwrap(), 3);
    }

    #[test]
    fn test_torn_tail_is_cut_and_log_stays_appendable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("craftable.wal");
        {
            let (wal, _) = WriteAheadLog::open(&path, false).unwrap();
            wal.append(&set("a", json!(1))).unwrap();
            wal.append(&set("b", json!(2))).unwrap();
        }
        let full = fs::metadata(&path).unwrap().len();
        OpenOptions::new().write(true).open(&path).unwrap().set_len(full - 3).unwrap();

        {
            let (wal, recovery) = WriteAheadLog::open(&path, false).unwrap();
            assert_eq!(recovery.entries.len(), 1);
            assert!(recovery.discarded_bytes > 0);
            assert_eq!(wal.append(&set("c", json!(3))).unwrap(), 2);
        }

        let (_wal, recovery) = WriteAheadLog::open(&path, false).unwrap();
        let paths: Vec<String> = recovery
            .entries
            .iter()
            .map(|e| match &e.mutation {
                Mutation::Set { path, .. } => path.to_string(),
                Mutation::Merge { path, .. } => path.to_string(),
            })
            .collect();
        assert_eq!(paths, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_rewrite_collapses_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("craftable.wal");
        let (wal, _) = WriteAheadLog::open(&path, false).unwrap();
        for i in 0..20 {
            wal.append(&set("posts/p1/likes", json!(i))).unwrap();
        }
        let before = wal.size_bytes().unwrap();

        let tree = json!({"posts": {"p1": {"likes": 19}}});
        wal.rewrite(&tree).unwrap();
        assert!(wal.size_bytes().unwrap() < before);
        assert_eq!(wal.size_bytes().unwrap(), fs::metadata(&path).unwrap().len());
        assert_eq!(wal.append(&set("posts/p1/likes", json!(20))).unwrap(), 22);
        drop(wal);

        let (_wal, recovery) = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(recovery.entries.len(), 2);
        assert_eq!(
            recovery.entries[0].mutation,
            Mutation::Set {
                path: DataPath::root(),
                value: tree
            }
        );
    }

    #[test]
    fn test_snapshot_splits_large_tree_into_bounded_entries() {
        let mut posts = serde_json::Map::new();
        for i in 0..10 {
            posts.insert(
                format!("p{i}"),
                json!({"title": format!("{:0>40}", i), "likes": i}),
            );
        }
        let tree = json!({"posts": posts, "users": {"u1": {"name": "Ada"}}});

        let chunk = 200;
        let mutations = snapshot_mutations(&tree, chunk);
        assert!(mutations.len() > 1);

        let mut rebuilt = Value::Null;
        for mutation in &mutations {
            let value_len = match mutation {
                Mutation::Set { value, .. } => encoded_len(value),
                Mutation::Merge { children, .. } => children
                    .iter()
                    .map(|(key, child)| key.to_string().len() + encoded_len(child))
                    .sum(),
            };
            assert!(value_len <= chunk, "entry of {value_len} bytes");
            match mutation {
                Mutation::Set { path, value } => crate::storage::tree::set(&mut rebuilt, path, value.clone()),
                Mutation::Merge { path, children } => crate::storage::tree::merge(&mut rebuilt, path, children),
            }
        }
        assert_eq!(rebuilt, tree);
    }

    #[test]
    fn test_small_tree_snapshot_is_one_set() {
        let tree = json!({"posts": {"p1": {"likes": 1}}});
        assert_eq!(
            snapshot_mutations(&tree, SNAPSHOT_CHUNK),
            vec![Mutation::Set {
                path: DataPath::root(),
                value: tree
            }]
        );
        assert!(snapshot_mutations(&Value::Null, SNAPSHOT_CHUNK).is_empty());
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("craftable.wal");
        fs::write(&path, b"not a log at all").unwrap();
        let err = WriteAheadLog::open(&path, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}
