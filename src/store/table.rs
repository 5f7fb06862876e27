use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::store::error::StoreError;
use crate::store::records::Record;

/// Journal entries below this count are never compacted.
const COMPACT_MIN_ENTRIES: usize = 1024;

/// Keyed, order-indexed durable collection.
///
/// A mutation is visible to every reader once the call has resolved.
#[async_trait]
pub trait Table<R: Record>: Send + Sync {
    async fn upsert(&self, record: R) -> Result<(), StoreError>;
    async fn bulk_upsert(&self, records: Vec<R>) -> Result<usize, StoreError>;
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
    async fn bulk_delete(&self, ids: &[String]) -> Result<usize, StoreError>;
    async fn get(&self, id: &str) -> Result<Option<R>, StoreError>;
    async fn count(&self) -> Result<usize, StoreError>;
    /// Records with `from <= order_key <= to`, ascending.
    async fn between(&self, from: i64, to: i64) -> Result<Vec<R>, StoreError>;
    async fn ascending(&self, limit: usize) -> Result<Vec<R>, StoreError>;
    async fn descending(&self, limit: usize) -> Result<Vec<R>, StoreError>;

    /// Records dropped while loading because they no longer deserialise.
    /// The count is reported once and then reset.
    fn take_discarded_on_load(&self) -> usize {
        0
    }
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum WriteEntry<'a, R> {
    Put { record: &'a R },
    Delete { id: &'a str },
}

#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ReadEntry<R> {
    Put { record: R },
    Delete { id: String },
}

struct Index<R> {
    records: HashMap<String, R>,
    order: BTreeSet<(i64, String)>,
}

impl<R> Default for Index<R> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            order: BTreeSet::new(),
        }
    }
}

impl<R: Record> Index<R> {
    fn put(&mut self, record: R) {
        if let Some(old) = self.records.get(record.id()) {
            self.order.remove(&(old.order_key(), old.id().to_string()));
        }
        self.order
            .insert((record.order_key(), record.id().to_string()));
        self.records.insert(record.id().to_string(), record);
    }

    fn remove(&mut self, id: &str) -> bool {
        match self.records.remove(id) {
            Some(old) => {
                self.order.remove(&(old.order_key(), id.to_string()));
                true
            }
            None => false,
        }
    }

    fn ordered(&self) -> impl DoubleEndedIterator<Item = &R> {
        self.order.iter().filter_map(|(_, id)| self.records.get(id))
    }
}

/// Append-only JSON-lines journal backing a table.
struct Journal {
    path: PathBuf,
    writer: BufWriter<File>,
    entries: usize,
}

impl Journal {
    fn open_append(path: PathBuf, entries: usize) -> Result<Self, StoreError> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            entries,
        })
    }

    fn append<R: Serialize>(&mut self, entries: &[WriteEntry<'_, R>]) -> Result<(), StoreError> {
        for entry in entries {
            serde_json::to_writer(&mut self.writer, entry)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        self.entries += entries.len();
        Ok(())
    }

    /// Rewrite the journal as one put per live record.
    fn compact<R: Record>(&mut self, index: &Index<R>) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("compact");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for record in index.ordered() {
                serde_json::to_writer(&mut out, &WriteEntry::Put { record })?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        *self = Journal::open_append(self.path.clone(), index.records.len())?;
        log::debug!(
            "Compacted {} to {} entries",
            self.path.display(),
            self.entries
        );
        Ok(())
    }
}

struct Inner<R> {
    index: Index<R>,
    journal: Option<Journal>,
}

impl<R: Record> Inner<R> {
    fn persist(&mut self, entries: &[WriteEntry<'_, R>]) -> Result<(), StoreError> {
        if let Some(journal) = self.journal.as_mut() {
            journal.append(entries)?;
        }
        Ok(())
    }

    fn maybe_compact(&mut self) -> Result<(), StoreError> {
        let live = self.index.records.len();
        if let Some(journal) = self.journal.as_mut() {
            if journal.entries > COMPACT_MIN_ENTRIES && journal.entries > 2 * live {
                journal.compact(&self.index)?;
            }
        }
        Ok(())
    }
}

/// In-memory index persisted to a JSON-lines journal.
pub struct JsonTable<R> {
    inner: RwLock<Inner<R>>,
    discarded: AtomicUsize,
}

impl<R: Record> JsonTable<R> {
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Inner {
                index: Index::default(),
                journal: None,
            }),
            discarded: AtomicUsize::new(0),
        }
    }

    /// Replay the journal at `path`, creating it if missing. Lines that no
    /// longer deserialise are skipped and the journal is rewritten clean.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut index = Index::default();
        let mut entries = 0;
        let mut skipped = 0;

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (line_no, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ReadEntry<R>>(&line) {
                    Ok(ReadEntry::Put { record }) => index.put(record),
                    Ok(ReadEntry::Delete { id }) => {
                        index.remove(&id);
                    }
                    Err(e) => {
                        skipped += 1;
                        log::warn!(
                            "Skipping unreadable entry {}:{}: {}",
                            path.display(),
                            line_no + 1,
                            e
                        );
                    }
                }
                entries += 1;
            }
        } else if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut journal = Journal::open_append(path, entries)?;
        if skipped > 0 {
            journal.compact(&index)?;
        }

        Ok(Self {
            inner: RwLock::new(Inner {
                index,
                journal: Some(journal),
            }),
            discarded: AtomicUsize::new(skipped),
        })
    }
}

#[async_trait]
impl<R: Record> Table<R> for JsonTable<R> {
    async fn upsert(&self, record: R) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.persist(&[WriteEntry::Put { record: &record }])?;
        inner.index.put(record);
        inner.maybe_compact()
    }

    async fn bulk_upsert(&self, records: Vec<R>) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut inner = self.inner.write().await;
        let entries: Vec<_> = records
            .iter()
            .map(|record| WriteEntry::Put { record })
            .collect();
        inner.persist(&entries)?;
        let count = records.len();
        for record in records {
            inner.index.put(record);
        }
        inner.maybe_compact()?;
        Ok(count)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.bulk_delete(&[id.to_string()]).await? == 1)
    }

    async fn bulk_delete(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        let present: Vec<&String> = ids
            .iter()
            .filter(|id| inner.index.records.contains_key(id.as_str()))
            .collect();
        if present.is_empty() {
            return Ok(0);
        }
        let entries: Vec<WriteEntry<'_, R>> = present
            .iter()
            .map(|id| WriteEntry::Delete { id: id.as_str() })
            .collect();
        inner.persist(&entries)?;
        let removed = present.iter().filter(|id| inner.index.remove(id)).count();
        inner.maybe_compact()?;
        Ok(removed)
    }

    async fn get(&self, id: &str) -> Result<Option<R>, StoreError> {
        Ok(self.inner.read().await.index.records.get(id).cloned())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().await.index.records.len())
    }

    async fn between(&self, from: i64, to: i64) -> Result<Vec<R>, StoreError> {
        let inner = self.inner.read().await;
        let index = &inner.index;
        Ok(index
            .order
            .range((from, String::new())..)
            .take_while(|(key, _)| *key <= to)
            .filter_map(|(_, id)| index.records.get(id).cloned())
            .collect())
    }

    async fn ascending(&self, limit: usize) -> Result<Vec<R>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.index.ordered().take(limit).cloned().collect())
    }

    async fn descending(&self, limit: usize) -> Result<Vec<R>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.index.ordered().rev().take(limit).cloned().collect())
    }

    fn take_discarded_on_load(&self) -> usize {
        self.discarded.swap(0, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::records::{PositionSample, Visibility};

    fn sample(timestamp: i64) -> PositionSample {
        PositionSample {
            id: PositionSample::live_id(timestamp),
            latitude: 10.0,
            longitude: 20.0,
            altitude_km: 420.0,
            velocity_kmh: 27_600.0,
            timestamp,
            visibility: Visibility::Daylight,
        }
    }

    #[tokio::test]
    async fn ordered_queries() {
        let table: JsonTable<PositionSample> = JsonTable::in_memory();
        table
            .bulk_upsert(vec![sample(30), sample(10), sample(20), sample(40)])
            .await
            .unwrap();

        let asc: Vec<i64> = table.ascending(2).await.unwrap().iter().map(|s| s.timestamp).collect();
        assert_eq!(asc, vec![10, 20]);
        let desc: Vec<i64> =
            table.descending(3).await.unwrap().iter().map(|s| s.timestamp).collect();
        assert_eq!(desc, vec![40, 30, 20]);
        let mid: Vec<i64> =
            table.between(20, 30).await.unwrap().iter().map(|s| s.timestamp).collect();
        assert_eq!(mid, vec![20, 30]);
    }

    #[tokio::test]
    async fn upsert_replaces_same_id() {
        let table: JsonTable<PositionSample> = JsonTable::in_memory();
        table.upsert(sample(10)).await.unwrap();
        let mut moved = sample(10);
        moved.latitude = -5.0;
        table.upsert(moved).await.unwrap();

        assert_eq!(table.count().await.unwrap(), 1);
        let stored = table.get("pos-10").await.unwrap().unwrap();
        assert_eq!(stored.latitude, -5.0);
    }

    #[tokio::test]
    async fn delete_reports_what_existed() {
        let table: JsonTable<PositionSample> = JsonTable::in_memory();
        table.bulk_upsert(vec![sample(1), sample(2)]).await.unwrap();
        assert!(table.delete("pos-1").await.unwrap());
        assert!(!table.delete("pos-1").await.unwrap());
        let removed = table
            .bulk_delete(&["pos-2".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(table.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn journal_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.jsonl");
        {
            let table: JsonTable<PositionSample> = JsonTable::open(&path).unwrap();
            table
                .bulk_upsert(vec![sample(1), sample(2), sample(3)])
                .await
                .unwrap();
            table.delete("pos-2").await.unwrap();
        }

        let table: JsonTable<PositionSample> = JsonTable::open(&path).unwrap();
        let ids: Vec<String> = table.ascending(10).await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["pos-1".to_string(), "pos-3".to_string()]);
    }

    #[tokio::test]
    async fn unreadable_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.jsonl");
        let good = serde_json::to_string(&WriteEntry::Put { record: &sample(5) }).unwrap();
        fs::write(
            &path,
            format!("{}\n{{\"op\":\"put\",\"record\":{{\"id\":\"x\"}}}}\n{{truncated", good),
        )
        .unwrap();

        let table: JsonTable<PositionSample> = JsonTable::open(&path).unwrap();
        assert_eq!(table.count().await.unwrap(), 1);
        assert_eq!(table.take_discarded_on_load(), 2);
        assert_eq!(table.take_discarded_on_load(), 0);

        // The journal was rewritten, so appends land on a clean line.
        table.upsert(sample(6)).await.unwrap();
        drop(table);
        let table: JsonTable<PositionSample> = JsonTable::open(&path).unwrap();
        assert_eq!(table.count().await.unwrap(), 2);
        assert_eq!(table.take_discarded_on_load(), 0);
    }

    #[tokio::test]
    async fn journal_is_compacted_after_churn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.jsonl");
        let table: JsonTable<PositionSample> = JsonTable::open(&path).unwrap();
        for _ in 0..3 {
            table
                .bulk_upsert((0..500).map(sample).collect())
                .await
                .unwrap();
        }
        let lines = fs::read_to_string(&path).unwrap().lines().count();
        assert!(lines <= 1000, "journal has {} lines", lines);
        assert_eq!(table.count().await.unwrap(), 500);
    }
}
