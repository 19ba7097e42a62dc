use crate::index::EntryIndex;
use async_trait::async_trait;
use jiff::Timestamp;
use linkvault_core::{
    NewEntry, OwnerId, Repository, Result, ShortCode, ShortenEntry, StorageError,
};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Counters collected while replaying a journal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records re-inserted into the index.
    pub replayed: usize,
    /// Records that soft-deleted an entry already replayed.
    pub deleted: usize,
    /// Lines that could not be parsed or conflicted with an earlier record.
    pub skipped: usize,
}

/// In-memory repository backed by an append-only journal file.
///
/// Every write is appended to the journal as one JSON line and flushed while
/// the write lock is held, before the in-memory index changes. A reader can
/// therefore never observe an entry that is indexed but not yet durable.
///
/// The journal is replayed once, by [`open`](JournaledRepository::open),
/// before the repository is handed out. Replayed entries receive fresh ids.
/// Soft deletes are journaled too, as a copy of the entry with
/// `deleted: true`, so they survive a restart.
///
/// Only one process may write to a journal file at a time.
pub struct JournaledRepository {
    path: PathBuf,
    recovery: RecoveryReport,
    state: RwLock<JournalState>,
}

struct JournalState {
    index: EntryIndex,
    journal: Journal,
}

impl JournaledRepository {
    /// Opens (or creates) the journal at `path` and rebuilds the index from it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut index = EntryIndex::default();
        let report = replay(&mut index, BufReader::new(&file))?;
        info!(
            path = %path.display(),
            entries = index.len(),
            replayed = report.replayed,
            deleted = report.deleted,
            skipped = report.skipped,
            "journal recovered"
        );

        let mut repo = Self::from_parts(path, index, Box::new(file));
        repo.recovery = report;
        Ok(repo)
    }

    fn from_parts(path: PathBuf, index: EntryIndex, sink: Box<dyn JournalSink>) -> Self {
        Self {
            path,
            recovery: RecoveryReport::default(),
            state: RwLock::new(JournalState {
                index,
                journal: Journal::new(sink),
            }),
        }
    }

    /// Returns the path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns what the replay in [`open`](JournaledRepository::open) did.
    pub fn recovery_report(&self) -> RecoveryReport {
        self.recovery
    }
}

impl std::fmt::Debug for JournaledRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournaledRepository")
            .field("path", &self.path)
            .field("recovery", &self.recovery)
            .finish_non_exhaustive()
    }
}

/// Rebuilds `index` from journal lines.
///
/// A record for a short code that is already indexed either soft-deletes it
/// (when the record carries `deleted: true`) or is skipped as a duplicate.
/// Every other record goes through the same insertion path as a live save,
/// with a fresh id. Unparseable lines are logged and skipped.
fn replay(index: &mut EntryIndex, mut reader: impl BufRead) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();
    let mut line = Vec::new();
    let mut line_no = 0usize;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        line_no += 1;

        let record = line.trim_ascii();
        if record.is_empty() {
            continue;
        }

        let record: ShortenEntry = match serde_json::from_slice(record) {
            Ok(record) => record,
            Err(err) => {
                warn!(line = line_no, error = %err, "skipping unreadable journal record");
                report.skipped += 1;
                continue;
            }
        };

        if index.contains_code(&record.short_code) {
            if record.deleted {
                index.mark_deleted(&record.short_code);
                report.deleted += 1;
            } else {
                warn!(
                    line = line_no,
                    code = %record.short_code,
                    "skipping duplicate short code in journal"
                );
                report.skipped += 1;
            }
            continue;
        }

        let deleted = record.deleted;
        let created_at = record.created_at;
        let pending = NewEntry {
            short_code: record.short_code,
            original_url: record.original_url,
            owner_id: record.owner_id,
            correlation_id: record.correlation_id,
        };
        let mut entry = index.assign(pending, created_at);
        entry.deleted = deleted;
        index.insert(entry);
        report.replayed += 1;
    }

    Ok(report)
}

/// Destination of journal appends.
///
/// Besides plain writes, a sink must report its length and shrink back to an
/// earlier length, so a failed append can be rolled back to the last record
/// boundary.
pub(crate) trait JournalSink: Write + Send + Sync {
    fn len(&self) -> io::Result<u64>;

    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl JournalSink for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// The append side of the journal.
struct Journal {
    sink: Option<Box<dyn JournalSink>>,
    /// Set when a failed append could not be rolled back. The tail may then
    /// hold a record nobody was told about, so nothing else is appended.
    poisoned: bool,
}

impl Journal {
    fn new(sink: Box<dyn JournalSink>) -> Self {
        Self {
            sink: Some(sink),
            poisoned: false,
        }
    }

    /// Appends one record and flushes it.
    ///
    /// On failure the sink is truncated back to its length before the call,
    /// so a rejected record never becomes durable, not even partially.
    fn append(&mut self, entry: &ShortenEntry) -> Result<()> {
        let mut line = Vec::with_capacity(128);
        serde_json::to_writer(&mut line, entry)
            .map_err(|err| StorageError::InvalidData(err.to_string()))?;
        line.push(b'\n');

        let sink = self.sink.as_mut().ok_or(StorageError::Closed)?;
        if self.poisoned {
            return Err(StorageError::Journal(
                "journal tail could not be rolled back after an earlier failure".to_string(),
            ));
        }

        let start = sink.len()?;
        let Err(err) = sink.write_all(&line).and_then(|()| sink.flush()) else {
            return Ok(());
        };

        if let Err(rollback) = sink.truncate(start) {
            error!(
                error = %rollback,
                len = start,
                "failed to roll back journal tail, refusing further appends"
            );
            self.poisoned = true;
        }
        Err(err.into())
    }

    fn close(&mut self) -> Result<()> {
        match self.sink.take() {
            Some(mut sink) => Ok(sink.flush()?),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Repository for JournaledRepository {
    async fn save(
        &self,
        code: &ShortCode,
        original_url: &str,
        owner_id: OwnerId,
    ) -> Result<ShortenEntry> {
        let mut state = self.state.write();
        let JournalState { index, journal } = &mut *state;
        index.ensure_codes_free([code])?;

        let entry = index.assign(
            NewEntry::new(code.clone(), original_url, owner_id),
            Timestamp::now(),
        );
        journal.append(&entry)?;
        index.insert(entry.clone());
        Ok(entry)
    }

    async fn save_all(&self, entries: Vec<NewEntry>) -> Result<Vec<ShortenEntry>> {
        let mut state = self.state.write();
        let JournalState { index, journal } = &mut *state;
        index.ensure_codes_free(entries.iter().map(|entry| &entry.short_code))?;

        let created_at = Timestamp::now();
        let total = entries.len();
        let mut stored = Vec::with_capacity(total);
        for pending in entries {
            let entry = index.assign(pending, created_at);
            if let Err(err) = journal.append(&entry) {
                error!(
                    path = %self.path.display(),
                    applied = stored.len(),
                    total,
                    error = %err,
                    "batch save stopped part way"
                );
                return Err(err);
            }
            index.insert(entry.clone());
            stored.push(entry);
        }
        Ok(stored)
    }

    async fn find_by_url(&self, original_url: &str) -> Result<Option<ShortenEntry>> {
        Ok(self.state.read().index.live_by_url(original_url).cloned())
    }

    async fn find_by_urls(&self, original_urls: &[String]) -> Result<Vec<ShortenEntry>> {
        Ok(self.state.read().index.live_by_urls(original_urls))
    }

    async fn find_by_key(&self, code: &ShortCode) -> Result<Option<ShortenEntry>> {
        Ok(self.state.read().index.get_by_code(code).cloned())
    }

    async fn find_all(&self) -> Result<Vec<ShortenEntry>> {
        Ok(self.state.read().index.newest_first())
    }

    async fn find_all_by_owner(&self, owner_id: OwnerId) -> Result<Vec<ShortenEntry>> {
        Ok(self.state.read().index.newest_first_by_owner(owner_id))
    }

    async fn delete_by_short_code(&self, code: &ShortCode) -> bool {
        let mut state = self.state.write();
        let JournalState { index, journal } = &mut *state;

        let tombstone = match index.get_by_code(code) {
            Some(entry) if !entry.deleted => ShortenEntry {
                deleted: true,
                ..entry.clone()
            },
            // Unknown or already deleted: nothing to write.
            _ => return true,
        };

        if let Err(err) = journal.append(&tombstone) {
            error!(code = %code, error = %err, "failed to journal soft delete");
            return false;
        }
        index.mark_deleted(code);
        debug!(code = %code, "soft deleted");
        true
    }

    async fn close(&self) -> Result<()> {
        self.state.write().journal.close()
    }
}
