//! Journal + index pair
//!
//! The catalog is the single owner of the live journal and metadata index. Its
//! commit protocol is: append to the journal, then insert into the index, both
//! under the journal lock. A record visible in the index is therefore always
//! recoverable after a crash, and the order records appear in `list()` is the
//! order replay will reproduce.

use crate::common::{Error, FileId, JournalSyncPolicy, Result};
use crate::store::event::{Event, FileRecord};
use crate::store::index::{MetadataIndex, RebuildStats};
use crate::store::journal::Journal;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct Catalog {
    journal: Mutex<Journal>,
    index: MetadataIndex,
}

impl Catalog {
    /// Open the journal and rebuild the index by replaying it from the start.
    pub fn open(journal_path: impl AsRef<Path>, sync_policy: JournalSyncPolicy) -> Result<Self> {
        let journal_path = journal_path.as_ref();
        tracing::info!("Replaying journal from {}", journal_path.display());

        let journal = Journal::open(journal_path, sync_policy)?;
        let index = MetadataIndex::new();
        let stats = index.rebuild_from(journal.replay()?)?;

        tracing::info!(
            "Catalog opened: {} files from {} events ({} skipped)",
            index.len(),
            stats.events,
            stats.skipped
        );

        Ok(Self {
            journal: Mutex::new(journal),
            index,
        })
    }

    /// Durably record `record` and make it visible to readers.
    ///
    /// Blocks on file I/O; async callers should run it on a blocking thread.
    pub fn commit(&self, record: FileRecord) -> Result<FileRecord> {
        let mut journal = self.lock_journal()?;
        let position = journal.append(&Event::AddFile(record.clone()))?;
        self.index.insert(record.clone());
        drop(journal);

        tracing::debug!(file_id = %record.id, position, "Committed file record");
        Ok(record)
    }

    /// Discard the index and rebuild it from the journal.
    pub fn rebuild(&self) -> Result<RebuildStats> {
        let journal = self.lock_journal()?;
        self.index.rebuild_from(journal.replay()?)
    }

    pub fn get(&self, id: &FileId) -> Option<FileRecord> {
        self.index.get(id)
    }

    /// Records in upload order
    pub fn list(&self) -> Vec<FileRecord> {
        self.index.list()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    fn lock_journal(&self) -> Result<MutexGuard<'_, Journal>> {
        self.journal
            .lock()
            .map_err(|_| Error::Internal("journal lock poisoned".into()))
    }
}
