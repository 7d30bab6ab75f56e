//! In-memory metadata index
//!
//! Maps each [`FileId`] to its [`FileRecord`] and remembers upload order for
//! listing. Readers share a read lock; inserts and rebuilds take the write lock
//! only for the in-memory mutation itself.

use crate::common::{FileId, Result};
use crate::store::event::{Event, FileRecord};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Outcome of folding a replayed journal into the index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    /// Events read from the journal
    pub events: u64,
    /// Events of an unknown type that were skipped
    pub skipped: u64,
    /// `AddFile` events whose identifier was already present
    pub duplicates: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct IndexState {
    positions: HashMap<FileId, usize>,
    records: Vec<FileRecord>,
}

impl IndexState {
    /// Returns true when an existing entry was overwritten.
    ///
    /// A repeated identifier keeps its original list position and takes the
    /// newer record: last write wins, ordering stays first-seen.
    fn insert(&mut self, record: FileRecord) -> bool {
        match self.positions.get(&record.id) {
            Some(&pos) => {
                self.records[pos] = record;
                true
            }
            None => {
                self.positions.insert(record.id.clone(), self.records.len());
                self.records.push(record);
                false
            }
        }
    }
}

/// Concurrent identifier → record map with insertion-ordered listing
#[derive(Debug, Default)]
pub struct MetadataIndex {
    state: RwLock<IndexState>,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with the fold of `events`.
    ///
    /// The new state is built off-lock and swapped in at the end, so a failed
    /// replay leaves the previous contents untouched.
    pub fn rebuild_from<I>(&self, events: I) -> Result<RebuildStats>
    where
        I: IntoIterator<Item = Result<Event>>,
    {
        let mut next = IndexState::default();
        let mut stats = RebuildStats::default();

        for event in events {
            stats.events += 1;
            match event? {
                Event::AddFile(record) => {
                    if next.insert(record) {
                        stats.duplicates += 1;
                    }
                }
                Event::Unknown { kind } => {
                    tracing::warn!("Skipping journal event of unknown type {:?}", kind);
                    stats.skipped += 1;
                }
            }
        }

        if stats.duplicates > 0 {
            tracing::warn!(
                "Journal contained {} repeated file ids; later records won",
                stats.duplicates
            );
        }

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(stats)
    }

    /// Add one record. The matching event must already be in the journal.
    pub fn insert(&self, record: FileRecord) {
        let replaced = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record);
        if replaced {
            tracing::warn!("Index insert replaced an existing file id");
        }
    }

    pub fn get(&self, id: &FileId) -> Option<FileRecord> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .positions
            .get(id)
            .map(|&pos| state.records[pos].clone())
    }

    pub fn contains(&self, id: &FileId) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .positions
            .contains_key(id)
    }

    /// All records in upload order
    pub fn list(&self) -> Vec<FileRecord> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .clone()
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
