//! Offline consistency check of a data directory
//!
//! Replays the journal read-only and compares it with the blob directory. An
//! indexed record without a blob means the write protocol was violated or the
//! disk was tampered with. Blobs without a record are the expected leftovers of
//! uploads interrupted between publishing and journaling.

use crate::common::{FileId, Result};
use crate::store::{BlobStore, Journal, MetadataIndex};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    /// Records in the replayed index
    pub records: usize,
    /// Records whose blob is present
    pub healthy: usize,
    pub missing_blobs: Vec<FileId>,
    pub orphaned_blobs: Vec<FileId>,
    /// Interrupted uploads still in staging
    pub staging_leftovers: usize,
    /// Size of all blobs referenced by a record
    pub total_bytes: u64,
    /// Events of a type this build does not know
    pub skipped_events: u64,
    /// Bytes of an incomplete final journal record
    pub torn_tail_bytes: u64,
}

impl VerifyReport {
    /// True when every indexed record has its blob
    pub fn is_consistent(&self) -> bool {
        self.missing_blobs.is_empty()
    }
}

pub fn verify_store(journal_path: &Path, blobs_dir: &Path) -> Result<VerifyReport> {
    tracing::info!(
        "Verifying {} against {}",
        journal_path.display(),
        blobs_dir.display()
    );

    let index = MetadataIndex::new();
    let mut replay = Journal::replay_path(journal_path)?;
    let stats = index.rebuild_from(replay.by_ref())?;

    let store = BlobStore::at(blobs_dir);
    let blobs = store.blobs()?;
    let on_disk: HashSet<&FileId> = blobs.iter().map(|(id, _)| id).collect();

    let mut report = VerifyReport {
        records: index.len(),
        staging_leftovers: store.staged()?,
        skipped_events: stats.skipped,
        torn_tail_bytes: replay.torn_tail(),
        ..Default::default()
    };

    for record in index.list() {
        if on_disk.contains(&record.id) {
            report.healthy += 1;
        } else {
            tracing::error!(file_id = %record.id, "Indexed file has no blob");
            report.missing_blobs.push(record.id);
        }
    }

    for (id, size) in &blobs {
        if index.contains(id) {
            report.total_bytes += size;
        } else {
            report.orphaned_blobs.push(id.clone());
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::JournalSyncPolicy;
    use crate::store::{Catalog, FileRecord};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_verify_reports_missing_and_orphaned() {
        let dir = tempdir().unwrap();
        let journal_path = dir.path().join("journal.txt");
        let blobs_dir = dir.path().join("files");
        BlobStore::open_dir(&blobs_dir).unwrap();

        let catalog = Catalog::open(&journal_path, JournalSyncPolicy::Always).unwrap();
        for id in ["a", "b"] {
            catalog
                .commit(FileRecord::new(FileId::parse(id).unwrap(), id, "m"))
                .unwrap();
        }
        fs::write(blobs_dir.join("a"), b"12345").unwrap();
        fs::write(blobs_dir.join("orphan"), b"x").unwrap();

        let report = verify_store(&journal_path, &blobs_dir).unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.healthy, 1);
        assert_eq!(report.missing_blobs, vec![FileId::parse("b").unwrap()]);
        assert_eq!(report.orphaned_blobs, vec![FileId::parse("orphan").unwrap()]);
        assert_eq!(report.total_bytes, 5);
        assert!(!report.is_consistent());
    }

    #[test]
    fn test_verify_empty_store() {
        let dir = tempdir().unwrap();
        let report =
            verify_store(&dir.path().join("journal.txt"), &dir.path().join("files")).unwrap();
        assert_eq!(report.records, 0);
        assert!(report.is_consistent());
    }

    #[test]
    fn test_verify_tolerates_torn_tail() {
        let dir = tempdir().unwrap();
        let journal_path = dir.path().join("journal.txt");
        fs::write(
            &journal_path,
            concat!(
                r#"{"type":"add_file","add_file":{"id":"a","name":"x","mime_type":"m"}}"#,
                "\n",
                r#"{"type":"add_fi"#,
            ),
        )
        .unwrap();

        let report = verify_store(&journal_path, &dir.path().join("files")).unwrap();
        assert_eq!(report.records, 1);
        assert_eq!(report.torn_tail_bytes, 15);
        assert_eq!(report.missing_blobs.len(), 1);
    }
}
