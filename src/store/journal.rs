//! Append-only metadata journal
//!
//! The journal is the only durable copy of file metadata. Every committed
//! change is appended as one newline-terminated JSON record (see
//! [`crate::store::event`]) and the in-memory index is rebuilt by replaying the
//! file from offset zero on startup.
//!
//! A record whose trailing newline never reached the disk is a torn write from a
//! crash. Replay treats it as the end of the log, and [`Journal::open`] cuts it
//! off so the next append starts on a clean line. Any other undecodable line is
//! corruption and stops replay with [`Error::JournalCorrupted`].
//!
//! `Journal` is a single writer. Concurrent callers go through
//! [`crate::store::Catalog`], which owns it behind a mutex.

use crate::common::{Error, JournalSyncPolicy, Result};
use crate::store::event::Event;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Append handle on the journal file
pub struct Journal {
    path: PathBuf,
    file: File,
    /// Byte length of the well-formed prefix of the file
    len: u64,
    /// Number of complete records in the file
    records: u64,
    sync_policy: JournalSyncPolicy,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
    #[cfg(test)]
    faults: Faults,
}

#[cfg(test)]
#[derive(Debug, Default)]
struct Faults {
    /// Fail the next write after this many bytes reach the file
    write_after: Option<usize>,
    /// Fail the next rollback
    rollback: bool,
}

impl Journal {
    /// Open or create the journal.
    ///
    /// The whole file is scanned once. A torn trailing record is truncated away;
    /// a malformed complete record fails the open.
    pub fn open(path: impl AsRef<Path>, sync_policy: JournalSyncPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;

        let mut replay = Self::replay_path(&path)?;
        let mut records = 0u64;
        for event in replay.by_ref() {
            event?;
            records += 1;
        }

        let len = replay.valid_len();
        if replay.torn_tail() > 0 {
            tracing::warn!(
                "Discarding {} bytes of incomplete trailing record in {}",
                replay.torn_tail(),
                path.display()
            );
            file.set_len(len)?;
            file.sync_all()?;
        }

        tracing::debug!("Journal opened: {} records, {} bytes", records, len);

        Ok(Self {
            path,
            file,
            len,
            records,
            sync_policy,
            poisoned: false,
            #[cfg(test)]
            faults: Faults::default(),
        })
    }

    /// Append one event and push it to stable storage.
    ///
    /// Returns the record's zero-based position in the journal. On failure the
    /// file is cut back to its previous length and the event must be treated as
    /// not committed.
    pub fn append(&mut self, event: &Event) -> Result<u64> {
        if self.poisoned {
            return Err(Error::Internal(format!(
                "journal {} holds an unrepaired partial record; reopen to repair",
                self.path.display()
            )));
        }
        let buf = event.encode()?;

        if let Err(e) = self.write_record(&buf) {
            if let Err(repair) = self.rollback() {
                tracing::error!(
                    "Journal append failed ({}) and truncating back to {} bytes also failed: {}",
                    e,
                    self.len,
                    repair
                );
                self.poisoned = true;
            }
            return Err(e);
        }

        let position = self.records;
        self.len += buf.len() as u64;
        self.records += 1;
        Ok(position)
    }

    fn write_record(&mut self, buf: &[u8]) -> Result<()> {
        #[cfg(test)]
        if let Some(n) = self.faults.write_after.take() {
            self.file.write_all(&buf[..n.min(buf.len())])?;
            return Err(std::io::Error::other("injected write failure").into());
        }

        self.file.write_all(buf)?;
        self.file.flush()?;
        if self.sync_policy == JournalSyncPolicy::Always {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Cut the file back to the end of the last complete record.
    fn rollback(&mut self) -> std::io::Result<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.faults.rollback) {
            return Err(std::io::Error::other("injected rollback failure"));
        }
        self.file.set_len(self.len)
    }

    /// Make the next append write `after` bytes and then fail.
    #[cfg(test)]
    pub(crate) fn fail_next_write(&mut self, after: usize) {
        self.faults.write_after = Some(after);
    }

    /// Make the next rollback fail.
    #[cfg(test)]
    pub(crate) fn fail_next_rollback(&mut self) {
        self.faults.rollback = true;
    }

    /// Replay this journal from the beginning.
    pub fn replay(&self) -> Result<Replay> {
        Self::replay_path(&self.path)
    }

    /// Replay the journal at `path` from the beginning. A missing file replays as empty.
    pub fn replay_path(path: impl AsRef<Path>) -> Result<Replay> {
        let reader = match File::open(path.as_ref()) {
            Ok(f) => Some(BufReader::new(f)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(Replay {
            reader,
            buf: Vec::new(),
            line: 0,
            valid_len: 0,
            torn_tail: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of complete records, including ones appended by this handle
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// Lazy scan over the journal's events in append order.
///
/// Yields `Err` at most once, for the first malformed record, and then ends.
pub struct Replay {
    reader: Option<BufReader<File>>,
    buf: Vec<u8>,
    line: u64,
    valid_len: u64,
    torn_tail: u64,
}

impl Replay {
    /// Bytes covered by the complete records read so far
    pub fn valid_len(&self) -> u64 {
        self.valid_len
    }

    /// Size of an incomplete final record, if the scan reached one
    pub fn torn_tail(&self) -> u64 {
        self.torn_tail
    }
}

impl Iterator for Replay {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        self.buf.clear();

        let n = match reader.read_until(b'\n', &mut self.buf) {
            Ok(n) => n,
            Err(e) => {
                self.reader = None;
                return Some(Err(e.into()));
            }
        };

        if n == 0 {
            self.reader = None;
            return None;
        }

        if self.buf.last() != Some(&b'\n') {
            // Crash mid-append: nothing after this can exist.
            self.torn_tail = n as u64;
            self.reader = None;
            return None;
        }

        self.line += 1;
        match Event::decode(&self.buf[..n - 1]) {
            Ok(event) => {
                self.valid_len += n as u64;
                Some(Ok(event))
            }
            Err(e) => {
                self.reader = None;
                Some(Err(Error::JournalCorrupted {
                    line: self.line,
                    reason: e.to_string(),
                }))
            }
        }
    }
}
