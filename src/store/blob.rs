//! Blob storage
//!
//! Layout:
//! - `<dir>/<file_id>`: one file per upload, named exactly by its identifier
//! - `<dir>/.staging/<file_id>`: in-flight uploads
//!
//! Uploads stream into the staging directory and are published with a
//! no-clobber hard link once fully written and synced, so a name under `<dir>`
//! always refers to complete content and is never overwritten.

use crate::common::{Error, FileId, Result};
use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};

const STAGING_DIR: &str = ".staging";
const CHUNK_SIZE: usize = 64 * 1024;

/// Write-once, read-many content store keyed by [`FileId`]
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
    staging: PathBuf,
}

impl BlobStore {
    /// Open or create the blob directory, discarding uploads left in staging
    /// by a previous process.
    pub fn open_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let store = Self::at(dir);
        fs::create_dir_all(&store.staging)?;

        let mut cleared = 0usize;
        for entry in fs::read_dir(&store.staging)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
                cleared += 1;
            }
        }
        if cleared > 0 {
            tracing::info!("Cleared {} interrupted uploads from staging", cleared);
        }

        Ok(store)
    }

    /// Handle on a blob directory without touching the filesystem
    pub fn at(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let staging = dir.join(STAGING_DIR);
        Self { dir, staging }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, id: &FileId) -> PathBuf {
        self.dir.join(id.as_str())
    }

    /// Start writing a new blob. Fails with [`Error::BlobExists`] if `id` was
    /// ever published or is being written right now.
    pub async fn create(&self, id: &FileId) -> Result<BlobSink> {
        let final_path = self.path_of(id);
        if tokio::fs::try_exists(&final_path).await? {
            return Err(Error::BlobExists(id.to_string()));
        }

        let staging_path = self.staging.join(id.as_str());
        let file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging_path)
            .await
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::BlobExists(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        Ok(BlobSink {
            id: id.clone(),
            dir: self.dir.clone(),
            staging_path,
            final_path,
            writer: BufWriter::new(file),
            written: 0,
            published: false,
        })
    }

    /// Open a published blob for reading. `Ok(None)` when it does not exist.
    pub async fn open(&self, id: &FileId) -> Result<Option<tokio::fs::File>> {
        match tokio::fs::File::open(self.path_of(id)).await {
            Ok(f) => Ok(Some(f)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Published blobs with their sizes. Names that are not valid identifiers are ignored.
    pub fn blobs(&self) -> Result<Vec<(FileId, u64)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut blobs = Vec::new();
        for entry in entries {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().map(FileId::parse) {
                Some(Ok(id)) => blobs.push((id, meta.len())),
                _ => tracing::debug!("Ignoring foreign file {:?} in blob directory", name),
            }
        }
        blobs.sort();
        Ok(blobs)
    }

    /// Number of files sitting in staging
    pub fn staged(&self) -> Result<usize> {
        match fs::read_dir(&self.staging) {
            Ok(entries) => Ok(entries.filter_map(|e| e.ok()).count()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

/// Streaming writer for one blob.
///
/// Nothing is visible under the blob's final name until [`BlobSink::finish`]
/// succeeds. Dropping an unfinished sink discards the staged bytes.
#[derive(Debug)]
pub struct BlobSink {
    id: FileId,
    dir: PathBuf,
    staging_path: PathBuf,
    final_path: PathBuf,
    writer: BufWriter<tokio::fs::File>,
    written: u64,
    published: bool,
}

impl BlobSink {
    pub fn id(&self) -> &FileId {
        &self.id
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.writer.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Sync the content and publish it under its identifier.
    pub async fn finish(mut self) -> Result<u64> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_all().await?;

        match tokio::fs::hard_link(&self.staging_path, &self.final_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::BlobExists(self.id.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        self.published = true;

        if let Err(e) = tokio::fs::remove_file(&self.staging_path).await {
            tracing::warn!("Failed to remove staged copy of {}: {}", self.id, e);
        }
        sync_dir(&self.dir).await?;

        Ok(self.written)
    }
}

impl Drop for BlobSink {
    fn drop(&mut self) {
        if !self.published {
            if let Err(e) = fs::remove_file(&self.staging_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to discard staged upload {}: {}", self.id, e);
                }
            }
        }
    }
}

/// Read a file as a stream of chunks without loading it into memory.
pub fn chunk_stream(mut file: tokio::fs::File) -> impl Stream<Item = std::io::Result<Bytes>> {
    async_stream::try_stream! {
        loop {
            let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
            if file.read_buf(&mut buf).await? == 0 {
                break;
            }
            yield buf.freeze();
        }
    }
}

/// Persist directory entries so a published name survives a crash.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await?;
    Ok(())
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
