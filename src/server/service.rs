//! The file service handed to request handlers
//!
//! Built once at startup from the live [`Catalog`] and [`BlobStore`] and cloned
//! into every handler. Cloning is cheap; all clones share the same catalog.

use crate::common::{Config, FileId, Result};
use crate::server::ingest::BodyError;
use crate::store::{BlobStore, Catalog, FileRecord};
use bytes::Bytes;
use futures_util::Stream;
use std::sync::Arc;

#[derive(Clone)]
pub struct FileService {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) blobs: BlobStore,
}

impl FileService {
    pub fn new(catalog: Arc<Catalog>, blobs: BlobStore) -> Self {
        Self { catalog, blobs }
    }

    /// Open the journal and blob directory named by `config`.
    pub fn open(config: &Config) -> Result<Self> {
        let blobs = BlobStore::open_dir(config.blobs_dir())?;
        let catalog = Catalog::open(config.journal_path(), config.journal_sync)?;
        Ok(Self::new(Arc::new(catalog), blobs))
    }

    /// Store one file from a byte stream and commit its record.
    pub async fn ingest<S, E>(
        &self,
        name: &str,
        content_type: Option<&str>,
        body: S,
    ) -> Result<FileRecord>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: BodyError,
    {
        let mut ingest = self.begin_ingest(name, content_type)?;
        ingest.store(body).await?;
        ingest.commit().await
    }

    /// All records in upload order
    pub fn list(&self) -> Vec<FileRecord> {
        self.catalog.list()
    }

    pub fn get(&self, id: &FileId) -> Option<FileRecord> {
        self.catalog.get(id)
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }
}
