//! File retrieval: resolve through the index, then open the blob.

use crate::common::{Error, FileId, Result};
use crate::server::FileService;
use crate::store::FileRecord;

/// An indexed file with its content opened for streaming
#[derive(Debug)]
pub struct RetrievedFile {
    pub record: FileRecord,
    pub file: tokio::fs::File,
    pub size: u64,
}

impl FileService {
    /// Look up `id` and open its blob.
    ///
    /// An unknown id is [`Error::NotFound`]. A known id whose blob is gone is
    /// [`Error::BlobMissing`]: the write protocol guarantees the blob exists
    /// before the record is indexed, so this means on-disk state was damaged.
    pub async fn open_file(&self, id: &FileId) -> Result<RetrievedFile> {
        let record = self
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let file = match self.blobs.open(id).await? {
            Some(file) => file,
            None => {
                tracing::error!(
                    file_id = %id,
                    path = %self.blobs.path_of(id).display(),
                    "Indexed file has no blob on disk"
                );
                return Err(Error::BlobMissing(id.to_string()));
            }
        };
        let size = file.metadata().await?.len();

        Ok(RetrievedFile { record, file, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Config, ErrorClass};
    use bytes::Bytes;
    use futures_util::stream;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_open_file_roundtrip_and_errors() {
        let dir = tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let service = FileService::open(&config).unwrap();

        let body = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
            b"payload",
        ))]);
        let record = service
            .ingest("x.bin", Some("application/x-test"), body)
            .await
            .unwrap();

        let mut retrieved = service.open_file(&record.id).await.unwrap();
        assert_eq!(retrieved.record, record);
        assert_eq!(retrieved.size, 7);
        let mut content = Vec::new();
        retrieved.file.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"payload");

        let unknown = service.open_file(&FileId::generate()).await.unwrap_err();
        assert!(matches!(unknown, Error::NotFound(_)));
        assert_eq!(unknown.class(), ErrorClass::Client);

        std::fs::remove_file(service.blobs().path_of(&record.id)).unwrap();
        let missing = service.open_file(&record.id).await.unwrap_err();
        assert!(matches!(missing, Error::BlobMissing(_)));
        assert_eq!(missing.class(), ErrorClass::Server);
    }
}
