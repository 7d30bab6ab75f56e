//! Upload ingestion
//!
//! An upload moves through `Validating → Storing → Committing → Done`, and can
//! drop to `Failed` from any of them. Bytes are staged during `Storing` and only
//! published, journaled and indexed in `Committing`, so a transport can still
//! reject the request between the two (e.g. on a second multipart part) without
//! anything becoming visible.

use crate::common::{Error, FileId, Result};
use crate::server::FileService;
use crate::store::{BlobSink, BlobStore, Catalog, FileRecord};
use bytes::Bytes;
use futures_util::{pin_mut, Stream, StreamExt};
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use std::fmt::Display;
use std::sync::Arc;

/// Content type recorded when the client does not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Error from reading an upload body
pub trait BodyError: Display {
    /// True when the transport cut the body off at its size limit
    fn is_too_large(&self) -> bool {
        false
    }

    fn detail(&self) -> String {
        self.to_string()
    }

    fn into_error(self) -> Error
    where
        Self: Sized,
    {
        if self.is_too_large() {
            Error::PayloadTooLarge(self.detail())
        } else {
            Error::UploadInterrupted(self.detail())
        }
    }
}

impl BodyError for std::io::Error {}

impl BodyError for MultipartError {
    fn is_too_large(&self) -> bool {
        self.status() == StatusCode::PAYLOAD_TOO_LARGE
    }

    fn detail(&self) -> String {
        self.body_text()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestState {
    Validating,
    Storing,
    Committing,
    Done,
    Failed(String),
}

/// One in-progress upload
pub struct Ingest {
    catalog: Arc<Catalog>,
    blobs: BlobStore,
    name: String,
    content_type: String,
    id: Option<FileId>,
    sink: Option<BlobSink>,
    state: IngestState,
}

impl FileService {
    /// Validate the declared name and content type of an upload.
    pub fn begin_ingest(&self, name: &str, content_type: Option<&str>) -> Result<Ingest> {
        if name.trim().is_empty() {
            return Err(Error::InvalidUpload("part is not a file".into()));
        }
        let content_type = content_type
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        Ok(Ingest {
            catalog: self.catalog.clone(),
            blobs: self.blobs.clone(),
            name: name.to_string(),
            content_type: content_type.to_string(),
            id: None,
            sink: None,
            state: IngestState::Validating,
        })
    }
}

impl Ingest {
    pub fn state(&self) -> &IngestState {
        &self.state
    }

    /// Identifier allocated on entering `Storing`
    pub fn id(&self) -> Option<&FileId> {
        self.id.as_ref()
    }

    /// Allocate an identifier and stream `body` into a staged blob.
    pub async fn store<S, E>(&mut self, body: S) -> Result<u64>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: BodyError,
    {
        if self.state != IngestState::Validating {
            return Err(Error::Internal(format!(
                "cannot store upload in state {:?}",
                self.state
            )));
        }
        self.transition(IngestState::Storing);

        let id = FileId::generate();
        self.id = Some(id.clone());

        let mut sink = match self.blobs.create(&id).await {
            Ok(sink) => sink,
            Err(e) => return Err(self.fail(e)),
        };

        pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Err(self.fail(e.into_error())),
            };
            if let Err(e) = sink.write(&chunk).await {
                return Err(self.fail(e));
            }
        }

        let written = sink.bytes_written();
        self.sink = Some(sink);
        Ok(written)
    }

    /// Abandon a stored upload as a client error. Staged bytes are discarded.
    pub fn reject(&mut self, reason: impl Into<String>) -> Error {
        self.abandon(Error::InvalidUpload(reason.into()))
    }

    /// Abandon a stored upload with `err`. Staged bytes are discarded.
    pub fn abandon(&mut self, err: Error) -> Error {
        self.fail(err)
    }

    /// Publish the blob, then journal and index the record.
    pub async fn commit(&mut self) -> Result<FileRecord> {
        let (Some(sink), Some(id)) = (self.sink.take(), self.id.clone()) else {
            return Err(Error::Internal(format!(
                "cannot commit upload in state {:?}",
                self.state
            )));
        };
        self.transition(IngestState::Committing);

        let size = match sink.finish().await {
            Ok(size) => size,
            Err(e) => return Err(self.fail(e)),
        };

        let record = FileRecord::new(id, self.name.clone(), self.content_type.clone());
        let catalog = self.catalog.clone();
        let committed = tokio::task::spawn_blocking(move || catalog.commit(record))
            .await
            .map_err(|e| Error::Internal(format!("commit task failed: {}", e)))
            .and_then(|r| r);

        match committed {
            Ok(record) => {
                self.transition(IngestState::Done);
                tracing::info!(
                    file_id = %record.id,
                    name = %record.name,
                    size,
                    "File stored"
                );
                Ok(record)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn transition(&mut self, next: IngestState) {
        tracing::debug!(file_id = ?self.id, from = ?self.state, to = ?next, "Ingest state");
        self.state = next;
    }

    fn fail(&mut self, err: Error) -> Error {
        self.sink = None;
        self.transition(IngestState::Failed(err.to_string()));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Config;
    use futures_util::stream;
    use tempfile::{tempdir, TempDir};

    fn service() -> (TempDir, FileService) {
        let dir = tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let service = FileService::open(&config).unwrap();
        (dir, service)
    }

    fn body(chunks: &[&'static [u8]]) -> impl Stream<Item = std::io::Result<Bytes>> {
        stream::iter(
            chunks
                .iter()
                .copied()
                .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_ingest_state_machine() {
        let (_dir, service) = service();

        let mut ingest = service.begin_ingest("x.txt", Some("text/plain")).unwrap();
        assert_eq!(ingest.state(), &IngestState::Validating);
        assert!(ingest.id().is_none());

        assert_eq!(ingest.store(body(&[b"ab", b"cd"])).await.unwrap(), 4);
        assert_eq!(ingest.state(), &IngestState::Storing);
        assert!(service.is_empty());

        let record = ingest.commit().await.unwrap();
        assert_eq!(ingest.state(), &IngestState::Done);
        assert_eq!(Some(&record.id), ingest.id());
        assert_eq!(record.name, "x.txt");
        assert_eq!(record.content_type, "text/plain");
        assert_eq!(service.list(), vec![record.clone()]);
        assert!(service.blobs().path_of(&record.id).is_file());
    }

    #[tokio::test]
    async fn test_missing_content_type_defaults() {
        let (_dir, service) = service();
        let record = service.ingest("blob", None, body(&[b"x"])).await.unwrap();
        assert_eq!(record.content_type, DEFAULT_CONTENT_TYPE);

        let record = service.ingest("blob", Some("  "), body(&[b"x"])).await.unwrap();
        assert_eq!(record.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_nameless_part_is_rejected() {
        let (_dir, service) = service();
        let err = service.begin_ingest("", Some("text/plain")).err().unwrap();
        assert!(matches!(err, Error::InvalidUpload(_)));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_reject_after_store_leaves_nothing() {
        let (_dir, service) = service();

        let mut ingest = service.begin_ingest("x.txt", None).unwrap();
        ingest.store(body(&[b"data"])).await.unwrap();
        let err = ingest.reject("too many parts");

        assert!(err.is_client_error());
        assert!(matches!(ingest.state(), IngestState::Failed(_)));
        assert!(service.is_empty());
        assert!(service.blobs().blobs().unwrap().is_empty());
        assert_eq!(service.blobs().staged().unwrap(), 0);
        assert!(ingest.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_interrupted_body_commits_nothing() {
        let (_dir, service) = service();

        let broken = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "client went away",
            )),
        ]);
        let err = service.ingest("x.txt", None, broken).await.unwrap_err();

        assert!(matches!(err, Error::UploadInterrupted(_)));
        assert!(service.is_empty());
        assert!(service.blobs().blobs().unwrap().is_empty());
        assert_eq!(service.blobs().staged().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_twice_is_refused() {
        let (_dir, service) = service();
        let mut ingest = service.begin_ingest("x.txt", None).unwrap();
        ingest.store(body(&[b"1"])).await.unwrap();
        assert!(matches!(
            ingest.store(body(&[b"2"])).await,
            Err(Error::Internal(_))
        ));
    }

    #[derive(Debug)]
    struct LimitHit;

    impl Display for LimitHit {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("length limit exceeded")
        }
    }

    impl BodyError for LimitHit {
        fn is_too_large(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_oversized_body_is_payload_too_large() {
        let (_dir, service) = service();

        let body = stream::iter(vec![Ok(Bytes::from_static(b"some")), Err(LimitHit)]);
        let err = service.ingest("big.bin", None, body).await.unwrap_err();

        assert!(matches!(err, Error::PayloadTooLarge(_)));
        assert!(err.is_client_error());
        assert!(service.is_empty());
        assert_eq!(service.blobs().staged().unwrap(), 0);
    }
}
