//! Remote operations against a running server

use crate::common::{Error, FileId, Result};
use crate::server::ListFilesResponse;
use crate::store::{chunk_stream, FileRecord};
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use std::path::Path;
use tokio::io::AsyncWriteExt;

fn endpoint(server: &str, path: &str) -> String {
    format!("{}{}", server.trim_end_matches('/'), path)
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);
    Err(Error::Http(format!("{}: {}", status, message)))
}

/// Upload a local file, streaming it from disk.
pub async fn upload_file(
    server: &str,
    path: &Path,
    content_type: Option<&str>,
) -> Result<FileRecord> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidUpload(format!("no file name in {}", path.display())))?
        .to_string();

    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    tracing::debug!("Uploading {} ({} bytes)", path.display(), len);

    let mut part = Part::stream_with_length(reqwest::Body::wrap_stream(chunk_stream(file)), len)
        .file_name(name);
    if let Some(ct) = content_type {
        part = part.mime_str(ct)?;
    }

    let resp = Client::new()
        .post(endpoint(server, "/files"))
        .multipart(Form::new().part("file", part))
        .send()
        .await?;

    Ok(check(resp).await?.json::<FileRecord>().await?)
}

/// Fetch the listing in upload order.
pub async fn list_files(server: &str) -> Result<Vec<FileRecord>> {
    let resp = Client::new()
        .get(endpoint(server, "/files"))
        .send()
        .await?;
    Ok(check(resp).await?.json::<ListFilesResponse>().await?.items)
}

/// Download `id` into `output`, returning the number of bytes written.
pub async fn download_file(server: &str, id: &FileId, output: &Path) -> Result<u64> {
    let resp = Client::new()
        .get(endpoint(server, &format!("/files/{}", id)))
        .send()
        .await?;
    let resp = check(resp).await?;

    let mut out = tokio::fs::File::create(output).await?;
    let mut written = 0u64;
    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;

    tracing::debug!("Downloaded {} to {} ({} bytes)", id, output.display(), written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_paths() {
        assert_eq!(
            endpoint("http://localhost:9000/", "/files"),
            "http://localhost:9000/files"
        );
        assert_eq!(
            endpoint("http://localhost:9000", "/files/abc"),
            "http://localhost:9000/files/abc"
        );
    }
}
