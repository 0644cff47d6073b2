//! Multipart upload parsing.
//!
//! The uploaded file is spooled to a temporary file as it arrives so its
//! exact size is known before the destination is written, without holding
//! the content in memory.

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use futures::StreamExt;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use stowaway_common::Metadata;

use crate::connection::Connection;
use crate::error::{ErrorKind, GatewayError, Result};
use crate::transfer::UploadSource;

/// Form field holding the destination descriptor.
pub const TO_FIELD: &str = "to";

/// Form field holding the file content.
pub const FILE_FIELD: &str = "file";

/// A parsed upload form.
#[derive(Debug)]
pub struct UploadForm {
    /// Destination descriptor.
    pub to: Connection,
    /// Uploaded file.
    pub file: SpooledFile,
}

/// Uploaded file content held in a temporary file.
#[derive(Debug)]
pub struct SpooledFile {
    temp: NamedTempFile,
    size: u64,
    file_name: String,
}

impl SpooledFile {
    /// Number of bytes received.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// File name declared by the client; may be empty.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Turn the spooled file into an upload source read in `chunk_size`
    /// chunks. The temporary file is removed once the stream is dropped.
    ///
    /// # Errors
    /// - Transfer error if the temporary file cannot be reopened
    pub fn into_source(self, chunk_size: usize) -> Result<UploadSource> {
        let file = self.temp.reopen().map_err(|e| {
            ErrorKind::Transfer.caused_by("Failed to read uploaded file", e.into())
        })?;

        let temp = self.temp;
        let stream = ReaderStream::with_capacity(tokio::fs::File::from_std(file), chunk_size.max(1))
            .map(move |chunk| {
                let _spool = &temp;
                chunk.map_err(stowaway_common::Error::from)
            });

        Ok(UploadSource {
            stream: Box::pin(stream),
            size: self.size,
            file_name: self.file_name,
            metadata: Metadata::new(),
        })
    }
}

/// Read the upload form.
///
/// Unknown fields are skipped; a repeated field replaces the earlier one.
///
/// # Errors
/// - Malformed request if the body is not valid multipart, or either the
///   `to` or `file` field is missing or unreadable
/// - Transfer error if the file cannot be spooled to disk
pub async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut to: Option<Connection> = None;
    let mut file: Option<SpooledFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Invalid multipart body", e))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(TO_FIELD) => {
                let body = field.bytes().await.map_err(|e| {
                    multipart_error(&format!("Failed to read '{}' field", TO_FIELD), e)
                })?;
                to = Some(Connection::from_json(&body)?);
            }
            Some(FILE_FIELD) => {
                file = Some(spool(field).await?);
            }
            other => {
                tracing::debug!("Skipping multipart field {:?}", other);
            }
        }
    }

    let to = to.ok_or_else(|| {
        ErrorKind::MalformedRequest.with_message(format!("Missing '{}' field", TO_FIELD))
    })?;
    let file = file.ok_or_else(|| {
        ErrorKind::MalformedRequest.with_message(format!("File required in '{}' field", FILE_FIELD))
    })?;

    Ok(UploadForm { to, file })
}

// The body limit surfaces as a multipart read error carrying 413.
fn multipart_error(context: &str, e: MultipartError) -> GatewayError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ErrorKind::PayloadTooLarge.with_message("Upload exceeds the configured size limit")
    } else {
        ErrorKind::MalformedRequest.with_message(format!("{}: {}", context, e))
    }
}

async fn spool(mut field: Field<'_>) -> Result<SpooledFile> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let temp = NamedTempFile::new()
        .map_err(|e| ErrorKind::Transfer.caused_by("Failed to spool upload", e.into()))?;
    let mut writer = temp
        .reopen()
        .map(tokio::fs::File::from_std)
        .map_err(|e| ErrorKind::Transfer.caused_by("Failed to spool upload", e.into()))?;

    let mut size: u64 = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error("Failed to read uploaded file", e))?
    {
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| ErrorKind::Transfer.caused_by("Failed to spool upload", e.into()))?;
        size += chunk.len() as u64;
    }
    writer
        .flush()
        .await
        .map_err(|e| ErrorKind::Transfer.caused_by("Failed to spool upload", e.into()))?;

    tracing::debug!("Spooled {} bytes of '{}'", size, file_name);
    Ok(SpooledFile {
        temp,
        size,
        file_name,
    })
}
