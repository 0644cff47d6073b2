//! Streaming transfer between backends.
//!
//! Content moves from a source stream into a destination container without
//! being buffered whole. [`MeteredStream`] sits between the two: it cuts
//! chunks to the configured size and fails the transfer if the source yields
//! more or fewer bytes than it declared.

use bytes::Bytes;
use futures::{ready, Stream};
use std::pin::Pin;
use std::task::{Context, Poll};

use stowaway_common::{Error, Metadata};
use stowaway_storage::{url_host_path, ByteStream, Container, Item};

use crate::connection::Connection;
use crate::error::{ErrorKind, Result};
use crate::response::ItemView;

/// Default transfer chunk size (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Name of a transferred item at the destination.
///
/// The first non-empty of `to.item_name`, `to.item_id` and `fallback`.
pub fn destination_name<'a>(to: &'a Connection, fallback: &'a str) -> &'a str {
    [to.item_name.as_str(), to.item_id.as_str()]
        .into_iter()
        .find(|name| !name.is_empty())
        .unwrap_or(fallback)
}

/// Key used to resolve a source item: its id, else its name.
///
/// Returns `None` when neither is set.
pub fn source_key(from: &Connection) -> Option<&str> {
    [from.item_id.as_str(), from.item_name.as_str()]
        .into_iter()
        .find(|key| !key.is_empty())
}

/// Content to upload into a destination container.
pub struct UploadSource {
    /// Item content.
    pub stream: ByteStream,
    /// Exact number of bytes `stream` yields.
    pub size: u64,
    /// Name used when the destination descriptor gives none.
    pub file_name: String,
    /// Metadata stored with the item.
    pub metadata: Metadata,
}

/// Moves content between backends in bounded chunks.
#[derive(Debug, Clone, Copy)]
pub struct TransferEngine {
    chunk_size: usize,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl TransferEngine {
    /// Create an engine. Zero is raised to one byte.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Chunk size in bytes.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Copy `source` into `destination` under `name`.
    ///
    /// The returned view reports the source's size and metadata.
    ///
    /// # Errors
    /// - Transfer error if reading the source or writing the destination fails
    pub async fn copy(
        &self,
        source: &dyn Item,
        destination: &dyn Container,
        name: &str,
    ) -> Result<ItemView> {
        let size = source
            .size()
            .await
            .map_err(|e| ErrorKind::Transfer.caused_by("Failed to retrieve file size", e))?;
        let metadata = source
            .metadata()
            .await
            .map_err(|e| ErrorKind::Transfer.caused_by("Failed to retrieve file metadata", e))?;
        let stream = source
            .open()
            .await
            .map_err(|e| ErrorKind::Transfer.caused_by("Failed to open file", e))?;

        tracing::info!(
            "Copying {} ({} bytes) to {}/{}",
            source.name(),
            size,
            destination.name(),
            name
        );
        self.put(destination, name, stream, size, metadata).await
    }

    /// Upload `source` into `destination` under `name`.
    ///
    /// # Errors
    /// - Transfer error if the content cannot be written
    pub async fn upload(
        &self,
        destination: &dyn Container,
        name: &str,
        source: UploadSource,
    ) -> Result<ItemView> {
        tracing::info!(
            "Uploading {} bytes to {}/{}",
            source.size,
            destination.name(),
            name
        );
        self.put(destination, name, source.stream, source.size, source.metadata)
            .await
    }

    async fn put(
        &self,
        destination: &dyn Container,
        name: &str,
        stream: ByteStream,
        size: u64,
        metadata: Metadata,
    ) -> Result<ItemView> {
        let metered = MeteredStream::new(stream, size, self.chunk_size);
        let created = destination
            .put(name, Box::pin(metered), size, metadata.clone())
            .await
            .map_err(|e| ErrorKind::Transfer.caused_by("File transfer failed", e))?;

        // Size and metadata come from the source, not from the destination's
        // view of the new item
        Ok(ItemView {
            id: created.id().to_string(),
            name: created.name().to_string(),
            size,
            url: url_host_path(&created.url()),
            metadata,
        })
    }
}

/// Stream adapter that re-chunks content and enforces its declared length.
pub struct MeteredStream {
    inner: ByteStream,
    declared: u64,
    seen: u64,
    chunk_size: usize,
    pending: Option<Bytes>,
    done: bool,
}

impl MeteredStream {
    /// Wrap `inner`, which must yield exactly `declared` bytes.
    pub fn new(inner: ByteStream, declared: u64, chunk_size: usize) -> Self {
        Self {
            inner,
            declared,
            seen: 0,
            chunk_size: chunk_size.max(1),
            pending: None,
            done: false,
        }
    }

    /// Bytes read from the inner stream so far.
    pub fn bytes_seen(&self) -> u64 {
        self.seen
    }

    fn emit(&mut self, mut chunk: Bytes) -> Bytes {
        if chunk.len() > self.chunk_size {
            let head = chunk.split_to(self.chunk_size);
            self.pending = Some(chunk);
            head
        } else {
            chunk
        }
    }
}

impl Stream for MeteredStream {
    type Item = stowaway_common::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(rest) = this.pending.take() {
            return Poll::Ready(Some(Ok(this.emit(rest))));
        }
        if this.done {
            return Poll::Ready(None);
        }

        match ready!(this.inner.as_mut().poll_next(cx)) {
            Some(Ok(chunk)) => {
                this.seen += chunk.len() as u64;
                if this.seen > this.declared {
                    this.done = true;
                    return Poll::Ready(Some(Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Source exceeds its declared size of {} bytes", this.declared),
                    )))));
                }
                Poll::Ready(Some(Ok(this.emit(chunk))))
            }
            Some(Err(e)) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.done = true;
                if this.seen < this.declared {
                    return Poll::Ready(Some(Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!(
                            "Source ended after {} of {} declared bytes",
                            this.seen, this.declared
                        ),
                    )))));
                }
                Poll::Ready(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, StreamExt, TryStreamExt};
    use stowaway_common::ConfigMap;
    use stowaway_storage::MemoryBackend;

    fn chunks(parts: &[&'static [u8]]) -> ByteStream {
        let parts: Vec<stowaway_common::Result<Bytes>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        Box::pin(stream::iter(parts))
    }

    #[tokio::test]
    async fn test_metered_stream_rechunks() {
        let metered = MeteredStream::new(chunks(&[b"abcdefg", b"hi"]), 9, 3);
        let out: Vec<Bytes> = metered.try_collect().await.unwrap();
        let sizes: Vec<usize> = out.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![3, 3, 1, 2]);
        assert_eq!(out.concat(), b"abcdefghi".to_vec());
    }

    #[tokio::test]
    async fn test_metered_stream_rejects_short_source() {
        let mut metered = MeteredStream::new(chunks(&[b"abc"]), 5, 64);
        assert!(metered.next().await.unwrap().is_ok());
        let err = metered.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
        assert!(metered.next().await.is_none());
    }

    #[tokio::test]
    async fn test_metered_stream_rejects_long_source() {
        let result: stowaway_common::Result<Vec<Bytes>> =
            MeteredStream::new(chunks(&[b"abc", b"def"]), 4, 64)
                .try_collect()
                .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_metered_stream_empty_source() {
        let out: Vec<Bytes> = MeteredStream::new(chunks(&[]), 0, 8)
            .try_collect()
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_destination_name_falls_back() {
        let mut to = Connection::default();
        assert_eq!(destination_name(&to, "a.txt"), "a.txt");
        to.item_id = "b".to_string();
        assert_eq!(destination_name(&to, "a.txt"), "b");
        to.item_name = "a".to_string();
        assert_eq!(destination_name(&to, "a.txt"), "a");
    }

    #[test]
    fn test_source_key_prefers_id() {
        let mut from = Connection::default();
        assert_eq!(source_key(&from), None);
        from.item_name = "a.txt".to_string();
        assert_eq!(source_key(&from), Some("a.txt"));
        from.item_id = "id-9".to_string();
        assert_eq!(source_key(&from), Some("id-9"));
    }

    #[tokio::test]
    async fn test_copy_between_containers() {
        let backend = MemoryBackend::new();
        let location = backend.dial(&ConfigMap::new()).unwrap();
        let src = location.container("src").await.unwrap();
        let dst = location.container("dst").await.unwrap();

        let mut metadata = Metadata::new();
        metadata.insert("owner".to_string(), serde_json::json!("ops"));
        src.put("a.txt", chunks(&[b"hello"]), 5, metadata.clone())
            .await
            .unwrap();

        let item = src.item("a.txt").await.unwrap();
        let engine = TransferEngine::new(2);
        let view = engine.copy(item.as_ref(), dst.as_ref(), "b.txt").await.unwrap();

        assert_eq!(view.name, "b.txt");
        assert_eq!(view.size, 5);
        assert_eq!(view.metadata, metadata);
        assert_eq!(view.url, "memdriver/dst/b.txt");

        let copied = dst.item("b.txt").await.unwrap();
        let content: Vec<Bytes> = copied.open().await.unwrap().try_collect().await.unwrap();
        assert_eq!(content.concat(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_upload_with_wrong_size_fails() {
        let backend = MemoryBackend::new();
        let location = backend.dial(&ConfigMap::new()).unwrap();
        let dst = location.container("dst").await.unwrap();

        let source = UploadSource {
            stream: chunks(&[b"hello"]),
            size: 3,
            file_name: "a.txt".to_string(),
            metadata: Metadata::new(),
        };
        let err = TransferEngine::default()
            .upload(dst.as_ref(), "a.txt", source)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transfer);
        assert!(dst.item("a.txt").await.is_err());
    }
}
