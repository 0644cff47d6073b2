//! Backend driver contract.
//!
//! A driver turns a provider kind and its configuration into a [`Location`]:
//! an open session on one backend. Locations expose containers, containers
//! expose items, and items expose their content as a [`ByteStream`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use url::Url;

use stowaway_common::{Cursor, Metadata, Page, PageSize, Result};

/// Byte stream type for reading and writing item content.
///
/// Dropping the stream releases whatever backend resource feeds it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// An open session on a storage backend.
///
/// Implementations must handle their own authentication and connection
/// management. A location is owned by one request and closed before the
/// request completes.
#[async_trait]
pub trait Location: Send + Sync {
    /// Get the provider kind (e.g., "memdriver", "local").
    fn kind(&self) -> &str;

    /// Page size used when the caller does not request one.
    fn default_page_size(&self) -> PageSize {
        PageSize::default()
    }

    /// List containers.
    ///
    /// # Returns
    /// Up to `limit` containers whose name starts with `prefix`, in backend
    /// order, and the cursor of the following page.
    ///
    /// # Errors
    /// - Network/backend errors
    async fn containers(
        &self,
        cursor: &Cursor,
        prefix: &str,
        limit: PageSize,
    ) -> Result<Page<Box<dyn Container>>>;

    /// Resolve a container by name.
    ///
    /// # Errors
    /// - Container not found
    async fn container(&self, name: &str) -> Result<Box<dyn Container>>;

    /// Close the session.
    ///
    /// Must be idempotent and safe to call after a failed operation.
    async fn close(&self) -> Result<()>;
}

/// A named collection of items.
#[async_trait]
pub trait Container: Send + Sync {
    /// Provider-assigned identifier.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// List items.
    ///
    /// # Returns
    /// Up to `limit` items whose name starts with `prefix`, in backend order,
    /// and the cursor of the following page.
    async fn items(
        &self,
        prefix: &str,
        cursor: &Cursor,
        limit: PageSize,
    ) -> Result<Page<Box<dyn Item>>>;

    /// Resolve an item by id or name.
    ///
    /// # Errors
    /// - Item not found
    async fn item(&self, id_or_name: &str) -> Result<Box<dyn Item>>;

    /// Create or overwrite an item from a stream.
    ///
    /// # Preconditions
    /// - `stream` yields exactly `size` bytes
    ///
    /// # Postconditions
    /// - The stream is consumed to its end
    /// - Returns the created item
    ///
    /// # Errors
    /// - Stream errors, including a stream shorter or longer than `size`
    /// - Quota errors
    /// - Network/I/O errors
    async fn put(
        &self,
        name: &str,
        stream: ByteStream,
        size: u64,
        metadata: Metadata,
    ) -> Result<Box<dyn Item>>;
}

/// An addressable unit of stored content.
#[async_trait]
pub trait Item: Send + Sync {
    /// Provider-assigned, stable identifier.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Backend-specific location of the item.
    fn url(&self) -> Url;

    /// Content size in bytes.
    async fn size(&self) -> Result<u64>;

    /// Provider-defined metadata.
    async fn metadata(&self) -> Result<Metadata>;

    /// Open the item content for streamed reading.
    async fn open(&self) -> Result<ByteStream>;
}

/// Host and path of an item URL, the form used in API responses.
pub fn url_host_path(url: &Url) -> String {
    format!("{}{}", url.host_str().unwrap_or(""), url.path())
}
