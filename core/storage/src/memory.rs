//! In-memory storage driver.
//!
//! Useful for testing and development. All sessions dialed from the same
//! [`MemoryBackend`] see the same containers; data is lost when the backend
//! is dropped.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{stream, StreamExt};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use url::Url;
use uuid::Uuid;

use stowaway_common::{ConfigMap, Cursor, Error, Metadata, Page, PageSize, Result};
use crate::driver::{ByteStream, Container, Item, Location};

/// Provider kind of the in-memory driver.
pub const KIND: &str = "memdriver";

/// Config key controlling creation of unknown containers.
///
/// When enabled (the default), resolving an unknown container succeeds with
/// an empty handle and the container is created by the first `put` into it.
/// Listing or reading through the handle never creates it.
pub const AUTO_CREATE_KEY: &str = "auto_create";

#[derive(Debug, Clone)]
struct StoredItem {
    id: String,
    data: Bytes,
    metadata: Metadata,
}

#[derive(Debug)]
struct StoredContainer {
    id: String,
    items: BTreeMap<String, StoredItem>,
}

impl StoredContainer {
    fn new(id: String) -> Self {
        Self {
            id,
            items: BTreeMap::new(),
        }
    }
}

/// Shared in-memory backend.
///
/// Plays the role of the remote provider: every session dialed from it
/// reads and writes the same state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    containers: Arc<RwLock<BTreeMap<String, StoredContainer>>>,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session on this backend.
    ///
    /// # Errors
    /// - `auto_create` is present but neither "true" nor "false"
    pub fn dial(&self, config: &ConfigMap) -> Result<Arc<dyn Location>> {
        let auto_create = match config.get(AUTO_CREATE_KEY).map(String::as_str) {
            None | Some("true") => true,
            Some("false") => false,
            Some(other) => {
                return Err(Error::Connection(format!(
                    "Invalid value for '{}': {}",
                    AUTO_CREATE_KEY, other
                )));
            }
        };

        Ok(Arc::new(MemoryLocation {
            backend: self.clone(),
            auto_create,
            closed: AtomicBool::new(false),
        }))
    }

    /// Create a container if it does not exist yet.
    pub fn create_container(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidInput("Container name cannot be empty".to_string()));
        }
        self.write()?
            .entry(name.to_string())
            .or_insert_with(|| StoredContainer::new(Uuid::new_v4().to_string()));
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, StoredContainer>>> {
        self.containers
            .read()
            .map_err(|_| Error::Backend("Memory backend lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, StoredContainer>>> {
        self.containers
            .write()
            .map_err(|_| Error::Backend("Memory backend lock poisoned".to_string()))
    }

    fn with_item<T>(
        &self,
        container: &str,
        name: &str,
        f: impl FnOnce(&StoredItem) -> T,
    ) -> Result<T> {
        let containers = self.read()?;
        containers
            .get(container)
            .and_then(|c| c.items.get(name))
            .map(f)
            .ok_or_else(|| Error::NotFound(format!("Item not found: {}/{}", container, name)))
    }
}

/// Keys strictly after `cursor` that start with `prefix`, at most `limit + 1`.
fn page_keys<'a, V>(
    map: &'a BTreeMap<String, V>,
    cursor: &Cursor,
    prefix: &str,
    limit: PageSize,
) -> (Vec<(&'a String, &'a V)>, Option<Cursor>) {
    let lower = if cursor.is_start() {
        Bound::Unbounded
    } else {
        Bound::Excluded(cursor.as_str().to_string())
    };

    let mut entries: Vec<(&String, &V)> = map
        .range((lower, Bound::Unbounded))
        .filter(|(key, _)| key.starts_with(prefix))
        .take(limit.get() + 1)
        .collect();

    let next = if entries.len() > limit.get() {
        entries.truncate(limit.get());
        entries.last().map(|(key, _)| Cursor::new(key.as_str()))
    } else {
        None
    };

    (entries, next)
}

fn item_url(container: &str, name: &str) -> Result<Url> {
    let mut url = Url::parse("memory://memdriver/")
        .map_err(|e| Error::Backend(format!("Invalid base URL: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| Error::Backend("Memory URL cannot be a base".to_string()))?
        .pop_if_empty()
        .push(container)
        .push(name);
    Ok(url)
}

/// Session on a [`MemoryBackend`].
pub struct MemoryLocation {
    backend: MemoryBackend,
    auto_create: bool,
    closed: AtomicBool,
}

impl MemoryLocation {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Connection("Session is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Location for MemoryLocation {
    fn kind(&self) -> &str {
        KIND
    }

    async fn containers(
        &self,
        cursor: &Cursor,
        prefix: &str,
        limit: PageSize,
    ) -> Result<Page<Box<dyn Container>>> {
        self.ensure_open()?;
        let containers = self.backend.read()?;
        let (entries, next) = page_keys(&containers, cursor, prefix, limit);

        let entries = entries
            .into_iter()
            .map(|(name, stored)| {
                Box::new(MemoryContainer {
                    backend: self.backend.clone(),
                    id: stored.id.clone(),
                    name: name.clone(),
                    auto_create: self.auto_create,
                }) as Box<dyn Container>
            })
            .collect();

        Ok(Page::new(entries, next))
    }

    async fn container(&self, name: &str) -> Result<Box<dyn Container>> {
        self.ensure_open()?;
        if name.is_empty() {
            return Err(Error::InvalidInput("Container name cannot be empty".to_string()));
        }

        let containers = self.backend.read()?;
        let id = match containers.get(name) {
            Some(stored) => stored.id.clone(),
            // Created on first put
            None if self.auto_create => Uuid::new_v4().to_string(),
            None => return Err(Error::NotFound(format!("Container not found: {}", name))),
        };

        Ok(Box::new(MemoryContainer {
            backend: self.backend.clone(),
            id,
            name: name.to_string(),
            auto_create: self.auto_create,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Container handle on a [`MemoryBackend`].
pub struct MemoryContainer {
    backend: MemoryBackend,
    id: String,
    name: String,
    auto_create: bool,
}

impl MemoryContainer {
    fn missing(&self) -> Error {
        Error::NotFound(format!("Container not found: {}", self.name))
    }

    fn item_handle(&self, name: &str, stored: &StoredItem) -> Result<Box<dyn Item>> {
        Ok(Box::new(MemoryItem {
            backend: self.backend.clone(),
            container: self.name.clone(),
            id: stored.id.clone(),
            name: name.to_string(),
            url: item_url(&self.name, name)?,
        }))
    }
}

#[async_trait]
impl Container for MemoryContainer {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn items(
        &self,
        prefix: &str,
        cursor: &Cursor,
        limit: PageSize,
    ) -> Result<Page<Box<dyn Item>>> {
        let containers = self.backend.read()?;
        let stored = match containers.get(&self.name) {
            Some(stored) => stored,
            None if self.auto_create => return Ok(Page::new(Vec::new(), None)),
            None => return Err(self.missing()),
        };

        let (entries, next) = page_keys(&stored.items, cursor, prefix, limit);
        let entries = entries
            .into_iter()
            .map(|(name, item)| self.item_handle(name, item))
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(entries, next))
    }

    async fn item(&self, id_or_name: &str) -> Result<Box<dyn Item>> {
        let containers = self.backend.read()?;
        let stored = containers.get(&self.name).ok_or_else(|| self.missing())?;

        // Ids take precedence over names
        let found = stored
            .items
            .iter()
            .find(|(_, item)| item.id == id_or_name)
            .or_else(|| stored.items.get_key_value(id_or_name));

        match found {
            Some((name, item)) => self.item_handle(name, item),
            None => Err(Error::NotFound(format!(
                "Item not found: {}/{}",
                self.name, id_or_name
            ))),
        }
    }

    async fn put(
        &self,
        name: &str,
        mut stream: ByteStream,
        size: u64,
        metadata: Metadata,
    ) -> Result<Box<dyn Item>> {
        if name.is_empty() {
            return Err(Error::InvalidInput("Item name cannot be empty".to_string()));
        }

        let mut data = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if data.len() as u64 + chunk.len() as u64 > size {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Stream exceeds declared size of {} bytes", size),
                )));
            }
            data.extend_from_slice(&chunk);
        }
        if (data.len() as u64) < size {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("Stream ended after {} of {} bytes", data.len(), size),
            )));
        }

        let mut containers = self.backend.write()?;
        if self.auto_create && !containers.contains_key(&self.name) {
            containers.insert(self.name.clone(), StoredContainer::new(self.id.clone()));
        }
        let stored = containers.get_mut(&self.name).ok_or_else(|| self.missing())?;

        // Overwrites keep the existing id
        let id = stored
            .items
            .get(name)
            .map(|existing| existing.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let item = StoredItem {
            id,
            data: data.freeze(),
            metadata,
        };
        let handle = self.item_handle(name, &item)?;
        stored.items.insert(name.to_string(), item);

        Ok(handle)
    }
}

/// Item handle on a [`MemoryBackend`].
///
/// Size, metadata and content are looked up on each call.
pub struct MemoryItem {
    backend: MemoryBackend,
    container: String,
    id: String,
    name: String,
    url: Url,
}

#[async_trait]
impl Item for MemoryItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> Url {
        self.url.clone()
    }

    async fn size(&self) -> Result<u64> {
        self.backend
            .with_item(&self.container, &self.name, |item| item.data.len() as u64)
    }

    async fn metadata(&self) -> Result<Metadata> {
        self.backend
            .with_item(&self.container, &self.name, |item| item.metadata.clone())
    }

    async fn open(&self) -> Result<ByteStream> {
        let data = self
            .backend
            .with_item(&self.container, &self.name, |item| item.data.clone())?;
        let stream = stream::once(async move { Ok(data) });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn bytes_stream(chunks: Vec<&'static [u8]>) -> ByteStream {
        Box::pin(stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, Error>(Bytes::from_static(c))),
        ))
    }

    async fn read_all(item: &dyn Item) -> Vec<u8> {
        let chunks: Vec<Bytes> = item.open().await.unwrap().try_collect().await.unwrap();
        chunks.concat()
    }

    fn dial(backend: &MemoryBackend) -> Arc<dyn Location> {
        backend.dial(&ConfigMap::new()).unwrap()
    }

    #[tokio::test]
    async fn test_put_and_read() {
        let backend = MemoryBackend::new();
        let location = dial(&backend);
        let container = location.container("c1").await.unwrap();

        let mut metadata = Metadata::new();
        metadata.insert("owner".to_string(), serde_json::json!("alice"));

        let item = container
            .put("a.txt", bytes_stream(vec![b"hel", b"lo"]), 5, metadata.clone())
            .await
            .unwrap();

        assert_eq!(item.name(), "a.txt");
        assert_eq!(item.size().await.unwrap(), 5);
        assert_eq!(item.metadata().await.unwrap(), metadata);
        assert_eq!(read_all(item.as_ref()).await, b"hello");
        assert_eq!(item.url().as_str(), "memory://memdriver/c1/a.txt");
    }

    #[tokio::test]
    async fn test_sessions_share_backend() {
        let backend = MemoryBackend::new();
        let first = dial(&backend);
        first
            .container("c1")
            .await
            .unwrap()
            .put("x", bytes_stream(vec![b"1"]), 1, Metadata::new())
            .await
            .unwrap();
        first.close().await.unwrap();

        let second = dial(&backend);
        let item = second.container("c1").await.unwrap().item("x").await.unwrap();
        assert_eq!(read_all(item.as_ref()).await, b"1");
    }

    #[tokio::test]
    async fn test_item_resolves_by_id_or_name() {
        let backend = MemoryBackend::new();
        let container = dial(&backend).container("c1").await.unwrap();
        let created = container
            .put("a.txt", bytes_stream(vec![b"abc"]), 3, Metadata::new())
            .await
            .unwrap();

        let by_id = container.item(created.id()).await.unwrap();
        let by_name = container.item("a.txt").await.unwrap();
        assert_eq!(by_id.id(), by_name.id());
        assert!(container.item("missing").await.err().unwrap().is_not_found());
    }

    #[tokio::test]
    async fn test_put_overwrite_keeps_id() {
        let backend = MemoryBackend::new();
        let container = dial(&backend).container("c1").await.unwrap();
        let first = container
            .put("a", bytes_stream(vec![b"old"]), 3, Metadata::new())
            .await
            .unwrap();
        let second = container
            .put("a", bytes_stream(vec![b"newer"]), 5, Metadata::new())
            .await
            .unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(read_all(second.as_ref()).await, b"newer");
    }

    #[tokio::test]
    async fn test_put_rejects_size_mismatch() {
        let backend = MemoryBackend::new();
        let container = dial(&backend).container("c1").await.unwrap();

        let short = container
            .put("short", bytes_stream(vec![b"ab"]), 3, Metadata::new())
            .await;
        assert!(matches!(short, Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof));

        let long = container
            .put("long", bytes_stream(vec![b"abcd"]), 3, Metadata::new())
            .await;
        assert!(matches!(long, Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData));

        // Nothing left behind
        let page = container
            .items("", &Cursor::start(), PageSize::default())
            .await
            .unwrap();
        assert!(page.entries.is_empty());
    }

    #[tokio::test]
    async fn test_items_pagination() {
        let backend = MemoryBackend::new();
        let container = dial(&backend).container("c1").await.unwrap();
        for name in ["a", "b", "c", "d", "e"] {
            container
                .put(name, bytes_stream(vec![b"x"]), 1, Metadata::new())
                .await
                .unwrap();
        }

        let limit = PageSize::new(2).unwrap();
        let first = container.items("", &Cursor::start(), limit).await.unwrap();
        let names: Vec<&str> = first.entries.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let cursor = first.next.clone().unwrap();
        let second = container.items("", &cursor, limit).await.unwrap();
        let names: Vec<&str> = second.entries.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["c", "d"]);

        let cursor = second.next.clone().unwrap();
        let third = container.items("", &cursor, limit).await.unwrap();
        let names: Vec<&str> = third.entries.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["e"]);
        assert!(third.next.is_none());
    }

    #[tokio::test]
    async fn test_items_prefix_filter() {
        let backend = MemoryBackend::new();
        let container = dial(&backend).container("c1").await.unwrap();
        for name in ["img-1", "img-2", "doc-1"] {
            container
                .put(name, bytes_stream(vec![b"x"]), 1, Metadata::new())
                .await
                .unwrap();
        }

        let page = container
            .items("img-", &Cursor::start(), PageSize::default())
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_containers_listing() {
        let backend = MemoryBackend::new();
        backend.create_container("b").unwrap();
        backend.create_container("a").unwrap();
        let location = dial(&backend);

        let page = location
            .containers(&Cursor::start(), "", PageSize::default())
            .await
            .unwrap();
        let names: Vec<&str> = page.entries.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(page.next.is_none());
    }

    #[tokio::test]
    async fn test_auto_create_disabled() {
        let backend = MemoryBackend::new();
        let mut config = ConfigMap::new();
        config.insert(AUTO_CREATE_KEY.to_string(), "false".to_string());
        let location = backend.dial(&config).unwrap();

        let err = location.container("nope").await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_auto_create_only_on_put() {
        let backend = MemoryBackend::new();
        let location = dial(&backend);

        let container = location.container("typo").await.unwrap();
        let page = container
            .items("", &Cursor::start(), PageSize::default())
            .await
            .unwrap();
        assert!(page.entries.is_empty());
        assert!(container.item("x").await.err().unwrap().is_not_found());

        let listed = location
            .containers(&Cursor::start(), "", PageSize::default())
            .await
            .unwrap();
        assert!(listed.entries.is_empty());

        container
            .put("x", bytes_stream(vec![b"1"]), 1, Metadata::new())
            .await
            .unwrap();
        let listed = location
            .containers(&Cursor::start(), "", PageSize::default())
            .await
            .unwrap();
        let names: Vec<&str> = listed.entries.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["typo"]);
        assert_eq!(listed.entries[0].id(), container.id());
    }

    #[tokio::test]
    async fn test_failed_put_does_not_create_container() {
        let backend = MemoryBackend::new();
        let location = dial(&backend);
        let container = location.container("c1").await.unwrap();

        let short = container
            .put("a", bytes_stream(vec![b"ab"]), 3, Metadata::new())
            .await;
        assert!(short.is_err());

        let listed = location
            .containers(&Cursor::start(), "", PageSize::default())
            .await
            .unwrap();
        assert!(listed.entries.is_empty());
    }

    #[test]
    fn test_invalid_auto_create_rejected() {
        let backend = MemoryBackend::new();
        let mut config = ConfigMap::new();
        config.insert(AUTO_CREATE_KEY.to_string(), "maybe".to_string());
        assert!(matches!(backend.dial(&config), Err(Error::Connection(_))));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let backend = MemoryBackend::new();
        let location = dial(&backend);
        location.close().await.unwrap();
        location.close().await.unwrap();
        assert!(location.container("c1").await.is_err());
    }
}
