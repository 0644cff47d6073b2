//! Local filesystem storage driver.
//!
//! Containers are the sub-directories of a root directory and items are the
//! regular files inside a container. Item metadata written through
//! [`Container::put`] is kept in a sidecar directory next to the items.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use url::Url;

use stowaway_common::{ConfigMap, Cursor, Error, Metadata, Page, PageSize, Result};
use crate::driver::{ByteStream, Container, Item, Location};

/// Provider kind of the local filesystem driver.
pub const KIND: &str = "local";

/// Config key holding the root directory.
pub const PATH_KEY: &str = "path";

/// Sidecar directory holding item metadata, one JSON file per item.
pub const META_DIRNAME: &str = ".stowaway-meta";

/// Prefix of in-flight upload files.
const UPLOAD_PREFIX: &str = ".stowaway-upload-";

/// Read buffer size for item streams (64 KiB).
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Open a session rooted at the `path` config value.
///
/// # Errors
/// - `path` missing or empty
/// - `path` is not an existing directory
pub fn dial(config: &ConfigMap) -> Result<Arc<dyn Location>> {
    let root = config
        .get(PATH_KEY)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::Connection(format!("Local driver requires '{}'", PATH_KEY)))?;

    let root = PathBuf::from(root);
    if !root.is_dir() {
        return Err(Error::Connection(format!(
            "Root is not a directory: {}",
            root.display()
        )));
    }
    let root = root
        .canonicalize()
        .map_err(|e| Error::Connection(format!("Cannot resolve {}: {}", root.display(), e)))?;

    Ok(Arc::new(LocalLocation {
        root,
        closed: AtomicBool::new(false),
    }))
}

/// Reject names that would escape their directory or collide with driver files.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::InvalidInput(format!("Invalid name: '{}'", name)));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(Error::InvalidInput(
            "Name cannot contain separators".to_string(),
        ));
    }
    if name == META_DIRNAME || name.starts_with(UPLOAD_PREFIX) {
        return Err(Error::InvalidInput(format!("Reserved name: '{}'", name)));
    }
    Ok(())
}

/// Sort names and cut the page following `cursor`.
fn paginate(
    mut names: Vec<String>,
    cursor: &Cursor,
    prefix: &str,
    limit: PageSize,
) -> (Vec<String>, Option<Cursor>) {
    names.sort();
    let mut page: Vec<String> = names
        .into_iter()
        .filter(|name| cursor.is_start() || name.as_str() > cursor.as_str())
        .filter(|name| name.starts_with(prefix))
        .take(limit.get() + 1)
        .collect();

    let next = if page.len() > limit.get() {
        page.truncate(limit.get());
        page.last().map(|name| Cursor::new(name.as_str()))
    } else {
        None
    };
    (page, next)
}

/// Names of the directory entries accepted by `keep`.
async fn entry_names(
    dir: &Path,
    keep: impl Fn(&std::fs::Metadata) -> bool,
) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(String::from) else {
            continue;
        };
        if name == META_DIRNAME || name.starts_with(UPLOAD_PREFIX) {
            continue;
        }
        let fs_meta = entry.metadata().await?;
        if keep(&fs_meta) {
            names.push(name);
        }
    }

    Ok(names)
}

/// Session on a local directory.
pub struct LocalLocation {
    root: PathBuf,
    closed: AtomicBool,
}

impl LocalLocation {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Connection("Session is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Location for LocalLocation {
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
        let names = entry_names(&self.root, |m| m.is_dir())
            .await
            .map_err(|e| Error::Backend(format!("Listing {} failed: {}", self.root.display(), e)))?;

        let (page, next) = paginate(names, cursor, prefix, limit);
        let entries = page
            .into_iter()
            .map(|name| {
                Box::new(LocalContainer {
                    dir: self.root.join(&name),
                    name,
                }) as Box<dyn Container>
            })
            .collect();

        Ok(Page::new(entries, next))
    }

    async fn container(&self, name: &str) -> Result<Box<dyn Container>> {
        self.ensure_open()?;
        validate_name(name)?;

        let dir = self.root.join(name);
        if !fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(Error::NotFound(format!("Container not found: {}", name)));
        }

        Ok(Box::new(LocalContainer {
            dir,
            name: name.to_string(),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// A directory under the root.
pub struct LocalContainer {
    dir: PathBuf,
    name: String,
}

impl LocalContainer {
    fn sidecar_path(&self, name: &str) -> PathBuf {
        self.dir.join(META_DIRNAME).join(format!("{}.json", name))
    }

    fn item_handle(&self, name: &str) -> Result<Box<dyn Item>> {
        let path = self.dir.join(name);
        let url = Url::from_file_path(&path)
            .map_err(|_| Error::Backend(format!("Cannot build URL for {}", path.display())))?;

        Ok(Box::new(LocalItem {
            name: name.to_string(),
            sidecar: self.sidecar_path(name),
            path,
            url,
        }))
    }

    async fn write_sidecar(&self, name: &str, metadata: &Metadata) -> Result<()> {
        let sidecar = self.sidecar_path(name);
        if metadata.is_empty() {
            match fs::remove_file(&sidecar).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }

        fs::create_dir_all(self.dir.join(META_DIRNAME)).await?;
        let json = serde_json::to_vec(metadata)?;
        fs::write(&sidecar, json).await?;
        Ok(())
    }
}

#[async_trait]
impl Container for LocalContainer {
    fn id(&self) -> &str {
        &self.name
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
        let names = entry_names(&self.dir, |m| m.is_file())
            .await
            .map_err(|e| Error::Backend(format!("Listing {} failed: {}", self.dir.display(), e)))?;

        let (page, next) = paginate(names, cursor, prefix, limit);
        let entries = page
            .iter()
            .map(|name| self.item_handle(name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(entries, next))
    }

    async fn item(&self, id_or_name: &str) -> Result<Box<dyn Item>> {
        if validate_name(id_or_name).is_err() {
            return Err(Error::NotFound(format!("Item not found: {}", id_or_name)));
        }

        let path = self.dir.join(id_or_name);
        if !fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            return Err(Error::NotFound(format!(
                "Item not found: {}/{}",
                self.name, id_or_name
            )));
        }

        self.item_handle(id_or_name)
    }

    async fn put(
        &self,
        name: &str,
        mut stream: ByteStream,
        size: u64,
        metadata: Metadata,
    ) -> Result<Box<dyn Item>> {
        validate_name(name)?;

        // Removed on drop unless persisted
        let temp = tempfile::Builder::new()
            .prefix(UPLOAD_PREFIX)
            .tempfile_in(&self.dir)?;
        let mut file = fs::File::from_std(temp.reopen()?);

        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > size {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Stream exceeds declared size of {} bytes", size),
                )));
            }
            file.write_all(&chunk).await.map_err(|e| match e.raw_os_error() {
                // ENOSPC / EDQUOT
                Some(28) | Some(122) => Error::Quota(e.to_string()),
                _ => Error::Io(e),
            })?;
        }
        if written < size {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("Stream ended after {} of {} bytes", written, size),
            )));
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        temp.persist(self.dir.join(name))
            .map_err(|e| Error::Io(e.error))?;
        self.write_sidecar(name, &metadata).await?;
        tracing::debug!("Stored {} ({} bytes) in {}", name, written, self.dir.display());

        self.item_handle(name)
    }
}

/// A file inside a container.
pub struct LocalItem {
    name: String,
    path: PathBuf,
    sidecar: PathBuf,
    url: Url,
}

#[async_trait]
impl Item for LocalItem {
    fn id(&self) -> &str {
        &self.name
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> Url {
        self.url.clone()
    }

    async fn size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path).await?.len())
    }

    async fn metadata(&self) -> Result<Metadata> {
        let mut metadata = match fs::read(&self.sidecar).await {
            Ok(bytes) => serde_json::from_slice::<Metadata>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Metadata::new(),
            Err(e) => return Err(e.into()),
        };

        if !metadata.contains_key("modified") {
            let modified: DateTime<Utc> = fs::metadata(&self.path).await?.modified()?.into();
            metadata.insert(
                "modified".to_string(),
                serde_json::Value::String(modified.to_rfc3339()),
            );
        }

        Ok(metadata)
    }

    async fn open(&self) -> Result<ByteStream> {
        let file = fs::File::open(&self.path).await?;
        let stream = ReaderStream::with_capacity(file, READ_CHUNK_SIZE).map_err(Error::from);
        Ok(Box::pin(stream))
    }
}
