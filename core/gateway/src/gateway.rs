//! Gateway facade.
//!
//! One method per API operation. Each dials the sessions it needs, runs the
//! operation and closes every session before returning.

use std::sync::Arc;

use stowaway_storage::DriverRegistry;

use crate::config::{GatewayConfig, NotFoundStatus};
use crate::connection::Connection;
use crate::error::{ErrorKind, GatewayError, Result};
use crate::pagination;
use crate::response::{ContainersResult, FieldPolicy, ItemView, ItemsResult};
use crate::session::{close_after, close_after_both, SessionManager};
use crate::transfer::{self, TransferEngine, UploadSource};

/// Stateless entry point for every gateway operation.
pub struct Gateway {
    sessions: SessionManager,
    transfer: TransferEngine,
    config: GatewayConfig,
}

impl Gateway {
    /// Create a gateway over a driver registry.
    pub fn new(registry: Arc<DriverRegistry>, config: GatewayConfig) -> Self {
        Self {
            sessions: SessionManager::new(registry),
            transfer: TransferEngine::new(config.chunk_size),
            config,
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Driver registry.
    pub fn registry(&self) -> &DriverRegistry {
        self.sessions.registry()
    }

    /// List one page of containers at the location `conn` describes.
    ///
    /// # Errors
    /// - Connection error if dialing fails
    /// - Backend error if the listing fails
    pub async fn list_containers(&self, conn: &Connection) -> Result<ContainersResult> {
        let session = self.sessions.open(conn)?;
        close_after(session, |session| async move {
            let location = session.location();
            let page_size = pagination::page_size(conn.count, location);
            let page = location
                .containers(&conn.cursor, "", page_size)
                .await
                .map_err(|e| ErrorKind::Backend.caused_by("Failed to retrieve containers", e))?;

            tracing::debug!("Listed {} containers on {}", page.entries.len(), conn.kind);
            Ok(pagination::containers_result(page_size, page))
        })
        .await
    }

    /// List one page of items in the container `conn` names.
    ///
    /// Items whose size or metadata cannot be fetched are still listed, with
    /// the failing field zeroed.
    ///
    /// # Errors
    /// - Connection error if dialing fails
    /// - Resolution error if the container cannot be resolved
    /// - Backend error if the listing fails
    pub async fn list_items(&self, conn: &Connection) -> Result<ItemsResult> {
        let session = self.sessions.open(conn)?;
        close_after(session, |session| async move {
            let location = session.location();
            let container = location
                .container(&conn.container_name)
                .await
                .map_err(|e| self.resolution_error("Failed to retrieve container", e))?;

            let page_size = pagination::page_size(conn.count, location);
            let page = container
                .items("", &conn.cursor, page_size)
                .await
                .map_err(|e| ErrorKind::Backend.caused_by("Failed to retrieve items", e))?;

            let mut items = Vec::with_capacity(page.entries.len());
            for item in &page.entries {
                let view = ItemView::describe(item.as_ref(), FieldPolicy::TolerateAndOmit)
                    .await
                    .map_err(|e| ErrorKind::Backend.caused_by("Failed to describe item", e))?;
                items.push(view);
            }

            tracing::debug!("Listed {} items in {}", items.len(), container.name());
            Ok(pagination::items_result(page_size, items, page.next))
        })
        .await
    }

    /// Store uploaded content in the container `to` names.
    ///
    /// The item is named `to.item_name`, else `to.item_id`, else the
    /// uploaded file name.
    ///
    /// # Errors
    /// - Malformed request if no item name can be determined
    /// - Connection error if dialing fails
    /// - Resolution error if the container cannot be resolved
    /// - Transfer error if the content cannot be written
    pub async fn upload(&self, to: &Connection, source: UploadSource) -> Result<ItemView> {
        let name = transfer::destination_name(to, &source.file_name).to_string();
        if name.is_empty() {
            return Err(ErrorKind::MalformedRequest.with_message("Item name required"));
        }

        let session = self.sessions.open(to)?;
        close_after(session, |session| async move {
            let container = session
                .location()
                .container(&to.container_name)
                .await
                .map_err(|e| self.resolution_error("Failed to retrieve container", e))?;

            self.transfer.upload(container.as_ref(), &name, source).await
        })
        .await
    }

    /// Copy an item from one backend to another.
    ///
    /// The source is resolved by `from.item_id`, else `from.item_name`. The
    /// copy keeps the source name unless `to.item_name` or `to.item_id` is
    /// set.
    ///
    /// # Errors
    /// - Malformed request if neither source id nor name is given
    /// - Connection error if dialing either backend fails
    /// - Resolution error if a container or the source item cannot be resolved
    /// - Transfer error if the content cannot be moved
    pub async fn copy(&self, from: &Connection, to: &Connection) -> Result<ItemView> {
        let key = transfer::source_key(from).ok_or_else(|| {
            ErrorKind::MalformedRequest.with_message("Source item_id or item_name required")
        })?;

        let source = self.sessions.open(from)?;
        let destination = match self.sessions.open(to) {
            Ok(destination) => destination,
            Err(e) => {
                if let Err(close) = source.close().await {
                    tracing::warn!("{}", close);
                }
                return Err(e);
            }
        };

        close_after_both(source, destination, |source, destination| async move {
            let source_container = source
                .location()
                .container(&from.container_name)
                .await
                .map_err(|e| self.resolution_error("Failed to retrieve source container", e))?;
            let item = source_container
                .item(key)
                .await
                .map_err(|e| self.resolution_error("Failed to retrieve file", e))?;

            let destination_container = destination
                .location()
                .container(&to.container_name)
                .await
                .map_err(|e| {
                    self.resolution_error("Failed to retrieve destination container", e)
                })?;

            let name = transfer::destination_name(to, item.name());
            self.transfer
                .copy(item.as_ref(), destination_container.as_ref(), name)
                .await
        })
        .await
    }

    /// Check whether the backend `conn` describes can be dialed.
    pub async fn dial(&self, conn: &Connection) -> bool {
        match self.sessions.open(conn) {
            Ok(session) => {
                if let Err(e) = session.close().await {
                    tracing::warn!("{}", e);
                }
                true
            }
            Err(e) => {
                tracing::info!("Dial check for {} failed: {}", conn.kind, e);
                false
            }
        }
    }

    fn resolution_error(&self, context: &str, source: stowaway_common::Error) -> GatewayError {
        let kind = match self.config.not_found_status {
            NotFoundStatus::Distinct if source.is_not_found() => ErrorKind::NotFound,
            _ => ErrorKind::Resolution,
        };
        kind.caused_by(context, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use stowaway_common::{Cursor, Metadata};
    use stowaway_storage::create_default_registry;

    fn gateway(config: GatewayConfig) -> Gateway {
        Gateway::new(Arc::new(create_default_registry().unwrap()), config)
    }

    fn memdriver(container: &str) -> Connection {
        Connection {
            kind: "memdriver".to_string(),
            container_name: container.to_string(),
            ..Default::default()
        }
    }

    fn source(content: &'static [u8], file_name: &str) -> UploadSource {
        UploadSource {
            stream: Box::pin(stream::iter(vec![Ok::<_, stowaway_common::Error>(
                Bytes::from_static(content),
            )])),
            size: content.len() as u64,
            file_name: file_name.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_upload_then_list_items() {
        let gateway = gateway(GatewayConfig::default());
        let view = gateway
            .upload(&memdriver("c1"), source(b"hello", "a.txt"))
            .await
            .unwrap();
        assert_eq!(view.name, "a.txt");
        assert_eq!(view.size, 5);

        let listed = gateway.list_items(&memdriver("c1")).await.unwrap();
        assert_eq!(listed.items.len(), 1);
        assert_eq!(listed.items[0].id, view.id);
        assert!(listed.cursor.is_start());
    }

    #[tokio::test]
    async fn test_upload_without_any_name_is_rejected() {
        let gateway = gateway(GatewayConfig::default());
        let err = gateway
            .upload(&memdriver("c1"), source(b"x", ""))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRequest);
    }

    #[tokio::test]
    async fn test_list_containers_pages() {
        let gateway = gateway(GatewayConfig::default());
        for name in ["a", "b", "c"] {
            gateway
                .upload(&memdriver(name), source(b"x", "x"))
                .await
                .unwrap();
        }

        let mut conn = memdriver("");
        conn.count = 2;
        let first = gateway.list_containers(&conn).await.unwrap();
        assert_eq!(first.containers.len(), 2);
        assert_eq!(first.count, 2);
        assert!(!first.cursor.is_start());

        conn.cursor = first.cursor;
        let second = gateway.list_containers(&conn).await.unwrap();
        assert_eq!(second.containers.len(), 1);
        assert!(second.containers.values().any(|name| name == "c"));
        assert_eq!(second.cursor, Cursor::start());
    }

    #[tokio::test]
    async fn test_copy_renames_and_keeps_content() {
        let gateway = gateway(GatewayConfig::default());
        gateway
            .upload(&memdriver("src"), source(b"payload", "a.txt"))
            .await
            .unwrap();

        let mut from = memdriver("src");
        from.item_name = "a.txt".to_string();
        let mut to = memdriver("dst");
        to.item_name = "b.txt".to_string();

        let view = gateway.copy(&from, &to).await.unwrap();
        assert_eq!(view.name, "b.txt");
        assert_eq!(view.size, 7);
    }

    #[tokio::test]
    async fn test_copy_missing_source_key() {
        let gateway = gateway(GatewayConfig::default());
        let err = gateway
            .copy(&memdriver("src"), &memdriver("dst"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRequest);
    }

    #[tokio::test]
    async fn test_missing_item_status_follows_config() {
        let mut from = memdriver("src");
        from.item_name = "ghost".to_string();

        let compatible = gateway(GatewayConfig::default());
        let err = compatible.copy(&from, &memdriver("dst")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resolution);

        let distinct =
            gateway(GatewayConfig::default().with_not_found_status(NotFoundStatus::Distinct));
        let err = distinct.copy(&from, &memdriver("dst")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_dial_reports_reachability() {
        let gateway = gateway(GatewayConfig::default());
        assert!(gateway.dial(&memdriver("")).await);

        let unknown = Connection {
            kind: "nope".to_string(),
            ..Default::default()
        };
        assert!(!gateway.dial(&unknown).await);
    }
}
