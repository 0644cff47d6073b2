//! Response bodies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use stowaway_common::{Cursor, Metadata};
use stowaway_storage::{url_host_path, Item};

/// How item descriptions treat a failing size or metadata lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Fail the description.
    Strict,
    /// Log the failure and report the field as zero or empty.
    TolerateAndOmit,
}

/// Client-facing description of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemView {
    pub id: String,
    pub name: String,
    pub size: u64,
    /// Host and path of the backend URL.
    pub url: String,
    pub metadata: Metadata,
}

impl ItemView {
    /// Describe an item, fetching its size and metadata.
    ///
    /// # Errors
    /// - Under [`FieldPolicy::Strict`], any size or metadata failure
    pub async fn describe(item: &dyn Item, policy: FieldPolicy) -> stowaway_common::Result<Self> {
        let size = match item.size().await {
            Ok(size) => size,
            Err(e) if policy == FieldPolicy::TolerateAndOmit => {
                tracing::warn!("Failed to retrieve size of {}: {}", item.name(), e);
                0
            }
            Err(e) => return Err(e),
        };

        let metadata = match item.metadata().await {
            Ok(metadata) => metadata,
            Err(e) if policy == FieldPolicy::TolerateAndOmit => {
                tracing::warn!("Failed to retrieve metadata of {}: {}", item.name(), e);
                Metadata::new()
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            id: item.id().to_string(),
            name: item.name().to_string(),
            size,
            url: url_host_path(&item.url()),
            metadata,
        })
    }
}

/// One page of containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainersResult {
    /// Cursor of the next page; empty when exhausted.
    pub cursor: Cursor,
    /// Effective page size.
    pub count: usize,
    /// Container id to container name.
    pub containers: BTreeMap<String, String>,
}

/// One page of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemsResult {
    /// Cursor of the next page; empty when exhausted.
    pub cursor: Cursor,
    /// Effective page size.
    pub count: usize,
    pub items: Vec<ItemView>,
}

/// Outcome of a connectivity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialResult {
    pub success: bool,
}
