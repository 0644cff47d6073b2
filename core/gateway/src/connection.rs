//! Connection descriptors carried in request bodies.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use stowaway_common::{ConfigMap, Cursor};

use crate::error::{ErrorKind, Result};

/// Everything a request says about one backend: which driver, which
/// configuration, and which container/item it addresses.
///
/// Missing fields take their empty value.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Connection {
    /// Provider kind, e.g. "memdriver" or "local".
    pub kind: String,
    /// Container addressed by the request.
    pub container_name: String,
    /// Item identifier; preferred over `item_name` when both are set.
    pub item_id: String,
    /// Item name.
    pub item_name: String,
    /// Provider configuration.
    #[serde(alias = "config_map")]
    pub config: ConfigMap,
    /// Listing cursor; empty requests the first page.
    pub cursor: Cursor,
    /// Requested page size; zero or negative uses the driver default.
    pub count: i64,
}

impl Connection {
    /// Parse a descriptor from a JSON body.
    ///
    /// # Errors
    /// - Malformed request if the body is not a JSON object of the expected shape
    pub fn from_json(body: &[u8]) -> Result<Self> {
        parse_object(body, &[])
    }
}

// Configuration values hold credentials; only their keys are printed.
impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("kind", &self.kind)
            .field("container_name", &self.container_name)
            .field("item_id", &self.item_id)
            .field("item_name", &self.item_name)
            .field("config", &self.config.keys().collect::<Vec<_>>())
            .field("cursor", &self.cursor)
            .field("count", &self.count)
            .finish()
    }
}

/// Body of a copy request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CopyRequest {
    /// Source backend and item.
    pub from: Connection,
    /// Destination backend and container; `item_name` optionally renames.
    pub to: Connection,
}

impl CopyRequest {
    /// Parse a copy request from a JSON body.
    ///
    /// # Errors
    /// - Malformed request if the body, `from` or `to` is not a JSON object
    pub fn from_json(body: &[u8]) -> Result<Self> {
        parse_object(body, &["from", "to"])
    }
}

/// Parse a JSON object body, requiring each of `nested` to be an object
/// when present.
///
/// Derived struct deserializers also accept a JSON array read positionally,
/// so the shape is checked on the raw value first.
fn parse_object<T: DeserializeOwned>(body: &[u8], nested: &[&str]) -> Result<T> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        ErrorKind::MalformedRequest.with_message(format!("Valid JSON body required: {}", e))
    })?;

    let Value::Object(fields) = &value else {
        return Err(ErrorKind::MalformedRequest.with_message("JSON object required"));
    };
    for key in nested {
        if fields.get(*key).is_some_and(|field| !field.is_object()) {
            return Err(ErrorKind::MalformedRequest
                .with_message(format!("'{}' must be a JSON object", key)));
        }
    }

    serde_json::from_value(value).map_err(|e| {
        ErrorKind::MalformedRequest.with_message(format!("Valid JSON body required: {}", e))
    })
}
