//! Common utilities and types shared across Stowaway modules.
//!
//! This module provides the error type and the small value types that the
//! storage drivers and the gateway exchange: opaque configuration maps,
//! item metadata, listing cursors and page sizes.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{ConfigMap, Cursor, Metadata, Page, PageSize};
