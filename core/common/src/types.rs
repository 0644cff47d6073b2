//! Common types used throughout Stowaway.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;

/// Provider configuration (credentials, endpoint, root path, ...).
///
/// The key set is entirely provider-defined; the gateway never looks inside.
pub type ConfigMap = BTreeMap<String, String>;

/// Provider-defined item metadata.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Opaque listing cursor.
///
/// A cursor is produced by a driver and handed back to the same driver on the
/// next request. Nothing outside the driver interprets its content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Cursor pointing at the first page.
    pub fn start() -> Self {
        Self(String::new())
    }

    /// Wrap a driver-native cursor value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Check if this cursor requests the first page.
    pub fn is_start(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the raw cursor value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the cursor and return the raw value.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for Cursor {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of entries requested per listing page. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageSize(NonZeroUsize);

impl PageSize {
    /// Create a page size.
    ///
    /// # Errors
    /// - Returns error if `size` is zero
    pub fn new(size: usize) -> crate::Result<Self> {
        NonZeroUsize::new(size)
            .map(Self)
            .ok_or_else(|| crate::Error::InvalidInput("Page size cannot be zero".to_string()))
    }

    /// Convert a client-supplied count, falling back to `default` when the
    /// count is zero or negative.
    pub fn from_count(count: i64, default: PageSize) -> Self {
        usize::try_from(count)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(Self)
            .unwrap_or(default)
    }

    /// Get the size as usize.
    pub fn get(&self) -> usize {
        self.0.get()
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self(NonZeroUsize::new(100).unwrap_or(NonZeroUsize::MIN))
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One page of a listing.
#[derive(Debug)]
pub struct Page<T> {
    /// Entries in backend order.
    pub entries: Vec<T>,
    /// Cursor for the following page; `None` when the listing is exhausted.
    pub next: Option<Cursor>,
}

impl<T> Page<T> {
    /// Create a page.
    pub fn new(entries: Vec<T>, next: Option<Cursor>) -> Self {
        Self { entries, next }
    }

    /// Create the last page of a listing.
    pub fn last(entries: Vec<T>) -> Self {
        Self {
            entries,
            next: None,
        }
    }

    /// Check if more pages follow.
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cursor_start() {
        let cursor = Cursor::start();
        assert!(cursor.is_start());
        assert_eq!(cursor.as_str(), "");
    }

    #[test]
    fn test_cursor_serializes_as_plain_string() {
        let cursor = Cursor::new("page-2");
        assert_eq!(serde_json::to_string(&cursor).unwrap(), "\"page-2\"");
        let parsed: Cursor = serde_json::from_str("\"page-2\"").unwrap();
        assert_eq!(parsed, cursor);
    }

    #[test]
    fn test_page_size_zero_fails() {
        assert!(PageSize::new(0).is_err());
        assert_eq!(PageSize::new(7).unwrap().get(), 7);
    }

    #[test]
    fn test_page_last_has_no_more() {
        let page = Page::last(vec![1, 2, 3]);
        assert!(!page.has_more());
        let page = Page::new(vec![1], Some(Cursor::new("1")));
        assert!(page.has_more());
    }

    proptest! {
        #[test]
        fn prop_page_size_from_count(count in any::<i64>(), default in 1usize..1000) {
            let default = PageSize::new(default).unwrap();
            let size = PageSize::from_count(count, default);
            if count > 0 {
                prop_assert_eq!(size.get() as i64, count);
            } else {
                prop_assert_eq!(size, default);
            }
        }
    }
}
