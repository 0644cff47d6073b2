//! Translation between client paging fields and driver pages.
//!
//! Clients send `cursor` and `count`; drivers take a [`Cursor`] and a
//! [`PageSize`] and answer with a [`Page`]. Cursors pass through untouched.

use stowaway_common::{Cursor, Page, PageSize};
use stowaway_storage::{Container, Location};

use crate::response::{ContainersResult, ItemView, ItemsResult};

/// Effective page size for a client count.
///
/// Zero or negative counts use the location's default.
pub fn page_size(count: i64, location: &dyn Location) -> PageSize {
    PageSize::from_count(count, location.default_page_size())
}

/// Cursor sent back to the client; empty when there are no more pages.
pub fn next_cursor(next: Option<Cursor>) -> Cursor {
    next.unwrap_or_else(Cursor::start)
}

/// Build the container listing response.
///
/// Containers are keyed by id; a repeated id collapses to the last one seen.
pub fn containers_result(page_size: PageSize, page: Page<Box<dyn Container>>) -> ContainersResult {
    let containers = page
        .entries
        .iter()
        .map(|container| (container.id().to_string(), container.name().to_string()))
        .collect();

    ContainersResult {
        cursor: next_cursor(page.next),
        count: page_size.get(),
        containers,
    }
}

/// Build the item listing response from already described items.
pub fn items_result(page_size: PageSize, items: Vec<ItemView>, next: Option<Cursor>) -> ItemsResult {
    ItemsResult {
        cursor: next_cursor(next),
        count: page_size.get(),
        items,
    }
}
