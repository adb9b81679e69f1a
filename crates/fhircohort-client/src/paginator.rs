use std::collections::HashSet;

use fhircohort_core::{Bundle, ResourceEntry};
use tracing::trace;

use crate::error::{ClientError, Result};
use crate::session::FhirSession;

/// Follow `next` links from `first_page` until exhausted.
///
/// Entries come back in server order, concatenated across pages; nothing is
/// reordered or deduplicated. A failed page aborts the whole drain, and so
/// does a `next` link that was already followed.
pub async fn drain(session: &FhirSession, first_page: Bundle) -> Result<Vec<ResourceEntry>> {
    let mut next = first_page.next_link().map(str::to_string);
    let mut entries = first_page.entry;
    let mut pages = 1usize;
    let mut visited = HashSet::new();

    while let Some(url) = next {
        if !visited.insert(url.clone()) {
            return Err(ClientError::PagingLoop { url });
        }
        let page = session.get_url(&url).await?;
        pages += 1;
        trace!(url = %url, entries = page.entry.len(), "fetched page");
        next = page.next_link().map(str::to_string);
        entries.extend(page.entry);
    }

    trace!(pages, entries = entries.len(), "bundle drained");
    Ok(entries)
}
