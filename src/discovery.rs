//! Page-count discovery
//!
//! Nothing on the server reports how many pages a document has. The count is
//! found by probing for numbered page images: grow exponentially until a page
//! is missing, then bisect the gap. That is O(log N) round trips instead of N.

use log::{debug, info};
use std::sync::Arc;

use crate::probe::ExistenceProbe;
use crate::registry::DocumentEntry;

/// Hard ceiling on discovered page counts. Longer documents are truncated.
pub const MAX_PAGE_SCAN: usize = 800;

/// Builds page image URLs for one document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageUrls {
    base_url: String,
    image_directory: String,
    extension: String,
}

impl PageUrls {
    #[must_use]
    pub fn new(base_url: &str, entry: &DocumentEntry, extension: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            image_directory: entry.image_directory.trim_matches('/').to_string(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// `<base>/<imageDirectory>_<page>.<ext>`, page unpadded
    #[must_use]
    pub fn page_url(&self, page: usize) -> String {
        if self.base_url.is_empty() {
            format!("{}_{page}.{}", self.image_directory, self.extension)
        } else {
            format!(
                "{}/{}_{page}.{}",
                self.base_url, self.image_directory, self.extension
            )
        }
    }
}

/// A registered document whose page count is known
#[derive(Clone, Debug)]
pub struct DocumentSource {
    pub entry: Arc<DocumentEntry>,
    pub page_count: usize,
    pub urls: PageUrls,
}

impl DocumentSource {
    #[must_use]
    pub fn page_url(&self, page: usize) -> String {
        self.urls.page_url(page)
    }
}

/// Highest existing page number, 0 for an empty document.
///
/// `max_scan` bounds the search; `MAX_PAGE_SCAN` is the usual value.
pub fn discover_page_count<P>(urls: &PageUrls, probe: &P, max_scan: usize) -> usize
where
    P: ExistenceProbe + ?Sized,
{
    let max_scan = max_scan.max(1);
    let exists = |page: usize| probe.exists(&urls.page_url(page));

    if !exists(1) {
        debug!("No first page at {}", urls.page_url(1));
        return 0;
    }

    let mut low = 1;
    let mut high = 2;
    while high <= max_scan && exists(high) {
        low = high;
        high *= 2;
    }

    let mut best = low;
    let mut lo = low + 1;
    let mut hi = (high - 1).min(max_scan);
    while lo <= hi {
        let mid = lo + (hi - lo) / 2;
        if exists(mid) {
            best = mid;
            lo = mid + 1;
        } else {
            hi = mid - 1;
        }
    }

    info!("Discovered {best} pages at {}", urls.page_url(1));
    best
}
