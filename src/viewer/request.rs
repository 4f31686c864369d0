//! Worker request and response types

use std::sync::Arc;

use super::layout::ImageSize;
use crate::discovery::PageUrls;

/// Monotonic fence value of a page load
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RenderToken(pub u64);

/// Monotonic fence value of a discovery run
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiscoveryId(pub u64);

/// A decoded page image
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedPage {
    pub size: ImageSize,
    pub bytes: Arc<[u8]>,
}

/// Errors from page loads
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadFault {
    #[error("server answered {code} for {url}")]
    Status { code: u16, url: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("reading body: {0}")]
    Body(String),

    #[error("not a recognizable image: {0}")]
    Decode(String),
}

/// Request sent to workers
#[derive(Debug)]
pub enum WorkerRequest {
    Discover {
        id: DiscoveryId,
        urls: PageUrls,
        max_scan: usize,
    },

    LoadPage {
        token: RenderToken,
        page: usize,
        url: String,
    },

    Shutdown,
}

/// Response from workers
#[derive(Debug)]
pub enum WorkerResponse {
    Discovered {
        id: DiscoveryId,
        page_count: usize,
    },

    PageLoaded {
        token: RenderToken,
        page: usize,
        result: Result<LoadedPage, LoadFault>,
    },

    /// Superseded before any work started
    DiscoveryCancelled(DiscoveryId),

    LoadCancelled(RenderToken),
}
