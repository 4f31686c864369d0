//! Fetching page images

use log::debug;
use std::io::Read;
use std::time::Duration;

use super::layout::ImageSize;
use super::request::{LoadFault, LoadedPage};

/// Largest page image accepted, in bytes
pub const MAX_PAGE_BYTES: u64 = 64 * 1024 * 1024;

/// Loads one page image and reports its native size
pub trait PageLoader: Send + Sync {
    fn load(&self, url: &str) -> Result<LoadedPage, LoadFault>;
}

/// Read native dimensions from encoded image bytes
pub fn decode_size(bytes: &[u8]) -> Result<ImageSize, LoadFault> {
    let size = imagesize::blob_size(bytes).map_err(|e| LoadFault::Decode(e.to_string()))?;
    let width = u32::try_from(size.width).map_err(|e| LoadFault::Decode(e.to_string()))?;
    let height = u32::try_from(size.height).map_err(|e| LoadFault::Decode(e.to_string()))?;
    if width == 0 || height == 0 {
        return Err(LoadFault::Decode(format!("empty image {width}x{height}")));
    }
    Ok(ImageSize::new(width, height))
}

/// Blocking HTTP page loader
pub struct HttpPageLoader {
    agent: ureq::Agent,
    max_bytes: u64,
}

impl HttpPageLoader {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self::with_limit(timeout, MAX_PAGE_BYTES)
    }

    /// Loader that rejects bodies larger than `max_bytes`
    #[must_use]
    pub fn with_limit(timeout: Duration, max_bytes: u64) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            max_bytes,
        }
    }
}

impl PageLoader for HttpPageLoader {
    fn load(&self, url: &str) -> Result<LoadedPage, LoadFault> {
        let response = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => LoadFault::Status {
                code,
                url: url.to_string(),
            },
            ureq::Error::Transport(t) => LoadFault::Transport(t.to_string()),
        })?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(self.max_bytes + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| LoadFault::Body(e.to_string()))?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(LoadFault::Body(format!(
                "page image exceeds {} bytes",
                self.max_bytes
            )));
        }

        let size = decode_size(&bytes)?;
        debug!("Loaded {url}: {}x{}", size.width, size.height);
        Ok(LoadedPage {
            size,
            bytes: bytes.into(),
        })
    }
}
