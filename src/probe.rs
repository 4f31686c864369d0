//! Existence prober - asks whether one numbered page image exists
//!
//! Probing is the only network traffic page-count discovery generates, so
//! every probe is as light as the server allows: a HEAD request first, a
//! full GET only when HEAD is refused or the transport fails.

use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Result of a single existence check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    Exists,
    Absent,
    /// The server could not be reached; callers treat this as absent
    Unknown,
}

impl ProbeOutcome {
    #[must_use]
    pub fn exists(self) -> bool {
        matches!(self, Self::Exists)
    }
}

/// Anything that can check whether a resource URL exists
pub trait ExistenceProbe: Send + Sync {
    fn probe(&self, url: &str) -> ProbeOutcome;

    /// Never fails: anything but a confirmed hit is `false`
    fn exists(&self, url: &str) -> bool {
        self.probe(url).exists()
    }
}

/// Blocking HTTP prober
pub struct HttpProber {
    agent: ureq::Agent,
    sequence: AtomicU64,
}

impl HttpProber {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Append a query parameter unique to this probe so no intermediate
    /// cache can answer for an earlier one
    fn cache_busted(&self, url: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let stamp = chrono::Utc::now().timestamp_millis();
        let sep = if url.contains('?') { '&' } else { '?' };
        format!("{url}{sep}_probe={stamp}-{seq}")
    }

    fn full_fetch(&self, url: &str) -> ProbeOutcome {
        match self.agent.get(url).call() {
            Ok(_) => ProbeOutcome::Exists,
            Err(ureq::Error::Status(code, _)) => {
                debug!("GET {url} -> {code}");
                ProbeOutcome::Absent
            }
            Err(ureq::Error::Transport(e)) => {
                debug!("GET {url} failed: {e}");
                ProbeOutcome::Unknown
            }
        }
    }
}

/// Status codes meaning "HEAD is not supported here"
fn head_unsupported(code: u16) -> bool {
    code == 405 || code == 501
}

impl ExistenceProbe for HttpProber {
    fn probe(&self, url: &str) -> ProbeOutcome {
        let url = self.cache_busted(url);
        match self.agent.head(&url).call() {
            Ok(_) => ProbeOutcome::Exists,
            Err(ureq::Error::Status(code, _)) if head_unsupported(code) => {
                debug!("HEAD refused with {code}, retrying {url} with GET");
                self.full_fetch(&url)
            }
            Err(ureq::Error::Status(_, _)) => ProbeOutcome::Absent,
            Err(ureq::Error::Transport(e)) => {
                debug!("HEAD {url} failed ({e}), retrying with GET");
                self.full_fetch(&url)
            }
        }
    }
}
