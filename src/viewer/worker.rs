//! Background worker - runs discovery and page loads off the viewer thread

use flume::{Receiver, Sender};
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::loader::PageLoader;
use super::request::{DiscoveryId, RenderToken, WorkerRequest, WorkerResponse};
use crate::discovery::discover_page_count;
use crate::probe::ExistenceProbe;

/// Latest issued fence values, shared with the workers so superseded jobs
/// can be skipped before they touch the network
#[derive(Debug, Default)]
pub struct Fences {
    latest_render: AtomicU64,
    latest_discovery: AtomicU64,
}

impl Fences {
    pub fn publish_render(&self, token: RenderToken) {
        self.latest_render.fetch_max(token.0, Ordering::SeqCst);
    }

    pub fn publish_discovery(&self, id: DiscoveryId) {
        self.latest_discovery.fetch_max(id.0, Ordering::SeqCst);
    }

    #[must_use]
    pub fn render_superseded(&self, token: RenderToken) -> bool {
        token.0 < self.latest_render.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn discovery_superseded(&self, id: DiscoveryId) -> bool {
        id.0 < self.latest_discovery.load(Ordering::SeqCst)
    }
}

/// Worker loop. Returns when asked to shut down or when the viewer is gone.
pub fn viewer_worker(
    rx: Receiver<WorkerRequest>,
    tx: Sender<WorkerResponse>,
    probe: Arc<dyn ExistenceProbe>,
    loader: Arc<dyn PageLoader>,
    fences: Arc<Fences>,
) {
    while let Ok(request) = rx.recv() {
        let response = match request {
            WorkerRequest::Discover { id, urls, max_scan } => {
                if fences.discovery_superseded(id) {
                    debug!("Skipping superseded discovery {id:?}");
                    WorkerResponse::DiscoveryCancelled(id)
                } else {
                    let page_count = discover_page_count(&urls, probe.as_ref(), max_scan);
                    WorkerResponse::Discovered { id, page_count }
                }
            }

            WorkerRequest::LoadPage { token, page, url } => {
                if fences.render_superseded(token) {
                    debug!("Skipping superseded load of page {page}");
                    WorkerResponse::LoadCancelled(token)
                } else {
                    WorkerResponse::PageLoaded {
                        token,
                        page,
                        result: loader.load(&url),
                    }
                }
            }

            WorkerRequest::Shutdown => break,
        };

        if tx.send(response).is_err() {
            break;
        }
    }
}
