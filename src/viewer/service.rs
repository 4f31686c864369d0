//! Viewer controller - owns state, persistence, cache and workers

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};

use super::layout::{ViewTransform, Viewport};
use super::loader::PageLoader;
use super::render::{DisplayedPage, RenderOutcome, RenderPipeline};
use super::request::{DiscoveryId, LoadFault, WorkerRequest, WorkerResponse};
use super::state::{Command, Effect, ViewerState};
use super::view_state::{PersistedViewState, ViewStateError};
use super::worker::{Fences, viewer_worker};
use crate::clock::Clock;
use crate::discovery::{DocumentSource, PageUrls};
use crate::page_count::PageCountCache;
use crate::probe::ExistenceProbe;
use crate::registry::{DocumentEntry, DocumentRegistry};
use crate::settings::Settings;
use crate::store::{
    KEY_COLLAPSED_FOLDERS, KEY_DOC_INDEX, KEY_PAGE, KEY_PENDING_DOC, KEY_PENDING_PAGE,
    KeyValueStore, view_state_key,
};

/// Zoom step for `zoom_in` / `zoom_out`
pub const ZOOM_STEP: f32 = 1.25;

/// Viewer wiring that does not change while it runs
#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub server_url: String,
    pub resource_root: String,
    pub image_extension: String,
    pub max_page_scan: usize,
    pub workers: usize,
    pub viewport: Viewport,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ViewerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            server_url: settings.server_url.clone(),
            resource_root: settings.resource_root.clone(),
            image_extension: settings.image_extension.clone(),
            max_page_scan: settings.max_page_scan,
            workers: settings.workers,
            viewport: Viewport::new(1280.0, 800.0),
        }
    }
}

/// Outcomes the UI layer may want to reflect
#[derive(Clone, Debug, PartialEq)]
pub enum ViewerEvent {
    PageCountKnown {
        doc_index: usize,
        page_count: usize,
        from_cache: bool,
    },
    /// Discovery found no first page
    EmptyDocument { doc_index: usize },
    PageDisplayed {
        page: usize,
        transform: ViewTransform,
    },
    PageFailed { page: usize, fault: LoadFault },
    Relayout(ViewTransform),
}

pub struct Viewer {
    config: ViewerConfig,
    registry: DocumentRegistry,
    state: ViewerState,
    source: Option<DocumentSource>,
    store: Box<dyn KeyValueStore>,
    cache: PageCountCache,
    pipeline: RenderPipeline,
    fences: Arc<Fences>,
    request_tx: Sender<WorkerRequest>,
    response_rx: Receiver<WorkerResponse>,
    next_discovery_id: u64,
    pending_discovery: Option<(DiscoveryId, usize)>,
    events: Vec<ViewerEvent>,
    num_workers: usize,
}

impl Viewer {
    #[must_use]
    pub fn new(
        config: ViewerConfig,
        store: Box<dyn KeyValueStore>,
        probe: Arc<dyn ExistenceProbe>,
        loader: Arc<dyn PageLoader>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let fences = Arc::new(Fences::default());
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        let num_workers = config.workers.max(1);
        for _ in 0..num_workers {
            let rx = request_rx.clone();
            let tx = response_tx.clone();
            let probe = probe.clone();
            let loader = loader.clone();
            let fences = fences.clone();
            std::thread::spawn(move || viewer_worker(rx, tx, probe, loader, fences));
        }

        Self {
            registry: DocumentRegistry::new(config.resource_root.clone()),
            pipeline: RenderPipeline::new(config.viewport),
            config,
            state: ViewerState::default(),
            source: None,
            store,
            cache: PageCountCache::new(clock),
            fences,
            request_tx,
            response_rx,
            next_discovery_id: 0,
            pending_discovery: None,
            events: Vec::new(),
            num_workers,
        }
    }

    /// Install a new document list and navigate to the remembered position,
    /// or to a pending deep-link target if one was left behind
    pub fn set_documents<I, S>(&mut self, raw_names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.registry.replace_all(raw_names);
        let effects = self.state.apply(Command::SetDocumentCount(self.registry.len()));
        self.execute_effects(effects);
        if self.registry.is_empty() {
            return;
        }

        let (index, page) = self
            .take_pending_navigation()
            .unwrap_or_else(|| self.persisted_position());
        self.select_document(index, page);
    }

    fn take_pending_navigation(&mut self) -> Option<(i64, i64)> {
        let doc = self.take_key(KEY_PENDING_DOC)?;
        let page = self
            .take_key(KEY_PENDING_PAGE)
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(1);
        match self.registry.position(&doc) {
            Some(index) => {
                info!("Opening pending document {doc} at page {page}");
                Some((index as i64, page))
            }
            None => {
                warn!("Pending document {doc} is not in the list");
                None
            }
        }
    }

    fn take_key(&mut self, key: &str) -> Option<String> {
        self.store.take(key).unwrap_or_else(|e| {
            warn!("Failed to read {key}: {e}");
            None
        })
    }

    fn persisted_position(&self) -> (i64, i64) {
        let read = |key: &str, default: i64| {
            self.store
                .get(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        (read(KEY_DOC_INDEX, 0), read(KEY_PAGE, 1))
    }

    /// Leave a one-shot navigation target for the next `set_documents`
    pub fn set_pending_navigation(&mut self, doc_name: &str, page: usize) {
        self.persist(KEY_PENDING_DOC, doc_name);
        self.persist(KEY_PENDING_PAGE, &page.to_string());
    }

    pub fn select_document(&mut self, index: i64, page: i64) {
        self.apply_command(Command::SelectDocument { index, page });
    }

    pub fn next_document(&mut self) {
        if self.state.has_document() {
            self.select_document(self.state.current_doc_index as i64 + 1, 1);
        }
    }

    pub fn prev_document(&mut self) {
        if self.state.has_document() {
            self.select_document(self.state.current_doc_index as i64 - 1, 1);
        }
    }

    pub fn go_to_page(&mut self, page: i64) {
        if self.source.is_none() {
            return;
        }
        self.apply_command(Command::GoToPage(page));
    }

    pub fn next_page(&mut self) {
        self.go_to_page(self.state.current_page as i64 + 1);
    }

    pub fn prev_page(&mut self) {
        self.go_to_page(self.state.current_page as i64 - 1);
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.apply_command(Command::SetZoom(zoom));
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.state.zoom * ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.state.zoom / ZOOM_STEP);
    }

    pub fn rotate(&mut self) {
        self.apply_command(Command::Rotate);
    }

    /// Forget the cached page count of the current document and discover it
    /// again, staying on the current page where possible
    pub fn refresh_page_count(&mut self) {
        let Some(entry) = self.current_entry().cloned() else {
            return;
        };
        info!("Refreshing page count of {}", entry.full_name);
        self.cache.evict(self.store.as_mut(), &entry);
        self.select_document(
            self.state.current_doc_index as i64,
            self.state.current_page as i64,
        );
    }

    /// Clear every persisted value and start over from the first document
    pub fn reset(&mut self) {
        info!("Resetting viewer state");
        self.apply_command(Command::Reset);
        if self.state.has_document() {
            self.select_document(0, 1);
        }
    }

    /// Read rotation/zoom of the current document. Records from another
    /// format version are replaced with defaults on the spot.
    pub fn load_persisted_view_state(&mut self) {
        let Some(entry) = self.current_entry().cloned() else {
            return;
        };
        let key = view_state_key(&entry.server_name);
        let view = match self.store.get(&key).map(|raw| PersistedViewState::decode(&raw)) {
            Some(Ok(view)) => view,
            Some(Err(ViewStateError::VersionMismatch { found })) => {
                info!("Discarding view state v{found} of {}", entry.server_name);
                let defaults = PersistedViewState::default();
                self.persist(&key, &defaults.encode());
                defaults
            }
            Some(Err(e)) => {
                debug!("Ignoring view state of {}: {e}", entry.server_name);
                PersistedViewState::default()
            }
            None => PersistedViewState::default(),
        };
        self.apply_command(Command::RestoreView {
            rotation: view.rotation,
            zoom: view.zoom,
        });
    }

    /// Start loading the current page of the active source
    pub fn render_current_page(&mut self) {
        let Some(source) = self.source.as_ref() else {
            return;
        };
        let Some(ticket) = self.pipeline.begin(&mut self.state, source) else {
            return;
        };
        self.fences.publish_render(ticket.token);
        let _ = self.request_tx.send(WorkerRequest::LoadPage {
            token: ticket.token,
            page: ticket.page,
            url: ticket.url,
        });
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        let viewport = Viewport::new(width, height);
        if viewport == self.pipeline.viewport() {
            return;
        }
        self.pipeline.set_viewport(viewport);
        self.execute_effects(vec![Effect::Relayout { recenter: true }]);
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.pipeline.pan_by(dx, dy);
    }

    pub fn toggle_folder_collapsed(&mut self, label: &str) -> bool {
        let mut folders = self.collapsed_folders();
        let collapsed = if folders.remove(label) {
            false
        } else {
            folders.insert(label.to_string());
            true
        };
        match serde_json::to_string(&folders) {
            Ok(json) => self.persist(KEY_COLLAPSED_FOLDERS, &json),
            Err(e) => warn!("Failed to encode collapsed folders: {e}"),
        }
        collapsed
    }

    #[must_use]
    pub fn is_folder_collapsed(&self, label: &str) -> bool {
        self.collapsed_folders().contains(label)
    }

    #[must_use]
    pub fn collapsed_folders(&self) -> BTreeSet<String> {
        self.store
            .get(KEY_COLLAPSED_FOLDERS)
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    fn apply_command(&mut self, cmd: Command) {
        let effects = self.state.apply(cmd);
        self.execute_effects(effects);
    }

    fn execute_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::InvalidateSource => {
                    self.source = None;
                    self.pending_discovery = None;
                    let token = self.pipeline.invalidate();
                    self.fences.publish_render(token);
                }

                Effect::PersistPosition => {
                    self.persist(KEY_DOC_INDEX, &self.state.current_doc_index.to_string());
                    self.persist(KEY_PAGE, &self.state.current_page.to_string());
                }

                Effect::PersistViewState => {
                    if let Some(entry) = self.current_entry().cloned() {
                        let view = PersistedViewState::new(self.state.rotation, self.state.zoom);
                        self.persist(&view_state_key(&entry.server_name), &view.encode());
                    }
                }

                Effect::LoadViewState => self.load_persisted_view_state(),

                Effect::Discover => self.start_discovery(),

                Effect::RenderCurrentPage => self.render_current_page(),

                Effect::Relayout { recenter } => {
                    if let Some(transform) = self.pipeline.relayout(&self.state, recenter) {
                        self.events.push(ViewerEvent::Relayout(transform));
                    }
                }

                Effect::ClearStore => {
                    if let Err(e) = self.store.clear() {
                        warn!("Failed to clear viewer state: {e}");
                    }
                    self.pipeline.clear();
                }
            }
        }
    }

    fn persist(&mut self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!("Failed to persist {key}: {e}");
        }
    }

    fn start_discovery(&mut self) {
        let index = self.state.current_doc_index;
        let Some(entry) = self.registry.get(index).cloned() else {
            return;
        };
        let urls = PageUrls::new(&self.config.server_url, &entry, &self.config.image_extension);

        if let Some(page_count) = self.cache.lookup(self.store.as_ref(), &entry) {
            debug!("Page count of {} from cache: {page_count}", entry.full_name);
            self.install_source(entry, urls, page_count, true);
            return;
        }

        self.next_discovery_id += 1;
        let id = DiscoveryId(self.next_discovery_id);
        self.fences.publish_discovery(id);
        self.pending_discovery = Some((id, index));
        let _ = self.request_tx.send(WorkerRequest::Discover {
            id,
            urls,
            max_scan: self.config.max_page_scan,
        });
    }

    fn install_source(
        &mut self,
        entry: Arc<DocumentEntry>,
        urls: PageUrls,
        page_count: usize,
        from_cache: bool,
    ) {
        let doc_index = self.state.current_doc_index;
        let _ = self.state.apply(Command::SetPageCount(page_count));

        if page_count == 0 {
            info!("{} has no pages yet", entry.full_name);
            self.source = None;
            self.pipeline.clear();
            self.events.push(ViewerEvent::EmptyDocument { doc_index });
            return;
        }

        self.source = Some(DocumentSource {
            entry,
            page_count,
            urls,
        });
        self.execute_effects(vec![Effect::PersistPosition]);
        self.events.push(ViewerEvent::PageCountKnown {
            doc_index,
            page_count,
            from_cache,
        });
        self.render_current_page();
    }

    fn handle_response(&mut self, response: WorkerResponse) {
        match response {
            WorkerResponse::Discovered { id, page_count } => {
                let Some((pending, index)) = self.pending_discovery else {
                    debug!("Dropping discovery {id:?}: nothing pending");
                    return;
                };
                if pending != id || index != self.state.current_doc_index {
                    debug!("Dropping stale discovery {id:?}");
                    return;
                }
                self.pending_discovery = None;
                let Some(entry) = self.registry.get(index).cloned() else {
                    return;
                };
                self.cache.remember(self.store.as_mut(), &entry, page_count);
                let urls =
                    PageUrls::new(&self.config.server_url, &entry, &self.config.image_extension);
                self.install_source(entry, urls, page_count, false);
            }

            WorkerResponse::PageLoaded {
                token,
                page: _,
                result,
            } => match self.pipeline.complete(token, result, &self.state) {
                RenderOutcome::Stale => {}
                RenderOutcome::Displayed { page, transform } => {
                    self.events.push(ViewerEvent::PageDisplayed { page, transform });
                }
                RenderOutcome::Failed { page, fault } => {
                    self.events.push(ViewerEvent::PageFailed { page, fault });
                }
            },

            WorkerResponse::DiscoveryCancelled(id) => {
                debug!("Discovery {id:?} cancelled");
            }

            WorkerResponse::LoadCancelled(token) => {
                debug!("Load {token:?} cancelled");
            }
        }
    }

    /// Apply every completion that has arrived and return the events since
    /// the last call
    pub fn poll_events(&mut self) -> Vec<ViewerEvent> {
        while let Ok(response) = self.response_rx.try_recv() {
            self.handle_response(response);
        }
        std::mem::take(&mut self.events)
    }

    /// Block until no discovery or page load is outstanding, or `timeout`
    /// passes. Returns the events collected meanwhile.
    pub fn wait_until_idle(&mut self, timeout: Duration) -> Vec<ViewerEvent> {
        let deadline = Instant::now() + timeout;
        while !self.is_idle() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.response_rx.recv_timeout(remaining) {
                Ok(response) => self.handle_response(response),
                Err(RecvTimeoutError::Timeout) => {
                    warn!("Viewer still busy after {timeout:?}");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.poll_events()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending_discovery.is_none() && self.pipeline.in_flight().is_none()
    }

    #[must_use]
    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    #[must_use]
    pub fn source(&self) -> Option<&DocumentSource> {
        self.source.as_ref()
    }

    #[must_use]
    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    #[must_use]
    pub fn current_entry(&self) -> Option<&Arc<DocumentEntry>> {
        if self.state.has_document() {
            self.registry.get(self.state.current_doc_index)
        } else {
            None
        }
    }

    #[must_use]
    pub fn displayed(&self) -> Option<&DisplayedPage> {
        self.pipeline.displayed()
    }

    #[must_use]
    pub fn transform(&self) -> ViewTransform {
        self.pipeline.transform()
    }

    #[must_use]
    pub fn load_error(&self) -> Option<&LoadFault> {
        self.pipeline.error()
    }

    /// Stop all workers
    pub fn shutdown(&self) {
        for _ in 0..self.num_workers {
            let _ = self.request_tx.send(WorkerRequest::Shutdown);
        }
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
