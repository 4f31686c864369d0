//! Render pipeline
//!
//! Page loads may complete in any order. Each request takes a fresh token
//! from a monotonic counter; a completion only touches visible state if its
//! token is still the latest one issued.

use log::{debug, warn};
use std::sync::Arc;

use super::layout::{ViewTransform, Viewport};
use super::request::{LoadFault, LoadedPage, RenderToken};
use super::state::ViewerState;
use crate::discovery::DocumentSource;
use crate::registry::DocumentEntry;

/// An issued page request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderTicket {
    pub token: RenderToken,
    pub entry: Arc<DocumentEntry>,
    pub doc_index: usize,
    pub page: usize,
    pub url: String,
}

/// The page currently on screen
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayedPage {
    /// Identity of the document on screen; its list index can change
    pub entry: Arc<DocumentEntry>,
    pub doc_index: usize,
    pub page: usize,
    pub image: LoadedPage,
}

/// What a completion did to visible state
#[derive(Clone, Debug, PartialEq)]
pub enum RenderOutcome {
    /// A newer request exists; nothing changed
    Stale,
    Displayed { page: usize, transform: ViewTransform },
    /// The previous pixels stay; an error indicator should be shown
    Failed { page: usize, fault: LoadFault },
}

#[derive(Debug, Default)]
pub struct RenderPipeline {
    counter: u64,
    in_flight: Option<RenderTicket>,
    viewport: Viewport,
    transform: ViewTransform,
    displayed: Option<DisplayedPage>,
    error: Option<LoadFault>,
}

impl RenderPipeline {
    #[must_use]
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            ..Self::default()
        }
    }

    /// Latest token issued
    #[must_use]
    pub fn current_token(&self) -> RenderToken {
        RenderToken(self.counter)
    }

    fn next_token(&mut self) -> RenderToken {
        self.counter += 1;
        RenderToken(self.counter)
    }

    /// Start loading the current page. Clamps `current_page` first.
    /// Returns `None` while the page count is unknown.
    pub fn begin(&mut self, state: &mut ViewerState, source: &DocumentSource) -> Option<RenderTicket> {
        if !state.has_pages() {
            return None;
        }
        state.current_page = state.clamp_page(state.current_page as i64);

        let ticket = RenderTicket {
            token: self.next_token(),
            entry: source.entry.clone(),
            doc_index: state.current_doc_index,
            page: state.current_page,
            url: source.page_url(state.current_page),
        };
        debug!("Render {:?}: page {} from {}", ticket.token, ticket.page, ticket.url);
        self.in_flight = Some(ticket.clone());
        Some(ticket)
    }

    /// Fence off everything in flight without issuing a load. Used when the
    /// document changes.
    pub fn invalidate(&mut self) -> RenderToken {
        self.in_flight = None;
        self.next_token()
    }

    /// Handle a finished load
    pub fn complete(
        &mut self,
        token: RenderToken,
        result: Result<LoadedPage, LoadFault>,
        state: &ViewerState,
    ) -> RenderOutcome {
        if token != self.current_token() {
            debug!("Dropping stale completion {token:?}, latest is {:?}", self.current_token());
            return RenderOutcome::Stale;
        }
        let Some(ticket) = self.in_flight.take() else {
            return RenderOutcome::Stale;
        };

        match result {
            Ok(image) => {
                let recenter = self
                    .displayed
                    .as_ref()
                    .is_none_or(|d| {
                        d.entry.storage_key != ticket.entry.storage_key || d.page != ticket.page
                    });
                self.transform = ViewTransform::compute(
                    image.size,
                    self.viewport,
                    state.rotation,
                    state.zoom,
                    recenter,
                    &self.transform,
                );
                self.displayed = Some(DisplayedPage {
                    entry: ticket.entry,
                    doc_index: ticket.doc_index,
                    page: ticket.page,
                    image,
                });
                self.error = None;
                RenderOutcome::Displayed {
                    page: ticket.page,
                    transform: self.transform,
                }
            }
            Err(fault) => {
                warn!("Page {} failed to load: {fault}", ticket.page);
                self.error = Some(fault.clone());
                RenderOutcome::Failed {
                    page: ticket.page,
                    fault,
                }
            }
        }
    }

    /// Re-fit the displayed page after a zoom, rotation or viewport change
    pub fn relayout(&mut self, state: &ViewerState, recenter: bool) -> Option<ViewTransform> {
        let displayed = self.displayed.as_ref()?;
        self.transform = ViewTransform::compute(
            displayed.image.size,
            self.viewport,
            state.rotation,
            state.zoom,
            recenter,
            &self.transform,
        );
        Some(self.transform)
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Move the page by a pixel offset
    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        if dx.is_finite() && dy.is_finite() {
            self.transform.pan_x += dx;
            self.transform.pan_y += dy;
        }
    }

    /// Drop what is on screen (empty document, reset)
    pub fn clear(&mut self) {
        self.displayed = None;
        self.error = None;
        self.transform = ViewTransform::default();
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[must_use]
    pub fn transform(&self) -> ViewTransform {
        self.transform
    }

    #[must_use]
    pub fn displayed(&self) -> Option<&DisplayedPage> {
        self.displayed.as_ref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&LoadFault> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn in_flight(&self) -> Option<&RenderTicket> {
        self.in_flight.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::PageUrls;
    use crate::registry::register_document;
    use crate::viewer::layout::ImageSize;
    use crate::viewer::state::Command;
    use std::sync::Arc;

    fn source(pages: usize) -> DocumentSource {
        let entry = Arc::new(register_document("book.pdf", "pages"));
        DocumentSource {
            urls: PageUrls::new("http://h", &entry, "png"),
            entry,
            page_count: pages,
        }
    }

    fn state(pages: usize) -> ViewerState {
        let mut state = ViewerState::default();
        let _ = state.apply(Command::SetDocumentCount(1));
        let _ = state.apply(Command::SetPageCount(pages));
        state
    }

    fn image(width: u32, height: u32) -> LoadedPage {
        LoadedPage {
            size: ImageSize::new(width, height),
            bytes: Arc::from(vec![0u8; 4]),
        }
    }

    #[test]
    fn unknown_page_count_issues_nothing() {
        let mut pipeline = RenderPipeline::default();
        let mut state = state(0);
        assert!(pipeline.begin(&mut state, &source(0)).is_none());
        assert_eq!(pipeline.current_token(), RenderToken(0));
    }

    #[test]
    fn begin_clamps_and_builds_url() {
        let mut pipeline = RenderPipeline::default();
        let mut state = state(4);
        state.current_page = 9;
        let ticket = pipeline.begin(&mut state, &source(4)).unwrap();
        assert_eq!(state.current_page, 4);
        assert_eq!(ticket.url, "http://h/pages/book_pdf_4.png");
        assert_eq!(ticket.token, RenderToken(1));
    }

    #[test]
    fn only_latest_completion_counts() {
        let mut pipeline = RenderPipeline::new(Viewport::new(100.0, 100.0));
        let mut state = state(5);
        let src = source(5);

        let mut tickets = Vec::new();
        for page in 1..=3 {
            state.current_page = page;
            tickets.push(pipeline.begin(&mut state, &src).unwrap());
        }

        // Completion order: 3, 1, 2
        let third = pipeline.complete(tickets[2].token, Ok(image(10, 10)), &state);
        assert!(matches!(third, RenderOutcome::Displayed { page: 3, .. }));
        assert_eq!(
            pipeline.complete(tickets[0].token, Ok(image(10, 10)), &state),
            RenderOutcome::Stale
        );
        assert_eq!(
            pipeline.complete(
                tickets[1].token,
                Err(LoadFault::Transport("reset".into())),
                &state
            ),
            RenderOutcome::Stale
        );
        assert_eq!(pipeline.displayed().unwrap().page, 3);
        assert!(pipeline.error().is_none());
    }

    #[test]
    fn failure_keeps_previous_pixels() {
        let mut pipeline = RenderPipeline::new(Viewport::new(100.0, 100.0));
        let mut state = state(5);
        let src = source(5);

        let first = pipeline.begin(&mut state, &src).unwrap();
        let _ = pipeline.complete(first.token, Ok(image(50, 50)), &state);

        state.current_page = 2;
        let second = pipeline.begin(&mut state, &src).unwrap();
        let fault = LoadFault::Status {
            code: 404,
            url: second.url.clone(),
        };
        let outcome = pipeline.complete(second.token, Err(fault.clone()), &state);

        assert_eq!(outcome, RenderOutcome::Failed { page: 2, fault: fault.clone() });
        assert_eq!(pipeline.displayed().unwrap().page, 1);
        assert_eq!(pipeline.error(), Some(&fault));
    }

    #[test]
    fn invalidate_fences_in_flight_load() {
        let mut pipeline = RenderPipeline::default();
        let mut state = state(2);
        let ticket = pipeline.begin(&mut state, &source(2)).unwrap();
        pipeline.invalidate();
        assert_eq!(
            pipeline.complete(ticket.token, Ok(image(1, 1)), &state),
            RenderOutcome::Stale
        );
        assert!(pipeline.displayed().is_none());
    }

    #[test]
    fn same_page_reload_keeps_pan() {
        let mut pipeline = RenderPipeline::new(Viewport::new(200.0, 200.0));
        let mut state = state(3);
        let src = source(3);

        let t = pipeline.begin(&mut state, &src).unwrap();
        let _ = pipeline.complete(t.token, Ok(image(100, 100)), &state);
        pipeline.pan_by(10.0, 5.0);
        let panned = pipeline.transform();

        let t = pipeline.begin(&mut state, &src).unwrap();
        let _ = pipeline.complete(t.token, Ok(image(100, 100)), &state);
        assert_eq!(pipeline.transform().pan_x, panned.pan_x);

        state.current_page = 2;
        let t = pipeline.begin(&mut state, &src).unwrap();
        let _ = pipeline.complete(t.token, Ok(image(100, 100)), &state);
        assert_eq!(pipeline.transform().pan_x, 0.0);
    }

    #[test]
    fn other_document_at_same_index_recenters() {
        let mut pipeline = RenderPipeline::new(Viewport::new(200.0, 200.0));
        let mut state = state(3);

        let t = pipeline.begin(&mut state, &source(3)).unwrap();
        let _ = pipeline.complete(t.token, Ok(image(100, 100)), &state);
        pipeline.pan_by(10.0, 5.0);

        let entry = Arc::new(register_document("other.pdf", "pages"));
        let other = DocumentSource {
            urls: PageUrls::new("http://h", &entry, "png"),
            entry,
            page_count: 3,
        };
        let t = pipeline.begin(&mut state, &other).unwrap();
        assert_eq!(t.doc_index, 0);
        let _ = pipeline.complete(t.token, Ok(image(100, 100)), &state);

        assert_eq!((pipeline.transform().pan_x, pipeline.transform().pan_y), (0.0, 0.0));
        assert_eq!(pipeline.displayed().unwrap().entry.server_name, "other.pdf");
    }

    #[test]
    fn relayout_applies_zoom() {
        let mut pipeline = RenderPipeline::new(Viewport::new(100.0, 100.0));
        let mut state = state(1);
        let t = pipeline.begin(&mut state, &source(1)).unwrap();
        let _ = pipeline.complete(t.token, Ok(image(200, 100)), &state);
        assert_eq!(pipeline.transform().scale, 0.5);

        state.zoom = 2.0;
        let transform = pipeline.relayout(&state, true).unwrap();
        assert_eq!(transform.base_scale, 0.5);
        assert_eq!(transform.scale, 1.0);
    }
}
