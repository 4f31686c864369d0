//! Viewer state and its transitions
//!
//! There is no separate mode tag. "No document" is `total_doc_count == 0`,
//! "page count unknown" is `total_page_count == 0`.

use super::view_state::{Rotation, ZOOM_EPSILON, clamp_zoom};

/// Everything the viewer is currently showing
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerState {
    /// Index into the document list (0-based)
    pub current_doc_index: usize,
    pub total_doc_count: usize,
    /// Current page (1-based)
    pub current_page: usize,
    pub total_page_count: usize,
    pub rotation: Rotation,
    pub zoom: f32,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self {
            current_doc_index: 0,
            total_doc_count: 0,
            current_page: 1,
            total_page_count: 0,
            rotation: Rotation::Deg0,
            zoom: 1.0,
        }
    }
}

impl ViewerState {
    #[must_use]
    pub fn has_document(&self) -> bool {
        self.total_doc_count > 0
    }

    #[must_use]
    pub fn has_pages(&self) -> bool {
        self.total_page_count > 0
    }

    /// Clamp a requested page into the known range. With an unknown count
    /// only the lower bound applies.
    #[must_use]
    pub fn clamp_page(&self, page: i64) -> usize {
        let page = page.max(1) as u64;
        let page = usize::try_from(page).unwrap_or(usize::MAX);
        if self.total_page_count > 0 {
            page.min(self.total_page_count)
        } else {
            page
        }
    }

    fn clamp_doc_index(&self, index: i64) -> usize {
        let last = self.total_doc_count.saturating_sub(1);
        let index = usize::try_from(index.max(0)).unwrap_or(usize::MAX);
        index.min(last)
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::SetDocumentCount(count) => {
                self.total_doc_count = count;
                if count == 0 {
                    self.current_doc_index = 0;
                    self.total_page_count = 0;
                    self.current_page = 1;
                    vec![Effect::InvalidateSource]
                } else {
                    self.current_doc_index = self.current_doc_index.min(count - 1);
                    vec![]
                }
            }

            Command::SelectDocument { index, page } => {
                if !self.has_document() {
                    return vec![];
                }
                self.current_doc_index = self.clamp_doc_index(index);
                self.total_page_count = 0;
                self.current_page = self.clamp_page(page);
                vec![
                    Effect::InvalidateSource,
                    Effect::PersistPosition,
                    Effect::LoadViewState,
                    Effect::Discover,
                ]
            }

            Command::SetPageCount(count) => {
                self.total_page_count = count;
                if count > 0 {
                    self.current_page = self.current_page.clamp(1, count);
                } else {
                    self.current_page = 1;
                }
                vec![]
            }

            Command::GoToPage(page) => {
                if !self.has_pages() {
                    return vec![];
                }
                let clamped = self.clamp_page(page);
                if clamped == self.current_page {
                    return vec![];
                }
                self.current_page = clamped;
                vec![Effect::PersistPosition, Effect::RenderCurrentPage]
            }

            Command::SetZoom(zoom) => {
                let Some(clamped) = clamp_zoom(zoom) else {
                    return vec![];
                };
                if (clamped - self.zoom).abs() < ZOOM_EPSILON {
                    return vec![];
                }
                self.zoom = clamped;
                vec![Effect::PersistViewState, Effect::Relayout { recenter: true }]
            }

            Command::Rotate => {
                self.rotation = self.rotation.next();
                vec![Effect::PersistViewState, Effect::Relayout { recenter: false }]
            }

            Command::RestoreView { rotation, zoom } => {
                self.rotation = rotation;
                self.zoom = clamp_zoom(zoom).unwrap_or(1.0);
                vec![]
            }

            Command::Reset => {
                let total_doc_count = self.total_doc_count;
                *self = Self {
                    total_doc_count,
                    ..Self::default()
                };
                vec![Effect::ClearStore, Effect::InvalidateSource]
            }
        }
    }
}

/// Commands that modify viewer state
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// A new document list was installed
    SetDocumentCount(usize),
    /// Switch documents; both values are clamped
    SelectDocument { index: i64, page: i64 },
    /// Discovery finished for the current document
    SetPageCount(usize),
    GoToPage(i64),
    SetZoom(f32),
    /// Quarter turn clockwise
    Rotate,
    /// Apply a loaded view-state record without persisting it again
    RestoreView { rotation: Rotation, zoom: f32 },
    /// Forget everything persisted
    Reset,
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Drop the current document source
    InvalidateSource,
    /// Write document index and page
    PersistPosition,
    /// Write rotation/zoom for the current document
    PersistViewState,
    /// Read rotation/zoom for the current document
    LoadViewState,
    /// Find the page count of the current document
    Discover,
    RenderCurrentPage,
    /// Re-fit without reloading the image
    Relayout { recenter: bool },
    ClearStore,
}
