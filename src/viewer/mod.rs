//! Viewer state machine and render pipeline

mod layout;
mod loader;
mod render;
mod request;
mod service;
mod state;
mod view_state;
mod worker;

pub use layout::{ImageSize, ViewTransform, Viewport, fit_scale};
pub use loader::{HttpPageLoader, MAX_PAGE_BYTES, PageLoader, decode_size};
pub use render::{DisplayedPage, RenderOutcome, RenderPipeline, RenderTicket};
pub use request::{DiscoveryId, LoadFault, LoadedPage, RenderToken};
pub use service::{Viewer, ViewerConfig, ViewerEvent, ZOOM_STEP};
pub use state::{Command, Effect, ViewerState};
pub use view_state::{
    MAX_ZOOM, MIN_ZOOM, PersistedViewState, Rotation, VIEW_STATE_VERSION, ViewStateError,
    ZOOM_EPSILON, clamp_zoom,
};
