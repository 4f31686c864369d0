//! Browser for documents served as numbered page images.
//!
//! The server never says how many pages a document has; the count is
//! discovered by probing for page images and cached with an adaptive TTL.

pub mod clock;
pub mod discovery;
pub mod page_count;
pub mod panic_handler;
pub mod probe;
pub mod registry;
pub mod settings;
pub mod store;
pub mod viewer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use discovery::{DocumentSource, MAX_PAGE_SCAN, PageUrls, discover_page_count};
pub use page_count::{CacheRecord, PageCountCache};
pub use probe::{ExistenceProbe, HttpProber, ProbeOutcome};
pub use registry::{DocumentEntry, DocumentRegistry, parse_listing, register_document};
pub use settings::Settings;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoreError};
pub use viewer::{Viewer, ViewerConfig, ViewerEvent, ViewerState};
