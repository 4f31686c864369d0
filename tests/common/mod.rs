#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use folioview::store::StoreError;
use folioview::viewer::{ImageSize, LoadFault, LoadedPage, PageLoader, Viewport};
use folioview::{
    Clock, ExistenceProbe, KeyValueStore, ManualClock, MemoryStore, ProbeOutcome, Viewer,
    ViewerConfig,
};

pub const WAIT: Duration = Duration::from_secs(5);

/// Split `.../<stem>_<page>.<ext>` into the stem's last path segment and page
pub fn parse_page_url(url: &str) -> Option<(String, usize)> {
    let path = url.split('?').next()?;
    let (stem, tail) = path.rsplit_once('_')?;
    let page = tail.split('.').next()?.parse().ok()?;
    let name = stem.rsplit('/').next()?.to_string();
    Some((name, page))
}

/// Probe answering from an in-memory table of page counts
#[derive(Default)]
pub struct FakeProbe {
    pages: Mutex<HashMap<String, usize>>,
    pub calls: AtomicUsize,
}

impl FakeProbe {
    pub fn with(docs: &[(&str, usize)]) -> Arc<Self> {
        let probe = Self::default();
        for (name, count) in docs {
            probe.set_pages(name, *count);
        }
        Arc::new(probe)
    }

    pub fn set_pages(&self, sanitized_name: &str, count: usize) {
        self.pages
            .lock()
            .unwrap()
            .insert(sanitized_name.to_string(), count);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExistenceProbe for FakeProbe {
    fn probe(&self, url: &str) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some((name, page)) = parse_page_url(url) else {
            return ProbeOutcome::Absent;
        };
        let count = self.pages.lock().unwrap().get(&name).copied().unwrap_or(0);
        if page >= 1 && page <= count {
            ProbeOutcome::Exists
        } else {
            ProbeOutcome::Absent
        }
    }
}

/// Loader returning a fixed-size image after a per-page delay
#[derive(Default)]
pub struct FakeLoader {
    delays_ms: Mutex<HashMap<usize, u64>>,
    failing: Mutex<HashSet<usize>>,
    pub loads: AtomicUsize,
}

impl FakeLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delay(&self, page: usize, ms: u64) {
        self.delays_ms.lock().unwrap().insert(page, ms);
    }

    pub fn fail(&self, page: usize) {
        self.failing.lock().unwrap().insert(page);
    }
}

impl PageLoader for FakeLoader {
    fn load(&self, url: &str) -> Result<LoadedPage, LoadFault> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let (_, page) = parse_page_url(url).ok_or_else(|| LoadFault::Decode(url.to_string()))?;
        let delay = self.delays_ms.lock().unwrap().get(&page).copied();
        if let Some(ms) = delay {
            std::thread::sleep(Duration::from_millis(ms));
        }
        if self.failing.lock().unwrap().contains(&page) {
            return Err(LoadFault::Status {
                code: 404,
                url: url.to_string(),
            });
        }
        Ok(LoadedPage {
            size: ImageSize::new(100, 200),
            bytes: Arc::from(vec![page as u8; 8]),
        })
    }
}

/// Store handle that several viewers can share, standing in for one
/// browser profile across reloads
#[derive(Clone, Default)]
pub struct SharedStore(pub Arc<Mutex<MemoryStore>>);

impl SharedStore {
    pub fn value(&self, key: &str) -> Option<String> {
        self.0.lock().unwrap().get(key)
    }
}

impl KeyValueStore for SharedStore {
    fn get(&self, key: &str) -> Option<String> {
        self.0.lock().unwrap().get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.0.lock().unwrap().set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.0.lock().unwrap().remove(key)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.0.lock().unwrap().clear()
    }

    fn keys(&self) -> Vec<String> {
        self.0.lock().unwrap().keys()
    }
}

pub fn test_config(workers: usize) -> ViewerConfig {
    ViewerConfig {
        server_url: "http://fake".to_string(),
        resource_root: "pages".to_string(),
        image_extension: "png".to_string(),
        max_page_scan: folioview::MAX_PAGE_SCAN,
        workers,
        viewport: Viewport::new(400.0, 400.0),
    }
}

pub struct Harness {
    pub viewer: Viewer,
    pub store: SharedStore,
    pub probe: Arc<FakeProbe>,
    pub loader: Arc<FakeLoader>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(docs: &[(&str, usize)]) -> Self {
        Self::with_parts(
            SharedStore::default(),
            FakeProbe::with(docs),
            FakeLoader::new(),
            Arc::new(ManualClock::new(1_000_000)),
            3,
        )
    }

    pub fn with_parts(
        store: SharedStore,
        probe: Arc<FakeProbe>,
        loader: Arc<FakeLoader>,
        clock: Arc<ManualClock>,
        workers: usize,
    ) -> Self {
        let clock_dyn: Arc<dyn Clock> = clock.clone();
        let viewer = Viewer::new(
            test_config(workers),
            Box::new(store.clone()),
            probe.clone(),
            loader.clone(),
            clock_dyn,
        );
        Self {
            viewer,
            store,
            probe,
            loader,
            clock,
        }
    }

    /// A second viewer over the same store, as after a page reload
    pub fn reopen(&self) -> Self {
        Self::with_parts(
            self.store.clone(),
            self.probe.clone(),
            self.loader.clone(),
            self.clock.clone(),
            3,
        )
    }
}
