//! Persistent key-value store for viewer state
//!
//! The viewer treats the store as a single-writer resource. Every mutation
//! is written through immediately so a crash never loses more than the
//! in-flight change.

use log::{debug, error};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "folioview";
const STATE_FILENAME: &str = "state.json";

pub const KEY_DOC_INDEX: &str = "viewer.doc_index";
pub const KEY_PAGE: &str = "viewer.page";
pub const KEY_PENDING_DOC: &str = "viewer.pending_doc";
pub const KEY_PENDING_PAGE: &str = "viewer.pending_page";
pub const KEY_COLLAPSED_FOLDERS: &str = "viewer.collapsed_folders";

const PAGE_COUNT_PREFIX: &str = "pagecount::";
const VIEW_STATE_PREFIX: &str = "viewstate::";

/// Key holding the discovered page count of a document
pub fn page_count_key(storage_key: &str) -> String {
    format!("{PAGE_COUNT_PREFIX}{storage_key}")
}

/// Key holding the rotation/zoom record of a document
pub fn view_state_key(server_name: &str) -> String {
    format!("{VIEW_STATE_PREFIX}{server_name}")
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file encoding: {0}")]
    Json(#[from] serde_json::Error),
}

/// String key-value storage
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    /// Drop every key
    fn clear(&mut self) -> Result<(), StoreError>;

    fn keys(&self) -> Vec<String>;

    /// Read a value and remove it in one step
    fn take(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self.get(key);
        if value.is_some() {
            self.remove(key)?;
        }
        Ok(value)
    }
}

/// Store that lives only as long as the process
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Store backed by a single JSON object on disk
#[derive(Debug)]
pub struct JsonFileStore {
    entries: BTreeMap<String, String>,
    file_path: PathBuf,
}

impl JsonFileStore {
    /// Default location under the user's data directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join(APP_NAME).join(STATE_FILENAME))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let entries = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };
        debug!("Loaded {} state entries from {path:?}", entries.len());
        Ok(Self {
            entries,
            file_path: path.to_path_buf(),
        })
    }

    /// Load the file, starting empty if it cannot be read or parsed
    pub fn load_or_empty(path: &Path) -> Self {
        Self::load_from_file(path).unwrap_or_else(|e| {
            error!("Failed to load viewer state from {path:?}: {e}");
            Self {
                entries: BTreeMap::new(),
                file_path: path.to_path_buf(),
            }
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.file_path, content)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.save()
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.entries.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        self.save()
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}
