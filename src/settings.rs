use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::discovery::MAX_PAGE_SCAN;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "folioview";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file syntax: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Base URL of the page image server
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// First path segment under which page images live
    #[serde(default = "default_resource_root")]
    pub resource_root: String,

    #[serde(default = "default_image_extension")]
    pub image_extension: String,

    /// Per-request timeout for existence probes and page loads
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_max_page_scan")]
    pub max_page_scan: usize,

    /// Background worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_resource_root() -> String {
    "pages".to_string()
}

fn default_image_extension() -> String {
    "png".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    10_000
}

fn default_max_page_scan() -> usize {
    MAX_PAGE_SCAN
}

fn default_workers() -> usize {
    2
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            server_url: default_server_url(),
            resource_root: default_resource_root(),
            image_extension: default_image_extension(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_page_scan: default_max_page_scan(),
            workers: default_workers(),
        }
    }
}

impl Settings {
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.max(1))
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from `path`, or from the default location.
///
/// A missing file is created with defaults. A file that cannot be parsed is
/// left alone and defaults are used.
pub fn load_settings(path: Option<&Path>) -> Settings {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) => p,
            None => {
                warn!("Could not determine config directory, using default settings");
                return Settings::default();
            }
        },
    };

    if !path.exists() {
        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Settings::default();
        if let Err(e) = save_settings_to_file(&settings, &path) {
            error!("Failed to save settings to {path:?}: {e}");
        }
        return settings;
    }

    match read_settings(&path) {
        Ok(mut settings) => {
            debug!("Loaded settings from {path:?}");
            if settings.version < CURRENT_VERSION {
                migrate_settings(&mut settings);
                if let Err(e) = save_settings_to_file(&settings, &path) {
                    error!("Failed to save migrated settings to {path:?}: {e}");
                }
            }
            settings
        }
        Err(e) => {
            error!("Failed to load settings file {path:?}: {e}");
            Settings::default()
        }
    }
}

fn read_settings(path: &Path) -> Result<Settings, SettingsError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut content = String::from(SETTINGS_HEADER);
    content.push_str(&serde_yaml::to_string(settings)?);
    fs::write(path, content)?;
    debug!("Saved settings to {path:?}");
    Ok(())
}

const SETTINGS_HEADER: &str = r#"# ============================================================================
# folioview settings
# ============================================================================
# server_url:       base URL of the page image server
# resource_root:    path segment page images live under
# image_extension:  extension of page images (png, jpg, ...)
# probe_timeout_ms: timeout for each existence probe and page load
# max_page_scan:    page counts above this are truncated
# workers:          background threads for discovery and page loads

"#;
