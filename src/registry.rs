//! Document registry
//!
//! Turns raw document identifiers (as received from the listing endpoint)
//! into entries that know where their page images live.

use log::debug;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Used when sanitization leaves nothing behind
pub const FALLBACK_NAME: &str = "doc";

static NON_ALNUM_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9A-Za-z]+").expect("static regex is valid"));

/// Registry record for one raw document identifier
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentEntry {
    /// Identifier exactly as received (trimmed)
    pub full_name: String,
    /// Last path segment
    pub server_name: String,
    /// Grouping prefix, if the identifier had one
    pub folder_segment: Option<String>,
    pub folder_sanitized: Option<String>,
    pub file_sanitized: String,
    /// Root-relative location prefix of the page images
    pub image_directory: String,
    /// Key for per-document cache records
    pub storage_key: String,
}

/// Replace every run of non-alphanumeric characters with one underscore.
///
/// The result is part of the page image path, so it has to match the naming
/// used by whatever produced the images, edge underscores included.
#[must_use]
pub fn sanitize(name: &str) -> String {
    let replaced = NON_ALNUM_RUN.replace_all(name, "_");
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn is_slash(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Build the entry for `raw_name` under `resource_root`. Pure and total.
///
/// A name is treated as an explicit path when it is rooted (leading slash)
/// or its first segment already is the resource root. Explicit paths keep
/// their segments as-is; everything else is bucketed as
/// `root/[sanitizedFolder/]sanitizedFile`.
#[must_use]
pub fn register_document(raw_name: &str, resource_root: &str) -> DocumentEntry {
    let full_name = raw_name.trim().to_string();
    let root = resource_root.trim_matches(is_slash);

    let segments: Vec<&str> = full_name
        .split(is_slash)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let (folder_segment, server_name) = match segments.split_last() {
        Some((last, [])) => (None, (*last).to_string()),
        Some((last, rest)) => (Some(rest.join("/")), (*last).to_string()),
        None => (None, full_name.clone()),
    };

    let folder_sanitized = folder_segment.as_deref().map(sanitize);
    let file_sanitized = sanitize(&server_name);

    let rooted = full_name.starts_with(is_slash);
    let under_root = !root.is_empty()
        && segments.len() > 1
        && segments[0].eq_ignore_ascii_case(root);

    let image_directory = if under_root {
        segments.join("/")
    } else if rooted && !segments.is_empty() {
        join_root(root, &segments.join("/"))
    } else {
        let mut location = String::new();
        if let Some(folder) = &folder_sanitized {
            location.push_str(folder);
            location.push('/');
        }
        location.push_str(&file_sanitized);
        join_root(root, &location)
    };

    let storage_key = match &folder_segment {
        Some(folder) => format!("{folder}::{server_name}"),
        None => server_name.clone(),
    };

    DocumentEntry {
        full_name,
        server_name,
        folder_segment,
        folder_sanitized,
        file_sanitized,
        image_directory,
        storage_key,
    }
}

fn join_root(root: &str, location: &str) -> String {
    if root.is_empty() {
        location.to_string()
    } else {
        format!("{root}/{location}")
    }
}

/// Split a newline-delimited listing into raw identifiers.
///
/// Blank lines and repeats are dropped; order is kept.
#[must_use]
pub fn parse_listing(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}

/// Retrieve and parse a listing from the list endpoint
pub fn fetch_listing(url: &str, timeout: Duration) -> anyhow::Result<Vec<String>> {
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    let body = agent.get(url).call()?.into_string()?;
    let names = parse_listing(&body);
    debug!("Listing {url} returned {} documents", names.len());
    Ok(names)
}

/// Owns every registered entry for the current listing
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    resource_root: String,
    entries: Vec<Arc<DocumentEntry>>,
}

impl DocumentRegistry {
    #[must_use]
    pub fn new(resource_root: impl Into<String>) -> Self {
        Self {
            resource_root: resource_root.into(),
            entries: Vec::new(),
        }
    }

    /// Registry populated from raw listing text
    #[must_use]
    pub fn from_listing(resource_root: impl Into<String>, listing: &str) -> Self {
        let mut registry = Self::new(resource_root);
        registry.replace_all(parse_listing(listing));
        registry
    }

    #[must_use]
    pub fn register(&self, raw_name: &str) -> DocumentEntry {
        register_document(raw_name, &self.resource_root)
    }

    /// Replace the whole list with freshly registered entries
    pub fn replace_all<I, S>(&mut self, raw_names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.entries = raw_names
            .into_iter()
            .filter(|name| !name.as_ref().trim().is_empty())
            .map(|name| Arc::new(self.register(name.as_ref())))
            .collect();
        debug!("Registered {} documents", self.entries.len());
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<DocumentEntry>> {
        self.entries.get(index)
    }

    #[must_use]
    pub fn entries(&self) -> &[Arc<DocumentEntry>] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the entry whose full or server name matches `name`
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.entries
            .iter()
            .position(|e| e.full_name == name)
            .or_else(|| self.entries.iter().position(|e| e.server_name == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_name_is_split_and_sanitized() {
        let entry = register_document("Folder/My Doc.pdf", "pages");
        assert_eq!(entry.server_name, "My Doc.pdf");
        assert_eq!(entry.folder_segment.as_deref(), Some("Folder"));
        assert_eq!(entry.folder_sanitized.as_deref(), Some("Folder"));
        assert_eq!(entry.file_sanitized, "My_Doc_pdf");
        assert_eq!(entry.image_directory, "pages/Folder/My_Doc_pdf");
        assert_eq!(entry.storage_key, "Folder::My Doc.pdf");
    }

    #[test]
    fn bare_name_is_bucketed_under_root() {
        let entry = register_document("  Annual   Report (final).pdf ", "pages");
        assert_eq!(entry.full_name, "Annual   Report (final).pdf");
        assert_eq!(entry.folder_segment, None);
        assert_eq!(entry.file_sanitized, "Annual_Report_final_pdf");
        assert_eq!(entry.image_directory, "pages/Annual_Report_final_pdf");
        assert_eq!(entry.storage_key, "Annual   Report (final).pdf");
    }

    #[test]
    fn backslashes_split_like_slashes() {
        let entry = register_document(r"Team\Q3\notes.txt", "pages");
        assert_eq!(entry.server_name, "notes.txt");
        assert_eq!(entry.folder_segment.as_deref(), Some("Team/Q3"));
        assert_eq!(entry.folder_sanitized.as_deref(), Some("Team_Q3"));
    }

    #[test]
    fn sanitizing_everything_away_falls_back() {
        assert_eq!(sanitize("..."), FALLBACK_NAME);
        assert_eq!(sanitize(""), FALLBACK_NAME);
        let entry = register_document("***", "pages");
        assert_eq!(entry.image_directory, "pages/doc");
    }

    #[test]
    fn edge_separators_leave_no_underscores() {
        assert_eq!(sanitize("(draft) notes!"), "draft_notes");
        let entry = register_document("_Team_/ v2.pdf", "pages");
        assert_eq!(entry.image_directory, "pages/Team/v2_pdf");
    }

    #[test]
    fn explicit_path_with_root_is_verbatim() {
        let entry = register_document("PAGES/scans/Batch 1", "pages");
        assert_eq!(entry.image_directory, "PAGES/scans/Batch 1");
        assert_eq!(entry.server_name, "Batch 1");
    }

    #[test]
    fn rooted_path_without_root_gets_prefixed() {
        let entry = register_document("/archive/2024/scan", "pages");
        assert_eq!(entry.image_directory, "pages/archive/2024/scan");
        assert_eq!(entry.folder_segment.as_deref(), Some("archive/2024"));
    }

    #[test]
    fn listing_drops_blanks_and_duplicates() {
        let names = parse_listing("a.pdf\r\n\r\nb.pdf\n a.pdf \nFolder/c.pdf\n");
        assert_eq!(names, vec!["a.pdf", "b.pdf", "Folder/c.pdf"]);
    }

    #[test]
    fn registry_finds_by_full_or_server_name() {
        let registry = DocumentRegistry::from_listing("pages", "x.pdf\nFolder/y.pdf\n");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.position("Folder/y.pdf"), Some(1));
        assert_eq!(registry.position("y.pdf"), Some(1));
        assert_eq!(registry.position("z.pdf"), None);
    }
}
