//! JSON record store for pipeline stages.
//!
//! Every stage persists what it produces under its own subdirectory of the
//! data directory:
//!
//! ```text
//! <data_dir>/
//! ├── raw_content/<slug>.json
//! ├── filtered_content/<slug>.json
//! ├── research/<slug>.json
//! ├── drafts/<slug>.json
//! └── published/<slug>.json
//! ```
//!
//! Records are keyed by [`slugify_title`]. Two titles that slug to the same
//! string share a file: the later save overwrites the earlier one. Nothing
//! in the pipeline deletes records.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use autopress_shared::{AutopressError, Result};

/// Subdirectory for articles as scraped.
pub const RAW_CONTENT: &str = "raw_content";
/// Subdirectory for articles that passed the filter.
pub const FILTERED_CONTENT: &str = "filtered_content";
/// Subdirectory for research findings.
pub const RESEARCH: &str = "research";
/// Subdirectory for generated drafts.
pub const DRAFTS: &str = "drafts";
/// Subdirectory for publish results.
pub const PUBLISHED: &str = "published";

/// Turn a title into a record name: lowercase, spaces and path separators
/// become `_`. Deterministic, not injective.
pub fn slugify_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

/// Handle to the data directory.
#[derive(Debug, Clone)]
pub struct JsonStore {
    data_dir: PathBuf,
}

impl JsonStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path a record named `name` in `subdir` lives at.
    pub fn record_path(&self, name: &str, subdir: &str) -> PathBuf {
        self.data_dir.join(subdir).join(format!("{name}.json"))
    }

    /// Write `record` as pretty JSON to `<data_dir>/<subdir>/<name>.json`,
    /// replacing any existing file. Returns the written path.
    /// Create `subdir` under the data directory if needed and return its path.
    pub fn ensure_subdir(&self, subdir: &str) -> Result<PathBuf> {
        let dir = self.data_dir.join(subdir);
        std::fs::create_dir_all(&dir).map_err(|e| AutopressError::io(&dir, e))?;
        Ok(dir)
    }

    pub fn save_data<T: Serialize + ?Sized>(
        &self,
        record: &T,
        name: &str,
        subdir: &str,
    ) -> Result<PathBuf> {
        if name.is_empty() {
            return Err(AutopressError::validation(format!(
                "cannot save a record with an empty name in {subdir}"
            )));
        }

        let dir = self.ensure_subdir(subdir)?;

        let target = dir.join(format!("{name}.json"));
        let temp = dir.join(format!(".{name}.json.tmp"));

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| AutopressError::parse(format!("failed to serialize {name}: {e}")))?;

        std::fs::write(&temp, json).map_err(|e| AutopressError::io(&temp, e))?;
        std::fs::rename(&temp, &target).map_err(|e| AutopressError::io(&target, e))?;

        debug!(path = %target.display(), "saved record");
        Ok(target)
    }

    /// Read back a record written by [`save_data`](Self::save_data).
    ///
    /// Fails with [`AutopressError::NotFound`] if the file is absent and
    /// [`AutopressError::Parse`] if it is not valid JSON for `T`.
    pub fn load_data<T: DeserializeOwned>(&self, name: &str, subdir: &str) -> Result<T> {
        let path = self.record_path(name, subdir);

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AutopressError::NotFound { path });
            }
            Err(e) => return Err(AutopressError::io(&path, e)),
        };

        serde_json::from_str(&content)
            .map_err(|e| AutopressError::parse(format!("{}: {e}", path.display())))
    }

    /// Load every record in `subdir`, sorted by record name.
    ///
    /// A missing subdirectory is an empty collection. Files that fail to
    /// parse are skipped with a debug log.
    pub fn list_data<T: DeserializeOwned>(&self, subdir: &str) -> Result<Vec<(String, T)>> {
        let dir = self.data_dir.join(subdir);

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AutopressError::io(&dir, e)),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                // In-flight `.<name>.json.tmp` files fail the suffix check.
                let file_name = entry.file_name().to_string_lossy().to_string();
                file_name.strip_suffix(".json").map(String::from)
            })
            .collect();
        names.sort();

        let mut records = Vec::with_capacity(names.len());
        for name in names {
            match self.load_data::<T>(&name, subdir) {
                Ok(record) => records.push((name, record)),
                Err(e) => debug!(name, subdir, error = %e, "skipping unreadable record"),
            }
        }

        Ok(records)
    }
}
