//! Durable resume point for batch processing
//!
//! Maps article id to processed record. Entries are only ever added, and
//! every insert rewrites the whole file atomically. One writer per cache
//! path is assumed; there is no file locking.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::write_json_atomic;
use crate::error::{Error, Result};
use crate::models::ProcessedArticle;

/// Processed articles keyed by article id, backed by a JSON file
#[derive(Debug)]
pub struct ProcessingCache {
    path: PathBuf,
    entries: BTreeMap<String, ProcessedArticle>,
}

impl ProcessingCache {
    /// Load the cache at `path`
    ///
    /// A missing file gives an empty cache. So does an unreadable or corrupt
    /// one, with a warning; the next insert overwrites it.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, ProcessedArticle>>(&content) {
                Ok(entries) => {
                    info!(path = %path.display(), entries = entries.len(), "Loaded processing cache");
                    entries
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Processing cache is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No processing cache yet");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Processing cache unreadable, starting empty");
                BTreeMap::new()
            }
        };

        Self { path, entries }
    }

    pub fn get(&self, id: &str) -> Option<&ProcessedArticle> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Add a record and persist the whole cache
    ///
    /// A write failure is returned as [`Error::Persistence`].
    pub fn insert(&mut self, id: String, record: ProcessedArticle) -> Result<()> {
        self.entries.insert(id, record);
        self.persist()
    }

    /// Rewrite the cache file from memory
    pub fn persist(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.entries).map_err(|e| Error::persistence(&self.path, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn values(&self) -> impl Iterator<Item = &ProcessedArticle> {
        self.entries.values()
    }
}
