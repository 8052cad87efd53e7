//! Article input discovery and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::info;

use crate::config::PathsConfig;
use crate::error::{Error, Result};
use crate::models::Article;

/// Pick the article file: the explicit override, or the newest `.json` in the data dir
///
/// A relative override that does not exist as given is looked up inside the
/// data directory.
pub fn resolve_articles_file(paths: &PathsConfig) -> Result<PathBuf> {
    if let Some(file) = &paths.articles_file {
        if file.is_file() {
            return Ok(file.clone());
        }
        if file.is_relative() {
            let in_data_dir = paths.data_dir.join(file);
            if in_data_dir.is_file() {
                return Ok(in_data_dir);
            }
        }
        return Err(Error::config(format!("Articles file not found: {}", file.display())));
    }

    latest_json_file(&paths.data_dir)?.ok_or_else(|| {
        Error::config(format!("No JSON files in {}", paths.data_dir.display()))
    })
}

/// Most recently modified `.json` file directly inside `dir`
pub fn latest_json_file(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::config(format!("Data directory does not exist: {}", dir.display())));
    }

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if !is_json || !path.is_file() {
            continue;
        }
        let modified = fs::metadata(&path)?.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }

    if let Some((_, path)) = &newest {
        info!(path = %path.display(), "Found latest articles file");
    }
    Ok(newest.map(|(_, path)| path))
}

/// Read a JSON array of articles
pub fn load_articles(path: &Path) -> Result<Vec<Article>> {
    let content = fs::read_to_string(path)?;
    let articles: Vec<Article> = serde_json::from_str(&content)?;
    info!(path = %path.display(), count = articles.len(), "Loaded articles");
    Ok(articles)
}
