//! Filesystem connector: wiki-like pages from a directory tree.
//!
//! Walks the configured root, keeps files matching the include globs, and
//! turns each into one [`SourceDocument`]. Unreadable files are skipped
//! with a warning rather than failing the fetch.

use anyhow::{bail, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::FilesystemConnectorConfig;
use crate::connector::Connector;
use crate::models::SourceDocument;

pub struct FilesystemConnector {
    config: FilesystemConnectorConfig,
}

impl FilesystemConnector {
    pub fn new(config: FilesystemConnectorConfig) -> Self {
        Self { config }
    }

    fn scan(&self) -> Result<Vec<SourceDocument>> {
        let root = &self.config.root;
        if !root.exists() {
            bail!("filesystem connector root does not exist: {}", root.display());
        }

        let include_set = build_globset(&self.config.include_globs)?;
        let exclude_set = build_globset(&self.config.exclude_globs)?;

        let mut documents = Vec::new();

        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }

            match file_to_document(path, &rel_str) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    tracing::warn!(path = rel_str, error = %e, "skipping unreadable file");
                }
            }
        }

        // Sort for deterministic ordering
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(documents)
    }
}

#[async_trait]
impl Connector for FilesystemConnector {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn fetch_all(&self) -> Result<Vec<SourceDocument>> {
        self.scan()
    }
}

fn file_to_document(path: &Path, relative_path: &str) -> Result<SourceDocument> {
    let text = std::fs::read_to_string(path)?;

    let title = path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| relative_path.to_string());

    Ok(SourceDocument {
        id: format!("filesystem:{relative_path}"),
        title,
        text,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilesystemConnectorConfig;
    use tempfile::TempDir;

    fn config(root: &Path) -> FilesystemConnectorConfig {
        FilesystemConnectorConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.md".to_string(), "**/*.txt".to_string()],
            exclude_globs: vec!["**/drafts/**".to_string()],
        }
    }

    #[tokio::test]
    async fn test_scan_collects_matching_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("pricing.md"), "Basic plan costs 10").unwrap();
        std::fs::write(dir.path().join("refunds.txt"), "Refund policy: 30 days").unwrap();
        std::fs::write(dir.path().join("image.png"), "binary").unwrap();

        let connector = FilesystemConnector::new(config(dir.path()));
        let docs = connector.fetch_all().await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "filesystem:pricing.md");
        assert_eq!(docs[0].title, "pricing");
        assert_eq!(docs[1].id, "filesystem:refunds.txt");
    }

    #[tokio::test]
    async fn test_excluded_directories_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("drafts")).unwrap();
        std::fs::write(dir.path().join("drafts/wip.md"), "not ready").unwrap();
        std::fs::write(dir.path().join("live.md"), "published page").unwrap();

        let connector = FilesystemConnector::new(config(dir.path()));
        let docs = connector.fetch_all().await.unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "filesystem:live.md");
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let connector = FilesystemConnector::new(config(&missing));
        assert!(connector.fetch_all().await.is_err());
    }
}
