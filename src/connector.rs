//! Document-source connectors.
//!
//! A [`Connector`] pulls source documents from an external system (a wiki
//! export, a spreadsheet, a directory of pages) for the ingestion
//! pipeline. Connectors may fail per item without aborting the whole
//! fetch; a connector that fails wholesale is logged and skipped for that
//! cycle.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::connector_fs::FilesystemConnector;
use crate::models::SourceDocument;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Origin tag used in child metadata (e.g. `"wiki"`, `"filesystem"`).
    fn name(&self) -> &str;

    /// Fetch every available document. May perform network or disk I/O.
    async fn fetch_all(&self) -> Result<Vec<SourceDocument>>;
}

/// All connectors resolved from configuration.
pub struct ConnectorRegistry {
    connectors: Vec<Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        if let Some(fs) = &config.connectors.filesystem {
            registry.register(Arc::new(FilesystemConnector::new(fs.clone())));
        }
        registry
    }

    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.connectors.push(connector);
    }

    pub fn connectors(&self) -> &[Arc<dyn Connector>] {
        &self.connectors
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
