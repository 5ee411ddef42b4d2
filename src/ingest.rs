//! Background ingestion pipeline.
//!
//! One cycle moves through Fetching → Embedding → Swapping and back to
//! Idle: pull documents from every connector, chunk them into children,
//! embed the children in bounded batches, then atomically install the new
//! generation and rebuild the keyword index from it. A failure anywhere
//! before the swap aborts the cycle and leaves the previous generation
//! untouched — a failed refresh degrades to stale data, never to no data.
//!
//! Cancellation is cooperative: the stop signal is honored between phases
//! and between embedding batches, but an in-flight swap always completes.
//! A trigger while a cycle is running is rejected, not queued.

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::chunker::split_document;
use crate::config::{ChunkingConfig, IngestionConfig};
use crate::connector::Connector;
use crate::embedding::Embedder;
use crate::keyword::KeywordIndex;
use crate::models::ChildMetadata;
use crate::store::{GenerationBuilder, IndexStore};

/// Pipeline phase, observable from other tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Fetching = 1,
    Embedding = 2,
    Swapping = 3,
    Cancelled = 4,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Phase::Fetching,
            2 => Phase::Embedding,
            3 => Phase::Swapping,
            4 => Phase::Cancelled,
            _ => Phase::Idle,
        }
    }
}

/// Outcome of one completed ingestion cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub fetched: usize,
    /// Documents discarded as noise (below the content-length floor).
    pub skipped: usize,
    pub parents: usize,
    pub children: usize,
    /// Embedding batches dropped after a capability failure; their
    /// children are retried by the next scheduled cycle.
    pub failed_batches: usize,
}

pub struct IngestionPipeline {
    connectors: Vec<Arc<dyn Connector>>,
    embedder: Arc<dyn Embedder>,
    store: Arc<IndexStore>,
    keyword: Arc<KeywordIndex>,
    chunking: ChunkingConfig,
    config: IngestionConfig,
    phase: AtomicU8,
    cancel_requested: AtomicBool,
}

impl IngestionPipeline {
    pub fn new(
        connectors: Vec<Arc<dyn Connector>>,
        embedder: Arc<dyn Embedder>,
        store: Arc<IndexStore>,
        keyword: Arc<KeywordIndex>,
        chunking: ChunkingConfig,
        config: IngestionConfig,
    ) -> Self {
        Self {
            connectors,
            embedder,
            store,
            keyword,
            chunking,
            config,
            phase: AtomicU8::new(Phase::Idle as u8),
            cancel_requested: AtomicBool::new(false),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }

    /// Ask a running cycle to stop at the next phase boundary. An
    /// in-flight swap completes first.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel_requested.load(Ordering::SeqCst) {
            bail!("ingestion cancelled by shutdown request");
        }
        Ok(())
    }

    /// Run one full ingestion cycle. Rejected with an error if a cycle is
    /// already in flight.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        if self
            .phase
            .compare_exchange(
                Phase::Idle as u8,
                Phase::Fetching as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            bail!("ingestion cycle already in progress; trigger rejected");
        }

        let result = self.cycle().await;

        if self.cancel_requested.load(Ordering::SeqCst) {
            self.set_phase(Phase::Cancelled);
        } else {
            self.set_phase(Phase::Idle);
        }
        result
    }

    async fn cycle(&self) -> Result<CycleReport> {
        // Fetching
        let mut documents = Vec::new();
        let mut skipped = 0usize;

        for connector in &self.connectors {
            match connector.fetch_all().await {
                Ok(docs) => {
                    for doc in docs {
                        // Character count, so multibyte scripts measure the
                        // same as ASCII.
                        if doc.text.trim().chars().count() < self.config.min_content_length {
                            skipped += 1;
                            continue;
                        }
                        documents.push((connector.name().to_string(), doc));
                    }
                }
                Err(e) => {
                    tracing::warn!(connector = connector.name(), error = %e, "connector fetch failed; skipping source");
                }
            }
        }

        let fetched = documents.len();
        tracing::info!(fetched, skipped, "fetch phase complete");
        if documents.is_empty() {
            bail!("no documents fetched from any connector; keeping previous generation");
        }

        self.ensure_not_cancelled()?;
        self.set_phase(Phase::Embedding);

        // Chunk every document into children under a fresh parent id.
        let mut builder = GenerationBuilder::new();
        let mut child_texts: Vec<String> = Vec::new();
        let mut child_metas: Vec<ChildMetadata> = Vec::new();

        for (i, (source, doc)) in documents.iter().enumerate() {
            let parent_id = format!("parent_{i}");
            let full_text = format!("[{}]\n{}", doc.title, doc.text);
            builder.add_parent(&parent_id, &full_text);

            for chunk in split_document(&full_text, &self.chunking) {
                child_texts.push(chunk);
                child_metas.push(ChildMetadata {
                    source: source.clone(),
                    title: doc.title.clone(),
                    parent_id: parent_id.clone(),
                });
            }
        }

        // Embed in bounded batches; a failed batch is dropped, not
        // retried inline.
        let mut failed_batches = 0usize;
        let mut start = 0usize;
        while start < child_texts.len() {
            self.ensure_not_cancelled()?;
            let end = (start + self.config.batch_size).min(child_texts.len());
            let batch = &child_texts[start..end];

            match self.embedder.embed(batch).await {
                Ok(embeddings) => {
                    builder.add_children(
                        batch.to_vec(),
                        embeddings,
                        child_metas[start..end].to_vec(),
                    );
                }
                Err(e) => {
                    failed_batches += 1;
                    tracing::error!(
                        batch_start = start,
                        batch_len = batch.len(),
                        error = %e,
                        "embedding batch failed; dropping batch until next run"
                    );
                }
            }
            start = end;
        }

        self.ensure_not_cancelled()?;

        // Swapping — the previous generation stays queryable until the
        // new one is installed in a single step.
        self.set_phase(Phase::Swapping);
        let report = CycleReport {
            fetched,
            skipped,
            parents: builder.parent_count(),
            children: builder.child_count(),
            failed_batches,
        };
        self.store.install(builder).await?;
        self.keyword.rebuild_from(&self.store.snapshot());

        Ok(report)
    }

    async fn cycle_and_log(&self) {
        match self.run_cycle().await {
            Ok(report) => {
                tracing::info!(
                    parents = report.parents,
                    children = report.children,
                    skipped = report.skipped,
                    failed_batches = report.failed_batches,
                    "ingestion cycle complete"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "ingestion cycle aborted; previous generation untouched");
            }
        }
    }

    /// Scheduler loop: one cycle shortly after startup, then periodic
    /// refreshes, with manual triggers in between. Runs until shutdown.
    async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
        mut trigger: mpsc::Receiver<()>,
    ) {
        let startup_delay = Duration::from_secs(self.config.startup_delay_seconds);
        tokio::select! {
            _ = tokio::time::sleep(startup_delay) => {}
            _ = shutdown.changed() => {
                tracing::info!("ingestion pipeline stopped before first cycle");
                return;
            }
        }

        self.cycle_and_log().await;

        let period = Duration::from_secs(self.config.interval_seconds);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.cycle_and_log().await,
                Some(()) = trigger.recv() => {
                    tracing::info!("manual refresh triggered");
                    self.cycle_and_log().await;
                }
                _ = shutdown.changed() => break,
            }
            if self.cancel_requested.load(Ordering::SeqCst) {
                break;
            }
        }
        tracing::info!("ingestion pipeline stopped");
    }
}

/// Control handle for a spawned pipeline.
pub struct PipelineHandle {
    pipeline: Arc<IngestionPipeline>,
    trigger: mpsc::Sender<()>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    /// Request an immediate refresh. A trigger while a cycle is already
    /// running is rejected and logged, never queued behind it.
    pub fn trigger_refresh(&self) -> bool {
        if self.pipeline.phase() != Phase::Idle {
            tracing::warn!("ingestion cycle already in progress; refresh trigger rejected");
            return false;
        }
        self.trigger.try_send(()).is_ok()
    }

    /// Signal shutdown. A running cycle stops at its next phase boundary.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the scheduler task to finish.
    pub async fn wait(self) {
        let _ = self.task.await;
    }
}

/// Spawn the pipeline scheduler onto the current runtime.
pub fn spawn(pipeline: Arc<IngestionPipeline>) -> PipelineHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (trigger_tx, trigger_rx) = mpsc::channel(1);

    // Relay the shutdown signal into the cooperative cancel flag so a
    // running cycle sees it between phases.
    let relay_pipeline = pipeline.clone();
    let mut relay_rx = shutdown_rx.clone();
    tokio::spawn(async move {
        if relay_rx.changed().await.is_ok() {
            relay_pipeline.request_cancel();
        }
    });

    let task = tokio::spawn(pipeline.clone().run(shutdown_rx, trigger_rx));

    PipelineHandle {
        pipeline,
        trigger: trigger_tx,
        shutdown: shutdown_tx,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::SourceDocument;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct StaticConnector {
        docs: Vec<SourceDocument>,
    }

    #[async_trait]
    impl Connector for StaticConnector {
        fn name(&self) -> &str {
            "wiki"
        }

        async fn fetch_all(&self) -> Result<Vec<SourceDocument>> {
            Ok(self.docs.clone())
        }
    }

    struct BrokenConnector;

    #[async_trait]
    impl Connector for BrokenConnector {
        fn name(&self) -> &str {
            "broken"
        }

        async fn fetch_all(&self) -> Result<Vec<SourceDocument>> {
            anyhow::bail!("connector unavailable")
        }
    }

    /// Deterministic stand-in embedder: a tiny bag-of-letters vector.
    struct HashEmbedder;

    #[async_trait]
    impl Embedder for HashEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = [0.0f32; 4];
                    for (i, b) in t.bytes().enumerate() {
                        v[i % 4] += b as f32 / 255.0;
                    }
                    v.to_vec()
                })
                .collect())
        }

        fn dims(&self) -> usize {
            4
        }
    }

    /// Fails for any batch containing the marker text.
    struct FlakyEmbedder;

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("poison")) {
                anyhow::bail!("capability failure");
            }
            HashEmbedder.embed(texts).await
        }

        fn dims(&self) -> usize {
            4
        }
    }

    fn doc(id: &str, title: &str, text: &str) -> SourceDocument {
        SourceDocument {
            id: id.to_string(),
            title: title.to_string(),
            text: text.to_string(),
        }
    }

    async fn open_store(dir: &TempDir) -> Arc<IndexStore> {
        let pool = db::connect(&dir.path().join("index.sqlite")).await.unwrap();
        Arc::new(IndexStore::open(pool).await.unwrap())
    }

    fn pipeline(
        connectors: Vec<Arc<dyn Connector>>,
        embedder: Arc<dyn Embedder>,
        store: Arc<IndexStore>,
        batch_size: usize,
    ) -> IngestionPipeline {
        IngestionPipeline::new(
            connectors,
            embedder,
            store,
            Arc::new(KeywordIndex::new(true)),
            ChunkingConfig::default(),
            IngestionConfig {
                batch_size,
                ..IngestionConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_full_cycle_builds_generation() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let connector = Arc::new(StaticConnector {
            docs: vec![
                doc("wiki:pricing", "Pricing", "Basic plan costs 10 per month"),
                doc("wiki:refunds", "Refunds", "Refund policy: 30 days"),
                doc("wiki:noise", "Noise", "hi"),
            ],
        });
        let p = pipeline(vec![connector], Arc::new(HashEmbedder), store.clone(), 50);

        let report = p.run_cycle().await.unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.parents, 2);
        assert_eq!(report.children, 2);
        assert_eq!(report.failed_batches, 0);
        assert_eq!(p.phase(), Phase::Idle);

        // Parents carry the bracketed-title format.
        assert_eq!(
            store.get_parent("parent_0").as_deref(),
            Some("[Pricing]\nBasic plan costs 10 per month")
        );
        let snapshot = store.snapshot();
        for child in snapshot.children() {
            assert!(snapshot.get_parent(&child.metadata.parent_id).is_some());
            assert_eq!(child.metadata.source, "wiki");
        }
    }

    #[tokio::test]
    async fn test_broken_connector_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let connectors: Vec<Arc<dyn Connector>> = vec![
            Arc::new(BrokenConnector),
            Arc::new(StaticConnector {
                docs: vec![doc("wiki:a", "A", "A page with enough content to index")],
            }),
        ];
        let p = pipeline(connectors, Arc::new(HashEmbedder), store, 50);

        let report = p.run_cycle().await.unwrap();
        assert_eq!(report.parents, 1);
    }

    #[tokio::test]
    async fn test_failed_batch_dropped_cycle_completes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let connector = Arc::new(StaticConnector {
            docs: vec![
                doc("wiki:good", "Good", "A perfectly indexable page of content"),
                doc("wiki:bad", "Bad", "This one contains poison for the embedder"),
            ],
        });
        // Batch size 1 so only the poisoned child's batch fails.
        let p = pipeline(vec![connector], Arc::new(FlakyEmbedder), store.clone(), 1);

        let report = p.run_cycle().await.unwrap();
        assert_eq!(report.parents, 2);
        assert_eq!(report.children, 1);
        assert_eq!(report.failed_batches, 1);
        // The poisoned parent still exists; it just has no children until
        // the next run.
        assert!(store.get_parent("parent_1").is_some());
    }

    #[tokio::test]
    async fn test_empty_fetch_keeps_previous_generation() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let seeded = Arc::new(StaticConnector {
            docs: vec![doc("wiki:a", "A", "The one and only knowledge page")],
        });
        let p = pipeline(vec![seeded], Arc::new(HashEmbedder), store.clone(), 50);
        p.run_cycle().await.unwrap();
        assert_eq!(store.parent_count(), 1);

        let empty = Arc::new(StaticConnector { docs: vec![] });
        let p = pipeline(vec![empty], Arc::new(HashEmbedder), store.clone(), 50);
        assert!(p.run_cycle().await.is_err());
        // Stale beats gone.
        assert_eq!(store.parent_count(), 1);
        assert_eq!(p.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_trigger_while_running_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        struct SlowEmbedder;

        #[async_trait]
        impl Embedder for SlowEmbedder {
            async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                HashEmbedder.embed(texts).await
            }

            fn dims(&self) -> usize {
                4
            }
        }

        let connector = Arc::new(StaticConnector {
            docs: vec![doc("wiki:a", "A", "Some page content that is long enough")],
        });
        let p = Arc::new(pipeline(
            vec![connector],
            Arc::new(SlowEmbedder),
            store,
            50,
        ));

        let background = {
            let p = p.clone();
            tokio::spawn(async move { p.run_cycle().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(p.phase(), Phase::Embedding);
        assert!(p.run_cycle().await.is_err(), "concurrent trigger must be rejected");

        background.await.unwrap().unwrap();
        assert_eq!(p.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_refresh_during_cycle_rejected_not_queued() {
        use std::sync::atomic::AtomicUsize;

        struct CountingConnector {
            fetches: AtomicUsize,
        }

        #[async_trait]
        impl Connector for CountingConnector {
            fn name(&self) -> &str {
                "wiki"
            }

            async fn fetch_all(&self) -> Result<Vec<SourceDocument>> {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                Ok(vec![doc("wiki:a", "A", "Page content long enough to index")])
            }
        }

        struct SlowEmbedder;

        #[async_trait]
        impl Embedder for SlowEmbedder {
            async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                HashEmbedder.embed(texts).await
            }

            fn dims(&self) -> usize {
                4
            }
        }

        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let connector = Arc::new(CountingConnector {
            fetches: AtomicUsize::new(0),
        });
        let p = Arc::new(IngestionPipeline::new(
            vec![connector.clone()],
            Arc::new(SlowEmbedder),
            store,
            Arc::new(KeywordIndex::new(true)),
            ChunkingConfig::default(),
            IngestionConfig {
                startup_delay_seconds: 0,
                ..IngestionConfig::default()
            },
        ));
        let handle = spawn(p.clone());

        // First cycle starts immediately; catch it mid-embedding.
        tokio::time::timeout(Duration::from_secs(2), async {
            while p.phase() != Phase::Embedding {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("cycle never reached the embedding phase");

        assert!(
            !handle.trigger_refresh(),
            "trigger during a running cycle must be rejected"
        );

        tokio::time::timeout(Duration::from_secs(2), async {
            while p.phase() != Phase::Idle {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("cycle never finished");

        // A rejected trigger is dropped, not queued: no second cycle runs.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(connector.fetches.load(Ordering::SeqCst), 1);

        // Once idle, a trigger is accepted and runs a cycle.
        assert!(handle.trigger_refresh());
        tokio::time::timeout(Duration::from_secs(2), async {
            while connector.fetches.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("accepted trigger never ran");

        handle.shutdown();
        handle.wait().await;
    }

    #[tokio::test]
    async fn test_cancel_before_swap_leaves_old_generation() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let connector = Arc::new(StaticConnector {
            docs: vec![doc("wiki:a", "A", "Initial page content for generation one")],
        });
        let p = pipeline(vec![connector.clone()], Arc::new(HashEmbedder), store.clone(), 50);
        p.run_cycle().await.unwrap();

        let p = pipeline(vec![connector], Arc::new(HashEmbedder), store.clone(), 50);
        p.request_cancel();
        assert!(p.run_cycle().await.is_err());
        assert_eq!(p.phase(), Phase::Cancelled);
        assert_eq!(store.parent_count(), 1);
    }

    #[tokio::test]
    async fn test_spawned_pipeline_shuts_down() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let connector = Arc::new(StaticConnector {
            docs: vec![doc("wiki:a", "A", "Page content for the spawned pipeline")],
        });
        let p = Arc::new(IngestionPipeline::new(
            vec![connector],
            Arc::new(HashEmbedder),
            store,
            Arc::new(KeywordIndex::new(true)),
            ChunkingConfig::default(),
            IngestionConfig {
                startup_delay_seconds: 3600, // never fires in this test
                ..IngestionConfig::default()
            },
        ));

        let handle = spawn(p);
        handle.shutdown();
        // Must return promptly rather than waiting out the startup delay.
        tokio::time::timeout(Duration::from_secs(2), handle.wait())
            .await
            .expect("pipeline did not stop on shutdown");
    }
}
