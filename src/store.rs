//! Parent-child index store with atomically swapped generations.
//!
//! The store owns the durable unit of retrieval context: a parent table
//! (parent_id → full text) plus the embedded child chunks derived from it.
//! One complete version of both is a *generation*. Readers always work
//! against an immutable [`Generation`] snapshot; a rebuild assembles the
//! next generation off to the side with a [`GenerationBuilder`] and
//! publishes it with a single pointer swap, so a concurrent query sees
//! either the entire old generation or the entire new one, never a mix.
//!
//! Both tables are persisted to SQLite in one transaction at swap time and
//! loaded back on startup, so the parent table survives process restarts.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::models::{ChildMatch, ChildMetadata, IndexedChild};

/// One complete, immutable version of the parent table + child index.
pub struct Generation {
    parents: HashMap<String, String>,
    children: Vec<IndexedChild>,
}

impl Generation {
    fn empty() -> Self {
        Self {
            parents: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn get_parent(&self, parent_id: &str) -> Option<&str> {
        self.parents.get(parent_id).map(|s| s.as_str())
    }

    pub fn children(&self) -> &[IndexedChild] {
        &self.children
    }

    /// Nearest child chunks by cosine distance, ascending. Returns fewer
    /// than `k` when the generation holds fewer children, and nothing at
    /// all when it is empty. A dimensionality mismatch against a
    /// non-empty index is a caller precondition violation.
    pub fn query(&self, embedding: &[f32], k: usize) -> Vec<ChildMatch> {
        if self.children.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<ChildMatch> = self
            .children
            .iter()
            .map(|child| ChildMatch {
                text: child.text.clone(),
                distance: cosine_distance(embedding, &child.embedding),
                metadata: child.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);
        matches
    }
}

/// Accumulates the next generation before it is published.
#[derive(Default)]
pub struct GenerationBuilder {
    parents: HashMap<String, String>,
    children: Vec<IndexedChild>,
}

impl GenerationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parent(&mut self, parent_id: &str, full_text: &str) {
        self.parents
            .insert(parent_id.to_string(), full_text.to_string());
    }

    /// Bulk-insert child chunks. All three slices must line up; a length
    /// mismatch is a caller precondition violation.
    pub fn add_children(
        &mut self,
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Vec<ChildMetadata>,
    ) {
        assert_eq!(texts.len(), embeddings.len(), "texts/embeddings mismatch");
        assert_eq!(texts.len(), metadatas.len(), "texts/metadatas mismatch");

        for ((text, embedding), metadata) in
            texts.into_iter().zip(embeddings).zip(metadatas)
        {
            self.children.push(IndexedChild {
                id: Uuid::new_v4().to_string(),
                text,
                embedding,
                metadata,
            });
        }
    }

    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    fn build(self) -> Generation {
        Generation {
            parents: self.parents,
            children: self.children,
        }
    }
}

/// Shared store holding the current generation behind a single pointer.
pub struct IndexStore {
    pool: SqlitePool,
    current: RwLock<Arc<Generation>>,
}

impl IndexStore {
    /// Run migrations and load the persisted generation, if any.
    pub async fn open(pool: SqlitePool) -> Result<Self> {
        migrate(&pool).await?;
        let generation = load_generation(&pool).await?;
        tracing::info!(
            parents = generation.parent_count(),
            children = generation.child_count(),
            "opened index store"
        );
        Ok(Self {
            pool,
            current: RwLock::new(Arc::new(generation)),
        })
    }

    /// The current generation. Holders keep reading a consistent view
    /// even while a newer generation is installed underneath them.
    pub fn snapshot(&self) -> Arc<Generation> {
        self.current.read().unwrap().clone()
    }

    pub fn query(&self, embedding: &[f32], k: usize) -> Vec<ChildMatch> {
        self.snapshot().query(embedding, k)
    }

    pub fn get_parent(&self, parent_id: &str) -> Option<String> {
        self.snapshot().get_parent(parent_id).map(|s| s.to_string())
    }

    pub fn parent_count(&self) -> usize {
        self.snapshot().parent_count()
    }

    pub fn child_count(&self) -> usize {
        self.snapshot().child_count()
    }

    /// Persist and publish a new generation. The previous generation stays
    /// fully queryable until the pointer swap; the swap itself replaces
    /// parent table and child index together, never field-by-field.
    pub async fn install(&self, builder: GenerationBuilder) -> Result<()> {
        let generation = builder.build();
        persist_generation(&self.pool, &generation).await?;

        let generation = Arc::new(generation);
        *self.current.write().unwrap() = generation.clone();
        tracing::info!(
            parents = generation.parent_count(),
            children = generation.child_count(),
            "installed new index generation"
        );
        Ok(())
    }

    /// Discard all parents and children by installing an empty generation.
    pub async fn reset(&self) -> Result<()> {
        self.install(GenerationBuilder::new()).await
    }
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parents (
            parent_id TEXT PRIMARY KEY,
            full_text TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS children (
            id TEXT PRIMARY KEY,
            parent_id TEXT NOT NULL,
            text TEXT NOT NULL,
            source TEXT NOT NULL,
            title TEXT NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (parent_id) REFERENCES parents(parent_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_children_parent_id ON children(parent_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Replace both tables in one transaction so a crash mid-rebuild leaves
/// either the old generation or the new one on disk, never a mix.
async fn persist_generation(pool: &SqlitePool, generation: &Generation) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM children").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM parents").execute(&mut *tx).await?;

    for (parent_id, full_text) in &generation.parents {
        sqlx::query("INSERT INTO parents (parent_id, full_text) VALUES (?, ?)")
            .bind(parent_id)
            .bind(full_text)
            .execute(&mut *tx)
            .await?;
    }

    for child in &generation.children {
        sqlx::query(
            "INSERT INTO children (id, parent_id, text, source, title, embedding) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&child.id)
        .bind(&child.metadata.parent_id)
        .bind(&child.text)
        .bind(&child.metadata.source)
        .bind(&child.metadata.title)
        .bind(vec_to_blob(&child.embedding))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn load_generation(pool: &SqlitePool) -> Result<Generation> {
    let mut generation = Generation::empty();

    let parent_rows = sqlx::query("SELECT parent_id, full_text FROM parents")
        .fetch_all(pool)
        .await?;
    for row in &parent_rows {
        generation
            .parents
            .insert(row.get("parent_id"), row.get("full_text"));
    }

    let child_rows =
        sqlx::query("SELECT id, parent_id, text, source, title, embedding FROM children")
            .fetch_all(pool)
            .await?;
    for row in &child_rows {
        let blob: Vec<u8> = row.get("embedding");
        generation.children.push(IndexedChild {
            id: row.get("id"),
            text: row.get("text"),
            embedding: blob_to_vec(&blob),
            metadata: ChildMetadata {
                source: row.get("source"),
                title: row.get("title"),
                parent_id: row.get("parent_id"),
            },
        });
    }

    Ok(generation)
}
