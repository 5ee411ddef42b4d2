//! Hybrid retrieval: vector similarity merged with keyword matching at
//! the parent level.
//!
//! Child chunks are only the matching substrate; the unit of relevance
//! returned to the caller is the full parent document. Both stages are
//! fallible-but-contained: an embedding failure skips the vector stage, a
//! disabled keyword index skips the lexical stage, and a parent missing
//! from the current generation is dropped rather than raised. The public
//! contract never errors.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::keyword::KeywordIndex;
use crate::store::IndexStore;

pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<IndexStore>,
    keyword: Arc<KeywordIndex>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<IndexStore>,
        keyword: Arc<KeywordIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            keyword,
            config,
        }
    }

    /// Retrieve the most relevant parent documents for a query, best
    /// first. Returns at most `top_k * 2` parents and possibly fewer —
    /// never low-quality filler.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Vec<String> {
        // One snapshot for the whole call: vector search, keyword
        // resolution, and parent lookup all see the same generation.
        let snapshot = self.store.snapshot();

        // Discovery order is preserved for equal scores: vector-stage
        // parents are recorded first, so a stable sort keeps them ahead.
        let mut ranked: Vec<(String, f32)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        // Vector stage
        match self.embedder.embed(&[query.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => {
                let query_vector = vectors.remove(0);
                let matches = snapshot.query(&query_vector, top_k * 3);
                let mut kept = 0usize;
                for m in matches {
                    if m.distance > self.config.max_distance {
                        continue;
                    }
                    kept += 1;
                    match positions.get(&m.metadata.parent_id) {
                        Some(&i) => {
                            // A parent is represented once, under the best
                            // (lowest) distance any of its children saw.
                            if m.distance < ranked[i].1 {
                                ranked[i].1 = m.distance;
                            }
                        }
                        None => {
                            positions.insert(m.metadata.parent_id.clone(), ranked.len());
                            ranked.push((m.metadata.parent_id, m.distance));
                        }
                    }
                }
                tracing::debug!(kept, parents = ranked.len(), "vector stage complete");
            }
            Ok(_) => {
                tracing::warn!("embedding returned no vector; skipping vector stage");
            }
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed; skipping vector stage");
            }
        }

        // Keyword stage. The index is lazily rebuilt on first use.
        if self.keyword.is_empty() && !snapshot.is_empty() {
            self.keyword.rebuild_from(&snapshot);
        }
        let mut hits = self.keyword.score(query);
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k * 2);
        for hit in hits {
            if hit.score <= 0.0 {
                continue;
            }
            // A keyword-only parent enters at a fixed moderate score and
            // never displaces a vector-stage score for the same parent.
            if !positions.contains_key(&hit.parent_id) {
                positions.insert(hit.parent_id.clone(), ranked.len());
                ranked.push((hit.parent_id, self.config.keyword_score));
            }
        }

        // Merge: ascending score, stable among ties, capped at top_k * 2.
        ranked.sort_by(|a, b| {
            a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(top_k * 2);

        let mut parents = Vec::with_capacity(ranked.len());
        for (parent_id, _) in ranked {
            match snapshot.get_parent(&parent_id) {
                Some(text) => parents.push(text.to_string()),
                None => {
                    // Index inconsistency; the next rebuild self-heals.
                    tracing::warn!(parent_id, "matched parent missing from generation; dropped");
                }
            }
        }

        tracing::info!(
            parents = parents.len(),
            query = %query.chars().take(50).collect::<String>(),
            "hybrid retrieval complete"
        );
        parents
    }
}
