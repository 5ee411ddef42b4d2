//! In-memory sparse lexical index over child chunks.
//!
//! Okapi BM25 scoring (saturating term frequency weighted by inverse
//! document frequency, with length normalization) over a tokenized copy
//! of the child corpus. The index is derived state: it is rebuilt after
//! every successful ingestion and lazily on first use, and is never
//! authoritative.
//!
//! When keyword search is disabled by configuration the index runs in an
//! explicit degraded mode: [`KeywordIndex::status`] reports it, scoring
//! contributes nothing, and hybrid retrieval falls back to vector-only
//! results.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::store::Generation;

const K1: f64 = 1.5;
const B: f64 = 0.75;

/// Observable state of the keyword index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordStatus {
    /// Keyword search switched off; scoring is a no-op.
    Disabled,
    /// Enabled but holding no corpus yet.
    Empty,
    /// Ready with the given number of indexed children.
    Ready { children: usize },
}

/// A scored child, identified by its owning parent.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub parent_id: String,
    pub score: f64,
}

struct IndexedDoc {
    term_freqs: HashMap<String, usize>,
    len: usize,
    parent_id: String,
}

#[derive(Default)]
struct Bm25State {
    docs: Vec<IndexedDoc>,
    doc_freqs: HashMap<String, usize>,
    avg_len: f64,
}

pub struct KeywordIndex {
    enabled: bool,
    state: RwLock<Bm25State>,
}

/// Lowercased alphanumeric terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl KeywordIndex {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            tracing::warn!("keyword index disabled; hybrid retrieval degrades to vector-only");
        }
        Self {
            enabled,
            state: RwLock::new(Bm25State::default()),
        }
    }

    pub fn status(&self) -> KeywordStatus {
        if !self.enabled {
            return KeywordStatus::Disabled;
        }
        let state = self.state.read().unwrap();
        if state.docs.is_empty() {
            KeywordStatus::Empty
        } else {
            KeywordStatus::Ready {
                children: state.docs.len(),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().unwrap().docs.is_empty()
    }

    /// Rebuild from `(child_text, parent_id)` pairs, replacing the
    /// previous corpus wholesale.
    pub fn rebuild(&self, corpus: impl IntoIterator<Item = (String, String)>) {
        if !self.enabled {
            return;
        }

        let mut docs = Vec::new();
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;

        for (text, parent_id) in corpus {
            let tokens = tokenize(&text);
            let mut term_freqs: HashMap<String, usize> = HashMap::new();
            for token in &tokens {
                *term_freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in term_freqs.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            total_len += tokens.len();
            docs.push(IndexedDoc {
                term_freqs,
                len: tokens.len(),
                parent_id,
            });
        }

        let avg_len = if docs.is_empty() {
            0.0
        } else {
            total_len as f64 / docs.len() as f64
        };

        let count = docs.len();
        *self.state.write().unwrap() = Bm25State {
            docs,
            doc_freqs,
            avg_len,
        };
        tracing::info!(children = count, "rebuilt keyword index");
    }

    /// Rebuild from the child corpus of an index generation.
    pub fn rebuild_from(&self, generation: &Generation) {
        self.rebuild(
            generation
                .children()
                .iter()
                .map(|c| (c.text.clone(), c.metadata.parent_id.clone())),
        );
    }

    /// BM25 score of every indexed child against the query, in corpus
    /// order. Disabled or empty index yields nothing.
    pub fn score(&self, query: &str) -> Vec<KeywordHit> {
        if !self.enabled {
            return Vec::new();
        }

        let query_terms = tokenize(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let state = self.state.read().unwrap();
        if state.docs.is_empty() {
            return Vec::new();
        }

        let n = state.docs.len() as f64;

        state
            .docs
            .iter()
            .map(|doc| {
                let mut score = 0.0;
                for term in &query_terms {
                    let tf = *doc.term_freqs.get(term).unwrap_or(&0) as f64;
                    if tf == 0.0 {
                        continue;
                    }
                    let df = *state.doc_freqs.get(term).unwrap_or(&0) as f64;
                    let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                    let norm = K1 * (1.0 - B + B * doc.len as f64 / state.avg_len);
                    score += idf * (tf * (K1 + 1.0)) / (tf + norm);
                }
                KeywordHit {
                    parent_id: doc.parent_id.clone(),
                    score,
                }
            })
            .collect()
    }
}
