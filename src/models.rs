//! Core data types that flow through the ingestion and retrieval pipeline.

/// Raw document produced by a connector, held only for the duration of
/// one ingestion pass. Only derived chunks and the parent table persist.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Source-qualified identifier (e.g. `"wiki:pricing-faq"`).
    pub id: String,
    pub title: String,
    pub text: String,
}

/// Closed metadata record attached to every child chunk.
///
/// Replaces the free-form metadata dictionaries of loosely-typed stores:
/// malformed metadata is unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildMetadata {
    /// Origin tag (e.g. `"wiki"`, `"sheet"`, `"filesystem"`).
    pub source: String,
    pub title: String,
    /// Identifier of the owning parent within the current generation.
    pub parent_id: String,
}

/// A child chunk as stored in the index: searchable text plus its
/// fixed-length embedding and origin metadata.
#[derive(Debug, Clone)]
pub struct IndexedChild {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChildMetadata,
}

/// A child-level match returned by a vector query. Distance follows the
/// cosine-distance convention: lower is more similar.
#[derive(Debug, Clone)]
pub struct ChildMatch {
    pub text: String,
    pub distance: f32,
    pub metadata: ChildMetadata,
}
