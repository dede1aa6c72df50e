use async_trait::async_trait;

use crate::domain::entities::point::{Embeddings, Point, RecordId, SimilarPoint};
use crate::helper::error_chain_fmt;

/// A named, independently dimensioned vector collection.
///
/// Each logical resource type owns exactly one collection, provisioned on
/// first use with its vector size and the payload indexes needed for equality
/// filtering.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub name: String,
    pub vector_size: u64,
    pub payload_indexes: Vec<PayloadIndex>,
}

impl CollectionSpec {
    pub fn new(name: impl Into<String>, vector_size: u64) -> Self {
        Self {
            name: name.into(),
            vector_size,
            payload_indexes: vec![],
        }
    }

    pub fn with_index(mut self, field: impl Into<String>, kind: PayloadIndexKind) -> Self {
        self.payload_indexes.push(PayloadIndex {
            field: field.into(),
            kind,
        });
        self
    }
}

/// A secondary index over one payload field, enabling equality filters
#[derive(Debug, Clone)]
pub struct PayloadIndex {
    pub field: String,
    pub kind: PayloadIndexKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadIndexKind {
    Integer,
    Keyword,
}

/// Value matched by an equality condition over a payload field
#[derive(Debug, Clone, PartialEq)]
pub enum MatchValue {
    Integer(i64),
    Keyword(String),
}

impl From<i64> for MatchValue {
    fn from(n: i64) -> Self {
        MatchValue::Integer(n)
    }
}

impl From<&str> for MatchValue {
    fn from(s: &str) -> Self {
        MatchValue::Keyword(s.to_string())
    }
}

impl From<String> for MatchValue {
    fn from(s: String) -> Self {
        MatchValue::Keyword(s)
    }
}

/// Conjunction of equality conditions over payload fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EqualityFilter {
    pub conditions: Vec<(String, MatchValue)>,
}

impl EqualityFilter {
    pub fn must(field: impl Into<String>, value: impl Into<MatchValue>) -> Self {
        Self {
            conditions: vec![(field.into(), value.into())],
        }
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<MatchValue>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }
}

/// Safe primitive operations over named vector collections.
///
/// Network and storage errors propagate unchanged: there is no retry at this
/// layer, and existence checks are the calling repository's responsibility.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotent create-if-absent of a collection and its payload indexes.
    /// Racing callers all succeed: "already exists" is not an error.
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), VectorIndexError>;

    /// Overwrite-semantics write, acknowledged only after the store reports
    /// durability so an immediately following read observes it
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), VectorIndexError>;

    /// Exact lookup by id, vectors included; missing ids are simply absent
    /// from the result, never an error
    async fn retrieve(
        &self,
        collection: &str,
        ids: &[RecordId],
    ) -> Result<Vec<Point>, VectorIndexError>;

    /// Bounded scan, optionally restricted by an equality filter. No ordering
    /// guarantee beyond iteration. Vectors are omitted.
    async fn scroll(
        &self,
        collection: &str,
        filter: Option<EqualityFilter>,
        limit: u32,
    ) -> Result<Vec<Point>, VectorIndexError>;

    /// k-nearest-neighbor similarity search under the collection's metric
    async fn search(
        &self,
        collection: &str,
        query_vector: Embeddings,
        limit: u64,
    ) -> Result<Vec<SimilarPoint>, VectorIndexError>;

    /// Idempotent delete; unknown ids are a no-op
    async fn delete(&self, collection: &str, ids: &[RecordId]) -> Result<(), VectorIndexError>;
}

#[derive(thiserror::Error)]
pub enum VectorIndexError {
    #[error("Error from the vector store: {0}")]
    Store(String),
    #[error("Invalid configuration for collection '{collection}': {details}")]
    Configuration { collection: String, details: String },
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl std::fmt::Debug for VectorIndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
