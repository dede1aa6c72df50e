use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Embeddings = Vec<f32>;

/// Identifier of a point within a collection.
///
/// Generated ids are 64-bit integers, but they come back from URL path
/// parameters as strings. [`RecordId::normalize`] folds a numeric string back
/// into its integer form so both representations compare equal everywhere ids
/// are looked up. Non-numeric strings pass through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl RecordId {
    pub fn normalize(&self) -> RecordId {
        match self {
            RecordId::Str(raw) => match raw.parse::<i64>() {
                Ok(n) => RecordId::Int(n),
                Err(_) => RecordId::Str(raw.clone()),
            },
            RecordId::Int(n) => RecordId::Int(*n),
        }
    }

    /// The integer form of this id, if it has one after normalization.
    pub fn as_int(&self) -> Option<i64> {
        match self.normalize() {
            RecordId::Int(n) => Some(n),
            RecordId::Str(_) => None,
        }
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Int(n)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Str(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId::Str(s)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Int(n) => n.fmt(f),
            RecordId::Str(s) => s.fmt(f),
        }
    }
}

/// The atomic unit stored in a vector collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    pub id: RecordId,
    pub vector: Embeddings,
    pub payload: Map<String, Value>,
}

/// A similarity search hit: raw cosine similarity, higher is more similar
#[derive(Debug, Clone)]
pub struct SimilarPoint {
    pub id: RecordId,
    pub score: f32,
    pub payload: Map<String, Value>,
}
