use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;

use crate::domain::entities::point::{Embeddings, Point, RecordId};
use crate::domain::services::id_generator::generate_id;
use crate::helper::error_chain_fmt;
use crate::repositories::vector_index::{CollectionSpec, VectorIndex, VectorIndexError};

const SCROLL_LIMIT: u32 = 100;

/// Audit log of raw user queries, kept in its own collection keyed by the
/// query's own embedding.
///
/// Writes here are best-effort from the caller's point of view: the RAG
/// pipeline spawns them off its critical path.
pub struct QueryLogRepository {
    index: Arc<dyn VectorIndex>,
    spec: CollectionSpec,
}

/// A logged query as returned by `list`
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoggedQuery {
    pub id: RecordId,
    pub query: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl QueryLogRepository {
    pub fn new(index: Arc<dyn VectorIndex>, spec: CollectionSpec) -> Self {
        Self { index, spec }
    }

    #[tracing::instrument(name = "Logging user query", skip(self, query, embedding))]
    pub async fn log(
        &self,
        query: &str,
        embedding: Embeddings,
    ) -> Result<RecordId, QueryLogRepositoryError> {
        self.index.ensure_collection(&self.spec).await?;

        let id = RecordId::Int(generate_id());
        let point = Point {
            id: id.clone(),
            vector: embedding,
            payload: json!({
                "query": query,
                "timestamp": Utc::now().to_rfc3339(),
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        };

        self.index.upsert(&self.spec.name, vec![point]).await?;
        info!(%id, "Logged user query");

        Ok(id)
    }

    #[tracing::instrument(name = "Listing user queries", skip(self))]
    pub async fn list(&self) -> Result<Vec<LoggedQuery>, QueryLogRepositoryError> {
        self.index.ensure_collection(&self.spec).await?;

        let points = self.index.scroll(&self.spec.name, None, SCROLL_LIMIT).await?;

        Ok(points
            .into_iter()
            .map(|point| {
                let query = point
                    .payload
                    .get("query")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let timestamp = point
                    .payload
                    .get("timestamp")
                    .and_then(|v| v.as_str())
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map(|dt| dt.with_timezone(&Utc));
                LoggedQuery {
                    id: point.id.normalize(),
                    query,
                    timestamp,
                }
            })
            .collect())
    }

    /// Idempotent: deleting an id that was never logged is a no-op
    #[tracing::instrument(name = "Deleting user query", skip(self))]
    pub async fn delete(&self, id: &RecordId) -> Result<(), QueryLogRepositoryError> {
        self.index.ensure_collection(&self.spec).await?;
        self.index
            .delete(&self.spec.name, &[id.normalize()])
            .await?;
        Ok(())
    }
}

#[derive(thiserror::Error)]
pub enum QueryLogRepositoryError {
    #[error(transparent)]
    Index(#[from] VectorIndexError),
}

impl std::fmt::Debug for QueryLogRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
