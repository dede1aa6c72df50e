use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::domain::entities::point::{RecordId, SimilarPoint};
use crate::domain::services::providers::{
    EmbeddingError, EmbeddingProvider, GenerationError, GenerationProvider,
};
use crate::helper::error_chain_fmt;
use crate::repositories::query_log_repository::QueryLogRepository;
use crate::repositories::vector_index::{VectorIndex, VectorIndexError};

/// How many similar records are pulled in as context for each answer
const SEARCH_LIMIT: u64 = 3;

const PREVIEW_LENGTH: usize = 150;

/// Retrieval-augmented answering over the knowledge collection.
///
/// Pipeline: embed the query, search the knowledge collection for the
/// closest records, build a prompt carrying them as numbered context, and
/// ask the generation provider for the final answer. The raw query is
/// logged off the critical path; a failed log never fails the answer.
pub struct RagQueryService {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    index: Arc<dyn VectorIndex>,
    query_log: Arc<QueryLogRepository>,
    knowledge_collection: String,
}

/// A generated answer plus a summary of the records it leaned on
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub query: String,
    pub text: String,
    pub context_used: Vec<ContextItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextItem {
    pub id: RecordId,
    /// Similarity score rounded to 2 decimals
    pub relevance: f32,
    /// First 150 characters of the record's text
    pub preview: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RagQueryService {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        index: Arc<dyn VectorIndex>,
        query_log: Arc<QueryLogRepository>,
        knowledge_collection: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            generator,
            index,
            query_log,
            knowledge_collection: knowledge_collection.into(),
        }
    }

    #[tracing::instrument(name = "Answering query", skip(self, query))]
    pub async fn answer(&self, query: &str) -> Result<Answer, RagError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::Validation(
                "query must be a non-empty string".into(),
            ));
        }

        let embedding = self.embedder.embed(query).await?;

        // Audit logging must not delay or fail the answer
        let log = self.query_log.clone();
        let logged_query = query.to_string();
        let logged_embedding = embedding.clone();
        tokio::spawn(async move {
            if let Err(e) = log.log(&logged_query, logged_embedding).await {
                error!(error = ?e, "Failed to log user query");
            }
        });

        let similar = self
            .index
            .search(&self.knowledge_collection, embedding, SEARCH_LIMIT)
            .await?;
        info!(
            documents_found = similar.len(),
            "Retrieved context, generating response"
        );

        let prompt = build_prompt(query, &similar);
        let text = self.generator.generate(&prompt).await?;

        Ok(Answer {
            query: query.to_string(),
            text,
            context_used: similar.iter().map(context_item).collect(),
        })
    }
}

fn build_prompt(query: &str, context: &[SimilarPoint]) -> String {
    let mut prompt = format!(
        "You are a helpful personal AI assistant with access to the user's \
         personal data collection.\n\
         Answer the user's question directly and naturally, without prefacing \
         with phrases like \"Based on your provided data\" or \"Thank you for \
         asking\".\n\
         Do not add unnecessary disclaimers.\n\
         If relevant context is provided, weave it naturally into the answer.\n\
         If no context is relevant, give a general helpful response.\n\n\
         User Question: {}",
        query
    );

    if context.is_empty() {
        prompt.push_str(
            "\n\nNo relevant context found in personal data. Please provide a \
             general helpful response.",
        );
        return prompt;
    }

    prompt.push_str("\n\nRelevant Context from Personal Data:\n");
    for (i, item) in context.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {} (Relevance: {:.1}%)\n",
            i + 1,
            semantic_text(item),
            item.score * 100.0,
        ));
    }
    prompt.push_str(
        "\nPlease provide a helpful response based on the context above. If \
         the context doesn't contain relevant information, let the user know \
         and provide a general helpful response.",
    );

    prompt
}

/// Records across collections keep their searchable text under different keys
fn semantic_text(point: &SimilarPoint) -> &str {
    ["content", "title", "description"]
        .iter()
        .find_map(|key| point.payload.get(*key).and_then(|v| v.as_str()))
        .unwrap_or_default()
}

fn context_item(point: &SimilarPoint) -> ContextItem {
    let text = semantic_text(point);
    let preview = if text.chars().count() > PREVIEW_LENGTH {
        format!("{}...", text.chars().take(PREVIEW_LENGTH).collect::<String>())
    } else {
        text.to_string()
    };

    ContextItem {
        id: point.id.normalize(),
        relevance: (point.score * 100.0).round() / 100.0,
        preview,
        timestamp: point
            .payload
            .get("timestamp")
            .and_then(|v| v.as_str())
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

#[derive(thiserror::Error)]
pub enum RagError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Index(#[from] VectorIndexError),
}

impl std::fmt::Debug for RagError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
