use std::sync::Arc;

use crate::configuration::Settings;
use crate::domain::entities::record::SemanticField;
use crate::domain::services::gemini::GeminiClient;
use crate::domain::services::providers::{EmbeddingProvider, GenerationProvider};
use crate::domain::services::rag::RagQueryService;
use crate::helper::error_chain_fmt;
use crate::repositories::qdrant_vector_index::QdrantVectorIndex;
use crate::repositories::query_log_repository::QueryLogRepository;
use crate::repositories::record_repository::{RecordRepository, OWNER_ID_KEY};
use crate::repositories::user_repository::UserRepository;
use crate::repositories::vector_index::{
    CollectionSpec, PayloadIndexKind, VectorIndex, VectorIndexError,
};

/// Placeholder-vector dimension of the users collection; users are never
/// searched by similarity
const USERS_VECTOR_SIZE: u64 = 4;

/// Every repository and service, wired once from settings.
///
/// Each resource type gets its own [`RecordRepository`] instance over its own
/// collection; they all share the same Qdrant client and Gemini client.
pub struct Application {
    pub knowledge: RecordRepository,
    pub goals: RecordRepository,
    pub blogs: RecordRepository,
    pub projects: RecordRepository,
    pub expenses: RecordRepository,
    pub quicklinks: RecordRepository,
    pub library: RecordRepository,
    pub contacts: RecordRepository,
    pub skills: RecordRepository,
    pub about: RecordRepository,
    pub code_logs: RecordRepository,
    pub query_log: Arc<QueryLogRepository>,
    pub users: UserRepository,
    pub rag: RagQueryService,
}

impl Application {
    pub fn build(settings: Settings) -> Result<Self, ApplicationBuildError> {
        let index: Arc<dyn VectorIndex> =
            Arc::new(QdrantVectorIndex::try_from_settings(&settings.qdrant)?);

        let gemini = Arc::new(GeminiClient::new(settings.gemini));
        let embedder: Arc<dyn EmbeddingProvider> = gemini.clone();
        let generator: Arc<dyn GenerationProvider> = gemini;

        let vector_size = settings.qdrant.collection_vector_size;
        let owned_spec = |name: &str| {
            CollectionSpec::new(name, vector_size)
                .with_index(OWNER_ID_KEY, PayloadIndexKind::Integer)
        };
        let repository = |name: &str, field: SemanticField| {
            RecordRepository::new(
                index.clone(),
                embedder.clone(),
                owned_spec(name),
                field,
            )
        };

        let query_log = Arc::new(QueryLogRepository::new(
            index.clone(),
            CollectionSpec::new(&settings.qdrant.queries_collection, vector_size),
        ));

        let users = UserRepository::new(
            index.clone(),
            CollectionSpec::new(&settings.qdrant.users_collection, USERS_VECTOR_SIZE)
                .with_index("email", PayloadIndexKind::Keyword)
                .with_index("apiKey", PayloadIndexKind::Keyword),
        );

        let rag = RagQueryService::new(
            embedder.clone(),
            generator,
            index.clone(),
            query_log.clone(),
            settings.qdrant.knowledge_collection.clone(),
        );

        Ok(Self {
            knowledge: repository(&settings.qdrant.knowledge_collection, SemanticField::Content),
            goals: repository("goals", SemanticField::Title),
            blogs: repository("blogs", SemanticField::Content),
            projects: repository("projects", SemanticField::Description)
                .with_view_tracking(),
            expenses: repository("expenses", SemanticField::Description),
            quicklinks: repository("quicklinks", SemanticField::Title),
            library: repository("library", SemanticField::Title),
            contacts: repository("contact", SemanticField::Message),
            skills: repository("skills", SemanticField::Skills),
            about: repository("about", SemanticField::Description),
            code_logs: repository("code_logs", SemanticField::Code),
            query_log,
            users,
            rag,
        })
    }
}

#[derive(thiserror::Error)]
pub enum ApplicationBuildError {
    #[error(transparent)]
    Index(#[from] VectorIndexError),
}

impl std::fmt::Debug for ApplicationBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
