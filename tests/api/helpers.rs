use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::json;

use knowledge_service::domain::entities::point::{Embeddings, Point, RecordId, SimilarPoint};
use knowledge_service::domain::entities::record::{AccessContext, RecordPayload, Role, SemanticField};
use knowledge_service::domain::services::providers::{
    EmbeddingError, EmbeddingProvider, GenerationError, GenerationProvider,
};
use knowledge_service::domain::services::rag::RagQueryService;
use knowledge_service::repositories::query_log_repository::QueryLogRepository;
use knowledge_service::repositories::record_repository::{RecordRepository, OWNER_ID_KEY};
use knowledge_service::repositories::user_repository::UserRepository;
use knowledge_service::repositories::vector_index::{
    CollectionSpec, EqualityFilter, MatchValue, PayloadIndexKind, VectorIndex, VectorIndexError,
};
use knowledge_service::telemetry::{get_tracing_subscriber, init_tracing_subscriber};

// Ensures that the `tracing` stack is only initialized once
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    if std::env::var("TEST_LOG").is_ok() {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_tracing_subscriber(subscriber);
    } else {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_tracing_subscriber(subscriber);
    };
});

/// Dimension of the deterministic test embeddings
pub const TEST_VECTOR_SIZE: u64 = 8;

/// In-memory stand-in for Qdrant, good enough to exercise the repositories'
/// filtering, upsert-replace and similarity semantics end to end.
pub struct InMemoryVectorIndex {
    collections: Mutex<HashMap<String, HashMap<String, Point>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// The stored vector of a point, for asserting on embedding currency
    pub fn stored_vector(&self, collection: &str, id: &RecordId) -> Option<Embeddings> {
        let collections = self.collections.lock().unwrap();
        collections
            .get(collection)?
            .get(&id.normalize().to_string())
            .map(|point| point.vector.clone())
    }

    pub fn point_count(&self, collection: &str) -> usize {
        let collections = self.collections.lock().unwrap();
        collections.get(collection).map_or(0, HashMap::len)
    }

    pub fn collection_names(&self) -> Vec<String> {
        let collections = self.collections.lock().unwrap();
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        names
    }
}

fn matches_filter(point: &Point, filter: &EqualityFilter) -> bool {
    filter.conditions.iter().all(|(field, value)| {
        let stored = point.payload.get(field);
        match value {
            MatchValue::Integer(n) => stored.and_then(|v| v.as_i64()) == Some(*n),
            MatchValue::Keyword(s) => stored.and_then(|v| v.as_str()) == Some(s.as_str()),
        }
    })
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), VectorIndexError> {
        let mut collections = self.collections.lock().unwrap();
        collections.entry(spec.name.clone()).or_default();
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), VectorIndexError> {
        let mut collections = self.collections.lock().unwrap();
        let stored = collections.entry(collection.to_string()).or_default();
        for point in points {
            stored.insert(point.id.normalize().to_string(), point);
        }
        Ok(())
    }

    async fn retrieve(
        &self,
        collection: &str,
        ids: &[RecordId],
    ) -> Result<Vec<Point>, VectorIndexError> {
        let collections = self.collections.lock().unwrap();
        let stored = match collections.get(collection) {
            Some(stored) => stored,
            None => return Ok(vec![]),
        };
        Ok(ids
            .iter()
            .filter_map(|id| stored.get(&id.normalize().to_string()).cloned())
            .collect())
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<EqualityFilter>,
        limit: u32,
    ) -> Result<Vec<Point>, VectorIndexError> {
        let collections = self.collections.lock().unwrap();
        let stored = match collections.get(collection) {
            Some(stored) => stored,
            None => return Ok(vec![]),
        };
        Ok(stored
            .values()
            .filter(|point| filter.as_ref().map_or(true, |f| matches_filter(point, f)))
            .take(limit as usize)
            .map(|point| Point {
                id: point.id.clone(),
                vector: vec![],
                payload: point.payload.clone(),
            })
            .collect())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: Embeddings,
        limit: u64,
    ) -> Result<Vec<SimilarPoint>, VectorIndexError> {
        let collections = self.collections.lock().unwrap();
        let stored = match collections.get(collection) {
            Some(stored) => stored,
            None => return Ok(vec![]),
        };
        let mut scored: Vec<SimilarPoint> = stored
            .values()
            .map(|point| SimilarPoint {
                id: point.id.clone(),
                score: cosine_similarity(&query_vector, &point.vector),
                payload: point.payload.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit as usize);
        Ok(scored)
    }

    async fn delete(&self, collection: &str, ids: &[RecordId]) -> Result<(), VectorIndexError> {
        let mut collections = self.collections.lock().unwrap();
        if let Some(stored) = collections.get_mut(collection) {
            for id in ids {
                stored.remove(&id.normalize().to_string());
            }
        }
        Ok(())
    }
}

/// Deterministic embedder: identical text always maps to an identical vector,
/// so a record is its own nearest neighbor
pub struct StubEmbedder;

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Embeddings, EmbeddingError> {
        let mut vector = vec![0.0f32; TEST_VECTOR_SIZE as usize];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % TEST_VECTOR_SIZE as usize] += byte as f32 / 255.0;
        }
        Ok(vector)
    }
}

/// Canned generation provider, recording every prompt it was handed
pub struct StubGenerator {
    pub prompts: Mutex<Vec<String>>,
}

impl StubGenerator {
    pub fn new() -> Self {
        Self {
            prompts: Mutex::new(vec![]),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl GenerationProvider for StubGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("stub answer".to_string())
    }
}

pub struct TestApp {
    pub index: Arc<InMemoryVectorIndex>,
    pub knowledge: RecordRepository,
    pub projects: RecordRepository,
    pub contacts: RecordRepository,
    pub skills: RecordRepository,
    pub query_log: Arc<QueryLogRepository>,
    pub users: UserRepository,
    pub rag: RagQueryService,
    pub generator: Arc<StubGenerator>,
}

pub fn spawn_app() -> TestApp {
    Lazy::force(&TRACING);

    let index = Arc::new(InMemoryVectorIndex::new());
    let shared_index: Arc<dyn VectorIndex> = index.clone();
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(StubEmbedder);
    let generator = Arc::new(StubGenerator::new());

    let owned_spec = |name: &str| {
        CollectionSpec::new(name, TEST_VECTOR_SIZE)
            .with_index(OWNER_ID_KEY, PayloadIndexKind::Integer)
    };

    let knowledge = RecordRepository::new(
        shared_index.clone(),
        embedder.clone(),
        owned_spec("personal_data"),
        SemanticField::Content,
    );
    let projects = RecordRepository::new(
        shared_index.clone(),
        embedder.clone(),
        owned_spec("projects"),
        SemanticField::Description,
    )
    .with_view_tracking();
    let contacts = RecordRepository::new(
        shared_index.clone(),
        embedder.clone(),
        owned_spec("contact"),
        SemanticField::Message,
    );
    let skills = RecordRepository::new(
        shared_index.clone(),
        embedder.clone(),
        owned_spec("skills"),
        SemanticField::Skills,
    );

    let query_log = Arc::new(QueryLogRepository::new(
        shared_index.clone(),
        CollectionSpec::new("user_queries", TEST_VECTOR_SIZE),
    ));

    let users = UserRepository::new(
        shared_index.clone(),
        CollectionSpec::new("users", 4)
            .with_index("email", PayloadIndexKind::Keyword)
            .with_index("apiKey", PayloadIndexKind::Keyword),
    );

    let rag = RagQueryService::new(
        embedder,
        generator.clone() as Arc<dyn GenerationProvider>,
        shared_index,
        query_log.clone(),
        "personal_data",
    );

    TestApp {
        index,
        knowledge,
        projects,
        contacts,
        skills,
        query_log,
        users,
        rag,
        generator,
    }
}

pub fn user_ctx(owner_id: i64) -> AccessContext {
    AccessContext::new(owner_id, Role::User)
}

pub fn admin_ctx(owner_id: i64) -> AccessContext {
    AccessContext::new(owner_id, Role::SuperAdmin)
}

pub fn content_payload(content: &str) -> RecordPayload {
    serde_json::from_value(json!({ "content": content, "category": "note" })).unwrap()
}

pub fn description_payload(title: &str, description: &str) -> RecordPayload {
    serde_json::from_value(json!({ "title": title, "description": description })).unwrap()
}
