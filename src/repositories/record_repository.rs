use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::info;

use crate::domain::entities::point::{Embeddings, Point, RecordId};
use crate::domain::entities::record::{AccessContext, Record, RecordPayload, SemanticField};
use crate::domain::services::id_generator::generate_id;
use crate::domain::services::providers::{EmbeddingError, EmbeddingProvider};
use crate::helper::error_chain_fmt;
use crate::repositories::vector_index::{
    CollectionSpec, EqualityFilter, VectorIndex, VectorIndexError,
};

pub const OWNER_ID_KEY: &str = "ownerId";
pub const TIMESTAMP_KEY: &str = "timestamp";
pub const VIEWS_KEY: &str = "views";

const SCROLL_LIMIT: u32 = 100;

/// Generic ownership-aware repository over one vector collection.
///
/// Every resource type (notes, blogs, goals, projects, ...) is an instance of
/// this repository with its own [`CollectionSpec`] and semantic field. The
/// policy is identical for all of them: embed on write, filter on read,
/// own-or-admin to mutate.
pub struct RecordRepository {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    spec: CollectionSpec,
    semantic_field: SemanticField,
    /// Collections tracking popularity keep an append-only `views` sequence
    track_views: bool,
}

impl RecordRepository {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        spec: CollectionSpec,
        semantic_field: SemanticField,
    ) -> Self {
        Self {
            index,
            embedder,
            spec,
            semantic_field,
            track_views: false,
        }
    }

    pub fn with_view_tracking(mut self) -> Self {
        self.track_views = true;
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.spec.name
    }

    /// Embeds the payload's semantic field, stamps the owner and creation
    /// timestamp, and upserts a freshly identified point.
    ///
    /// Ids are always repository-assigned; a caller cannot pick the id of a
    /// new record, so an add can never overwrite an existing point.
    #[tracing::instrument(name = "Adding record", skip(self, payload, ctx), fields(collection = %self.spec.name))]
    pub async fn add(
        &self,
        mut payload: RecordPayload,
        ctx: &AccessContext,
    ) -> Result<RecordId, RecordRepositoryError> {
        self.index.ensure_collection(&self.spec).await?;

        payload.strip_reserved();
        let text = self
            .semantic_field
            .extract(&payload)
            .ok_or_else(|| self.missing_semantic_field())?
            .into_owned();

        let vector = self.embedder.embed(&text).await?;
        let id = RecordId::Int(generate_id());

        let views: Option<Vec<DateTime<Utc>>> = self.track_views.then(Vec::new);
        let point = self.build_point(
            id.clone(),
            vector,
            &payload,
            Some(ctx.owner_id),
            Utc::now(),
            views.as_deref(),
        )?;

        self.index.upsert(&self.spec.name, vec![point]).await?;
        info!(%id, "Added record");

        Ok(id)
    }

    /// Privileged roles scan the whole collection; everyone else only ever
    /// sees records stamped with their own owner id.
    #[tracing::instrument(name = "Listing records", skip(self, ctx), fields(collection = %self.spec.name))]
    pub async fn list(&self, ctx: &AccessContext) -> Result<Vec<Record>, RecordRepositoryError> {
        self.index.ensure_collection(&self.spec).await?;

        let filter = if ctx.role.is_privileged() {
            None
        } else {
            Some(EqualityFilter::must(OWNER_ID_KEY, ctx.owner_id))
        };

        let points = self
            .index
            .scroll(&self.spec.name, filter, SCROLL_LIMIT)
            .await?;

        points
            .into_iter()
            .map(|point| self.record_from_point(point))
            .collect()
    }

    /// Exact retrieval by id. Plain reads carry no ownership check: callers
    /// reach a record through an opaque id they already hold.
    #[tracing::instrument(name = "Getting record by id", skip(self), fields(collection = %self.spec.name))]
    pub async fn get_by_id(&self, id: &RecordId) -> Result<Record, RecordRepositoryError> {
        self.index.ensure_collection(&self.spec).await?;

        let id = id.normalize();
        let points = self.index.retrieve(&self.spec.name, &[id.clone()]).await?;

        let point = points
            .into_iter()
            .next()
            .ok_or_else(|| self.not_found(&id))?;

        self.record_from_point(point)
    }

    /// Shallow-merges `partial` over the stored payload, recomputing the
    /// embedding only when the semantic field's value actually changed.
    #[tracing::instrument(name = "Updating record", skip(self, partial, ctx), fields(collection = %self.spec.name))]
    pub async fn update(
        &self,
        id: &RecordId,
        mut partial: RecordPayload,
        ctx: &AccessContext,
    ) -> Result<RecordId, RecordRepositoryError> {
        self.index.ensure_collection(&self.spec).await?;

        let id = id.normalize();
        let existing_point = self
            .index
            .retrieve(&self.spec.name, &[id.clone()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| self.not_found(&id))?;

        let old_vector = existing_point.vector.clone();
        let existing = self.record_from_point(existing_point)?;
        self.check_can_mutate(&existing, ctx)?;

        partial.strip_reserved();
        let merged = existing.payload.merged_with(&partial);

        let new_text = self
            .semantic_field
            .extract(&merged)
            .ok_or_else(|| self.missing_semantic_field())?
            .into_owned();
        let semantic_changed =
            self.semantic_field.extract(&existing.payload).as_deref() != Some(new_text.as_str());

        let vector = if semantic_changed || old_vector.is_empty() {
            self.embedder.embed(&new_text).await?
        } else {
            old_vector
        };

        let point = self.build_point(
            id.clone(),
            vector,
            &merged,
            existing.owner_id,
            existing.created_at.unwrap_or_else(Utc::now),
            existing.views.as_deref(),
        )?;

        self.index.upsert(&self.spec.name, vec![point]).await?;
        info!(%id, "Updated record");

        Ok(id)
    }

    /// Same existence and ownership checks as update, then a hard delete:
    /// there is no soft-deleted state.
    #[tracing::instrument(name = "Deleting record", skip(self, ctx), fields(collection = %self.spec.name))]
    pub async fn delete(
        &self,
        id: &RecordId,
        ctx: &AccessContext,
    ) -> Result<(), RecordRepositoryError> {
        self.index.ensure_collection(&self.spec).await?;

        let id = id.normalize();
        let existing = self
            .index
            .retrieve(&self.spec.name, &[id.clone()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| self.not_found(&id))?;

        let existing = self.record_from_point(existing)?;
        self.check_can_mutate(&existing, ctx)?;

        self.index.delete(&self.spec.name, &[id.clone()]).await?;
        info!(%id, "Deleted record");

        Ok(())
    }

    /// Appends a view timestamp to the record's `views` sequence.
    ///
    /// The vector is reused as-is: a view never touches the semantic field.
    #[tracing::instrument(name = "Recording view", skip(self, ctx), fields(collection = %self.spec.name))]
    pub async fn record_view(
        &self,
        id: &RecordId,
        ctx: &AccessContext,
    ) -> Result<Vec<DateTime<Utc>>, RecordRepositoryError> {
        self.index.ensure_collection(&self.spec).await?;

        let id = id.normalize();
        let existing_point = self
            .index
            .retrieve(&self.spec.name, &[id.clone()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| self.not_found(&id))?;

        let vector = existing_point.vector.clone();
        let existing = self.record_from_point(existing_point)?;
        self.check_can_mutate(&existing, ctx)?;

        let mut views = existing.views.unwrap_or_default();
        views.push(Utc::now());

        let point = self.build_point(
            id.clone(),
            vector,
            &existing.payload,
            existing.owner_id,
            existing.created_at.unwrap_or_else(Utc::now),
            Some(&views),
        )?;

        self.index.upsert(&self.spec.name, vec![point]).await?;

        Ok(views)
    }

    fn check_can_mutate(
        &self,
        record: &Record,
        ctx: &AccessContext,
    ) -> Result<(), RecordRepositoryError> {
        if ctx.role.is_privileged() {
            return Ok(());
        }
        match record.owner_id {
            Some(owner_id) if owner_id == ctx.owner_id => Ok(()),
            _ => Err(RecordRepositoryError::Forbidden(format!(
                "caller {} does not own record {}",
                ctx.owner_id, record.id
            ))),
        }
    }

    fn build_point(
        &self,
        id: RecordId,
        vector: Embeddings,
        payload: &RecordPayload,
        owner_id: Option<i64>,
        created_at: DateTime<Utc>,
        views: Option<&[DateTime<Utc>]>,
    ) -> Result<Point, RecordRepositoryError> {
        let value = serde_json::to_value(payload)
            .map_err(|e| RecordRepositoryError::Payload(e.to_string()))?;
        let Value::Object(mut map) = value else {
            return Err(RecordRepositoryError::Payload(
                "record payload did not serialize to an object".into(),
            ));
        };

        if let Some(owner_id) = owner_id {
            map.insert(OWNER_ID_KEY.into(), json!(owner_id));
        }
        map.insert(TIMESTAMP_KEY.into(), json!(created_at.to_rfc3339()));
        if let Some(views) = views {
            let views: Vec<String> = views.iter().map(|v| v.to_rfc3339()).collect();
            map.insert(VIEWS_KEY.into(), json!(views));
        }

        Ok(Point {
            id,
            vector,
            payload: map,
        })
    }

    fn record_from_point(&self, point: Point) -> Result<Record, RecordRepositoryError> {
        let mut map = point.payload;

        let owner_id = map.remove(OWNER_ID_KEY).and_then(|v| v.as_i64());
        let created_at = map
            .remove(TIMESTAMP_KEY)
            .and_then(|v| v.as_str().map(str::to_owned))
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let views = map.remove(VIEWS_KEY).and_then(|v| match v {
            Value::Array(items) => Some(
                items
                    .into_iter()
                    .filter_map(|item| {
                        item.as_str()
                            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                            .map(|dt| dt.with_timezone(&Utc))
                    })
                    .collect(),
            ),
            _ => None,
        });

        let payload = serde_json::from_value(Value::Object(map))
            .map_err(|e| RecordRepositoryError::Payload(e.to_string()))?;

        Ok(Record {
            id: point.id.normalize(),
            owner_id,
            created_at,
            views,
            payload,
        })
    }

    fn missing_semantic_field(&self) -> RecordRepositoryError {
        RecordRepositoryError::Validation(format!(
            "field '{}' must be a non-empty string",
            self.semantic_field.name()
        ))
    }

    fn not_found(&self, id: &RecordId) -> RecordRepositoryError {
        RecordRepositoryError::NotFound(format!(
            "no record with id {} in '{}'",
            id, self.spec.name
        ))
    }
}

#[derive(thiserror::Error)]
pub enum RecordRepositoryError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Malformed stored payload: {0}")]
    Payload(String),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Index(#[from] VectorIndexError),
}

impl std::fmt::Debug for RecordRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
