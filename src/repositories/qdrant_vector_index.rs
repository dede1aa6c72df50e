use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, vectors::VectorsOptions, Condition,
    CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Distance,
    FieldType, Filter, GetPointsBuilder, ListValue, PointId, PointStruct, PointsIdsList,
    RetrievedPoint, ScoredPoint, ScrollPointsBuilder, SearchPointsBuilder, Struct,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder, Vectors,
};
use qdrant_client::{Payload, Qdrant};
use tracing::info;

use crate::configuration::QdrantSettings;
use crate::domain::entities::point::{Embeddings, Point, RecordId, SimilarPoint};
use crate::repositories::vector_index::{
    CollectionSpec, EqualityFilter, MatchValue, PayloadIndexKind, VectorIndex, VectorIndexError,
};

/// Qdrant-backed implementation of [`VectorIndex`].
///
/// One client handle is shared by every repository; the underlying gRPC
/// channel is safe for concurrent use.
pub struct QdrantVectorIndex {
    client: Qdrant,
    distance: Distance,
}

impl QdrantVectorIndex {
    pub fn new(client: Qdrant, collection_distance: &str) -> Result<Self, VectorIndexError> {
        let distance = Distance::from_str_name(collection_distance).ok_or(
            VectorIndexError::Configuration {
                collection: "*".into(),
                details: format!("invalid distance name '{}'", collection_distance),
            },
        )?;

        Ok(Self { client, distance })
    }

    /// Builds the gRPC client from settings
    pub fn try_from_settings(settings: &QdrantSettings) -> Result<Self, VectorIndexError> {
        use secrecy::ExposeSecret;

        let mut builder = Qdrant::from_url(&settings.get_grpc_base_url());
        if let Some(api_key) = &settings.api_key {
            builder = builder.api_key(api_key.expose_secret().to_string());
        }
        let client = builder
            .build()
            .map_err(|e| VectorIndexError::Store(e.to_string()))?;

        Self::new(client, &settings.collection_distance)
    }

    fn to_point_id(id: &RecordId) -> PointId {
        match id.normalize() {
            RecordId::Int(n) => PointId::from(n as u64),
            RecordId::Str(s) => PointId::from(s),
        }
    }

    fn from_point_id(point_id: &PointId) -> Option<RecordId> {
        match &point_id.point_id_options {
            Some(PointIdOptions::Num(n)) => Some(RecordId::Int(*n as i64)),
            Some(PointIdOptions::Uuid(s)) => Some(RecordId::Str(s.clone())),
            None => None,
        }
    }

    fn to_filter(filter: EqualityFilter) -> Filter {
        Filter::must(filter.conditions.into_iter().map(|(field, value)| {
            match value {
                MatchValue::Integer(n) => Condition::matches(field, n),
                MatchValue::Keyword(s) => Condition::matches(field, s),
            }
        }))
    }

    fn to_qdrant_payload(
        payload: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Payload, VectorIndexError> {
        Payload::try_from(serde_json::Value::Object(payload))
            .map_err(|e| VectorIndexError::InvalidPayload(e.to_string()))
    }

    fn from_retrieved(point: RetrievedPoint) -> Option<Point> {
        let id = point.id.as_ref().and_then(Self::from_point_id)?;
        Some(Point {
            id,
            vector: extract_vector(point.vectors).unwrap_or_default(),
            payload: payload_to_json(point.payload),
        })
    }

    fn from_scored(point: ScoredPoint) -> Option<SimilarPoint> {
        let id = point.id.as_ref().and_then(Self::from_point_id)?;
        Some(SimilarPoint {
            id,
            score: point.score,
            payload: payload_to_json(point.payload),
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    #[tracing::instrument(name = "Ensuring collection", skip(self, spec), fields(collection = %spec.name))]
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), VectorIndexError> {
        match self
            .client
            .create_collection(
                CreateCollectionBuilder::new(&spec.name)
                    .vectors_config(VectorParamsBuilder::new(spec.vector_size, self.distance)),
            )
            .await
        {
            Ok(_) => info!(collection = %spec.name, "Created collection"),
            Err(error) => {
                // Racing callers both try to create; losing is fine
                if !is_already_exists(&error.to_string()) {
                    return Err(VectorIndexError::Store(error.to_string()));
                }
            }
        }

        for index in &spec.payload_indexes {
            let field_type = match index.kind {
                PayloadIndexKind::Integer => FieldType::Integer,
                PayloadIndexKind::Keyword => FieldType::Keyword,
            };
            match self
                .client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &spec.name,
                    &index.field,
                    field_type,
                ))
                .await
            {
                Ok(_) => info!(collection = %spec.name, field = %index.field, "Ensured payload index"),
                Err(error) => {
                    if !is_already_exists(&error.to_string()) {
                        return Err(VectorIndexError::Store(error.to_string()));
                    }
                }
            }
        }

        Ok(())
    }

    #[tracing::instrument(name = "Upserting points", skip(self, points))]
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), VectorIndexError> {
        let points = points
            .into_iter()
            .map(|point| {
                Ok(PointStruct::new(
                    Self::to_point_id(&point.id),
                    point.vector,
                    Self::to_qdrant_payload(point.payload)?,
                ))
            })
            .collect::<Result<Vec<_>, VectorIndexError>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| VectorIndexError::Store(e.to_string()))?;

        Ok(())
    }

    #[tracing::instrument(name = "Retrieving points", skip(self, ids))]
    async fn retrieve(
        &self,
        collection: &str,
        ids: &[RecordId],
    ) -> Result<Vec<Point>, VectorIndexError> {
        let point_ids: Vec<PointId> = ids.iter().map(Self::to_point_id).collect();

        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(collection, point_ids)
                    .with_payload(true)
                    .with_vectors(true),
            )
            .await
            .map_err(|e| VectorIndexError::Store(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(Self::from_retrieved)
            .collect())
    }

    #[tracing::instrument(name = "Scrolling points", skip(self, filter))]
    async fn scroll(
        &self,
        collection: &str,
        filter: Option<EqualityFilter>,
        limit: u32,
    ) -> Result<Vec<Point>, VectorIndexError> {
        let mut builder = ScrollPointsBuilder::new(collection)
            .limit(limit)
            .with_payload(true)
            .with_vectors(false);

        if let Some(filter) = filter {
            builder = builder.filter(Self::to_filter(filter));
        }

        let response = self
            .client
            .scroll(builder)
            .await
            .map_err(|e| VectorIndexError::Store(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(Self::from_retrieved)
            .collect())
    }

    #[tracing::instrument(name = "Searching similar points", skip(self, query_vector))]
    async fn search(
        &self,
        collection: &str,
        query_vector: Embeddings,
        limit: u64,
    ) -> Result<Vec<SimilarPoint>, VectorIndexError> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, query_vector, limit).with_payload(true),
            )
            .await
            .map_err(|e| VectorIndexError::Store(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(Self::from_scored)
            .collect())
    }

    #[tracing::instrument(name = "Deleting points", skip(self, ids))]
    async fn delete(&self, collection: &str, ids: &[RecordId]) -> Result<(), VectorIndexError> {
        let point_ids: Vec<PointId> = ids.iter().map(Self::to_point_id).collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .map_err(|e| VectorIndexError::Store(e.to_string()))?;

        Ok(())
    }
}

/// Qdrant reports re-creation of a collection or a payload index through the
/// error message, not a dedicated status code
fn is_already_exists(error_details: &str) -> bool {
    error_details.contains("already exists")
}

fn extract_vector(vectors: Option<Vectors>) -> Option<Embeddings> {
    match vectors?.vectors_options? {
        VectorsOptions::Vector(vector) => Some(vector.data),
        VectorsOptions::Vectors(named) => named.vectors.into_values().next().map(|v| v.data),
    }
}

fn payload_to_json(
    payload: HashMap<String, QdrantValue>,
) -> serde_json::Map<String, serde_json::Value> {
    payload
        .into_iter()
        .filter_map(|(key, value)| qdrant_value_to_json(value).map(|v| (key, v)))
        .collect()
}

fn qdrant_value_to_json(value: QdrantValue) -> Option<serde_json::Value> {
    match value.kind? {
        Kind::NullValue(_) => Some(serde_json::Value::Null),
        Kind::BoolValue(b) => Some(serde_json::Value::Bool(b)),
        Kind::IntegerValue(n) => Some(serde_json::Value::Number(n.into())),
        Kind::DoubleValue(f) => serde_json::Number::from_f64(f).map(serde_json::Value::Number),
        Kind::StringValue(s) => Some(serde_json::Value::String(s)),
        Kind::ListValue(ListValue { values }) => Some(serde_json::Value::Array(
            values.into_iter().filter_map(qdrant_value_to_json).collect(),
        )),
        Kind::StructValue(Struct { fields }) => {
            Some(serde_json::Value::Object(payload_to_json(fields)))
        }
    }
}
