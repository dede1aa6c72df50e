use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::Secret;
use serde_json::{json, Value};
use tracing::info;

use crate::domain::entities::point::{Point, RecordId};
use crate::domain::entities::record::Role;
use crate::domain::entities::user::{User, UserError};
use crate::domain::entities::user_email::{UserEmail, UserEmailError};
use crate::domain::entities::user_password::{UserPassword, UserPasswordError};
use crate::domain::services::id_generator::generate_id;
use crate::helper::error_chain_fmt;
use crate::repositories::vector_index::{
    CollectionSpec, EqualityFilter, VectorIndex, VectorIndexError,
};
use crate::telemetry::spawn_blocking_with_tracing;

const SCROLL_LIMIT: u32 = 100;

/// Users carry no semantic text: they live in a minimal collection with a
/// fixed placeholder vector, queried only through payload-index filters.
const PLACEHOLDER_VECTOR: [f32; 4] = [0.1, 0.2, 0.3, 0.4];

/// User accounts persisted in their own collection.
///
/// Lookup by email and api key goes through keyword payload indexes declared
/// in the collection spec.
pub struct UserRepository {
    index: Arc<dyn VectorIndex>,
    spec: CollectionSpec,
}

/// Partial update; `password` is re-hashed when present
#[derive(Debug, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub password: Option<Secret<String>>,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub image: Option<String>,
}

impl UserRepository {
    pub fn new(index: Arc<dyn VectorIndex>, spec: CollectionSpec) -> Self {
        Self { index, spec }
    }

    #[tracing::instrument(name = "Creating user", skip(self, password))]
    pub async fn create(
        &self,
        email: &str,
        password: Secret<String>,
        full_name: Option<String>,
        role: Role,
    ) -> Result<User, UserRepositoryError> {
        self.index.ensure_collection(&self.spec).await?;

        let user = User::create(generate_id(), email, password, full_name, role).await?;
        self.index
            .upsert(&self.spec.name, vec![self.point_from_user(&user)])
            .await?;

        info!(user_id = user.id, "Created user");
        Ok(user)
    }

    #[tracing::instrument(name = "Getting user by id", skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Result<User, UserRepositoryError> {
        self.index.ensure_collection(&self.spec).await?;

        let points = self
            .index
            .retrieve(&self.spec.name, &[RecordId::Int(id)])
            .await?;

        let point = points
            .into_iter()
            .next()
            .ok_or_else(|| UserRepositoryError::NotFound(format!("no user with id {}", id)))?;

        user_from_point(point)
    }

    #[tracing::instrument(name = "Finding user by email", skip(self, email))]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserRepositoryError> {
        self.find_one(EqualityFilter::must("email", email)).await
    }

    #[tracing::instrument(name = "Finding user by api key", skip(self, api_key))]
    pub async fn find_by_api_key(
        &self,
        api_key: &str,
    ) -> Result<Option<User>, UserRepositoryError> {
        self.find_one(EqualityFilter::must("apiKey", api_key)).await
    }

    #[tracing::instrument(name = "Listing users", skip(self))]
    pub async fn list(&self) -> Result<Vec<User>, UserRepositoryError> {
        self.index.ensure_collection(&self.spec).await?;

        let points = self.index.scroll(&self.spec.name, None, SCROLL_LIMIT).await?;

        points.into_iter().map(user_from_point).collect()
    }

    /// Full-replace update of the stored user from a partial patch
    #[tracing::instrument(name = "Updating user", skip(self, patch))]
    pub async fn update(&self, id: i64, patch: UserPatch) -> Result<User, UserRepositoryError> {
        let mut user = self.get_by_id(id).await?;

        if let Some(email) = patch.email {
            user.email = UserEmail::parse(&email)?;
        }
        if let Some(password) = patch.password {
            user.password_hash =
                spawn_blocking_with_tracing(move || UserPassword::compute_password_hash(password))
                    .await
                    .map_err(|e| {
                        UserRepositoryError::Internal(format!(
                            "Unexpected error when spawning blocking thread: {}",
                            e
                        ))
                    })??;
        }
        if let Some(full_name) = patch.full_name {
            user.full_name = Some(full_name);
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(image) = patch.image {
            user.image = Some(image);
        }

        self.index
            .upsert(&self.spec.name, vec![self.point_from_user(&user)])
            .await?;

        Ok(user)
    }

    #[tracing::instrument(name = "Deleting user", skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), UserRepositoryError> {
        self.index.ensure_collection(&self.spec).await?;
        self.index
            .delete(&self.spec.name, &[RecordId::Int(id)])
            .await?;
        Ok(())
    }

    async fn find_one(
        &self,
        filter: EqualityFilter,
    ) -> Result<Option<User>, UserRepositoryError> {
        self.index.ensure_collection(&self.spec).await?;

        let points = self
            .index
            .scroll(&self.spec.name, Some(filter), 1)
            .await?;

        points.into_iter().next().map(user_from_point).transpose()
    }

    fn point_from_user(&self, user: &User) -> Point {
        let payload = json!({
            "email": user.email.as_ref(),
            "password": user.password_hash.as_ref(),
            "fullName": user.full_name,
            "role": user.role,
            "apiKey": user.api_key,
            "image": user.image,
            "timestamp": user.created_at.to_rfc3339(),
        });

        Point {
            id: RecordId::Int(user.id),
            vector: PLACEHOLDER_VECTOR.to_vec(),
            payload: payload.as_object().cloned().unwrap_or_default(),
        }
    }
}

fn user_from_point(point: Point) -> Result<User, UserRepositoryError> {
    let malformed = |details: &str| UserRepositoryError::Payload(details.to_string());

    let id = point
        .id
        .as_int()
        .ok_or_else(|| malformed("user id is not an integer"))?;

    let payload = &point.payload;
    let field_str =
        |key: &str| -> Option<String> { payload.get(key).and_then(Value::as_str).map(String::from) };

    let email = field_str("email").ok_or_else(|| malformed("missing email"))?;
    let password = field_str("password").ok_or_else(|| malformed("missing password hash"))?;
    let role = payload
        .get("role")
        .cloned()
        .and_then(|v| serde_json::from_value::<Role>(v).ok())
        .unwrap_or(Role::User);
    let created_at = field_str("timestamp")
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Ok(User {
        id,
        email: UserEmail::parse(&email)?,
        password_hash: UserPassword::parse(Secret::new(password))?,
        full_name: field_str("fullName"),
        role,
        api_key: field_str("apiKey").unwrap_or_default(),
        image: field_str("image"),
        created_at,
    })
}

#[derive(thiserror::Error)]
pub enum UserRepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Malformed stored user: {0}")]
    Payload(String),
    #[error("Internal: {0}")]
    Internal(String),
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Email(#[from] UserEmailError),
    #[error(transparent)]
    Password(#[from] UserPasswordError),
    #[error(transparent)]
    Index(#[from] VectorIndexError),
}

impl std::fmt::Debug for UserRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
