use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use secrecy::Secret;
use tracing::info;

use super::record::Role;
use super::user_email::{UserEmail, UserEmailError};
use super::user_password::{UserPassword, UserPasswordError};
use crate::helper::error_chain_fmt;
use crate::telemetry::spawn_blocking_with_tracing;

const API_KEY_LENGTH: usize = 32;

/// A user account.
///
/// `password_hash` is wrapped in a `Secret` to avoid leaking it in logs.
/// `api_key` is an opaque secret usable in place of a session token for
/// read-only public access.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: UserEmail,
    pub password_hash: UserPassword,
    pub full_name: Option<String>,
    pub role: Role,
    pub api_key: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates a user, hashing their password on a blocking thread
    pub async fn create(
        id: i64,
        email: &str,
        password: Secret<String>,
        full_name: Option<String>,
        role: Role,
    ) -> Result<User, UserError> {
        let email = UserEmail::parse(email)?;
        info!(email = email.as_ref(), "Valid email");

        let password_hash =
            spawn_blocking_with_tracing(move || UserPassword::compute_password_hash(password))
                .await
                .map_err(|e| {
                    UserError::InternalError(format!(
                        "Unexpected error when spawning blocking thread: {}",
                        e
                    ))
                })??;

        Ok(User {
            id,
            email,
            password_hash,
            full_name,
            role,
            api_key: generate_api_key(),
            image: None,
            created_at: Utc::now(),
        })
    }
}

/// An opaque random secret, regenerated on demand, never derived from user data
pub fn generate_api_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_LENGTH)
        .map(char::from)
        .collect()
}

#[derive(thiserror::Error)]
pub enum UserError {
    #[error(transparent)]
    PasswordError(#[from] UserPasswordError),
    #[error(transparent)]
    EmailError(#[from] UserEmailError),
    #[error("Internal: {0}")]
    InternalError(String),
}

impl std::fmt::Debug for UserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
