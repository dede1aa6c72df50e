use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash, PasswordHasher,
    PasswordVerifier, Version,
};
use secrecy::{ExposeSecret, Secret};

use crate::helper::error_chain_fmt;

/// PHC format hashed password.
///
/// The salt and hash-function parameters are stored per user, so the hash
/// function can change without breaking existing accounts.
#[derive(Debug, Clone)]
pub struct UserPassword(Secret<String>);

impl UserPassword {
    /// Computes a PHC-format password hash.
    ///
    /// CPU-intensive: run it on a blocking thread.
    #[tracing::instrument(name = "Computing password in PHC format", skip(password))]
    pub fn compute_password_hash(
        password: Secret<String>,
    ) -> Result<UserPassword, UserPasswordError> {
        let salt = SaltString::generate(&mut rand::thread_rng());

        let password_hash = Argon2::new(
            Algorithm::Argon2id,
            Version::V0x13,
            Params::new(15000, 2, 1, None).unwrap(),
        )
        .hash_password(password.expose_secret().as_bytes(), &salt)?
        .to_string();

        Ok(UserPassword(Secret::new(password_hash)))
    }

    /// Parses a serialized PHC-format hash, as read back from storage
    pub fn parse(password_hash_str: Secret<String>) -> Result<UserPassword, UserPasswordError> {
        let expected_password_hash = PasswordHash::new(password_hash_str.expose_secret())?;
        Ok(UserPassword(Secret::new(
            expected_password_hash.serialize().to_string(),
        )))
    }

    /// Verifies a candidate password against this hash.
    ///
    /// CPU-intensive: run it on a blocking thread.
    #[tracing::instrument(name = "Verifying password hash", skip(self, password_candidate))]
    pub fn verify(&self, password_candidate: Secret<String>) -> Result<(), UserPasswordError> {
        let expected_password_hash = PasswordHash::new(self.0.expose_secret())?;

        Argon2::default()
            .verify_password(
                password_candidate.expose_secret().as_bytes(),
                &expected_password_hash,
            )
            .map_err(|e| {
                UserPasswordError::InvalidCredentials(format!("Invalid password: {:?}", e))
            })
    }
}

impl AsRef<str> for UserPassword {
    fn as_ref(&self) -> &str {
        self.0.expose_secret()
    }
}

#[derive(thiserror::Error)]
pub enum UserPasswordError {
    #[error(transparent)]
    HashError(#[from] argon2::password_hash::Error),
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

impl std::fmt::Debug for UserPasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
