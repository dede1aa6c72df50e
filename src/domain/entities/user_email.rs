use validator::validate_email;

use crate::helper::error_chain_fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEmail(String);

impl UserEmail {
    pub fn parse(s: &str) -> Result<UserEmail, UserEmailError> {
        if validate_email(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(UserEmailError::InvalidEmailFormat(format!(
                "{} is not a valid user email.",
                s
            )))
        }
    }
}

impl AsRef<str> for UserEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(thiserror::Error)]
pub enum UserEmailError {
    #[error("Invalid email format: {0}")]
    InvalidEmailFormat(String),
}

impl std::fmt::Debug for UserEmailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
