use thiserror::Error;

use crate::model::ids::UserId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UserError {
    #[error("username cannot be empty")]
    EmptyUsername,
}

/// Identity details the engine needs from the account system.
///
/// Authentication lives elsewhere; this only carries what certificates and
/// announcement recipients need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    id: UserId,
    username: String,
    full_name: Option<String>,
    email: Option<String>,
}

impl UserProfile {
    /// # Errors
    ///
    /// Returns `UserError::EmptyUsername` if the username is blank.
    pub fn new(
        id: UserId,
        username: impl Into<String>,
        full_name: Option<String>,
        email: Option<String>,
    ) -> Result<Self, UserError> {
        let username = username.into().trim().to_owned();
        if username.is_empty() {
            return Err(UserError::EmptyUsername);
        }
        Ok(Self {
            id,
            username,
            full_name: full_name.filter(|n| !n.trim().is_empty()),
            email,
        })
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn full_name(&self) -> Option<&str> {
        self.full_name.as_deref()
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Name printed on certificates: the full name when present, else the username.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }
}
