use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use in_memory_users_repository::InMemoryUsersRepository;
pub use postgres_users_repository::{PostgresUsersRepository, PostgresUsersRepositoryConfig};

use crate::api::{User, UserId, UserPatch};

mod in_memory_users_repository;
mod postgres_users_repository;

#[derive(Debug, thiserror::Error)]
pub enum UsersRepositoryError {
    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("No user registered with email {0}")]
    EmailNotFound(String),

    #[error("Email {0} is already registered")]
    EmailTaken(String),

    #[error("{0} must not be empty")]
    InvalidField(&'static str),

    #[error("Failed to deserialize user: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCredentials {
    pub id: UserId,
    pub password_hash: String,
}

#[async_trait::async_trait]
pub trait UsersRepository {
    /// Registers user, email has to be unique
    async fn add_user(&self, user: NewUser) -> Result<User, UsersRepositoryError>;

    async fn get_user(&self, id: UserId) -> Result<User, UsersRepositoryError>;

    /// Looks up the password hash used to log in with the email
    async fn find_credentials(&self, email: &str)
        -> Result<UserCredentials, UsersRepositoryError>;

    /// Applies profile changes, returns the updated user
    async fn update_user(&self, id: UserId, patch: UserPatch)
        -> Result<User, UsersRepositoryError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// User fields kept as a JSON document, id and email are stored next to it
struct StoredUser {
    username: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl StoredUser {
    fn to_user(&self, id: UserId, email: &str) -> User {
        User {
            id,
            username: self.username.clone(),
            email: email.to_string(),
            created_at: self.created_at,
        }
    }
}

/// Trims provided fields and rejects the ones left empty
fn normalized_patch(patch: UserPatch) -> Result<UserPatch, UsersRepositoryError> {
    let username = match patch.username {
        Some(username) if username.trim().is_empty() => {
            return Err(UsersRepositoryError::InvalidField("username"))
        }
        username => username.map(|username| username.trim().to_string()),
    };
    let email = match patch.email {
        Some(email) if email.trim().is_empty() => {
            return Err(UsersRepositoryError::InvalidField("email"))
        }
        email => email.map(|email| email.trim().to_string()),
    };
    Ok(UserPatch { username, email })
}
