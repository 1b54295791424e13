use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Statement};

use crate::api::{User, UserId, UserPatch};
use crate::users_repository::{
    normalized_patch, NewUser, StoredUser, UserCredentials, UsersRepository,
    UsersRepositoryError,
};

pub struct PostgresUsersRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

pub struct PostgresUsersRepository {
    client: Client,
}

impl PostgresUsersRepository {
    pub async fn init(config: PostgresUsersRepositoryConfig) -> anyhow::Result<Self> {
        let connection_str = format!(
            "postgresql://{}:{}@{}",
            config.username, config.password, config.hostname
        );
        tracing::info!("Postgres connection to {}", config.hostname);
        let (client, connection) = tokio_postgres::connect(&connection_str, NoTls)
            .await
            .context("Failed to start postgres")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Postgres connection error: {}", e);
            }
        });

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS users (
            id              SERIAL PRIMARY KEY,
            email           TEXT NOT NULL UNIQUE,
            params          JSONB
            )
        ",
            )
            .await
            .context("Failed to setup users table")?;

        Ok(Self { client })
    }
}

fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.as_db_error()
        .map(|db_err| db_err.code() == &SqlState::UNIQUE_VIOLATION)
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl UsersRepository for PostgresUsersRepository {
    async fn add_user(&self, user: NewUser) -> Result<User, UsersRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("INSERT INTO users (email, params) VALUES ($1, $2) RETURNING id")
            .await?;

        let stored = StoredUser {
            username: user.username,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };

        let rows = match self
            .client
            .query(&stmt, &[&user.email, &json!(stored)])
            .await
        {
            Ok(rows) => rows,
            Err(err) if is_unique_violation(&err) => {
                return Err(UsersRepositoryError::EmailTaken(user.email))
            }
            Err(err) => return Err(err.into()),
        };

        let user_id: UserId = rows
            .first()
            .ok_or_else(|| UsersRepositoryError::Other("Id not returned".to_string()))?
            .try_get(0)?;

        Ok(stored.to_user(user_id, &user.email))
    }

    async fn get_user(&self, id: UserId) -> Result<User, UsersRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT email, params FROM users WHERE id = ($1)")
            .await?;

        let rows = self.client.query(&stmt, &[&id]).await?;
        let row = rows
            .first()
            .ok_or(UsersRepositoryError::UserNotFound(id))?;

        let email: String = row.try_get(0)?;
        let params: serde_json::Value = row.try_get(1)?;
        let stored: StoredUser = serde_json::from_value(params)?;
        Ok(stored.to_user(id, &email))
    }

    async fn find_credentials(
        &self,
        email: &str,
    ) -> Result<UserCredentials, UsersRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT id, params FROM users WHERE email = ($1)")
            .await?;

        let rows = self.client.query(&stmt, &[&email]).await?;
        let row = rows
            .first()
            .ok_or_else(|| UsersRepositoryError::EmailNotFound(email.to_string()))?;

        let id: UserId = row.try_get(0)?;
        let params: serde_json::Value = row.try_get(1)?;
        let stored: StoredUser = serde_json::from_value(params)?;
        Ok(UserCredentials {
            id,
            password_hash: stored.password_hash,
        })
    }

    async fn update_user(
        &self,
        id: UserId,
        patch: UserPatch,
    ) -> Result<User, UsersRepositoryError> {
        let patch = normalized_patch(patch)?;
        let stmt: Statement = self
            .client
            .prepare(
                "UPDATE users SET email = COALESCE(($1)::TEXT, email), params = params || ($2)::JSONB \
                 WHERE id = ($3) RETURNING email, params",
            )
            .await?;

        let params_patch = match &patch.username {
            Some(username) => json!({ "username": username }),
            None => json!({}),
        };

        let rows = match self
            .client
            .query(&stmt, &[&patch.email, &params_patch, &id])
            .await
        {
            Ok(rows) => rows,
            Err(err) if is_unique_violation(&err) => {
                return Err(UsersRepositoryError::EmailTaken(
                    patch.email.unwrap_or_default(),
                ))
            }
            Err(err) => return Err(err.into()),
        };

        let row = rows
            .first()
            .ok_or(UsersRepositoryError::UserNotFound(id))?;
        let email: String = row.try_get(0)?;
        let params: serde_json::Value = row.try_get(1)?;
        let stored: StoredUser = serde_json::from_value(params)?;
        Ok(stored.to_user(id, &email))
    }
}
