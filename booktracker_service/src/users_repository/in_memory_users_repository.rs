use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use chrono::Utc;

use crate::api::{User, UserId, UserPatch};
use crate::users_repository::{
    normalized_patch, NewUser, StoredUser, UserCredentials, UsersRepository,
    UsersRepositoryError,
};

struct UserRecord {
    email: String,
    user: StoredUser,
}

#[derive(Default)]
pub struct InMemoryUsersRepository {
    users: parking_lot::RwLock<HashMap<UserId, UserRecord>>,
    user_sequence_generator: AtomicI32,
}

#[async_trait::async_trait]
impl UsersRepository for InMemoryUsersRepository {
    async fn add_user(&self, user: NewUser) -> Result<User, UsersRepositoryError> {
        let mut locked_users = self.users.write();
        if locked_users
            .values()
            .any(|record| record.email == user.email)
        {
            return Err(UsersRepositoryError::EmailTaken(user.email));
        }

        let id = self.user_sequence_generator.fetch_add(1, Ordering::Relaxed) + 1;
        let stored = StoredUser {
            username: user.username,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        let result = stored.to_user(id, &user.email);
        locked_users.insert(
            id,
            UserRecord {
                email: user.email,
                user: stored,
            },
        );
        Ok(result)
    }

    async fn get_user(&self, id: UserId) -> Result<User, UsersRepositoryError> {
        self.users
            .read()
            .get(&id)
            .map(|record| record.user.to_user(id, &record.email))
            .ok_or(UsersRepositoryError::UserNotFound(id))
    }

    async fn find_credentials(
        &self,
        email: &str,
    ) -> Result<UserCredentials, UsersRepositoryError> {
        self.users
            .read()
            .iter()
            .find(|(_, record)| record.email == email)
            .map(|(&id, record)| UserCredentials {
                id,
                password_hash: record.user.password_hash.clone(),
            })
            .ok_or_else(|| UsersRepositoryError::EmailNotFound(email.to_string()))
    }

    async fn update_user(
        &self,
        id: UserId,
        patch: UserPatch,
    ) -> Result<User, UsersRepositoryError> {
        let patch = normalized_patch(patch)?;
        let mut locked_users = self.users.write();

        if let Some(email) = &patch.email {
            if locked_users
                .iter()
                .any(|(&other_id, record)| other_id != id && &record.email == email)
            {
                return Err(UsersRepositoryError::EmailTaken(email.clone()));
            }
        }

        let record = locked_users
            .get_mut(&id)
            .ok_or(UsersRepositoryError::UserNotFound(id))?;
        if let Some(username) = patch.username {
            record.user.username = username;
        }
        if let Some(email) = patch.email {
            record.email = email;
        }
        Ok(record.user.to_user(id, &record.email))
    }
}

#[cfg(test)]
mod tests_in_memory_users_repository {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    /// Simple test to cover user management
    /// 1. Creates user and gets it back
    /// 2. Rejects a second user with the same email
    /// 3. Finds credentials by email
    /// 4. Gets user not existing in db to get not found
    async fn test_user_management() {
        let repository = InMemoryUsersRepository::default();

        let user = repository
            .add_user(new_user("reader", "reader@example.com"))
            .await
            .unwrap();
        assert_eq!(user.username, "reader");
        assert_eq!(user.email, "reader@example.com");
        assert_eq!(repository.get_user(user.id).await.unwrap(), user);

        let duplicate = repository
            .add_user(new_user("other", "reader@example.com"))
            .await;
        assert!(matches!(
            duplicate,
            Err(UsersRepositoryError::EmailTaken(..))
        ));

        let credentials = repository
            .find_credentials("reader@example.com")
            .await
            .unwrap();
        assert_eq!(
            credentials,
            UserCredentials {
                id: user.id,
                password_hash: "hash".to_string(),
            }
        );
        assert!(matches!(
            repository.find_credentials("nobody@example.com").await,
            Err(UsersRepositoryError::EmailNotFound(..))
        ));

        let unknown_user_id = user.id + 1;
        assert!(matches!(
            repository.get_user(unknown_user_id).await,
            Err(UsersRepositoryError::UserNotFound(..))
        ));
    }

    #[tokio::test]
    async fn test_update_user() {
        let repository = InMemoryUsersRepository::default();
        let first = repository
            .add_user(new_user("first", "first@example.com"))
            .await
            .unwrap();
        repository
            .add_user(new_user("second", "second@example.com"))
            .await
            .unwrap();

        let renamed = repository
            .update_user(
                first.id,
                UserPatch {
                    username: Some(" renamed ".to_string()),
                    email: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.username, "renamed");
        assert_eq!(renamed.email, "first@example.com");
        assert_eq!(renamed.created_at, first.created_at);

        let taken = repository
            .update_user(
                first.id,
                UserPatch {
                    username: None,
                    email: Some("second@example.com".to_string()),
                },
            )
            .await;
        assert!(matches!(taken, Err(UsersRepositoryError::EmailTaken(..))));

        let empty = repository
            .update_user(
                first.id,
                UserPatch {
                    username: Some("  ".to_string()),
                    email: None,
                },
            )
            .await;
        assert!(matches!(
            empty,
            Err(UsersRepositoryError::InvalidField("username"))
        ));

        let moved = repository
            .update_user(
                first.id,
                UserPatch {
                    username: None,
                    email: Some("new@example.com".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.email, "new@example.com");
        assert!(repository
            .find_credentials("first@example.com")
            .await
            .is_err());

        assert!(matches!(
            repository.update_user(100, UserPatch::default()).await,
            Err(UsersRepositoryError::UserNotFound(100))
        ));
    }
}
