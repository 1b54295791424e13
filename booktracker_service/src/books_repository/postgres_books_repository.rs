use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use tokio_postgres::{Client, NoTls, Row, Statement};

use crate::api::{AttachmentKind, Book, BookId, StatusFilter, UserId};
use crate::book_form::NewBook;
use crate::books_repository::{
    attachment_patch, editable_fields_patch, BooksRepository, BooksRepositoryError, StoredBook,
};

pub struct PostgresBooksRepository {
    client: Client,
}

pub struct PostgresBooksRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

impl PostgresBooksRepository {
    pub async fn init(config: PostgresBooksRepositoryConfig) -> anyhow::Result<Self> {
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
        CREATE TABLE IF NOT EXISTS books (
            id              SERIAL PRIMARY KEY,
            user_id         INTEGER NOT NULL,
            params          JSONB
            )
        ",
            )
            .await
            .context("Failed to setup books table")?;
        Ok(Self { client })
    }

    async fn patch_book(
        &self,
        user_id: UserId,
        book_id: BookId,
        patch: serde_json::Value,
    ) -> Result<Book, BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "UPDATE books SET params = params || ($1)::JSONB \
                 WHERE id = ($2) AND user_id = ($3) RETURNING params",
            )
            .await?;

        let rows = self
            .client
            .query(&stmt, &[&patch, &book_id, &user_id])
            .await?;
        book_from_params(rows.first(), book_id, user_id)
    }
}

fn book_from_params(
    row: Option<&Row>,
    book_id: BookId,
    user_id: UserId,
) -> Result<Book, BooksRepositoryError> {
    let params: serde_json::Value = row
        .ok_or(BooksRepositoryError::NotFound(book_id))?
        .try_get(0)?;
    let stored: StoredBook = serde_json::from_value(params)?;
    Ok(stored.into_book(book_id, user_id))
}

#[async_trait::async_trait]
impl BooksRepository for PostgresBooksRepository {
    async fn add_book(&self, user_id: UserId, book: NewBook) -> Result<Book, BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("INSERT INTO books (user_id, params) VALUES ($1, $2) RETURNING id")
            .await?;

        let stored = StoredBook::new(book, Utc::now());
        let rows = self
            .client
            .query(&stmt, &[&user_id, &json!(stored)])
            .await?;

        let book_id: BookId = rows
            .first()
            .ok_or_else(|| BooksRepositoryError::Other("Id not returned".to_string()))?
            .try_get(0)?;

        Ok(stored.into_book(book_id, user_id))
    }

    async fn get_book(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<Book, BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT params FROM books WHERE id = ($1) AND user_id = ($2)")
            .await?;

        let rows = self.client.query(&stmt, &[&book_id, &user_id]).await?;
        book_from_params(rows.first(), book_id, user_id)
    }

    async fn list_books(
        &self,
        user_id: UserId,
        filter: StatusFilter,
    ) -> Result<Vec<Book>, BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "SELECT id, params FROM books \
                 WHERE user_id = ($1) AND (($2)::TEXT IS NULL OR params->>'status' = ($2)::TEXT) \
                 ORDER BY id",
            )
            .await?;

        let status = filter.status().map(|status| status.as_str());
        let rows = self.client.query(&stmt, &[&user_id, &status]).await?;

        rows.iter()
            .map(|row| -> Result<Book, BooksRepositoryError> {
                let book_id: BookId = row.try_get(0)?;
                let params: serde_json::Value = row.try_get(1)?;
                let stored: StoredBook = serde_json::from_value(params)?;
                Ok(stored.into_book(book_id, user_id))
            })
            .collect()
    }

    async fn update_book(
        &self,
        user_id: UserId,
        book_id: BookId,
        book: NewBook,
    ) -> Result<Book, BooksRepositoryError> {
        self.patch_book(user_id, book_id, editable_fields_patch(&book))
            .await
    }

    async fn set_attachment(
        &self,
        user_id: UserId,
        book_id: BookId,
        kind: AttachmentKind,
        path: Option<String>,
    ) -> Result<Book, BooksRepositoryError> {
        self.patch_book(user_id, book_id, attachment_patch(kind, path))
            .await
    }

    async fn delete_book(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<Book, BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("DELETE FROM books WHERE id = ($1) AND user_id = ($2) RETURNING params")
            .await?;

        let rows = self.client.query(&stmt, &[&book_id, &user_id]).await?;
        book_from_params(rows.first(), book_id, user_id)
    }
}

#[cfg(test)]
mod postgres_books_repository_tests {
    use serial_test::file_serial;
    use testcontainers::core::IntoContainerPort;
    use testcontainers::runners::AsyncRunner;
    use testcontainers::{ContainerAsync, GenericImage, ImageExt};

    use crate::api::{AttachmentKind, Status, StatusFilter};
    use crate::book_form::{NewBook, Progress};
    use crate::books_repository::{
        BooksRepository, BooksRepositoryError, PostgresBooksRepository,
        PostgresBooksRepositoryConfig,
    };

    async fn start_postgres_container_and_init_repo(
    ) -> (ContainerAsync<GenericImage>, PostgresBooksRepository) {
        let _pg_container = GenericImage::new("postgres", "latest")
            .with_mapped_port(5432, 5432.tcp())
            .with_env_var("POSTGRES_USER", "postgres")
            .with_env_var("POSTGRES_PASSWORD", "postgres")
            .start()
            .await
            .expect("Failed to start postgres");

        for _ in 0..10 {
            if let Ok(repo) = PostgresBooksRepository::init(PostgresBooksRepositoryConfig {
                hostname: "127.0.0.1".to_string(),
                username: "postgres".to_string(),
                password: "postgres".to_string(),
            })
            .await
            {
                return (_pg_container, repo);
            }
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        }
        panic!("Failed to setup postgres container")
    }

    fn new_book(title: &str, progress: Progress) -> NewBook {
        NewBook {
            title: title.to_string(),
            author: "Herbert".to_string(),
            genre: Some("Sci-fi".to_string()),
            premise: Some("Spice".to_string()),
            review: None,
            progress,
        }
    }

    #[tokio::test]
    #[file_serial(key, path => "../.pgtestslock")]
    /// Covers the whole book lifecycle
    /// for the sake of not starting container multiple times it tests everything in one testcase
    async fn test_book_lifecycle() {
        let (_container, repo) = start_postgres_container_and_init_repo().await;

        assert!(matches!(
            repo.get_book(1, 20000).await,
            Err(BooksRepositoryError::NotFound(20000))
        ));
        assert_eq!(repo.list_books(1, StatusFilter::All).await.unwrap(), vec![]);

        let reading = repo
            .add_book(
                1,
                new_book(
                    "Dune",
                    Progress::Reading {
                        total_pages: 400,
                        current_page: 20,
                    },
                ),
            )
            .await
            .expect("Failed to add book");
        let to_read = repo
            .add_book(1, new_book("Children of Dune", Progress::ToRead))
            .await
            .expect("Failed to add book");
        repo.add_book(2, new_book("Foreign", Progress::ToRead))
            .await
            .expect("Failed to add book");

        assert_eq!(repo.get_book(1, reading.id).await.unwrap(), reading);
        assert!(matches!(
            repo.get_book(2, reading.id).await,
            Err(BooksRepositoryError::NotFound(..))
        ));

        let all = repo.list_books(1, StatusFilter::All).await.unwrap();
        assert_eq!(all, vec![reading.clone(), to_read.clone()]);
        let only_to_read = repo.list_books(1, StatusFilter::ToRead).await.unwrap();
        assert_eq!(only_to_read, vec![to_read.clone()]);

        let with_pdf = repo
            .set_attachment(
                1,
                reading.id,
                AttachmentKind::Pdf,
                Some("uploads/1_1_pdf.pdf".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(with_pdf.pdf_path.as_deref(), Some("uploads/1_1_pdf.pdf"));

        let updated = repo
            .update_book(
                1,
                reading.id,
                new_book(
                    "Dune",
                    Progress::Read {
                        rating: Some(4.5),
                        total_pages: Some(400),
                    },
                ),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, Status::Read);
        assert_eq!(updated.current_page, None);
        assert_eq!(updated.rating, Some(4.5));
        assert_eq!(updated.pdf_path.as_deref(), Some("uploads/1_1_pdf.pdf"));

        assert!(matches!(
            repo.update_book(2, reading.id, new_book("x", Progress::ToRead))
                .await,
            Err(BooksRepositoryError::NotFound(..))
        ));

        let deleted = repo.delete_book(1, to_read.id).await.unwrap();
        assert_eq!(deleted, to_read);
        assert_eq!(
            repo.list_books(1, StatusFilter::All).await.unwrap(),
            vec![updated]
        );
    }
}
