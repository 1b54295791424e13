use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};

use chrono::Utc;
use serde_json::json;

use crate::api::{AttachmentKind, Book, BookId, StatusFilter, UserId};
use crate::book_form::NewBook;
use crate::books_repository::{
    attachment_patch, editable_fields_patch, BooksRepository, BooksRepositoryError, StoredBook,
};

struct OwnedBook {
    user_id: UserId,
    book: StoredBook,
}

#[derive(Default)]
pub struct InMemoryBooksRepository {
    book_sequence_generator: AtomicI32,
    books: parking_lot::RwLock<BTreeMap<BookId, OwnedBook>>,
}

impl InMemoryBooksRepository {
    fn patch_book(
        &self,
        user_id: UserId,
        book_id: BookId,
        patch: serde_json::Value,
    ) -> Result<Book, BooksRepositoryError> {
        let mut locked_books = self.books.write();
        match locked_books.get_mut(&book_id) {
            Some(owned) if owned.user_id == user_id => {
                let mut result_book = json!(owned.book);
                json_patch::merge(&mut result_book, &patch);
                owned.book = serde_json::from_value(result_book)?;
                Ok(owned.book.clone().into_book(book_id, user_id))
            }
            _ => Err(BooksRepositoryError::NotFound(book_id)),
        }
    }
}

#[async_trait::async_trait]
impl BooksRepository for InMemoryBooksRepository {
    async fn add_book(&self, user_id: UserId, book: NewBook) -> Result<Book, BooksRepositoryError> {
        let id = self.book_sequence_generator.fetch_add(1, Ordering::Relaxed) + 1;
        let book = StoredBook::new(book, Utc::now());
        self.books.write().insert(
            id,
            OwnedBook {
                user_id,
                book: book.clone(),
            },
        );
        Ok(book.into_book(id, user_id))
    }

    async fn get_book(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<Book, BooksRepositoryError> {
        self.books
            .read()
            .get(&book_id)
            .filter(|owned| owned.user_id == user_id)
            .map(|owned| owned.book.clone().into_book(book_id, user_id))
            .ok_or(BooksRepositoryError::NotFound(book_id))
    }

    async fn list_books(
        &self,
        user_id: UserId,
        filter: StatusFilter,
    ) -> Result<Vec<Book>, BooksRepositoryError> {
        Ok(self
            .books
            .read()
            .iter()
            .filter(|(_, owned)| owned.user_id == user_id && filter.matches(owned.book.status))
            .map(|(&book_id, owned)| owned.book.clone().into_book(book_id, user_id))
            .collect())
    }

    async fn update_book(
        &self,
        user_id: UserId,
        book_id: BookId,
        book: NewBook,
    ) -> Result<Book, BooksRepositoryError> {
        self.patch_book(user_id, book_id, editable_fields_patch(&book))
    }

    async fn set_attachment(
        &self,
        user_id: UserId,
        book_id: BookId,
        kind: AttachmentKind,
        path: Option<String>,
    ) -> Result<Book, BooksRepositoryError> {
        self.patch_book(user_id, book_id, attachment_patch(kind, path))
    }

    async fn delete_book(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<Book, BooksRepositoryError> {
        let mut locked_books = self.books.write();
        match locked_books.get(&book_id) {
            Some(owned) if owned.user_id == user_id => {
                let owned = locked_books
                    .remove(&book_id)
                    .ok_or(BooksRepositoryError::NotFound(book_id))?;
                Ok(owned.book.into_book(book_id, user_id))
            }
            _ => Err(BooksRepositoryError::NotFound(book_id)),
        }
    }
}

#[cfg(test)]
mod in_memory_books_repository_tests {
    use crate::api::{AttachmentKind, Status, StatusFilter};
    use crate::book_form::{NewBook, Progress};
    use crate::books_repository::{BooksRepository, BooksRepositoryError, InMemoryBooksRepository};

    fn new_book(title: &str, progress: Progress) -> NewBook {
        NewBook {
            title: title.to_string(),
            author: "Herbert".to_string(),
            genre: Some("Sci-fi".to_string()),
            premise: None,
            review: None,
            progress,
        }
    }

    #[tokio::test]
    /// Tests if add_book and get_book work correctly and keep books of users apart
    async fn test_add_book_and_get_it() {
        let repo = InMemoryBooksRepository::default();

        let book_not_found = repo.get_book(1, 20000).await;
        assert!(matches!(
            book_not_found,
            Err(BooksRepositoryError::NotFound(20000))
        ));

        let added = repo
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
        assert!(added.id > 0);
        assert_eq!(added.status, Status::Reading);
        assert_eq!(added.total_pages, Some(400));
        assert_eq!(added.current_page, Some(20));

        let book = repo.get_book(1, added.id).await.expect("Failed to get book");
        assert_eq!(book, added);

        let other_user = repo.get_book(2, added.id).await;
        assert!(matches!(
            other_user,
            Err(BooksRepositoryError::NotFound(..))
        ));
    }

    #[tokio::test]
    /// Tests if list_books filters by owner and status and keeps id order
    async fn test_add_books_and_list_them() {
        let repo = InMemoryBooksRepository::default();

        let list = repo
            .list_books(1, StatusFilter::All)
            .await
            .expect("Failed to list books");
        assert_eq!(list, vec![]);

        let first = repo
            .add_book(1, new_book("first", Progress::ToRead))
            .await
            .unwrap();
        let second = repo
            .add_book(
                1,
                new_book(
                    "second",
                    Progress::Read {
                        rating: Some(4.5),
                        total_pages: None,
                    },
                ),
            )
            .await
            .unwrap();
        repo.add_book(2, new_book("foreign", Progress::ToRead))
            .await
            .unwrap();

        let all_ids: Vec<_> = repo
            .list_books(1, StatusFilter::All)
            .await
            .unwrap()
            .iter()
            .map(|book| book.id)
            .collect();
        assert_eq!(all_ids, vec![first.id, second.id]);

        let read = repo.list_books(1, StatusFilter::Read).await.unwrap();
        assert_eq!(read, vec![second]);
    }

    #[tokio::test]
    /// Tests if update_book replaces progress fields and keeps attachments
    async fn test_update_book_and_attachments() {
        let repo = InMemoryBooksRepository::default();

        let missing = repo
            .update_book(1, 2000, new_book("x", Progress::ToRead))
            .await;
        assert!(matches!(missing, Err(BooksRepositoryError::NotFound(2000))));

        let added = repo
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
            .unwrap();

        let with_cover = repo
            .set_attachment(
                1,
                added.id,
                AttachmentKind::Cover,
                Some("uploads/1_1_cover.png".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(with_cover.cover_path.as_deref(), Some("uploads/1_1_cover.png"));
        assert_eq!(with_cover.pdf_path, None);

        let updated = repo
            .update_book(
                1,
                added.id,
                NewBook {
                    genre: None,
                    review: Some("Great".to_string()),
                    ..new_book(
                        "Dune Messiah",
                        Progress::Read {
                            rating: Some(5.0),
                            total_pages: None,
                        },
                    )
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Dune Messiah");
        assert_eq!(updated.status, Status::Read);
        assert_eq!(updated.total_pages, None);
        assert_eq!(updated.current_page, None);
        assert_eq!(updated.rating, Some(5.0));
        assert_eq!(updated.genre, None);
        assert_eq!(updated.review.as_deref(), Some("Great"));
        assert_eq!(updated.cover_path.as_deref(), Some("uploads/1_1_cover.png"));
        assert_eq!(updated.created_at, added.created_at);

        let wrong_owner = repo
            .set_attachment(2, added.id, AttachmentKind::Pdf, Some("x".to_string()))
            .await;
        assert!(matches!(
            wrong_owner,
            Err(BooksRepositoryError::NotFound(..))
        ));
    }

    #[tokio::test]
    async fn test_delete_book() {
        let repo = InMemoryBooksRepository::default();
        let added = repo
            .add_book(1, new_book("Dune", Progress::ToRead))
            .await
            .unwrap();

        assert!(matches!(
            repo.delete_book(2, added.id).await,
            Err(BooksRepositoryError::NotFound(..))
        ));

        let deleted = repo.delete_book(1, added.id).await.unwrap();
        assert_eq!(deleted, added);
        assert!(matches!(
            repo.get_book(1, added.id).await,
            Err(BooksRepositoryError::NotFound(..))
        ));
        assert!(matches!(
            repo.delete_book(1, added.id).await,
            Err(BooksRepositoryError::NotFound(..))
        ));
    }
}
