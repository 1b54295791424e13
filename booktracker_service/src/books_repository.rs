use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub use in_memory_books_repository::InMemoryBooksRepository;
pub use postgres_books_repository::{PostgresBooksRepository, PostgresBooksRepositoryConfig};

use crate::api::{AttachmentKind, Book, BookId, Status, StatusFilter, UserId};
use crate::book_form::NewBook;

mod in_memory_books_repository;
mod postgres_books_repository;

#[derive(thiserror::Error, Debug)]
pub enum BooksRepositoryError {
    #[error("Book {0} not found")]
    NotFound(BookId),

    #[error("Failed to deserialize book: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

/// Every operation is scoped to the owner, books of other users behave as missing
#[async_trait::async_trait]
pub trait BooksRepository {
    /// Adds book to the user's library, returns the stored book with its assigned id
    async fn add_book(&self, user_id: UserId, book: NewBook) -> Result<Book, BooksRepositoryError>;
    /// Retrieves a single book
    async fn get_book(&self, user_id: UserId, book_id: BookId)
        -> Result<Book, BooksRepositoryError>;
    /// Lists books of the user matching the filter, ordered by id
    async fn list_books(
        &self,
        user_id: UserId,
        filter: StatusFilter,
    ) -> Result<Vec<Book>, BooksRepositoryError>;
    /// Replaces editable fields of the book, attachments and creation time are kept
    async fn update_book(
        &self,
        user_id: UserId,
        book_id: BookId,
        book: NewBook,
    ) -> Result<Book, BooksRepositoryError>;
    /// Records where the attachment is stored, `None` clears it
    async fn set_attachment(
        &self,
        user_id: UserId,
        book_id: BookId,
        kind: AttachmentKind,
        path: Option<String>,
    ) -> Result<Book, BooksRepositoryError>;
    /// Removes the book, returns it so that its attachments can be cleaned up
    async fn delete_book(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<Book, BooksRepositoryError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Book fields kept as a JSON document, id and owner live next to it
struct StoredBook {
    title: String,
    author: String,
    genre: Option<String>,
    status: Status,
    total_pages: Option<u32>,
    current_page: Option<u32>,
    rating: Option<f64>,
    premise: Option<String>,
    review: Option<String>,
    cover_path: Option<String>,
    pdf_path: Option<String>,
    created_at: DateTime<Utc>,
}

impl StoredBook {
    fn new(book: NewBook, created_at: DateTime<Utc>) -> Self {
        Self {
            status: book.status(),
            total_pages: book.progress.total_pages(),
            current_page: book.progress.current_page(),
            rating: book.progress.rating(),
            title: book.title,
            author: book.author,
            genre: book.genre,
            premise: book.premise,
            review: book.review,
            cover_path: None,
            pdf_path: None,
            created_at,
        }
    }

    fn into_book(self, id: BookId, user_id: UserId) -> Book {
        Book {
            id,
            user_id,
            title: self.title,
            author: self.author,
            genre: self.genre,
            status: self.status,
            total_pages: self.total_pages,
            current_page: self.current_page,
            rating: self.rating,
            premise: self.premise,
            review: self.review,
            cover_path: self.cover_path,
            pdf_path: self.pdf_path,
            created_at: self.created_at,
        }
    }
}

/// Merge patch replacing every editable field, fields not carried by the new status become null
fn editable_fields_patch(book: &NewBook) -> serde_json::Value {
    json!({
        "title": book.title,
        "author": book.author,
        "genre": book.genre,
        "status": book.status(),
        "total_pages": book.progress.total_pages(),
        "current_page": book.progress.current_page(),
        "rating": book.progress.rating(),
        "premise": book.premise,
        "review": book.review,
    })
}

fn attachment_patch(kind: AttachmentKind, path: Option<String>) -> serde_json::Value {
    match kind {
        AttachmentKind::Cover => json!({ "cover_path": path }),
        AttachmentKind::Pdf => json!({ "pdf_path": path }),
    }
}
