use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use paperclip::actix::{api_v2_operation, web};

use crate::api::{BookId, BookPayload, BooksQuery, MessageResponse};
use crate::attachments::AttachmentStore;
use crate::auth::AuthenticatedUser;
use crate::book_form::NewBook;
use crate::books_repository::{BooksRepository, BooksRepositoryError};
use crate::handlers::error_response;

fn repository_error_response(operation: &str, err: BooksRepositoryError) -> HttpResponse {
    match err {
        BooksRepositoryError::NotFound(_) => error_response(StatusCode::NOT_FOUND, err),
        err => {
            tracing::error!("{} failed {}", operation, err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{} failed", operation))
        }
    }
}

#[api_v2_operation]
pub async fn list_books(
    user: AuthenticatedUser,
    books_repository: Data<Arc<dyn BooksRepository + Send + Sync>>,
    query: web::Query<BooksQuery>,
) -> Result<HttpResponse, Error> {
    let filter = query.into_inner().status.unwrap_or_default();
    Ok(
        match books_repository.list_books(user.user_id, filter).await {
            Ok(books) => HttpResponse::Ok().json(books),
            Err(err) => repository_error_response("List books", err),
        },
    )
}

#[api_v2_operation]
pub async fn add_book(
    user: AuthenticatedUser,
    books_repository: Data<Arc<dyn BooksRepository + Send + Sync>>,
    payload: web::Json<BookPayload>,
) -> Result<HttpResponse, Error> {
    let new_book = match NewBook::try_from(payload.into_inner()) {
        Ok(new_book) => new_book,
        Err(err) => return Ok(error_response(StatusCode::BAD_REQUEST, err)),
    };

    Ok(
        match books_repository.add_book(user.user_id, new_book).await {
            Ok(book) => HttpResponse::Created().json(book),
            Err(err) => repository_error_response("Add book", err),
        },
    )
}

#[api_v2_operation]
pub async fn get_book(
    user: AuthenticatedUser,
    books_repository: Data<Arc<dyn BooksRepository + Send + Sync>>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    Ok(
        match books_repository
            .get_book(user.user_id, book_id.into_inner())
            .await
        {
            Ok(book) => HttpResponse::Ok().json(book),
            Err(err) => repository_error_response("Get book", err),
        },
    )
}

#[api_v2_operation]
pub async fn update_book(
    user: AuthenticatedUser,
    books_repository: Data<Arc<dyn BooksRepository + Send + Sync>>,
    book_id: web::Path<BookId>,
    payload: web::Json<BookPayload>,
) -> Result<HttpResponse, Error> {
    let new_book = match NewBook::try_from(payload.into_inner()) {
        Ok(new_book) => new_book,
        Err(err) => return Ok(error_response(StatusCode::BAD_REQUEST, err)),
    };

    Ok(
        match books_repository
            .update_book(user.user_id, book_id.into_inner(), new_book)
            .await
        {
            Ok(book) => HttpResponse::Ok().json(book),
            Err(err) => repository_error_response("Update book", err),
        },
    )
}

#[api_v2_operation]
pub async fn delete_book(
    user: AuthenticatedUser,
    books_repository: Data<Arc<dyn BooksRepository + Send + Sync>>,
    attachment_store: Data<Arc<dyn AttachmentStore + Send + Sync>>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    let book = match books_repository
        .delete_book(user.user_id, book_id.into_inner())
        .await
    {
        Ok(book) => book,
        Err(err) => return Ok(repository_error_response("Delete book", err)),
    };

    for path in [book.cover_path.as_deref(), book.pdf_path.as_deref()]
        .into_iter()
        .flatten()
    {
        if let Err(err) = attachment_store.remove(path).await {
            tracing::warn!("Failed to remove attachment of deleted book {}: {}", book.id, err);
        }
    }

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "book deleted successfully".to_string(),
    }))
}
