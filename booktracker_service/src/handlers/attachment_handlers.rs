use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::web::{Data, Path};
use actix_web::HttpResponse;
use futures_util::TryStreamExt;

use crate::api::{content_type_for, AttachmentKind, BookId};
use crate::attachments::{AttachmentError, AttachmentStore, UploadLimit};
use crate::auth::AuthenticatedUser;
use crate::books_repository::{BooksRepository, BooksRepositoryError};
use crate::handlers::error_response;

struct UploadedFile {
    content_type: String,
    bytes: Vec<u8>,
}

#[derive(thiserror::Error, Debug)]
enum UploadError {
    #[error("File exceeds the upload limit of {0} bytes")]
    TooLarge(usize),

    #[error(transparent)]
    Multipart(#[from] actix_multipart::MultipartError),
}

/// Reads the form field named after the attachment kind, other fields are skipped
async fn read_field(
    mut payload: Multipart,
    kind: AttachmentKind,
    limit: UploadLimit,
) -> Result<Option<UploadedFile>, UploadError> {
    while let Some(mut field) = payload.try_next().await? {
        if field.name() != kind.field_name() {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();
        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if bytes.len() + chunk.len() > limit.bytes {
                return Err(UploadError::TooLarge(limit.bytes));
            }
            bytes.extend_from_slice(&chunk);
        }
        return Ok(Some(UploadedFile {
            content_type,
            bytes,
        }));
    }
    Ok(None)
}

fn book_error_response(err: BooksRepositoryError) -> HttpResponse {
    match err {
        BooksRepositoryError::NotFound(_) => error_response(StatusCode::NOT_FOUND, err),
        err => {
            tracing::error!("Attachment book lookup failed {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Error accessing book")
        }
    }
}

pub async fn upload_attachment(
    user: AuthenticatedUser,
    books_repository: Data<Arc<dyn BooksRepository + Send + Sync>>,
    attachment_store: Data<Arc<dyn AttachmentStore + Send + Sync>>,
    upload_limit: Data<UploadLimit>,
    path: Path<(BookId, AttachmentKind)>,
    payload: Multipart,
) -> HttpResponse {
    let (book_id, kind) = path.into_inner();
    let book = match books_repository.get_book(user.user_id, book_id).await {
        Ok(book) => book,
        Err(err) => return book_error_response(err),
    };

    let file = match read_field(payload, kind, **upload_limit).await {
        Ok(Some(file)) => file,
        Ok(None) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Missing form field {}", kind.field_name()),
            )
        }
        Err(err @ UploadError::TooLarge(_)) => {
            tracing::warn!("Rejected {} upload for book {}: {}", kind, book_id, err);
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, err);
        }
        Err(UploadError::Multipart(err)) => {
            tracing::warn!("Malformed {} upload for book {}: {}", kind, book_id, err);
            return error_response(StatusCode::BAD_REQUEST, "Invalid multipart form");
        }
    };

    if !kind.accepts(&file.content_type) {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Unsupported {} content type '{}'", kind, file.content_type),
        );
    }

    let new_path = match attachment_store
        .save(user.user_id, book_id, kind, file.bytes, &file.content_type)
        .await
    {
        Ok(path) => path,
        Err(err) => {
            tracing::error!("Failed to store {} of book {}: {}", kind, book_id, err);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store file");
        }
    };

    let updated = match books_repository
        .set_attachment(user.user_id, book_id, kind, Some(new_path.clone()))
        .await
    {
        Ok(book) => book,
        Err(err) => {
            if let Err(remove_err) = attachment_store.remove(&new_path).await {
                tracing::warn!(
                    "Failed to remove unrecorded {} {}: {}",
                    kind,
                    new_path,
                    remove_err
                );
            }
            return book_error_response(err);
        }
    };

    if let Some(old_path) = kind.path_of(&book).filter(|old| *old != new_path) {
        if let Err(err) = attachment_store.remove(old_path).await {
            tracing::warn!("Failed to remove replaced {} {}: {}", kind, old_path, err);
        }
    }

    HttpResponse::Ok().json(updated)
}

pub async fn download_attachment(
    user: AuthenticatedUser,
    books_repository: Data<Arc<dyn BooksRepository + Send + Sync>>,
    attachment_store: Data<Arc<dyn AttachmentStore + Send + Sync>>,
    path: Path<(BookId, AttachmentKind)>,
) -> HttpResponse {
    let (book_id, kind) = path.into_inner();
    let book = match books_repository.get_book(user.user_id, book_id).await {
        Ok(book) => book,
        Err(err) => return book_error_response(err),
    };

    let Some(stored_path) = kind.path_of(&book) else {
        return error_response(StatusCode::NOT_FOUND, kind.missing_message());
    };

    match attachment_store.load(stored_path).await {
        Ok(bytes) => HttpResponse::Ok()
            .content_type(content_type_for(stored_path))
            .body(bytes),
        Err(AttachmentError::NotFound(_)) => {
            tracing::warn!("{} of book {} missing from storage", kind, book_id);
            error_response(StatusCode::NOT_FOUND, kind.missing_message())
        }
        Err(err) => {
            tracing::error!("Failed to load {} of book {}: {}", kind, book_id, err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load file")
        }
    }
}
