use actix_web::http::StatusCode;
use actix_web::{Error, HttpResponse};
use paperclip::actix::api_v2_operation;

use crate::api::ErrorResponse;

mod attachment_handlers;
mod auth_handlers;
mod book_handlers;
mod user_handlers;

pub use attachment_handlers::{download_attachment, upload_attachment};
pub use auth_handlers::{login, register};
pub use book_handlers::{add_book, delete_book, get_book, list_books, update_book};
pub use user_handlers::{get_user, update_user};

#[api_v2_operation]
pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().finish())
}

pub(crate) fn error_response(status: StatusCode, error: impl ToString) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: error.to_string(),
    })
}
