use std::sync::Arc;

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::error::InternalError;
use actix_web::web::{JsonConfig, PathConfig, QueryConfig};
use actix_web::{App, ResponseError};
use paperclip::actix::{web, OpenApiExt};
use tracing_actix_web::TracingLogger;

use crate::attachments::{AttachmentStore, UploadLimit};
use crate::auth::TokenKeys;
use crate::books_repository::BooksRepository;
use crate::handlers;
use crate::users_repository::UsersRepository;

/// Shared services handed to every worker
#[derive(Clone)]
pub struct AppState {
    pub books: Arc<dyn BooksRepository + Send + Sync>,
    pub users: Arc<dyn UsersRepository + Send + Sync>,
    pub attachments: Arc<dyn AttachmentStore + Send + Sync>,
    pub token_keys: Arc<TokenKeys>,
    pub upload_limit: UploadLimit,
}

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(handlers::health)))
        .service(web::resource("/auth/register").route(web::post().to(handlers::register)))
        .service(web::resource("/auth/login").route(web::post().to(handlers::login)))
        .service(
            web::resource("/books/")
                .route(web::get().to(handlers::list_books))
                .route(web::post().to(handlers::add_book)),
        )
        .service(
            web::resource("/books/{book_id}")
                .route(web::get().to(handlers::get_book))
                .route(web::put().to(handlers::update_book))
                .route(web::delete().to(handlers::delete_book)),
        )
        .service(
            web::resource("/user/")
                .route(web::get().to(handlers::get_user))
                .route(web::put().to(handlers::update_user)),
        );
}

/// Multipart routes, registered outside of the documented api
pub fn config_attachments(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(
        actix_web::web::resource("/books/{book_id}/{kind}")
            .route(actix_web::web::get().to(handlers::download_attachment))
            .route(actix_web::web::put().to(handlers::upload_attachment)),
    );
}

/// Keeps the status actix picked for a rejected body, query or path and answers with `{error}`
fn rejected<E: ResponseError + 'static>(err: E) -> actix_web::Error {
    let response = handlers::error_response(err.status_code(), &err);
    InternalError::from_response(err, response).into()
}

pub fn build_app(
    state: &AppState,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .wrap_api()
        .app_data(web::Data::new(state.books.clone()))
        .app_data(web::Data::new(state.users.clone()))
        .app_data(web::Data::new(state.attachments.clone()))
        .app_data(web::Data::from(state.token_keys.clone()))
        .app_data(web::Data::new(state.upload_limit))
        .app_data(JsonConfig::default().error_handler(|err, _req| rejected(err)))
        .app_data(QueryConfig::default().error_handler(|err, _req| rejected(err)))
        .app_data(PathConfig::default().error_handler(|err, _req| rejected(err)))
        .configure(config_app)
        .with_json_spec_at("/apispec/v2")
        .build()
        .configure(config_attachments)
        .wrap(TracingLogger::default())
}
