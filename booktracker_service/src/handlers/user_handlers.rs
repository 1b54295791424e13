use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use paperclip::actix::{api_v2_operation, web};

use crate::api::UserPatch;
use crate::auth::AuthenticatedUser;
use crate::handlers::error_response;
use crate::users_repository::{UsersRepository, UsersRepositoryError};

#[api_v2_operation]
pub async fn get_user(
    user: AuthenticatedUser,
    users_repository: Data<Arc<dyn UsersRepository + Send + Sync>>,
) -> Result<HttpResponse, Error> {
    Ok(match users_repository.get_user(user.user_id).await {
        Ok(user) => HttpResponse::Ok().json(user),
        Err(err @ UsersRepositoryError::UserNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, err)
        }
        Err(err) => {
            tracing::error!("Get user failed {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Error getting user")
        }
    })
}

#[api_v2_operation]
pub async fn update_user(
    user: AuthenticatedUser,
    users_repository: Data<Arc<dyn UsersRepository + Send + Sync>>,
    patch: web::Json<UserPatch>,
) -> Result<HttpResponse, Error> {
    Ok(
        match users_repository
            .update_user(user.user_id, patch.into_inner())
            .await
        {
            Ok(user) => HttpResponse::Ok().json(user),
            Err(err @ UsersRepositoryError::InvalidField(_)) => {
                error_response(StatusCode::BAD_REQUEST, err)
            }
            Err(err @ UsersRepositoryError::EmailTaken(_)) => {
                error_response(StatusCode::CONFLICT, err)
            }
            Err(err @ UsersRepositoryError::UserNotFound(_)) => {
                error_response(StatusCode::NOT_FOUND, err)
            }
            Err(err) => {
                tracing::error!("Update user failed {}", err);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Error updating user")
            }
        },
    )
}
