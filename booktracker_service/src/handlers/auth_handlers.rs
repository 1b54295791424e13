use std::sync::Arc;

use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::http::StatusCode;
use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use paperclip::actix::{api_v2_operation, web};

use crate::api::{LoginRequest, LoginResponse, RegisterRequest};
use crate::auth::{hash_password, verify_password, TokenKeys, AUTH_COOKIE, TOKEN_LIFETIME_HOURS};
use crate::handlers::error_response;
use crate::users_repository::{NewUser, UsersRepository, UsersRepositoryError};

#[api_v2_operation]
pub async fn register(
    users_repository: Data<Arc<dyn UsersRepository + Send + Sync>>,
    request: web::Json<RegisterRequest>,
) -> Result<HttpResponse, Error> {
    let request = request.into_inner();
    let username = request.username.trim();
    let email = request.email.trim();
    if username.is_empty() || email.is_empty() || request.password.is_empty() {
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            "username, email and password are required",
        ));
    }

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            tracing::error!("Register failed {}", err);
            return Ok(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to hash password",
            ));
        }
    };

    let new_user = NewUser {
        username: username.to_string(),
        email: email.to_string(),
        password_hash,
    };

    Ok(match users_repository.add_user(new_user).await {
        Ok(user) => {
            tracing::info!("Registered user {}", user.id);
            HttpResponse::Created().json(user)
        }
        Err(err @ UsersRepositoryError::EmailTaken(_)) => {
            error_response(StatusCode::CONFLICT, err)
        }
        Err(err) => {
            tracing::error!("Register failed {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to register user")
        }
    })
}

#[api_v2_operation]
pub async fn login(
    users_repository: Data<Arc<dyn UsersRepository + Send + Sync>>,
    token_keys: Data<TokenKeys>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse, Error> {
    let request = request.into_inner();
    let email = request.email.trim();
    if email.is_empty() || request.password.is_empty() {
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            "email and password are required",
        ));
    }

    let credentials = match users_repository.find_credentials(email).await {
        Ok(credentials) => credentials,
        Err(UsersRepositoryError::EmailNotFound(_)) => {
            return Ok(error_response(
                StatusCode::UNAUTHORIZED,
                "email not registered",
            ))
        }
        Err(err) => {
            tracing::error!("Login failed {}", err);
            return Ok(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to log in",
            ));
        }
    };

    match verify_password(&request.password, &credentials.password_hash) {
        Ok(true) => {}
        Ok(false) => {
            return Ok(error_response(
                StatusCode::UNAUTHORIZED,
                "incorrect password",
            ))
        }
        Err(err) => {
            tracing::error!("Stored password hash of user {} unusable {}", credentials.id, err);
            return Ok(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to log in",
            ));
        }
    }

    let token = match token_keys.issue(credentials.id) {
        Ok(token) => token,
        Err(err) => {
            tracing::error!("Login failed {}", err);
            return Ok(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to generate token",
            ));
        }
    };

    let cookie = Cookie::build(AUTH_COOKIE, token.clone())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(TOKEN_LIFETIME_HOURS))
        .finish();

    Ok(HttpResponse::Ok().cookie(cookie).json(LoginResponse {
        message: "login successful".to_string(),
        token,
    }))
}
