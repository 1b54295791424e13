//! Password hashing, session tokens and the extractor guarding authenticated routes.

use std::sync::Arc;

use actix_web::dev::Payload;
use actix_web::error::InternalError;
use actix_web::http::header::AUTHORIZATION;
use actix_web::web::Data;
use actix_web::{FromRequest, HttpRequest, HttpResponse};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use paperclip::actix::OperationModifier;
use paperclip::v2::schema::Apiv2Schema;
use serde::{Deserialize, Serialize};

use crate::api::{ErrorResponse, UserId};
use crate::users_repository::{UsersRepository, UsersRepositoryError};

/// Name of the cookie set on login, the same name as the header
pub const AUTH_COOKIE: &str = "Authorization";
pub const TOKEN_LIFETIME_HOURS: i64 = 72;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Failed to hash password: {0}")]
    Hashing(String),

    #[error("Failed to generate token: {0}")]
    TokenGeneration(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: UserId,
    exp: i64,
}

/// HS256 keys derived from the configured secret
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue(&self, user_id: UserId) -> Result<String, AuthError> {
        let expires_at = Utc::now() + chrono::Duration::hours(TOKEN_LIFETIME_HOURS);
        self.issue_with_expiry(user_id, expires_at.timestamp())
    }

    fn issue_with_expiry(&self, user_id: UserId, exp: i64) -> Result<String, AuthError> {
        let claims = Claims { sub: user_id, exp };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AuthError::TokenGeneration(err.to_string()))
    }

    /// Returns the user the token was issued for
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims.sub)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hashing(err.to_string()))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(password_hash).map_err(|err| AuthError::Hashing(err.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Token from `Authorization: Bearer` header, falling back to the login cookie
fn request_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());

    from_header.or_else(|| req.cookie(AUTH_COOKIE).map(|cookie| cookie.value().to_string()))
}

fn unauthorized(error: AuthError) -> actix_web::Error {
    let response = HttpResponse::Unauthorized().json(ErrorResponse {
        error: error.to_string(),
    });
    InternalError::from_response(error, response).into()
}

/// Id of the user owning the request, rejects with 401 when the session is not valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = request_token(req);
        let keys = req.app_data::<Data<TokenKeys>>().cloned();
        let users = req
            .app_data::<Data<Arc<dyn UsersRepository + Send + Sync>>>()
            .cloned();

        Box::pin(async move {
            let token = token.ok_or_else(|| unauthorized(AuthError::MissingToken))?;
            let (Some(keys), Some(users)) = (keys, users) else {
                tracing::error!("Token keys or users repository not registered");
                return Err(actix_web::error::ErrorInternalServerError(
                    "Authentication not configured",
                ));
            };

            let user_id = keys.verify(&token).map_err(unauthorized)?;
            match users.get_user(user_id).await {
                Ok(_) => Ok(AuthenticatedUser { user_id }),
                Err(UsersRepositoryError::UserNotFound(_)) => {
                    Err(unauthorized(AuthError::InvalidToken))
                }
                Err(err) => {
                    tracing::error!("Failed to check user of token {}", err);
                    Err(actix_web::error::ErrorInternalServerError(
                        "Failed to check session",
                    ))
                }
            }
        })
    }
}

impl Apiv2Schema for AuthenticatedUser {}
impl OperationModifier for AuthenticatedUser {}
