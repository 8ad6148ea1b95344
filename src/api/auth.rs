use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::handler::auth::AuthenticatedUser;
use crate::handler::errors::ErrorResponse;
use crate::repository::sqlx_impl::{PgPasswordResetRepository, PgUserRepository};
use crate::services::user_service::{
    ChangePasswordRequest, ForgotPasswordRequest, RegisterRequest, ResetPasswordRequest,
    UserService,
};

type UserServiceType = UserService<PgUserRepository, PgPasswordResetRepository>;

#[derive(Deserialize)]
pub struct LoginApi {
    pub identity: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    pub token: String,
}

#[derive(Serialize)]
pub struct RefreshTokenResponse {
    pub token: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// POST /api/register
pub async fn register_api(
    Extension(service): Extension<Arc<UserServiceType>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let auth_response = service.register(payload).await?;
    Ok((StatusCode::CREATED, Json(auth_response)))
}

/// POST /api/login
pub async fn login_api(
    Extension(service): Extension<Arc<UserServiceType>>,
    Json(payload): Json<LoginApi>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let auth_response = service.login(payload.identity, payload.password).await?;
    Ok(Json(auth_response))
}

/// POST /api/refresh-token
pub async fn refresh_token_api(
    Extension(service): Extension<Arc<UserServiceType>>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let token = service.refresh_token(&payload.token).await?;
    Ok(Json(RefreshTokenResponse { token }))
}

/// GET /api/me
pub async fn me_api(
    Extension(service): Extension<Arc<UserServiceType>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(service.get_user(user.user_id).await?))
}

/// POST /api/change-password
pub async fn change_password_api(
    Extension(service): Extension<Arc<UserServiceType>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    service.change_password(user.user_id, payload).await?;
    Ok(MessageResponse::new("Password changed successfully"))
}

/// POST /api/forgot-password
///
/// Answers the same way whether or not the address has an account. No mailer
/// is wired in, so the reset link is written to the log.
pub async fn forgot_password_api(
    Extension(service): Extension<Arc<UserServiceType>>,
    Extension(config): Extension<Arc<AppConfig>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    if let Some(token) = service.forgot_password(payload).await? {
        log_reset_link(&config, &token);
    }
    Ok(MessageResponse::new(
        "If the address has an account, a reset link has been sent",
    ))
}

/// POST /api/reset-password
pub async fn reset_password_api(
    Extension(service): Extension<Arc<UserServiceType>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    service.reset_password(payload).await?;
    Ok(MessageResponse::new("Password reset successfully"))
}

pub fn log_reset_link(config: &AppConfig, token: &str) {
    tracing::info!(
        reset_url = %format!("{}/reset-password?token={}", config.public_base_url, token),
        "password reset requested"
    );
}
