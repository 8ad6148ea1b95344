use axum::http::header::SET_COOKIE;
use axum::{
    extract::{Extension, Form, Query},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tera::{Context, Tera};

use crate::api::auth::log_reset_link;
use crate::config::AppConfig;
use crate::handler::auth::{clear_session_cookie, safe_next, session_cookie};
use crate::handler::errors::{page_error, public_message, status_for};
use crate::repository::sqlx_impl::{PgPasswordResetRepository, PgUserRepository};
use crate::services::user_service::{
    ChangePasswordRequest, ForgotPasswordRequest, RegisterRequest, ResetPasswordRequest,
    UserService,
};
use crate::views::{CurrentUser, page_context, render, render_with_status};

type UserServiceType = UserService<PgUserRepository, PgPasswordResetRepository>;

#[derive(Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub username: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub identity: String, // email or username
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Deserialize)]
pub struct ChangePasswordForm {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordForm {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordQuery {
    pub token: Option<String>,
}

#[derive(Deserialize)]
pub struct ResetPasswordForm {
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Re-renders a form with the error from a failed service call. Unexpected
/// failures get the 500 page instead.
fn form_error(tmpl: &Tera, template: &str, mut ctx: Context, err: &anyhow::Error) -> Response {
    let status = status_for(err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        return page_error(tmpl, err);
    }
    ctx.insert("error", &public_message(err));
    render_with_status(tmpl, status, template, &ctx)
}

fn with_session(token: &str, config: &AppConfig, to: &str) -> Response {
    (
        [(SET_COOKIE, session_cookie(token, config.is_production()))],
        Redirect::to(to),
    )
        .into_response()
}

// GET /register
pub async fn register_page(Extension(tmpl): Extension<Tera>, user: CurrentUser) -> Response {
    let ctx = page_context("Register", &user);
    render(&tmpl, "register.html", &ctx)
}

// POST /register
pub async fn register_post(
    Extension(service): Extension<Arc<UserServiceType>>,
    Extension(config): Extension<Arc<AppConfig>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Form(payload): Form<RegisterForm>,
) -> Response {
    let mut ctx = page_context("Register", &user);
    ctx.insert("form_email", &payload.email);
    ctx.insert("form_username", &payload.username);
    ctx.insert("form_full_name", &payload.full_name);
    ctx.insert("form_phone", &payload.phone);

    if payload.password != payload.confirm_password {
        ctx.insert("error", "Passwords do not match");
        return render_with_status(&tmpl, StatusCode::BAD_REQUEST, "register.html", &ctx);
    }

    let req = RegisterRequest {
        email: payload.email,
        username: payload.username,
        full_name: payload.full_name,
        phone: payload.phone,
        password: payload.password,
    };

    match service.register(req).await {
        Ok(auth_response) => with_session(&auth_response.token, &config, "/account"),
        Err(e) => form_error(&tmpl, "register.html", ctx, &e),
    }
}

// GET /login?next=/checkin
pub async fn login_page(
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Query(params): Query<NextQuery>,
) -> Response {
    let mut ctx = page_context("Login", &user);
    ctx.insert("next", safe_next(params.next.as_deref()));
    render(&tmpl, "login.html", &ctx)
}

// POST /login
pub async fn login_post(
    Extension(service): Extension<Arc<UserServiceType>>,
    Extension(config): Extension<Arc<AppConfig>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Form(payload): Form<LoginForm>,
) -> Response {
    let next = safe_next(payload.next.as_deref()).to_string();

    match service.login(payload.identity.clone(), payload.password).await {
        Ok(auth_response) => {
            // accounts created by an admin must pick their own password first
            let to = if auth_response.requires_password_change {
                "/change-password"
            } else {
                next.as_str()
            };
            with_session(&auth_response.token, &config, to)
        }
        Err(e) => {
            let mut ctx = page_context("Login", &user);
            ctx.insert("next", &next);
            ctx.insert("form_identity", &payload.identity);
            form_error(&tmpl, "login.html", ctx, &e)
        }
    }
}

// GET /logout
pub async fn logout() -> Response {
    ([(SET_COOKIE, clear_session_cookie())], Redirect::to("/")).into_response()
}

// GET /change-password
pub async fn change_password_page(
    Extension(service): Extension<Arc<UserServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
) -> Response {
    let mut ctx = page_context("Change Password", &user);
    if let Some(Extension(current)) = &user {
        match service.get_user(current.user_id).await {
            Ok(account) => ctx.insert("first_login", &account.first_login),
            Err(e) => return page_error(&tmpl, &e),
        }
    }
    render(&tmpl, "change_password.html", &ctx)
}

// POST /change-password
pub async fn change_password_post(
    Extension(service): Extension<Arc<UserServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Form(payload): Form<ChangePasswordForm>,
) -> Response {
    let Some(Extension(current)) = &user else {
        return Redirect::to("/login?next=%2Fchange-password").into_response();
    };
    let user_id = current.user_id;

    let mut ctx = page_context("Change Password", &user);

    if payload.new_password != payload.confirm_password {
        ctx.insert("error", "New passwords do not match");
        return render_with_status(&tmpl, StatusCode::BAD_REQUEST, "change_password.html", &ctx);
    }

    let req = ChangePasswordRequest {
        current_password: payload.current_password,
        new_password: payload.new_password,
    };

    match service.change_password(user_id, req).await {
        Ok(()) => Redirect::to("/account").into_response(),
        Err(e) => form_error(&tmpl, "change_password.html", ctx, &e),
    }
}

// GET /forgot-password
pub async fn forgot_password_page(Extension(tmpl): Extension<Tera>, user: CurrentUser) -> Response {
    let ctx = page_context("Forgot Password", &user);
    render(&tmpl, "forgot_password.html", &ctx)
}

// POST /forgot-password
pub async fn forgot_password_post(
    Extension(service): Extension<Arc<UserServiceType>>,
    Extension(config): Extension<Arc<AppConfig>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Form(payload): Form<ForgotPasswordForm>,
) -> Response {
    match service
        .forgot_password(ForgotPasswordRequest {
            email: payload.email,
        })
        .await
    {
        Ok(token) => {
            if let Some(token) = token {
                log_reset_link(&config, &token);
            }
            let mut ctx = page_context("Forgot Password", &user);
            ctx.insert(
                "message",
                "If the address has an account, a reset link has been sent.",
            );
            render(&tmpl, "forgot_password.html", &ctx)
        }
        Err(e) => page_error(&tmpl, &e),
    }
}

// GET /reset-password?token=TOKEN
pub async fn reset_password_page(
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Query(params): Query<ResetPasswordQuery>,
) -> Response {
    let Some(token) = params.token.filter(|t| !t.trim().is_empty()) else {
        return Redirect::to("/forgot-password").into_response();
    };
    let mut ctx = page_context("Reset Password", &user);
    ctx.insert("token", &token);
    render(&tmpl, "reset_password.html", &ctx)
}

// POST /reset-password
pub async fn reset_password_post(
    Extension(service): Extension<Arc<UserServiceType>>,
    Extension(tmpl): Extension<Tera>,
    user: CurrentUser,
    Form(payload): Form<ResetPasswordForm>,
) -> Response {
    let mut ctx = page_context("Reset Password", &user);
    ctx.insert("token", &payload.token);

    if payload.new_password != payload.confirm_password {
        ctx.insert("error", "New passwords do not match");
        return render_with_status(&tmpl, StatusCode::BAD_REQUEST, "reset_password.html", &ctx);
    }

    let req = ResetPasswordRequest {
        token: payload.token,
        new_password: payload.new_password,
    };

    match service.reset_password(req).await {
        Ok(()) => Redirect::to("/login").into_response(),
        Err(e) => form_error(&tmpl, "reset_password.html", ctx, &e),
    }
}
